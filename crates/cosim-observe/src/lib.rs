//! cosim-observe: vendor-neutral observability ABI.
//!
//! The matrix builders and the similarity cache depend only on these traits and
//! event types. Backends (Prometheus, OTLP, a live dashboard) live elsewhere.

pub trait Counter: Send + Sync {
    fn inc(&self, v: u64);
}
pub trait Gauge: Send + Sync {
    fn set(&self, v: i64);
}
pub trait Histogram: Send + Sync {
    fn observe(&self, v: f64);
}

pub trait Meter: Send + Sync + 'static {
    fn counter(
        &self,
        name: &'static str,
        labels: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Counter>;
    fn gauge(
        &self,
        name: &'static str,
        labels: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Gauge>;
    fn histo(
        &self,
        name: &'static str,
        _buckets: &'static [f64],
        labels: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Histogram>;
    fn emit(&self, evt: VizEvent);
}

/// A do-nothing meter for tests and users who don't care about telemetry.
#[derive(Clone, Default)]
pub struct NoopMeter;
struct NoopC;
impl Counter for NoopC {
    fn inc(&self, _v: u64) {}
}
struct NoopG;
impl Gauge for NoopG {
    fn set(&self, _v: i64) {}
}
struct NoopH;
impl Histogram for NoopH {
    fn observe(&self, _v: f64) {}
}
impl Meter for NoopMeter {
    fn counter(
        &self,
        _n: &'static str,
        _l: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Counter> {
        Box::new(NoopC)
    }
    fn gauge(
        &self,
        _n: &'static str,
        _l: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Gauge> {
        Box::new(NoopG)
    }
    fn histo(
        &self,
        _n: &'static str,
        _b: &'static [f64],
        _l: &'static [(&'static str, &'static str)],
    ) -> Box<dyn Histogram> {
        Box::new(NoopH)
    }
    fn emit(&self, _e: VizEvent) {}
}

/// Typed events for live visualization (item ids and scores never included).
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum VizEvent {
    Build(BuildEvt),
    Query(QueryEvt),
}

/// Which of the three cache matrices an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixKind {
    Feature,
    FeatureTranspose,
    Cosimilarity,
}

impl MatrixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixKind::Feature => "feature",
            MatrixKind::FeatureTranspose => "transpose",
            MatrixKind::Cosimilarity => "cosimilarity",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuildEvt {
    pub matrix: MatrixKind,
    pub kind: BuildKind,
}
#[derive(Clone, Debug)]
pub enum BuildKind {
    Start { rows: usize },
    Progress { processed: usize, total: usize },
    Finish { rows_written: u64, cells: u64, ms: u64 },
    Failed,
}

#[derive(Clone, Debug)]
pub struct QueryEvt {
    pub path: QueryPath,
    pub results: usize,
}

/// How a most-similar query was answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryPath {
    /// Served from the precomputed cosimilarity row.
    Cached,
    /// Recomputed from the feature and transpose matrices.
    Recomputed,
    /// Best-effort subset of an undersized cosimilarity row.
    Partial,
    /// Nothing loaded could answer the request.
    Unanswerable,
}

impl QueryPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPath::Cached => "cached",
            QueryPath::Recomputed => "recomputed",
            QueryPath::Partial => "partial",
            QueryPath::Unanswerable => "unanswerable",
        }
    }
}

/// Macros (simple versions). Can be feature-gated if desired.
#[macro_export]
macro_rules! obs_count {
    ($m:expr, $name:expr, $labels:expr, $v:expr) => {{
        $m.counter($name, $labels).inc($v as u64);
    }};
}
#[macro_export]
macro_rules! obs_gauge {
    ($m:expr, $name:expr, $labels:expr, $v:expr) => {{
        $m.gauge($name, $labels).set($v as i64);
    }};
}
#[macro_export]
macro_rules! obs_hist {
    ($m:expr, $name:expr, $labels:expr, $v:expr) => {{
        $m.histo($name, &[], $labels).observe($v as f64);
    }};
}
#[macro_export]
macro_rules! obs_timed {
    ($m:expr, $name:expr, $labels:expr, $body:block) => {{
        let __t = std::time::Instant::now();
        let __ret = { $body };
        let __ms = __t.elapsed().as_secs_f64() * 1000.0;
        $m.histo($name, &[], $labels).observe(__ms);
        __ret
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        total: Arc<AtomicU64>,
    }
    struct RecC(Arc<AtomicU64>);
    impl Counter for RecC {
        fn inc(&self, v: u64) {
            self.0.fetch_add(v, Ordering::Relaxed);
        }
    }
    impl Meter for Recorded {
        fn counter(
            &self,
            _n: &'static str,
            _l: &'static [(&'static str, &'static str)],
        ) -> Box<dyn Counter> {
            Box::new(RecC(self.total.clone()))
        }
        fn gauge(
            &self,
            _n: &'static str,
            _l: &'static [(&'static str, &'static str)],
        ) -> Box<dyn Gauge> {
            Box::new(NoopG)
        }
        fn histo(
            &self,
            _n: &'static str,
            _b: &'static [f64],
            _l: &'static [(&'static str, &'static str)],
        ) -> Box<dyn Histogram> {
            Box::new(NoopH)
        }
        fn emit(&self, _e: VizEvent) {}
    }

    #[test]
    fn test_obs_count_macro() {
        let meter = Recorded::default();
        obs_count!(meter, "cosim_cells_written", &[], 3);
        obs_count!(meter, "cosim_cells_written", &[], 4usize);
        assert_eq!(meter.total.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_obs_timed_returns_body_value() {
        let meter = NoopMeter;
        let v = obs_timed!(meter, "cosim_build_duration_ms", &[("phase", "feature")], { 41 + 1 });
        assert_eq!(v, 42);
    }

    #[test]
    fn test_labels() {
        assert_eq!(MatrixKind::FeatureTranspose.as_str(), "transpose");
        assert_eq!(QueryPath::Partial.as_str(), "partial");
    }
}
