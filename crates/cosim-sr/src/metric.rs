//! Feature sources and score normalization.
//!
//! A metric turns an item id into a sparse feature vector and, optionally,
//! answers most-similar queries on its own. How it computes either is opaque
//! to the cache.

use crate::types::{ItemId, SparseVector, SrResultList};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a metric for a single item.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric {metric} failed for item {id}: {reason}")]
    Failed {
        metric: String,
        id: ItemId,
        reason: String,
    },

    #[error("metric {0} does not support this operation")]
    Unsupported(String),
}

/// A similarity metric that can produce feature vectors.
pub trait SrMetric: Send + Sync {
    fn name(&self) -> &str;

    /// Feature vector of an item. `None` when the metric knows nothing about it.
    fn vector(&self, id: ItemId) -> Result<Option<SparseVector>, MetricError>;

    /// Raw, un-normalized most-similar list computed by the metric itself.
    fn most_similar(
        &self,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<Option<SrResultList>, MetricError> {
        let _ = (id, k, valid_ids);
        Err(MetricError::Unsupported(self.name().to_string()))
    }
}

/// Where a cache gets its feature vectors from.
///
/// Chosen once when the cache is constructed.
#[derive(Clone)]
pub enum FeatureSource {
    /// A metric over one language edition.
    Local {
        language: String,
        metric: Arc<dyn SrMetric>,
    },
    /// A language-independent metric.
    Universal(Arc<dyn SrMetric>),
}

impl FeatureSource {
    pub fn local(language: impl Into<String>, metric: Arc<dyn SrMetric>) -> Self {
        FeatureSource::Local {
            language: language.into(),
            metric,
        }
    }

    pub fn universal(metric: Arc<dyn SrMetric>) -> Self {
        FeatureSource::Universal(metric)
    }

    pub fn metric(&self) -> &dyn SrMetric {
        match self {
            FeatureSource::Local { metric, .. } => metric.as_ref(),
            FeatureSource::Universal(metric) => metric.as_ref(),
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            FeatureSource::Local { language, .. } => Some(language),
            FeatureSource::Universal(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.metric().name()
    }

    pub fn vector(&self, id: ItemId) -> Result<Option<SparseVector>, MetricError> {
        self.metric().vector(id)
    }

    pub fn most_similar(
        &self,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<Option<SrResultList>, MetricError> {
        self.metric().most_similar(id, k, valid_ids)
    }
}

impl fmt::Debug for FeatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSource::Local { language, metric } => f
                .debug_struct("Local")
                .field("language", language)
                .field("metric", &metric.name())
                .finish(),
            FeatureSource::Universal(metric) => {
                f.debug_tuple("Universal").field(&metric.name()).finish()
            }
        }
    }
}

/// Maps raw similarity scores onto a caller-facing scale.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, results: SrResultList) -> SrResultList;
}

/// Returns scores unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
    fn normalize(&self, results: SrResultList) -> SrResultList {
        results
    }
}
