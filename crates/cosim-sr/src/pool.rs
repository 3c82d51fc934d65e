//! Bounded parallel for-each over row ids.

use crate::error::BuildError;
use crate::types::ItemId;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A dedicated worker pool for one build phase.
pub(crate) struct RowPool {
    pool: rayon::ThreadPool,
    log_interval: usize,
}

impl RowPool {
    pub fn new(max_threads: usize, log_interval: usize, phase: &'static str) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads.max(1))
            .thread_name(move |i| format!("cosim-{}-{}", phase, i))
            .build()?;
        Ok(Self {
            pool,
            log_interval: log_interval.max(1),
        })
    }

    /// Runs `f` once per id on the pool. `progress(processed, total)` fires every
    /// `log_interval` rows. Stops at the first error `f` returns.
    pub fn run<F, P>(&self, ids: &[ItemId], progress: P, f: F) -> Result<usize, BuildError>
    where
        F: Fn(ItemId) -> Result<(), BuildError> + Sync + Send,
        P: Fn(usize, usize) + Sync + Send,
    {
        let processed = AtomicUsize::new(0);
        let total = ids.len();
        self.pool.install(|| {
            ids.par_iter().try_for_each(|&id| {
                f(id)?;
                let n = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if n % self.log_interval == 0 {
                    progress(n, total);
                }
                Ok::<(), BuildError>(())
            })
        })?;
        Ok(processed.into_inner())
    }
}
