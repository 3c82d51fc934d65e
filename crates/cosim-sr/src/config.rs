//! Cache configuration.

use crate::error::{Result, SrError};
use crate::similarity::SimilarityConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a [`SimilarityCache`](crate::SimilarityCache).
///
/// Example YAML:
/// ```yaml
/// dir: "/var/lib/cosim/simple"
/// similarity:
///   kind: "containment"
///   total_rows: 250000
/// max_threads: 8
/// max_sims_per_doc: 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the three matrix files
    pub dir: PathBuf,

    /// Structural similarity algorithm
    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// Worker threads per build phase
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Length of each precomputed cosimilarity row
    #[serde(default = "default_max_sims_per_doc")]
    pub max_sims_per_doc: usize,

    /// Memory budget for one transpose batch
    #[serde(default = "default_transpose_buffer_mb")]
    pub transpose_buffer_mb: usize,

    /// Rows between progress log lines
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_max_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_max_sims_per_doc() -> usize {
    100
}

fn default_transpose_buffer_mb() -> usize {
    cosim_matrix::DEFAULT_TRANSPOSE_BUFFER_MB
}

fn default_log_interval() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cosim-cache"),
            similarity: SimilarityConfig::default(),
            max_threads: default_max_threads(),
            max_sims_per_doc: default_max_sims_per_doc(),
            transpose_buffer_mb: default_transpose_buffer_mb(),
            log_interval: default_log_interval(),
        }
    }
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(SrError::Config("dir cannot be empty".to_string()));
        }
        if self.max_threads == 0 {
            return Err(SrError::Config("max_threads must be > 0".to_string()));
        }
        if self.max_sims_per_doc == 0 {
            return Err(SrError::Config("max_sims_per_doc must be > 0".to_string()));
        }
        if self.transpose_buffer_mb == 0 {
            return Err(SrError::Config(
                "transpose_buffer_mb must be > 0".to_string(),
            ));
        }
        if self.log_interval == 0 {
            return Err(SrError::Config("log_interval must be > 0".to_string()));
        }
        self.similarity.validate()
    }
}

/// Build parameters carried by a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub max_threads: usize,
    pub max_sims_per_doc: usize,
    pub transpose_buffer_mb: usize,
    pub log_interval: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for BuildOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_threads: config.max_threads,
            max_sims_per_doc: config.max_sims_per_doc,
            transpose_buffer_mb: config.transpose_buffer_mb,
            log_interval: config.log_interval,
        }
    }
}
