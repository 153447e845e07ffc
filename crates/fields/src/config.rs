//! Tuning knobs for field evaluation.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable that disables parallel execution when set to `0` or
/// `false`.
pub const PARALLEL_ENV: &str = "FIELDS_PARALLEL";

/// Environment variable overriding [`EvaluationConfig::default_grain_size`].
pub const GRAIN_SIZE_ENV: &str = "FIELDS_GRAIN_SIZE";

/// Controls how multi-function calls are scheduled during evaluation.
///
/// None of the settings change results; they only decide whether and how a
/// single call is split across the rayon thread pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Allow splitting a call into chunks that run on different threads.
    pub parallel: bool,
    /// Masks with fewer indices than this are always processed inline.
    pub min_parallel_size: usize,
    /// Grain size a procedure executor reports for its whole procedure.
    pub default_grain_size: usize,
    /// Upper bound for the number of chunks a single call is split into.
    /// Zero means four chunks per rayon worker thread.
    pub max_chunks: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            min_parallel_size: 4096,
            default_grain_size: 10_000,
            max_chunks: 0,
        }
    }
}

impl EvaluationConfig {
    /// Configuration that never leaves the calling thread.
    pub fn single_threaded() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Default configuration with overrides taken from [`PARALLEL_ENV`] and
    /// [`GRAIN_SIZE_ENV`]. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(PARALLEL_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => config.parallel = false,
                "1" | "true" | "on" | "yes" => config.parallel = true,
                other => tracing::warn!("ignoring invalid {PARALLEL_ENV} value '{other}'"),
            }
        }
        if let Some(grain_size) = env::var(GRAIN_SIZE_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            config.default_grain_size = grain_size.max(1);
        }
        config
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_min_parallel_size(mut self, min_parallel_size: usize) -> Self {
        self.min_parallel_size = min_parallel_size;
        self
    }

    /// Effective chunk limit, resolving `max_chunks == 0` against the size of
    /// the current rayon pool.
    pub fn chunk_limit(&self) -> usize {
        if self.max_chunks == 0 {
            rayon::current_num_threads() * 4
        } else {
            self.max_chunks
        }
    }
}
