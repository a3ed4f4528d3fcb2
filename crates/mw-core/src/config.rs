use serde::{Deserialize, Serialize};

use crate::error::{ErrorThreshold, Result};

pub const ERROR_THRESHOLD_ENV: &str = "MARROW_ERROR_THRESHOLD";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Failures at or above this severity are raised, the rest become null
    pub error_threshold: ErrorThreshold,
    /// Workers started with the pool; more are added on demand
    pub worker_threads: usize,
    /// Deepest context allowed before a construction is treated as runaway recursion
    pub max_context_depth: usize,
    /// Longest alias chain followed during a single lookup
    pub max_alias_depth: usize,
    /// Consult the keep store at all
    pub enable_cache: bool,
    /// Refuse to build a runtime whose link pass reported errors
    pub strict_link: bool,
    /// Log every resolution step at debug level instead of trace
    pub trace_resolution: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            error_threshold: ErrorThreshold::Everything,
            worker_threads: 2,
            max_context_depth: 512,
            max_alias_depth: 64,
            enable_cache: true,
            strict_link: true,
            trace_resolution: false,
        }
    }
}

impl RuntimeOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        let value = std::env::var(ERROR_THRESHOLD_ENV).ok();
        self.with_threshold_override(value.as_deref())
    }

    fn with_threshold_override(mut self, value: Option<&str>) -> Self {
        if let Some(text) = value {
            match ErrorThreshold::parse(text) {
                Some(threshold) => self.error_threshold = threshold,
                None => warn!(
                    "ignoring {}={:?}: not an error threshold",
                    ERROR_THRESHOLD_ENV, text
                ),
            }
        }
        self
    }

    pub fn threshold(mut self, threshold: ErrorThreshold) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn lenient_link(mut self) -> Self {
        self.strict_link = false;
        self
    }
}
