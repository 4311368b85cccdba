use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::PartialFormat;

/// When to feed the next queued chunk after a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RefeedPolicy {
    /// Re-feed on the next driver-loop iteration, after completion handling
    /// has unwound. Bounds stack depth under bursty back-to-back completions.
    #[default]
    Deferred,
    /// Re-feed synchronously inside the completion handler.
    Immediate,
}

/// Construction options for a [`crate::Multiply`] stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplyOptions {
    /// Gain factor applied to every sample. Required; must be finite.
    pub multiply: f64,
    /// Format applied before any upstream announcement arrives.
    #[serde(default)]
    pub initial_format: Option<PartialFormat>,
    #[serde(default)]
    pub refeed: RefeedPolicy,
}

impl MultiplyOptions {
    pub fn new(multiply: f64) -> Self {
        Self {
            multiply,
            initial_format: None,
            refeed: RefeedPolicy::default(),
        }
    }

    pub fn with_initial_format(mut self, format: PartialFormat) -> Self {
        self.initial_format = Some(format);
        self
    }

    pub fn with_refeed(mut self, refeed: RefeedPolicy) -> Self {
        self.refeed = refeed;
        self
    }

    /// Fail fast on configuration errors, before any resource is allocated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiply.is_finite() {
            return Err(ConfigError::InvalidFactor(self.multiply));
        }
        Ok(())
    }
}
