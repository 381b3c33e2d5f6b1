use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time budgets and limits for the generation pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Budget for the primary generator before falling back to the template.
    pub generator_timeout_ms: u64,
    /// Budget for the community context lookup.
    pub context_timeout_ms: u64,
    /// Maximum number of community rulesets to draw insights from.
    /// Zero skips the lookup.
    pub context_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generator_timeout_ms: 30_000,
            context_timeout_ms: 5_000,
            context_limit: 5,
        }
    }
}

impl GenerationConfig {
    /// A configuration that never consults a context provider.
    pub fn offline() -> Self {
        Self {
            context_limit: 0,
            ..Default::default()
        }
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_context_timeout(mut self, timeout: Duration) -> Self {
        self.context_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
