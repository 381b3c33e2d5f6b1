use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use forge_generate::GenerationConfig;
use forge_ledger::DEFAULT_INITIAL_GRANT;

use crate::error::SdkResult;

/// Top-level configuration, usually loaded from a TOML file:
///
/// ```toml
/// initial_credits = 10
/// community_archive = "community.json"
///
/// [generation]
/// generator_timeout_ms = 30000
/// context_timeout_ms = 5000
/// context_limit = 5
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Credits granted when an account is created. Zero grants nothing.
    pub initial_credits: i64,
    /// JSON array of community rulesets used as generation context.
    pub community_archive: Option<PathBuf>,
    pub generation: GenerationConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            initial_credits: DEFAULT_INITIAL_GRANT,
            community_archive: None,
            generation: GenerationConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
