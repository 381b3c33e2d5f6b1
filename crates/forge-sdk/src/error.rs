use thiserror::Error;

use crate::access::AccessError;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid input: {0}")]
    Invalid(#[from] forge_types::TypeError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Ledger(#[from] forge_ledger::LedgerError),

    #[error(transparent)]
    Chain(#[from] forge_chain::ChainError),

    #[error(transparent)]
    Generation(#[from] forge_generate::GenerationError),

    #[error("snapshot rejected: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid_input",
            Self::Access(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Chain(e) => e.kind(),
            Self::Generation(e) => e.kind(),
            Self::Snapshot(_) => "invalid_snapshot",
            Self::Config(_) => "invalid_config",
            Self::Json(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use forge_types::{AccountId, ProjectId};

    use super::*;

    #[test]
    fn kinds_come_from_the_source() {
        let err: SdkError = forge_ledger::LedgerError::AccountNotFound(AccountId::new(3)).into();
        assert_eq!(err.kind(), "account_not_found");

        let err: SdkError = AccessError::ProjectNotFound(ProjectId::new(2)).into();
        assert_eq!(err.kind(), "project_not_found");
        assert_eq!(err.to_string(), "project not found: proj:2");
    }
}
