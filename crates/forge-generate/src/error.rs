use forge_chain::ChainError;
use forge_ledger::LedgerError;
use forge_types::{AccountId, ProjectId};

/// Errors that end a generation request without side effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The project lacks an input generation needs.
    #[error("project is missing required input: {}", missing.join(", "))]
    InvalidProject { missing: Vec<String> },

    #[error("{account} does not own {project}")]
    NotOwner { account: AccountId, project: ProjectId },

    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl GenerationError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidProject { .. } => "invalid_project",
            Self::NotOwner { .. } => "not_owner",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::Chain(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
        }
    }
}

impl From<LedgerError> for GenerationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits {
                balance, required, ..
            } => Self::InsufficientCredits { balance, required },
            other => Self::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_shortfall_maps_to_insufficient_credits() {
        let err: GenerationError = LedgerError::InsufficientCredits {
            account: AccountId::new(1),
            balance: 0,
            required: 1,
        }
        .into();
        assert_eq!(err, GenerationError::InsufficientCredits { balance: 0, required: 1 });
        assert_eq!(err.kind(), "insufficient_credits");
    }

    #[test]
    fn kinds_pass_through() {
        let err: GenerationError = LedgerError::AccountNotFound(AccountId::new(4)).into();
        assert_eq!(err.kind(), "account_not_found");
        let err: GenerationError = ChainError::ContentRequired.into();
        assert_eq!(err.kind(), "content_required");
    }

    #[test]
    fn invalid_project_lists_missing_inputs() {
        let err = GenerationError::InvalidProject {
            missing: vec!["description".into(), "tech stack".into()],
        };
        assert_eq!(
            err.to_string(),
            "project is missing required input: description, tech stack"
        );
    }
}
