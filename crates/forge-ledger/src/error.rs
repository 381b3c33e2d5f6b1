use forge_types::AccountId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("account already registered: {0}")]
    AccountExists(AccountId),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("initial credits were already granted to {0}")]
    DuplicateGrant(AccountId),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("{grantor} is not allowed to grant credits")]
    Unauthorized { grantor: AccountId },

    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits {
        account: AccountId,
        balance: i64,
        required: i64,
    },

    #[error("integrity violation for {account}: {reason}")]
    IntegrityViolation { account: AccountId, reason: String },

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::AccountExists(_) => "account_exists",
            Self::EmailTaken(_) => "email_taken",
            Self::DuplicateGrant(_) => "duplicate_grant",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::LockPoisoned => "internal",
        }
    }
}
