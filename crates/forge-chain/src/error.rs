//! Error types for the version chain.

use forge_types::{AccountId, LineageKey, ProjectId, VersionId};
use uuid::Uuid;

/// Errors that can occur during version chain operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// A root version was requested with blank content.
    #[error("ruleset content must not be empty")]
    EmptyContent,

    /// A derived version was requested with blank content.
    #[error("content is required to create a new version")]
    ContentRequired,

    /// The requester does not own the lineage or version.
    #[error("{account} does not own {target}")]
    NotOwner { account: AccountId, target: String },

    /// A referenced version does not exist.
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    /// No public version has the given uuid. Private versions are reported
    /// the same way.
    #[error("ruleset {0} not found or not public")]
    NotPublic(Uuid),

    /// No version with the given number exists in the lineage.
    #[error("version {number} not found in {lineage}")]
    VersionNumberNotFound { lineage: LineageKey, number: u32 },

    /// A root was requested for a lineage that already has versions.
    #[error("lineage {0} already has versions")]
    LineageExists(LineageKey),

    /// The supplied project is not the one the lineage belongs to.
    #[error("project {project} does not belong to lineage {lineage}")]
    ProjectMismatch {
        lineage: LineageKey,
        project: ProjectId,
    },

    /// The referenced version lives in a different lineage than the lock.
    #[error("version {version} is not part of lineage {lineage}")]
    LineageMismatch {
        lineage: LineageKey,
        version: VersionId,
    },

    /// Persisted versions failed validation during restore.
    #[error("integrity violation at {version}: {reason}")]
    IntegrityViolation { version: VersionId, reason: String },

    #[error("version chain lock poisoned")]
    LockPoisoned,
}

impl ChainError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyContent => "empty_content",
            Self::ContentRequired => "content_required",
            Self::NotOwner { .. } => "not_owner",
            Self::VersionNotFound(_) | Self::VersionNumberNotFound { .. } => "version_not_found",
            Self::NotPublic(_) => "not_public",
            Self::LineageExists(_) => "lineage_exists",
            Self::ProjectMismatch { .. } | Self::LineageMismatch { .. } => "lineage_mismatch",
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::LockPoisoned => "internal",
        }
    }
}

/// Convenience alias for chain results.
pub type ChainResult<T> = Result<T, ChainError>;
