//! High-level SDK for Ruleforge.
//!
//! Provides a unified API over the credit ledger, the version chain, and the
//! generation pipeline. This is the main entry point for applications
//! embedding Ruleforge.

pub mod access;
pub mod config;
pub mod error;
pub mod forge;
pub mod response;
pub mod snapshot;

pub use access::{AccessError, AccessPolicy, Action, ProjectRegistry};
pub use config::ForgeConfig;
pub use error::{SdkError, SdkResult};
pub use forge::{Forge, Reconciliation};
pub use response::{FailureResponse, GenerationResponse};
pub use snapshot::{Snapshot, SNAPSHOT_FORMAT};

// Re-export key types
pub use forge_chain::{ArtifactVersion, LineageReport, Visibility};
pub use forge_generate::{
    ArchiveContextProvider, CommunityRuleset, ContextProvider, GenerationConfig, GenerationSpec,
    Generator, GeneratorError, Insights,
};
pub use forge_ledger::{CreditSummary, EntryKind, LedgerEntry};
pub use uuid::Uuid;
pub use forge_types::{
    Account, AccountId, DeveloperStyle, LineageKey, NewProject, Project, ProjectId,
    ProjectUpdate, Role, VersionId,
};
