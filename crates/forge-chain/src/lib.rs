//! Immutable version chain for Ruleforge rulesets.
//!
//! Every edit of a ruleset produces a new [`ArtifactVersion`] linked to the
//! version it was derived from. Versions are grouped into lineages keyed by
//! (owner, project); within a lineage version numbers are unique, gapless,
//! and strictly increasing. "Latest" is derived from the links, never stored.
//!
//! Writers take a per-lineage lock ([`LineageGuard`]) and go through a
//! prepare/publish pair, so a caller can pair publication with another
//! side effect (a ledger debit) and abandon the version if that fails.

pub mod audit;
pub mod chain;
pub mod error;
pub mod tags;
pub mod version;

pub use audit::{ChainAuditor, ChainViolation, ChainViolationKind, LineageReport};
pub use chain::{LineageGuard, PreparedVersion, VersionChain};
pub use error::{ChainError, ChainResult};
pub use tags::extract_tags;
pub use version::{ArtifactVersion, Visibility};
