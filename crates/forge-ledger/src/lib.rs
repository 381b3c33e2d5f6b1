//! Append-only credit ledger for Ruleforge.
//!
//! The ledger is the single source of truth for account balances. It provides:
//! - Immutable [`LedgerEntry`] records (initial grant, admin grant, usage debit)
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - `InMemoryLedger` with per-account transactional locking
//! - Deterministic balance replay from the entry log
//! - Credit summary projections
//! - Stream validation (ordering, sign rules, attribution, cache agreement)

pub mod error;
pub mod memory;
pub mod projection;
pub mod records;
pub mod replay;
pub mod traits;
pub mod validation;

pub use error::LedgerError;
pub use memory::{InMemoryLedger, DEFAULT_INITIAL_GRANT};
pub use projection::{CreditSummary, ProjectionBuilder};
pub use records::{EntryKind, LedgerEntry};
pub use replay::{ReplayEngine, ReplayResult};
pub use traits::{CreditLedger, LedgerReader, LedgerWriter};
pub use validation::{StreamValidator, ValidationReport, Violation, ViolationKind};
