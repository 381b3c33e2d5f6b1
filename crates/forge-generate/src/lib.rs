//! Ruleset generation pipeline for Ruleforge.
//!
//! A generation request flows through
//! `Requested → BalanceChecked → ContextGathered → Generated → Committed`:
//!
//! 1. The project is checked for ownership and the inputs generation needs.
//! 2. The ledger confirms the requester can afford one credit.
//! 3. An optional [`ContextProvider`] supplies community [`Insights`] under
//!    its own timeout. Failure degrades to empty context.
//! 4. The [`FallbackChain`] runs the primary [`Generator`], if any, and falls
//!    back to the local [`TemplateGenerator`], so content is always produced.
//! 5. The version is prepared under its lineage lock, the credit is debited
//!    against it, and only then is it published. A failed debit discards the
//!    prepared version.
//!
//! Failure at any step before the commit leaves the ledger and the chain
//! exactly as they were.

pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod spec;
pub mod stage;
pub mod template;

pub use config::GenerationConfig;
pub use context::{ArchiveContextProvider, CommunityRuleset, ContextError, ContextProvider, Insights};
pub use error::GenerationError;
pub use generator::{FallbackChain, GeneratedContent, Generator, GeneratorError};
pub use orchestrator::{GenerationFailure, GenerationOrchestrator, GenerationOutcome, GENERATION_COST};
pub use spec::GenerationSpec;
pub use stage::{GenerationStage, StageRecord};
pub use template::TemplateGenerator;
