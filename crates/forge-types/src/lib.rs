//! Foundation types for Ruleforge.
//!
//! This crate provides the identifiers and plain records shared by every
//! other Ruleforge crate. It carries no behaviour beyond validation and
//! formatting.
//!
//! # Key Types
//!
//! - [`AccountId`], [`ProjectId`], [`VersionId`], [`EntryId`]: numeric identifiers
//! - [`Account`] / [`Role`]: a credit holder and its spending capability
//! - [`Project`] / [`DeveloperStyle`]: the input a ruleset is generated from
//! - [`LineageKey`]: the (owner, project) pair a version chain is scoped to

pub mod account;
pub mod error;
pub mod identity;
pub mod lineage;
pub mod project;

pub use account::{Account, Role};
pub use error::TypeError;
pub use identity::{AccountId, EntryId, ProjectId, VersionId};
pub use lineage::LineageKey;
pub use project::{DeveloperStyle, NewProject, Project, ProjectUpdate};

/// Returns `true` if `text` is empty or contains only whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t"));
        assert!(!is_blank(" x "));
    }
}
