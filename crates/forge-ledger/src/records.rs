use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forge_types::{AccountId, EntryId, VersionId};

/// Why an entry exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Granted once when the account is opened.
    InitialGrant,
    /// Granted by an admin.
    AdminGrant,
    /// Spent on a committed ruleset version.
    UsageDebit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialGrant => "initial_grant",
            Self::AdminGrant => "admin_grant",
            Self::UsageDebit => "usage_debit",
        }
    }

    /// Grants add credits, debits remove them.
    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::UsageDebit)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of the credit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: AccountId,
    /// Signed, never zero.
    pub amount: i64,
    pub kind: EntryKind,
    pub description: String,
    /// The version that consumed the credit, for usage debits.
    pub linked_version: Option<VersionId>,
    /// The account balance once this entry was applied.
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `+10` for credits, `-1` for debits.
    pub fn formatted_amount(&self) -> String {
        if self.amount >= 0 {
            format!("+{}", self.amount)
        } else {
            self.amount.to_string()
        }
    }
}
