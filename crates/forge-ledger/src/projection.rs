use serde::{Deserialize, Serialize};

use forge_types::AccountId;

use crate::error::LedgerError;
use crate::records::LedgerEntry;
use crate::replay::apply_entries;
use crate::traits::LedgerReader;

/// What an account holder sees about their credits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub account: AccountId,
    pub current_balance: i64,
    pub total_used: i64,
    pub total_granted: i64,
    /// Most recent entries, newest first.
    pub recent_entries: Vec<LedgerEntry>,
}

/// Deterministic projection builders.
pub struct ProjectionBuilder;

impl ProjectionBuilder {
    pub fn credit_summary<R: LedgerReader + ?Sized>(
        reader: &R,
        account: &AccountId,
        recent: usize,
    ) -> Result<CreditSummary, LedgerError> {
        let entries = reader.entries(account)?;
        let totals = apply_entries(*account, &entries);

        Ok(CreditSummary {
            account: *account,
            current_balance: reader.balance_of(account)?,
            total_used: totals.total_used,
            total_granted: totals.total_granted,
            recent_entries: entries.into_iter().rev().take(recent).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use forge_types::{Account, Role, VersionId};

    use crate::memory::InMemoryLedger;
    use crate::records::EntryKind;
    use crate::traits::LedgerWriter;

    use super::*;

    #[test]
    fn summary_totals_and_recent_order() {
        let ledger = InMemoryLedger::new(3);
        let user = Account::new(AccountId::new(1), "u@example.com", Role::Member);
        ledger.register(&user).unwrap();
        ledger.grant_initial(&user.id).unwrap();
        ledger.debit_usage(&user.id, 1, VersionId::new(1)).unwrap();
        ledger.debit_usage(&user.id, 1, VersionId::new(2)).unwrap();

        let summary = ProjectionBuilder::credit_summary(&ledger, &user.id, 2).unwrap();
        assert_eq!(summary.current_balance, 1);
        assert_eq!(summary.total_used, 2);
        assert_eq!(summary.total_granted, 3);
        assert_eq!(summary.recent_entries.len(), 2);
        assert_eq!(summary.recent_entries[0].linked_version, Some(VersionId::new(2)));
        assert!(summary
            .recent_entries
            .iter()
            .all(|e| e.kind == EntryKind::UsageDebit));
    }

    #[test]
    fn summary_is_deterministic() {
        let ledger = InMemoryLedger::default();
        let user = Account::new(AccountId::new(1), "u@example.com", Role::Member);
        ledger.register(&user).unwrap();
        ledger.grant_initial(&user.id).unwrap();

        let first = ProjectionBuilder::credit_summary(&ledger, &user.id, 10).unwrap();
        let second = ProjectionBuilder::credit_summary(&ledger, &user.id, 10).unwrap();
        assert_eq!(first, second);
    }
}
