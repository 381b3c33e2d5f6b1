use forge_types::AccountId;

use crate::error::LedgerError;
use crate::records::{EntryKind, LedgerEntry};
use crate::traits::LedgerReader;

/// Balance reconstructed from an account's entry log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayResult {
    pub account: AccountId,
    pub evaluated_entries: u64,
    pub balance: i64,
    pub total_granted: i64,
    pub total_used: i64,
}

/// Deterministic replay of credit entries.
pub struct ReplayEngine;

impl ReplayEngine {
    pub fn replay<R: LedgerReader + ?Sized>(
        reader: &R,
        account: &AccountId,
    ) -> Result<ReplayResult, LedgerError> {
        let entries = reader.entries(account)?;
        Ok(apply_entries(*account, &entries))
    }

    /// Returns `true` if the cached balance matches a full replay.
    pub fn verify_convergence<R: LedgerReader + ?Sized>(
        reader: &R,
        account: &AccountId,
    ) -> Result<bool, LedgerError> {
        let replayed = Self::replay(reader, account)?;
        Ok(replayed.balance == reader.balance_of(account)?)
    }
}

pub(crate) fn apply_entries(account: AccountId, entries: &[LedgerEntry]) -> ReplayResult {
    let mut result = ReplayResult {
        account,
        evaluated_entries: 0,
        balance: 0,
        total_granted: 0,
        total_used: 0,
    };

    for entry in entries {
        result.evaluated_entries += 1;
        result.balance += entry.amount;
        match entry.kind {
            EntryKind::InitialGrant | EntryKind::AdminGrant => result.total_granted += entry.amount,
            EntryKind::UsageDebit => result.total_used += entry.amount.abs(),
        }
    }

    result
}
