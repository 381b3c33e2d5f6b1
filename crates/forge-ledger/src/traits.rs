use forge_types::{Account, AccountId, VersionId};

use crate::error::LedgerError;
use crate::records::LedgerEntry;

/// Write boundary for credit ledger mutations.
///
/// Every method is a single-account transaction: the entry append and the
/// cached balance update are observed together or not at all.
pub trait LedgerWriter: Send + Sync {
    /// Open a book for `account` with a zero balance.
    fn register(&self, account: &Account) -> Result<(), LedgerError>;

    /// Grant the fixed opening amount. Fails if the account already has one.
    fn grant_initial(&self, account: &AccountId) -> Result<LedgerEntry, LedgerError>;

    /// Grant `amount` credits on behalf of `granted_by`, who must be an admin.
    fn grant_admin(
        &self,
        account: &AccountId,
        amount: i64,
        granted_by: &AccountId,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Spend `amount` credits on `version`.
    ///
    /// Non-admins must hold at least `amount`; the check and the debit happen
    /// under the same account lock.
    fn debit_usage(
        &self,
        account: &AccountId,
        amount: i64,
        version: VersionId,
    ) -> Result<LedgerEntry, LedgerError>;
}

/// Read boundary for balances and entry history.
pub trait LedgerReader: Send + Sync {
    fn account(&self, account: &AccountId) -> Result<Account, LedgerError>;

    /// The cached balance. Always equal to the sum of the account's entries.
    fn balance_of(&self, account: &AccountId) -> Result<i64, LedgerError>;

    /// Read-only sufficiency check. Admins can always spend.
    fn can_spend(&self, account: &AccountId, amount: i64) -> Result<bool, LedgerError>;

    /// All entries for the account, oldest first.
    fn entries(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn accounts(&self) -> Result<Vec<AccountId>, LedgerError>;
}

/// A ledger that can be both read and written.
pub trait CreditLedger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> CreditLedger for T {}
