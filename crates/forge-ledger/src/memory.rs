use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tracing::{debug, info};

use forge_types::{Account, AccountId, EntryId, VersionId};

use crate::error::LedgerError;
use crate::records::{EntryKind, LedgerEntry};
use crate::traits::{LedgerReader, LedgerWriter};

/// Credits granted when an account is opened, unless configured otherwise.
pub const DEFAULT_INITIAL_GRANT: i64 = 10;

/// In-memory credit ledger for tests, local use, and embedding.
///
/// Each account has its own book behind its own mutex, so mutations on one
/// account are serialized while different accounts never contend.
pub struct InMemoryLedger {
    initial_grant: i64,
    books: RwLock<HashMap<AccountId, Arc<Mutex<AccountBook>>>>,
    next_entry: AtomicU64,
}

struct AccountBook {
    account: Account,
    balance: i64,
    entries: Vec<LedgerEntry>,
}

impl AccountBook {
    fn append(&mut self, mut entry: LedgerEntry) -> LedgerEntry {
        self.balance += entry.amount;
        entry.balance_after = self.balance;
        self.entries.push(entry.clone());
        entry
    }

    fn has_initial_grant(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == EntryKind::InitialGrant)
    }
}

impl InMemoryLedger {
    pub fn new(initial_grant: i64) -> Self {
        Self {
            initial_grant,
            books: RwLock::new(HashMap::new()),
            next_entry: AtomicU64::new(1),
        }
    }

    pub fn initial_grant(&self) -> i64 {
        self.initial_grant
    }

    /// Rebuild a book from a persisted entry log.
    ///
    /// The balance is recomputed from the entries; no cached value is
    /// trusted. Entry ids must be strictly increasing, amounts nonzero, and
    /// each recorded `balance_after` must match the running sum.
    pub fn restore(&self, account: Account, entries: Vec<LedgerEntry>) -> Result<i64, LedgerError> {
        let mut last_id = None;
        let mut running = 0i64;
        for entry in &entries {
            if entry.account != account.id {
                return Err(LedgerError::IntegrityViolation {
                    account: account.id,
                    reason: format!("{} belongs to {}", entry.id, entry.account),
                });
            }
            if entry.amount == 0 {
                return Err(LedgerError::IntegrityViolation {
                    account: account.id,
                    reason: format!("{} has a zero amount", entry.id),
                });
            }
            if last_id.is_some_and(|prev| entry.id <= prev) {
                return Err(LedgerError::IntegrityViolation {
                    account: account.id,
                    reason: format!("{} is out of order", entry.id),
                });
            }
            running += entry.amount;
            if entry.balance_after != running {
                return Err(LedgerError::IntegrityViolation {
                    account: account.id,
                    reason: format!(
                        "{} records balance {} but entries sum to {running}",
                        entry.id, entry.balance_after
                    ),
                });
            }
            last_id = Some(entry.id);
        }

        let balance = running;
        let mut books = self.books.write().map_err(|_| LedgerError::LockPoisoned)?;
        if books.contains_key(&account.id) {
            return Err(LedgerError::AccountExists(account.id));
        }
        Self::check_email(&books, &account)?;

        if let Some(max) = last_id {
            self.next_entry.fetch_max(max.get() + 1, Ordering::SeqCst);
        }

        debug!(account = %account.id, entries = entries.len(), balance, "restored account book");
        books.insert(
            account.id,
            Arc::new(Mutex::new(AccountBook {
                account,
                balance,
                entries,
            })),
        );
        Ok(balance)
    }

    /// Fails if another book already uses `account`'s email, ignoring case.
    /// Callers hold the map's write lock so the check and the insert are one
    /// step.
    fn check_email(
        books: &HashMap<AccountId, Arc<Mutex<AccountBook>>>,
        account: &Account,
    ) -> Result<(), LedgerError> {
        let email = account.email.trim();
        for book in books.values() {
            if Self::lock(book)?.account.email.trim().eq_ignore_ascii_case(email) {
                return Err(LedgerError::EmailTaken(email.to_string()));
            }
        }
        Ok(())
    }

    fn book(&self, account: &AccountId) -> Result<Arc<Mutex<AccountBook>>, LedgerError> {
        let books = self.books.read().map_err(|_| LedgerError::LockPoisoned)?;
        books
            .get(account)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(*account))
    }

    fn lock(book: &Mutex<AccountBook>) -> Result<MutexGuard<'_, AccountBook>, LedgerError> {
        book.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    fn new_entry(
        &self,
        account: AccountId,
        amount: i64,
        kind: EntryKind,
        description: String,
        linked_version: Option<VersionId>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(self.next_entry.fetch_add(1, Ordering::SeqCst)),
            account,
            amount,
            kind,
            description,
            linked_version,
            balance_after: 0,
            created_at: Utc::now(),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_GRANT)
    }
}

impl LedgerWriter for InMemoryLedger {
    fn register(&self, account: &Account) -> Result<(), LedgerError> {
        let mut books = self.books.write().map_err(|_| LedgerError::LockPoisoned)?;
        if books.contains_key(&account.id) {
            return Err(LedgerError::AccountExists(account.id));
        }
        Self::check_email(&books, account)?;
        books.insert(
            account.id,
            Arc::new(Mutex::new(AccountBook {
                account: account.clone(),
                balance: 0,
                entries: Vec::new(),
            })),
        );
        debug!(account = %account.id, role = %account.role, "registered account");
        Ok(())
    }

    fn grant_initial(&self, account: &AccountId) -> Result<LedgerEntry, LedgerError> {
        if self.initial_grant <= 0 {
            return Err(LedgerError::InvalidAmount(self.initial_grant));
        }

        let book = self.book(account)?;
        let mut book = Self::lock(&book)?;
        if book.has_initial_grant() {
            return Err(LedgerError::DuplicateGrant(*account));
        }

        let entry = self.new_entry(
            *account,
            self.initial_grant,
            EntryKind::InitialGrant,
            "Initial credits upon registration".into(),
            None,
        );
        let entry = book.append(entry);
        info!(account = %account, amount = entry.amount, balance = book.balance, "initial credits granted");
        Ok(entry)
    }

    fn grant_admin(
        &self,
        account: &AccountId,
        amount: i64,
        granted_by: &AccountId,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        // Read the grantor before locking the target: they may be the same book.
        let grantor = self.account(granted_by)?;
        if !grantor.is_admin() {
            return Err(LedgerError::Unauthorized {
                grantor: *granted_by,
            });
        }

        let book = self.book(account)?;
        let mut book = Self::lock(&book)?;
        let entry = self.new_entry(
            *account,
            amount,
            EntryKind::AdminGrant,
            format!("Credits granted by admin: {}", grantor.email),
            None,
        );
        let entry = book.append(entry);
        info!(account = %account, granted_by = %granted_by, amount, balance = book.balance, "admin credits granted");
        Ok(entry)
    }

    fn debit_usage(
        &self,
        account: &AccountId,
        amount: i64,
        version: VersionId,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let book = self.book(account)?;
        let mut book = Self::lock(&book)?;
        if !book.account.is_admin() && book.balance < amount {
            return Err(LedgerError::InsufficientCredits {
                account: *account,
                balance: book.balance,
                required: amount,
            });
        }

        let entry = self.new_entry(
            *account,
            -amount,
            EntryKind::UsageDebit,
            format!("Generated ruleset {version}"),
            Some(version),
        );
        let entry = book.append(entry);
        debug!(account = %account, version = %version, balance = book.balance, "usage debited");
        Ok(entry)
    }
}

impl LedgerReader for InMemoryLedger {
    fn account(&self, account: &AccountId) -> Result<Account, LedgerError> {
        let book = self.book(account)?;
        let book = Self::lock(&book)?;
        Ok(book.account.clone())
    }

    fn balance_of(&self, account: &AccountId) -> Result<i64, LedgerError> {
        let book = self.book(account)?;
        let book = Self::lock(&book)?;
        Ok(book.balance)
    }

    fn can_spend(&self, account: &AccountId, amount: i64) -> Result<bool, LedgerError> {
        let book = self.book(account)?;
        let book = Self::lock(&book)?;
        Ok(book.account.is_admin() || book.balance >= amount)
    }

    fn entries(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let book = self.book(account)?;
        let book = Self::lock(&book)?;
        Ok(book.entries.clone())
    }

    fn accounts(&self) -> Result<Vec<AccountId>, LedgerError> {
        let books = self.books.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut ids: Vec<_> = books.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let accounts = self.books.read().map(|b| b.len()).unwrap_or_default();
        f.debug_struct("InMemoryLedger")
            .field("initial_grant", &self.initial_grant)
            .field("accounts", &accounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::Role;
    use proptest::prelude::*;

    fn member(id: u64) -> Account {
        Account::new(AccountId::new(id), format!("user{id}@example.com"), Role::Member)
    }

    fn admin(id: u64) -> Account {
        Account::new(AccountId::new(id), format!("admin{id}@example.com"), Role::Admin)
    }

    fn opened(ledger: &InMemoryLedger, account: Account) -> AccountId {
        let id = account.id;
        ledger.register(&account).unwrap();
        ledger.grant_initial(&id).unwrap();
        id
    }

    fn entry_sum(ledger: &InMemoryLedger, id: &AccountId) -> i64 {
        ledger.entries(id).unwrap().iter().map(|e| e.amount).sum()
    }

    #[test]
    fn initial_grant_sets_balance() {
        let ledger = InMemoryLedger::default();
        let id = opened(&ledger, member(1));
        assert_eq!(ledger.balance_of(&id).unwrap(), DEFAULT_INITIAL_GRANT);

        let entries = ledger.entries(&id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::InitialGrant);
        assert_eq!(entries[0].description, "Initial credits upon registration");
    }

    #[test]
    fn second_initial_grant_is_rejected() {
        let ledger = InMemoryLedger::default();
        let id = opened(&ledger, member(1));

        let error = ledger.grant_initial(&id).unwrap_err();
        assert_eq!(error, LedgerError::DuplicateGrant(id));
        assert_eq!(ledger.balance_of(&id).unwrap(), DEFAULT_INITIAL_GRANT);
        assert_eq!(ledger.entries(&id).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let ledger = InMemoryLedger::default();
        ledger.register(&member(1)).unwrap();
        let error = ledger.register(&member(1)).unwrap_err();
        assert_eq!(error, LedgerError::AccountExists(AccountId::new(1)));
    }

    #[test]
    fn email_is_unique_ignoring_case() {
        let ledger = InMemoryLedger::default();
        ledger.register(&member(1)).unwrap();
        let twin = Account::new(AccountId::new(2), " USER1@example.com", Role::Member);

        let error = ledger.register(&twin).unwrap_err();
        assert_eq!(error, LedgerError::EmailTaken("USER1@example.com".into()));
        assert_eq!(error.kind(), "email_taken");
        assert_eq!(ledger.accounts().unwrap(), vec![AccountId::new(1)]);
    }

    #[test]
    fn concurrent_registrations_with_one_email_admit_one() {
        let ledger = InMemoryLedger::default();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=8)
                .map(|n| {
                    let ledger = &ledger;
                    scope.spawn(move || {
                        ledger.register(&Account::new(AccountId::new(n), "same@example.com", Role::Member))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(ledger.accounts().unwrap().len(), 1);
    }

    #[test]
    fn unknown_account_is_reported() {
        let ledger = InMemoryLedger::default();
        let error = ledger.balance_of(&AccountId::new(9)).unwrap_err();
        assert_eq!(error, LedgerError::AccountNotFound(AccountId::new(9)));
    }

    #[test]
    fn admin_grant_requires_admin_and_positive_amount() {
        let ledger = InMemoryLedger::default();
        let user = opened(&ledger, member(1));
        let other = opened(&ledger, member(2));
        let boss = opened(&ledger, admin(3));

        assert_eq!(
            ledger.grant_admin(&user, 5, &other).unwrap_err(),
            LedgerError::Unauthorized { grantor: other }
        );
        assert_eq!(
            ledger.grant_admin(&user, 0, &boss).unwrap_err(),
            LedgerError::InvalidAmount(0)
        );
        assert_eq!(
            ledger.grant_admin(&user, -4, &boss).unwrap_err(),
            LedgerError::InvalidAmount(-4)
        );

        let entry = ledger.grant_admin(&user, 5, &boss).unwrap();
        assert_eq!(entry.kind, EntryKind::AdminGrant);
        assert_eq!(entry.description, "Credits granted by admin: admin3@example.com");
        assert_eq!(ledger.balance_of(&user).unwrap(), DEFAULT_INITIAL_GRANT + 5);
    }

    #[test]
    fn admin_may_grant_to_self() {
        let ledger = InMemoryLedger::default();
        let boss = opened(&ledger, admin(1));
        ledger.grant_admin(&boss, 3, &boss).unwrap();
        assert_eq!(ledger.balance_of(&boss).unwrap(), DEFAULT_INITIAL_GRANT + 3);
    }

    #[test]
    fn debit_links_version_and_decrements() {
        let ledger = InMemoryLedger::default();
        let id = opened(&ledger, member(1));

        let entry = ledger.debit_usage(&id, 1, VersionId::new(77)).unwrap();
        assert_eq!(entry.amount, -1);
        assert_eq!(entry.kind, EntryKind::UsageDebit);
        assert_eq!(entry.linked_version, Some(VersionId::new(77)));
        assert_eq!(ledger.balance_of(&id).unwrap(), DEFAULT_INITIAL_GRANT - 1);
    }

    #[test]
    fn debit_beyond_balance_is_rejected_for_members() {
        let ledger = InMemoryLedger::new(1);
        let id = opened(&ledger, member(1));

        ledger.debit_usage(&id, 1, VersionId::new(1)).unwrap();
        let error = ledger.debit_usage(&id, 1, VersionId::new(2)).unwrap_err();
        assert_eq!(
            error,
            LedgerError::InsufficientCredits {
                account: id,
                balance: 0,
                required: 1
            }
        );
        assert_eq!(ledger.balance_of(&id).unwrap(), 0);
        assert!(!ledger.can_spend(&id, 1).unwrap());
    }

    #[test]
    fn admins_spend_past_zero_with_recorded_arithmetic() {
        let ledger = InMemoryLedger::new(1);
        let id = opened(&ledger, admin(1));

        for n in 0..3 {
            ledger.debit_usage(&id, 1, VersionId::new(n)).unwrap();
        }
        assert_eq!(ledger.balance_of(&id).unwrap(), -2);
        assert_eq!(entry_sum(&ledger, &id), -2);
        assert!(ledger.can_spend(&id, 100).unwrap());
    }

    #[test]
    fn concurrent_debits_never_double_spend() {
        let ledger = InMemoryLedger::new(1);
        let id = opened(&ledger, member(1));

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|n| {
                    let ledger = &ledger;
                    scope.spawn(move || ledger.debit_usage(&id, 1, VersionId::new(n)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::InsufficientCredits { .. })
        )));
        assert_eq!(ledger.balance_of(&id).unwrap(), 0);
    }

    #[test]
    fn entry_ids_increase_across_accounts() {
        let ledger = InMemoryLedger::default();
        let a = opened(&ledger, member(1));
        let b = opened(&ledger, member(2));
        let first = ledger.entries(&a).unwrap()[0].id;
        let second = ledger.entries(&b).unwrap()[0].id;
        assert!(first < second);
    }

    #[test]
    fn restore_recomputes_balance_from_entries() {
        let source = InMemoryLedger::default();
        let id = opened(&source, member(1));
        source.debit_usage(&id, 1, VersionId::new(5)).unwrap();
        let entries = source.entries(&id).unwrap();

        let target = InMemoryLedger::default();
        let balance = target.restore(member(1), entries.clone()).unwrap();
        assert_eq!(balance, DEFAULT_INITIAL_GRANT - 1);
        assert_eq!(target.entries(&id).unwrap(), entries);

        // New entries continue after the restored ids.
        let next = target.debit_usage(&id, 1, VersionId::new(6)).unwrap();
        assert!(next.id > entries.last().unwrap().id);
    }

    #[test]
    fn entries_record_the_balance_they_leave() {
        let ledger = InMemoryLedger::new(2);
        let id = opened(&ledger, member(1));
        let other = opened(&ledger, member(2));

        let first = ledger.debit_usage(&id, 1, VersionId::new(1)).unwrap();
        ledger.debit_usage(&other, 1, VersionId::new(2)).unwrap();
        let second = ledger.debit_usage(&id, 1, VersionId::new(3)).unwrap();

        assert_eq!(first.balance_after, 1);
        assert_eq!(second.balance_after, 0);
        let recorded: Vec<i64> = ledger.entries(&id).unwrap().iter().map(|e| e.balance_after).collect();
        assert_eq!(recorded, vec![2, 1, 0]);
    }

    #[test]
    fn restore_rejects_tampered_recorded_balance() {
        let source = InMemoryLedger::default();
        let id = opened(&source, member(1));
        source.debit_usage(&id, 1, VersionId::new(5)).unwrap();
        let mut entries = source.entries(&id).unwrap();
        entries[1].balance_after = 10;

        let target = InMemoryLedger::default();
        let error = target.restore(member(1), entries).unwrap_err();
        assert!(matches!(error, LedgerError::IntegrityViolation { .. }));
        assert!(target.accounts().unwrap().is_empty());
    }

    #[test]
    fn restore_rejects_foreign_entries() {
        let source = InMemoryLedger::default();
        opened(&source, member(1));
        let entries = source.entries(&AccountId::new(1)).unwrap();

        let target = InMemoryLedger::default();
        let error = target.restore(member(2), entries).unwrap_err();
        assert!(matches!(error, LedgerError::IntegrityViolation { .. }));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Grant(i64),
        Debit(i64),
        Initial,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50).prop_map(Op::Grant),
            (1i64..4).prop_map(Op::Debit),
            Just(Op::Initial),
        ]
    }

    proptest! {
        #[test]
        fn balance_always_equals_entry_sum(ops in proptest::collection::vec(op(), 0..60), is_admin in any::<bool>()) {
            let ledger = InMemoryLedger::default();
            let account = if is_admin { admin(1) } else { member(1) };
            let id = account.id;
            ledger.register(&account).unwrap();
            ledger.register(&admin(2)).unwrap();

            for (n, op) in ops.into_iter().enumerate() {
                let _ = match op {
                    Op::Grant(amount) => ledger.grant_admin(&id, amount, &AccountId::new(2)).map(|_| ()),
                    Op::Debit(amount) => ledger.debit_usage(&id, amount, VersionId::new(n as u64)).map(|_| ()),
                    Op::Initial => ledger.grant_initial(&id).map(|_| ()),
                };
                let balance = ledger.balance_of(&id).unwrap();
                prop_assert_eq!(balance, entry_sum(&ledger, &id));
                if !is_admin {
                    prop_assert!(balance >= 0);
                }
            }

            let initial_grants = ledger
                .entries(&id)
                .unwrap()
                .iter()
                .filter(|e| e.kind == EntryKind::InitialGrant)
                .count();
            prop_assert!(initial_grants <= 1);
        }
    }
}
