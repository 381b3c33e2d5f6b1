use forge_types::AccountId;

use crate::error::LedgerError;
use crate::records::EntryKind;
use crate::replay::apply_entries;
use crate::traits::LedgerReader;

/// Result of validating one account's entry stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub account: AccountId,
    pub entry_count: u64,
    pub cached_balance: i64,
    pub replayed_balance: i64,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Raw id of the offending entry, or 0 for account-level violations.
    pub entry: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    OutOfOrder,
    ZeroAmount,
    SignMismatch,
    MissingInitialGrant,
    DuplicateInitialGrant,
    UnlinkedDebit,
    NegativeBalance,
    RecordedBalanceMismatch,
    BalanceDivergence,
}

/// Credit stream validator.
pub struct StreamValidator;

impl StreamValidator {
    /// Validate a single account's entries for all invariants.
    pub fn validate_account<R: LedgerReader + ?Sized>(
        reader: &R,
        account: &AccountId,
    ) -> Result<ValidationReport, LedgerError> {
        let holder = reader.account(account)?;
        let entries = reader.entries(account)?;
        let cached_balance = reader.balance_of(account)?;
        let mut violations = Vec::new();
        let mut running = 0i64;
        let mut initial_grants = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            let raw = entry.id.get();

            if index > 0 && entry.id <= entries[index - 1].id {
                violations.push(Violation {
                    entry: raw,
                    kind: ViolationKind::OutOfOrder,
                    description: format!("{} follows {}", entry.id, entries[index - 1].id),
                });
            }

            if entry.amount == 0 {
                violations.push(Violation {
                    entry: raw,
                    kind: ViolationKind::ZeroAmount,
                    description: "entry amount is zero".into(),
                });
            } else if entry.kind.is_credit() != (entry.amount > 0) {
                violations.push(Violation {
                    entry: raw,
                    kind: ViolationKind::SignMismatch,
                    description: format!("{} entry with amount {}", entry.kind, entry.amount),
                });
            }

            match entry.kind {
                EntryKind::InitialGrant => {
                    initial_grants += 1;
                    if initial_grants > 1 {
                        violations.push(Violation {
                            entry: raw,
                            kind: ViolationKind::DuplicateInitialGrant,
                            description: "more than one initial grant".into(),
                        });
                    }
                }
                EntryKind::UsageDebit => {
                    if entry.linked_version.is_none() {
                        violations.push(Violation {
                            entry: raw,
                            kind: ViolationKind::UnlinkedDebit,
                            description: "usage debit does not reference a version".into(),
                        });
                    }
                }
                EntryKind::AdminGrant => {}
            }

            running += entry.amount;
            if entry.balance_after != running {
                violations.push(Violation {
                    entry: raw,
                    kind: ViolationKind::RecordedBalanceMismatch,
                    description: format!(
                        "recorded balance {} but running balance is {running}",
                        entry.balance_after
                    ),
                });
            }
            if running < 0 && !holder.is_admin() {
                violations.push(Violation {
                    entry: raw,
                    kind: ViolationKind::NegativeBalance,
                    description: format!("running balance dropped to {running}"),
                });
            }
        }

        if !entries.is_empty() && initial_grants == 0 {
            violations.push(Violation {
                entry: 0,
                kind: ViolationKind::MissingInitialGrant,
                description: "account has entries but no initial grant".into(),
            });
        }

        let replayed = apply_entries(*account, &entries);
        if replayed.balance != cached_balance {
            violations.push(Violation {
                entry: 0,
                kind: ViolationKind::BalanceDivergence,
                description: format!(
                    "cached balance {cached_balance} differs from entry sum {}",
                    replayed.balance
                ),
            });
        }

        Ok(ValidationReport {
            account: *account,
            entry_count: entries.len() as u64,
            cached_balance,
            replayed_balance: replayed.balance,
            violations,
        })
    }

    /// Validate every account in the ledger.
    pub fn validate_all<R: LedgerReader + ?Sized>(
        reader: &R,
    ) -> Result<Vec<ValidationReport>, LedgerError> {
        let accounts = reader.accounts()?;
        let mut reports = Vec::with_capacity(accounts.len());
        for account in &accounts {
            reports.push(Self::validate_account(reader, account)?);
        }
        Ok(reports)
    }
}
