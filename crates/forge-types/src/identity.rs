use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Prefix used by the `Display` form.
            pub const PREFIX: &'static str = $prefix;

            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            /// Accepts both the bare number and the prefixed display form.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix(concat!($prefix, ":"))
                    .unwrap_or(trimmed);
                digits
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId(s.to_string()))
            }
        }
    };
}

numeric_id!(
    /// Identifier of an account (a credit holder).
    AccountId,
    "acct"
);
numeric_id!(
    /// Identifier of a project.
    ProjectId,
    "proj"
);
numeric_id!(
    /// Identifier of an immutable artifact version.
    VersionId,
    "ver"
);
numeric_id!(
    /// Identifier of a ledger entry. Strictly increasing across a ledger.
    EntryId,
    "entry"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        assert_eq!(AccountId::new(7).to_string(), "acct:7");
        assert_eq!(VersionId::new(12).to_string(), "ver:12");
    }

    #[test]
    fn parse_accepts_prefixed_and_bare() {
        assert_eq!("proj:3".parse::<ProjectId>().unwrap(), ProjectId::new(3));
        assert_eq!("3".parse::<ProjectId>().unwrap(), ProjectId::new(3));
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let err = "acct:3".parse::<ProjectId>().unwrap_err();
        assert_eq!(err, TypeError::InvalidId("acct:3".into()));
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&EntryId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntryId::new(42));
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(VersionId::new(1) < VersionId::new(2));
    }
}
