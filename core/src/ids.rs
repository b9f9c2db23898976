//! Strongly typed identifiers for stored entities.
//!
//! Every identifier is a newtype over `String` so a card id can never be
//! passed where a program id is expected. The store itself only sees the
//! inner string (as a document id or a field value).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an identifier from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {reason}")]
pub struct ParseIdError {
    kind: &'static str,
    reason: &'static str,
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from trusted, application-controlled input.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier, returning the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(ParseIdError { kind: $kind, reason: "cannot be empty" });
                }
                if s.contains('/') {
                    return Err(ParseIdError { kind: $kind, reason: "cannot contain '/'" });
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a merchant business.
    BusinessId,
    "business id"
);

string_id!(
    /// Identifier of a loyalty program owned by a business.
    ProgramId,
    "program id"
);

string_id!(
    /// Identifier of a customer's card in one loyalty program.
    CardId,
    "card id"
);

string_id!(
    /// Identifier of an authenticated user (customers and business owners alike).
    UserId,
    "user id"
);

string_id!(
    /// Identifier of an append-only record (stamp events, reward events, notes).
    RecordId,
    "record id"
);
