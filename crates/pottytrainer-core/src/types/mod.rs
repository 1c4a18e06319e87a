//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the journal core:
//! - Opaque identifiers (`UserId`, `FoodId`, ...)
//! - Poop quality (`Quality`)
//! - Error types (`PottyError`, `ErrorKind`)
//! - Stored record shapes (see [`records`])
//!
//! Identifiers carry no meaning. They are UUID v4 strings when generated by
//! the core, but any non-empty string read back from the store is accepted.

pub mod records;

pub use records::{
    ApiToken, Eat, ExternalIdentity, Food, FoodName, Ingredient, Poop, Record, User,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a [`User`], the root identity.
    UserId
);
opaque_id!(
    /// Identifier of an [`ApiToken`] row. This is never the credential itself.
    TokenId
);
opaque_id!(
    /// Identifier of an [`Eat`] event.
    EatId
);
opaque_id!(
    /// Identifier of a [`Poop`] event.
    PoopId
);
opaque_id!(
    /// Identifier of a [`Food`]. Graph identity is by `FoodId`, never by name.
    FoodId
);
opaque_id!(
    /// Identifier of a [`FoodName`] (one alias of a food).
    FoodNameId
);
opaque_id!(
    /// Identifier of an [`Ingredient`] edge.
    IngredientId
);
opaque_id!(
    /// Identifier of an [`ExternalIdentity`] link.
    ExternalIdentityId
);

// =============================================================================
// QUALITY
// =============================================================================

/// User-reported quality of a bowel movement.
///
/// Bipolar today, but stored as an integer so finer grades can be added
/// without rewriting existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Quality {
    Bad,
    Good,
}

impl Quality {
    /// The stored integer value (`-1` or `1`).
    #[must_use]
    pub const fn value(self) -> i64 {
        match self {
            Self::Bad => -1,
            Self::Good => 1,
        }
    }
}

impl TryFrom<i64> for Quality {
    type Error = PottyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Bad),
            1 => Ok(Self::Good),
            other => Err(PottyError::BadInput(format!(
                "quality must be -1 or 1, got {other}"
            ))),
        }
    }
}

impl From<Quality> for i64 {
    fn from(quality: Quality) -> Self {
        quality.value()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No matching record.
    NotFound,
    /// Credential invalid or identity inconsistent.
    Unauthorized,
    /// Payload fails structural or domain validation.
    BadInput,
    /// Storage failure, timeout or cancellation.
    Unavailable,
    /// Reserved for optimistic concurrency.
    Conflict,
}

impl ErrorKind {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::BadInput => "bad_input",
            Self::Unavailable => "unavailable",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the Potty Trainer core.
///
/// - No silent failures
/// - Store and repository errors are surfaced verbatim, never retried
/// - Identity failures collapse into `Unauthorized`
#[derive(Debug, Error)]
pub enum PottyError {
    /// Zero rows matched the lookup.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The credential is unknown, expired, revoked, or points at a missing user.
    #[error("Unauthorized")]
    Unauthorized,

    /// The payload failed validation.
    #[error("Bad input: {0}")]
    BadInput(String),

    /// The store failed (I/O, transaction, corrupted table).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The caller's deadline elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// The enclosing request went away.
    #[error("Operation cancelled")]
    Cancelled,

    /// Concurrent modification detected. Not raised by the current store.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid configuration input (e.g. empty namespace).
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PottyError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// The category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::BadInput(_) | Self::Config(_) => ErrorKind::BadInput,
            Self::Unavailable(_)
            | Self::SerializationError(_)
            | Self::Timeout
            | Self::Cancelled => ErrorKind::Unavailable,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// Whether this is a `NotFound` error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Map any store-level failure into `Unavailable`.
pub(crate) fn unavailable(err: impl fmt::Display) -> PottyError {
    PottyError::Unavailable(err.to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_accepts_bipolar_values() {
        assert_eq!(Quality::try_from(-1).ok(), Some(Quality::Bad));
        assert_eq!(Quality::try_from(1).ok(), Some(Quality::Good));
    }

    #[test]
    fn quality_rejects_everything_else() {
        for value in [0, 2, -2, i64::MAX, i64::MIN] {
            let err = Quality::try_from(value).expect_err("must reject");
            assert_eq!(err.kind(), ErrorKind::BadInput);
        }
    }

    #[test]
    fn quality_serializes_as_integer() {
        let bytes = postcard::to_allocvec(&Quality::Bad).expect("encode");
        let raw: i64 = postcard::from_bytes(&bytes).expect("decode as i64");
        assert_eq!(raw, -1);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(FoodId::generate(), FoodId::generate());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(PottyError::Timeout.kind(), ErrorKind::Unavailable);
        assert_eq!(PottyError::Cancelled.kind(), ErrorKind::Unavailable);
        assert_eq!(
            PottyError::not_found("Food", "f1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            PottyError::Config("empty".into()).kind(),
            ErrorKind::BadInput
        );
        assert_eq!(ErrorKind::Unauthorized.as_str(), "unauthorized");
    }

    #[test]
    fn unauthorized_message_is_opaque() {
        assert_eq!(PottyError::Unauthorized.to_string(), "Unauthorized");
    }
}
