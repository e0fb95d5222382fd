//! Error types for the quote-book crate.
//!
//! Errors fall into a small taxonomy:
//!
//! - **Data consistency** ([`Error::EntryNotFound`], [`Error::DuplicateEntry`],
//!   [`Error::Mismatch`]) - raised by price levels and books only when strict
//!   checking is enabled, otherwise the offending operation is ignored.
//! - **Stale references** ([`Error::StaleReference`]) - a key outlived the
//!   object it pointed at (for example a delta read after cleanup).
//! - **Malformed field data** ([`Error::InvalidField`]) - a field was present
//!   but could not be converted to the requested type.
//!
//! Sequence gaps and quality changes are state transitions, not errors.

use thiserror::Error;

use crate::types::Price;

/// The main error type for this crate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Update or removal of an entry id that is not present at the level
    #[error("attempted to modify a non-existent entry {id} at {price}")]
    EntryNotFound {
        /// Entry id that was looked up
        id: String,
        /// Price of the level searched
        price: Price,
    },

    /// Addition of an entry id that is already present at the level
    #[error("attempted to add an existing entry {id} at {price}")]
    DuplicateEntry {
        /// Entry id that was added
        id: String,
        /// Price of the level
        price: Price,
    },

    /// Two books or levels expected to be equal differ
    #[error("book mismatch: {0}")]
    Mismatch(String),

    /// A level or entry key no longer refers to a live object
    #[error("stale reference: object was destroyed by cleanup")]
    StaleReference,

    /// A field was present but its value could not be used
    #[error("invalid field {name} ({fid}): {reason}")]
    InvalidField {
        /// Field name
        name: String,
        /// Numeric field id
        fid: u16,
        /// Why the value was rejected
        reason: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an [`Error::InvalidField`]
    pub fn invalid_field(name: impl Into<String>, fid: u16, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            name: name.into(),
            fid,
            reason: reason.into(),
        }
    }

    /// Check if this error signals a data-consistency violation
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            Error::EntryNotFound { .. } | Error::DuplicateEntry { .. } | Error::Mismatch(_)
        )
    }
}
