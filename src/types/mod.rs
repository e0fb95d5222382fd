//! Core value types shared by the book, delta and listener layers.
//!
//! - [`fields`] - the field-access seam to the message decoding layer
//!
//! Prices are exact decimals and sizes are signed integers so that a level's
//! size and its size change share one type.

pub mod fields;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use fields::{FieldAccess, FieldDescriptor, FieldMessage, FieldRef, FieldValue};

/// Price of a level
///
/// Using `Decimal` instead of floating point for:
/// - Exact value equality (`10.0 == 10.00`), so level lookup never drifts
/// - Total ordering for `BTreeMap` keys
///
/// Callers should still feed a canonical representation from one source.
pub type Price = Decimal;

/// Size of an entry or level, and the change in size between two states
pub type Quantity = i64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Identifier of an entry, unique within its price level
pub type EntryId = String;

/// Book side of a level or entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy interest, best level is the highest price
    Bid,
    /// Sell interest, best level is the lowest price
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Action applied to a level or entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Newly created this interval
    Add,
    /// Existing and modified
    Update,
    /// Removed
    Delete,
    /// No action recorded (entry action on level-only deltas)
    #[default]
    Unknown,
}

impl Action {
    /// Single-character wire code
    pub fn as_char(self) -> char {
        match self {
            Action::Add => 'A',
            Action::Update => 'U',
            Action::Delete => 'D',
            Action::Unknown => 'Z',
        }
    }
}

/// Origin of the interest at a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Regular resting interest
    #[default]
    Regular,
    /// Interest implied from other instruments
    Implied,
}

/// Freshness classification of a subscription's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Data is current
    #[default]
    Ok,
    /// Data may be stale
    MaybeStale,
    /// Data is stale
    Stale,
    /// Part of the data is stale
    PartialStale,
    /// Marked stale by the application
    ForcedStale,
    /// Data was delivered twice
    Duplicate,
    /// Quality cannot be determined
    Unknown,
}

impl Quality {
    /// Numeric code used by the transport layer
    pub fn code(self) -> u8 {
        match self {
            Quality::Ok => 0,
            Quality::MaybeStale => 1,
            Quality::Stale => 2,
            Quality::PartialStale => 3,
            Quality::ForcedStale => 4,
            Quality::Duplicate => 5,
            Quality::Unknown => 99,
        }
    }

    /// Parse a numeric transport code; unrecognised codes map to `Unknown`
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Quality::Ok,
            1 => Quality::MaybeStale,
            2 => Quality::Stale,
            3 => Quality::PartialStale,
            4 => Quality::ForcedStale,
            5 => Quality::Duplicate,
            _ => Quality::Unknown,
        }
    }

    /// Check if the data can be trusted
    pub fn is_ok(self) -> bool {
        self == Quality::Ok
    }
}

/// Message type tag as delivered by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    /// Generic update
    Update,
    /// First image after subscribing
    Initial,
    /// Full-state refresh after recovery
    Recap,
    /// Snapshot delivered on request
    Snapshot,
    /// Pre-opening image
    PreOpening,
    /// Quote update
    Quote,
    /// Trade report
    Trade,
    /// Any other message type
    Unknown,
}

impl MsgType {
    /// Parse a numeric tag; anything unrecognised is `Unknown`
    pub fn from_tag(tag: u16) -> Self {
        match tag {
            0 => MsgType::Update,
            1 => MsgType::Initial,
            6 => MsgType::Recap,
            9 => MsgType::Snapshot,
            12 => MsgType::PreOpening,
            13 => MsgType::Quote,
            14 => MsgType::Trade,
            _ => MsgType::Unknown,
        }
    }

    /// Numeric tag
    pub fn tag(self) -> u16 {
        match self {
            MsgType::Update => 0,
            MsgType::Initial => 1,
            MsgType::Recap => 6,
            MsgType::Snapshot => 9,
            MsgType::PreOpening => 12,
            MsgType::Quote => 13,
            MsgType::Trade => 14,
            MsgType::Unknown => 199,
        }
    }

    /// Check if the message carries full state and supersedes the book
    pub fn is_recap_class(self) -> bool {
        matches!(
            self,
            MsgType::Initial | MsgType::Recap | MsgType::Snapshot | MsgType::PreOpening
        )
    }

    /// Check if the message is an incremental update that may carry quote fields
    pub fn is_update_class(self) -> bool {
        matches!(self, MsgType::Update | MsgType::Quote | MsgType::Trade)
    }

    /// Check if the message is dropped while the book's quality is not OK
    ///
    /// Pre-opening messages rebuild the book like a recap but, unlike the
    /// other recap types, do not restore a stale book.
    pub fn is_gated_when_stale(self) -> bool {
        self.is_update_class() || self == MsgType::PreOpening
    }
}

/// Message qualifier bitfield (`wMsgQual`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MsgQual(u16);

impl MsgQual {
    /// The message may have been delivered before
    pub const POSSIBLY_DUPLICATE: u16 = 0x0001;
    /// The message has been delivered before
    pub const DEFINITELY_DUPLICATE: u16 = 0x0002;
    /// The message arrived out of sequence
    pub const OUT_OF_SEQUENCE: u16 = 0x0004;
    /// The message was delayed upstream
    pub const DELAYED: u16 = 0x0008;

    /// Wrap a raw qualifier value
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw qualifier value
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Check if the possibly-duplicate bit is set
    pub fn is_possibly_duplicate(self) -> bool {
        self.0 & Self::POSSIBLY_DUPLICATE != 0
    }

    /// Check if the definitely-duplicate bit is set
    pub fn is_definitely_duplicate(self) -> bool {
        self.0 & Self::DEFINITELY_DUPLICATE != 0
    }

    /// Check if the out-of-sequence bit is set
    pub fn is_out_of_sequence(self) -> bool {
        self.0 & Self::OUT_OF_SEQUENCE != 0
    }

    /// Check if the delayed bit is set
    pub fn is_delayed(self) -> bool {
        self.0 & Self::DELAYED != 0
    }

    /// Promote a possibly-duplicate qualifier to definitely-duplicate
    #[must_use]
    pub fn promoted_to_duplicate(self) -> Self {
        Self((self.0 & !Self::POSSIBLY_DUPLICATE) | Self::DEFINITELY_DUPLICATE)
    }
}
