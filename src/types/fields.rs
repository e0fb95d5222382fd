//! Field-level access to decoded market-data messages.
//!
//! The transport and decoding layers are not part of this crate. A message is
//! anything implementing [`FieldAccess`]: it can look up a field by descriptor
//! and iterate over every field it carries. [`FieldMessage`] is a small
//! in-memory implementation used by adapters and tests.
//!
//! # Example
//!
//! ```rust
//! use quote_book::types::fields::{self, FieldAccess, FieldMessage, FieldValue};
//! use rust_decimal_macros::dec;
//!
//! let msg = FieldMessage::new()
//!     .with_field(fields::BID_PRICE, FieldValue::Price(dec!(10.00)))
//!     .with_field(fields::BID_SIZE, FieldValue::F64(100.0));
//!
//! assert_eq!(msg.try_price(fields::BID_PRICE).unwrap(), Some(dec!(10.00)));
//! assert_eq!(msg.try_quantity(fields::BID_SIZE).unwrap(), Some(100));
//! assert_eq!(msg.try_price(fields::ASK_PRICE).unwrap(), None);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{Price, Quantity, TimestampMs};
use crate::error::Error;
use crate::Result;

/// Name and numeric id of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Field name
    pub name: &'static str,
    /// Numeric field id
    pub fid: u16,
}

impl FieldDescriptor {
    /// Create a descriptor
    pub const fn new(name: &'static str, fid: u16) -> Self {
        Self { name, fid }
    }
}

/// Message type tag
pub const MSG_TYPE: FieldDescriptor = FieldDescriptor::new("MdMsgType", 1);
/// Message qualifier bitfield
pub const MSG_QUAL: FieldDescriptor = FieldDescriptor::new("wMsgQual", 21);
/// Number of quotes conflated into this message
pub const CONFLATE_QUOTE_COUNT: FieldDescriptor = FieldDescriptor::new("wConflateQuoteCount", 23);
/// Ask price
pub const ASK_PRICE: FieldDescriptor = FieldDescriptor::new("wAskPrice", 109);
/// Ask size
pub const ASK_SIZE: FieldDescriptor = FieldDescriptor::new("wAskSize", 110);
/// Bid price
pub const BID_PRICE: FieldDescriptor = FieldDescriptor::new("wBidPrice", 237);
/// Bid size
pub const BID_SIZE: FieldDescriptor = FieldDescriptor::new("wBidSize", 238);
/// Issue symbol
pub const ISSUE_SYMBOL: FieldDescriptor = FieldDescriptor::new("wIssueSymbol", 305);
/// Quote time
pub const QUOTE_TIME: FieldDescriptor = FieldDescriptor::new("wQuoteTime", 442);
/// Source time
pub const SRC_TIME: FieldDescriptor = FieldDescriptor::new("wSrcTime", 465);
/// Symbol
pub const SYMBOL: FieldDescriptor = FieldDescriptor::new("wSymbol", 470);
/// Running quote counter used for gap detection
pub const QUOTE_COUNT: FieldDescriptor = FieldDescriptor::new("wQuoteCount", 1034);
/// Quote sequence number
pub const QUOTE_SEQ_NUM: FieldDescriptor = FieldDescriptor::new("wQuoteSeqNum", 1036);
/// Activity time
pub const ACTIVITY_TIME: FieldDescriptor = FieldDescriptor::new("wActivityTime", 1021);
/// Line time
pub const LINE_TIME: FieldDescriptor = FieldDescriptor::new("wLineTime", 1174);
/// Send time
pub const SEND_TIME: FieldDescriptor = FieldDescriptor::new("wSendTime", 1175);

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Exact price
    Price(Price),
    /// Floating-point number
    F64(f64),
    /// Signed integer
    I64(i64),
    /// Unsigned integer
    U64(u64),
    /// Date-time in milliseconds since Unix epoch
    DateTime(TimestampMs),
    /// String
    String(String),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Price(_) => "price",
            FieldValue::F64(_) => "f64",
            FieldValue::I64(_) => "i64",
            FieldValue::U64(_) => "u64",
            FieldValue::DateTime(_) => "date-time",
            FieldValue::String(_) => "string",
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::I64(v) => Some(v),
            FieldValue::U64(v) => i64::try_from(v).ok(),
            FieldValue::F64(v) if v.is_finite() => v.to_i64(),
            FieldValue::Price(p) => p.to_i64(),
            _ => None,
        }
    }
}

impl From<Price> for FieldValue {
    fn from(value: Price) -> Self {
        FieldValue::Price(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::F64(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::I64(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::U64(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

/// A borrowed view of one field, handed out during iteration
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    /// Field name
    pub name: &'a str,
    /// Numeric field id
    pub fid: u16,
    /// Field value
    pub value: &'a FieldValue,
}

/// Typed access to the fields of one message
///
/// Implementors provide [`field`](FieldAccess::field) and
/// [`for_each_field`](FieldAccess::for_each_field); the `try_*` accessors
/// convert on top of them. A missing field is `Ok(None)`, a field of the wrong
/// type or out of range is [`Error::InvalidField`].
pub trait FieldAccess {
    /// Look up a field by descriptor
    fn field(&self, desc: FieldDescriptor) -> Option<FieldValue>;

    /// Invoke `f` for every field in the message
    fn for_each_field(&self, f: &mut dyn FnMut(FieldRef<'_>));

    /// Get a field as a price
    fn try_price(&self, desc: FieldDescriptor) -> Result<Option<Price>> {
        match self.field(desc) {
            None => Ok(None),
            Some(value) => to_price(desc, &value).map(Some),
        }
    }

    /// Get a field as a quantity (fractional sizes are truncated)
    fn try_quantity(&self, desc: FieldDescriptor) -> Result<Option<Quantity>> {
        match self.field(desc) {
            None => Ok(None),
            Some(value) => to_quantity(desc, &value).map(Some),
        }
    }

    /// Get a field as a timestamp
    fn try_timestamp(&self, desc: FieldDescriptor) -> Result<Option<TimestampMs>> {
        match self.field(desc) {
            None => Ok(None),
            Some(value) => to_timestamp(desc, &value).map(Some),
        }
    }

    /// Get a field as a string
    fn try_string(&self, desc: FieldDescriptor) -> Result<Option<String>> {
        match self.field(desc) {
            None => Ok(None),
            Some(FieldValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(desc, "string", &other)),
        }
    }

    /// Get a field as a `u16`
    fn try_u16(&self, desc: FieldDescriptor) -> Result<Option<u16>> {
        self.field(desc)
            .map(|value| to_integer(desc, &value))
            .transpose()
    }

    /// Get a field as a `u32`
    fn try_u32(&self, desc: FieldDescriptor) -> Result<Option<u32>> {
        self.field(desc)
            .map(|value| to_integer(desc, &value))
            .transpose()
    }

    /// Get a field as an `i32`
    fn try_i32(&self, desc: FieldDescriptor) -> Result<Option<i32>> {
        self.field(desc)
            .map(|value| to_integer(desc, &value))
            .transpose()
    }
}

fn mismatch(desc: FieldDescriptor, expected: &str, found: &FieldValue) -> Error {
    Error::invalid_field(
        desc.name,
        desc.fid,
        format!("expected {expected}, found {}", found.type_name()),
    )
}

/// Convert a field value to a price
pub fn to_price(desc: FieldDescriptor, value: &FieldValue) -> Result<Price> {
    match *value {
        FieldValue::Price(p) => Ok(p),
        FieldValue::I64(v) => Ok(Decimal::from(v)),
        FieldValue::U64(v) => Ok(Decimal::from(v)),
        FieldValue::F64(v) => Decimal::try_from(v)
            .map(|d| d.normalize())
            .map_err(|e| Error::invalid_field(desc.name, desc.fid, e.to_string())),
        _ => Err(mismatch(desc, "price", value)),
    }
}

/// Convert a field value to a quantity
pub fn to_quantity(desc: FieldDescriptor, value: &FieldValue) -> Result<Quantity> {
    match value {
        FieldValue::DateTime(_) | FieldValue::String(_) => Err(mismatch(desc, "quantity", value)),
        _ => value
            .as_i64()
            .ok_or_else(|| Error::invalid_field(desc.name, desc.fid, "quantity out of range")),
    }
}

/// Convert a field value to a timestamp
pub fn to_timestamp(desc: FieldDescriptor, value: &FieldValue) -> Result<TimestampMs> {
    match *value {
        FieldValue::DateTime(t) | FieldValue::U64(t) => Ok(t),
        FieldValue::I64(v) => u64::try_from(v)
            .map_err(|_| Error::invalid_field(desc.name, desc.fid, "negative timestamp")),
        _ => Err(mismatch(desc, "date-time", value)),
    }
}

/// Convert a field value to an integer of type `T`
pub fn to_integer<T: TryFrom<i64>>(desc: FieldDescriptor, value: &FieldValue) -> Result<T> {
    let raw = match value {
        FieldValue::I64(_) | FieldValue::U64(_) => value.as_i64(),
        _ => return Err(mismatch(desc, "integer", value)),
    };
    raw.and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| Error::invalid_field(desc.name, desc.fid, "integer out of range"))
}

/// An owned message made of `(descriptor, value)` pairs in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMessage {
    fields: Vec<(FieldDescriptor, FieldValue)>,
}

impl FieldMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any existing field with the same id
    #[must_use]
    pub fn with_field(mut self, desc: FieldDescriptor, value: impl Into<FieldValue>) -> Self {
        self.set_field(desc, value);
        self
    }

    /// Set a field, replacing any existing field with the same id
    pub fn set_field(&mut self, desc: FieldDescriptor, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(d, _)| d.fid == desc.fid) {
            Some(slot) => *slot = (desc, value),
            None => self.fields.push((desc, value)),
        }
    }

    /// Remove a field by id
    pub fn remove_field(&mut self, fid: u16) -> Option<FieldValue> {
        let pos = self.fields.iter().position(|(d, _)| d.fid == fid)?;
        Some(self.fields.remove(pos).1)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the message has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FieldAccess for FieldMessage {
    fn field(&self, desc: FieldDescriptor) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(d, _)| d.fid == desc.fid)
            .map(|(_, v)| v.clone())
    }

    fn for_each_field(&self, f: &mut dyn FnMut(FieldRef<'_>)) {
        for (desc, value) in &self.fields {
            f(FieldRef {
                name: desc.name,
                fid: desc.fid,
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_absent_field_is_none() {
        let msg = FieldMessage::new();
        assert_eq!(msg.try_price(BID_PRICE).unwrap(), None);
        assert_eq!(msg.try_u16(MSG_QUAL).unwrap(), None);
    }

    #[test]
    fn test_price_conversions() {
        let msg = FieldMessage::new()
            .with_field(BID_PRICE, 10.5f64)
            .with_field(ASK_PRICE, 11i64);
        assert_eq!(msg.try_price(BID_PRICE).unwrap(), Some(dec!(10.5)));
        assert_eq!(msg.try_price(ASK_PRICE).unwrap(), Some(dec!(11)));
    }

    #[test]
    fn test_wrong_type_is_invalid_field() {
        let msg = FieldMessage::new().with_field(BID_PRICE, "abc");
        let err = msg.try_price(BID_PRICE).unwrap_err();
        assert!(matches!(err, Error::InvalidField { fid: 237, .. }));
    }

    #[test]
    fn test_integer_range_checked() {
        let msg = FieldMessage::new()
            .with_field(CONFLATE_QUOTE_COUNT, 70_000i64)
            .with_field(QUOTE_COUNT, -1i64);
        assert!(msg.try_u16(CONFLATE_QUOTE_COUNT).is_err());
        assert!(msg.try_u32(QUOTE_COUNT).is_err());
        assert_eq!(msg.try_i32(QUOTE_COUNT).unwrap(), Some(-1));
    }

    #[test]
    fn test_quantity_truncates_floats() {
        let msg = FieldMessage::new().with_field(BID_SIZE, 150.7f64);
        assert_eq!(msg.try_quantity(BID_SIZE).unwrap(), Some(150));
    }

    #[test]
    fn test_with_field_replaces_and_iterates_in_order() {
        let msg = FieldMessage::new()
            .with_field(BID_SIZE, 1i64)
            .with_field(ASK_SIZE, 2i64)
            .with_field(BID_SIZE, 3i64);
        assert_eq!(msg.len(), 2);

        let mut seen = Vec::new();
        msg.for_each_field(&mut |field| seen.push((field.fid, field.value.clone())));
        assert_eq!(
            seen,
            vec![(238, FieldValue::I64(3)), (110, FieldValue::I64(2))]
        );
    }
}
