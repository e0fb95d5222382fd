//! Last-seen quote fields.
//!
//! The listener keeps two caches: the regular cache, updated by in-sequence
//! messages, and a transient cache that absorbs possibly-duplicate and
//! out-of-sequence messages without disturbing the regular one.
//!
//! Malformed field data never fails a message. A bad bid or ask price or size
//! drops that whole side for the message; a bad metadata field is skipped.
//! Both are logged.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::types::fields::{self, to_integer, to_price, to_quantity, to_timestamp};
use crate::types::{FieldAccess, FieldRef, FieldValue, Price, Quantity, Side, TimestampMs};
use crate::Result;

/// Modification state of a cached field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    /// Never received
    #[default]
    NotInitialised,
    /// Received before, but not changed by the last message
    NotModified,
    /// Changed by the last message
    Modified,
}

impl FieldState {
    fn age(&mut self) {
        if *self == FieldState::Modified {
            *self = FieldState::NotModified;
        }
    }
}

/// Modification state of every cached field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldStates {
    /// Symbol
    pub symbol: FieldState,
    /// Bid price
    pub bid_price: FieldState,
    /// Bid size
    pub bid_size: FieldState,
    /// Ask price
    pub ask_price: FieldState,
    /// Ask size
    pub ask_size: FieldState,
    /// Quote (event) time
    pub quote_time: FieldState,
    /// Source time
    pub src_time: FieldState,
    /// Activity time
    pub activity_time: FieldState,
    /// Line time
    pub line_time: FieldState,
    /// Send time
    pub send_time: FieldState,
    /// Quote (event) sequence number
    pub quote_seq_num: FieldState,
    /// Quote count
    pub quote_count: FieldState,
    /// Message qualifier
    pub msg_qual: FieldState,
}

impl FieldStates {
    /// Turn every `Modified` state into `NotModified`
    pub(crate) fn age(&mut self) {
        for state in [
            &mut self.symbol,
            &mut self.bid_price,
            &mut self.bid_size,
            &mut self.ask_price,
            &mut self.ask_size,
            &mut self.quote_time,
            &mut self.src_time,
            &mut self.activity_time,
            &mut self.line_time,
            &mut self.send_time,
            &mut self.quote_seq_num,
            &mut self.quote_count,
            &mut self.msg_qual,
        ] {
            state.age();
        }
    }
}

/// Write `value` into `slot`, returning whether it changed
///
/// The state becomes `Modified` on a change or on first receipt.
pub(crate) fn store<T: PartialEq>(slot: &mut T, state: &mut FieldState, value: T) -> bool {
    let changed = *slot != value;
    if changed || *state == FieldState::NotInitialised {
        *state = FieldState::Modified;
    }
    *slot = value;
    changed
}

fn store_decoded<T: PartialEq>(slot: &mut T, state: &mut FieldState, decoded: Result<T>) {
    match decoded {
        Ok(value) => {
            store(slot, state, value);
        }
        Err(err) => warn!(error = %err, "ignoring malformed field"),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SideQuote {
    price: Price,
    size: Quantity,
    got_price: bool,
    got_size: bool,
}

impl SideQuote {
    fn got(&self) -> bool {
        self.got_price || self.got_size
    }

    fn commit(
        &mut self,
        pending: PendingSide,
        price_state: &mut FieldState,
        size_state: &mut FieldState,
    ) {
        if let Some(price) = pending.price {
            self.got_price = store(&mut self.price, price_state, price);
        }
        if let Some(size) = pending.size {
            self.got_size = store(&mut self.size, size_state, size);
        }
    }
}

/// Price and size of one side as decoded from the current message
#[derive(Debug, Default)]
struct PendingSide {
    price: Option<Price>,
    size: Option<Quantity>,
    malformed: bool,
}

impl PendingSide {
    fn set_price(&mut self, side: Side, decoded: Result<Price>) {
        match decoded {
            Ok(price) => self.price = Some(price),
            Err(err) => self.reject(side, &err),
        }
    }

    fn set_size(&mut self, side: Side, decoded: Result<Quantity>) {
        match decoded {
            Ok(size) => self.size = Some(size),
            Err(err) => self.reject(side, &err),
        }
    }

    fn reject(&mut self, side: Side, err: &Error) {
        warn!(?side, error = %err, "skipping side with malformed quote field");
        self.malformed = true;
    }
}

#[derive(Debug, Default)]
struct Decoding {
    bid: PendingSide,
    ask: PendingSide,
    symbol: Option<String>,
}

/// Quote fields as last seen on the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteCache {
    bid: SideQuote,
    ask: SideQuote,

    pub(crate) symbol: String,
    pub(crate) quote_time: TimestampMs,
    pub(crate) src_time: TimestampMs,
    pub(crate) activity_time: TimestampMs,
    pub(crate) line_time: TimestampMs,
    pub(crate) send_time: TimestampMs,

    pub(crate) quote_seq_num: u32,
    /// Quote count accepted by the last gap check
    pub(crate) quote_count: u32,
    /// Quote count carried by the most recent message that had one
    pub(crate) msg_quote_count: u32,
    /// Expected quote count step for the current message
    pub(crate) conflate_count: u16,

    pub(crate) states: FieldStates,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self {
            bid: SideQuote::default(),
            ask: SideQuote::default(),
            symbol: String::new(),
            quote_time: 0,
            src_time: 0,
            activity_time: 0,
            line_time: 0,
            send_time: 0,
            quote_seq_num: 0,
            quote_count: 0,
            msg_quote_count: 0,
            conflate_count: 1,
            states: FieldStates::default(),
        }
    }
}

impl QuoteCache {
    /// Get the cached bid price
    pub fn bid_price(&self) -> Price {
        self.bid.price
    }

    /// Get the cached bid size
    pub fn bid_size(&self) -> Quantity {
        self.bid.size
    }

    /// Get the cached ask price
    pub fn ask_price(&self) -> Price {
        self.ask.price
    }

    /// Get the cached ask size
    pub fn ask_size(&self) -> Quantity {
        self.ask.size
    }

    /// Get the last symbol seen on the stream
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the quote (event) time
    pub fn quote_time(&self) -> TimestampMs {
        self.quote_time
    }

    /// Get the source time
    pub fn src_time(&self) -> TimestampMs {
        self.src_time
    }

    /// Get the activity time
    pub fn activity_time(&self) -> TimestampMs {
        self.activity_time
    }

    /// Get the line time
    pub fn line_time(&self) -> TimestampMs {
        self.line_time
    }

    /// Get the send time
    pub fn send_time(&self) -> TimestampMs {
        self.send_time
    }

    /// Get the quote sequence number
    pub fn quote_seq_num(&self) -> u32 {
        self.quote_seq_num
    }

    /// Get the quote count
    pub fn quote_count(&self) -> u32 {
        self.quote_count
    }

    /// Get the modification state of every field
    pub fn field_states(&self) -> &FieldStates {
        &self.states
    }

    /// Price and size cached for a side
    pub fn side(&self, side: Side) -> (Price, Quantity) {
        let quote = self.quote(side);
        (quote.price, quote.size)
    }

    fn quote(&self, side: Side) -> &SideQuote {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    /// Check if the last decoded message changed the price or size of a side
    pub fn got_side(&self, side: Side) -> bool {
        self.quote(side).got()
    }

    /// Check if the last decoded message changed any quote field
    pub fn got_quote(&self) -> bool {
        self.got_side(Side::Bid) || self.got_side(Side::Ask)
    }

    /// Zero the cached bid and ask
    pub(crate) fn clear_quote(&mut self) {
        for quote in [&mut self.bid, &mut self.ask] {
            quote.price = Decimal::ZERO;
            quote.size = 0;
        }
    }

    /// Decode every known field of `msg` into the cache
    ///
    /// Sizes are scaled by `multiplier`. A price or size only counts as
    /// received when it differs from the cached value, and a side is only
    /// updated when all of its fields in the message are well formed. Returns
    /// the symbol if the message carried one.
    pub(crate) fn decode<M: FieldAccess + ?Sized>(
        &mut self,
        msg: &M,
        multiplier: Quantity,
    ) -> Option<String> {
        self.bid.got_price = false;
        self.bid.got_size = false;
        self.ask.got_price = false;
        self.ask.got_size = false;
        self.conflate_count = 1;

        let mut decoding = Decoding::default();
        msg.for_each_field(&mut |field: FieldRef<'_>| {
            self.apply(field, multiplier, &mut decoding);
        });

        let states = &mut self.states;
        if !decoding.bid.malformed {
            self.bid
                .commit(decoding.bid, &mut states.bid_price, &mut states.bid_size);
        }
        if !decoding.ask.malformed {
            self.ask
                .commit(decoding.ask, &mut states.ask_price, &mut states.ask_size);
        }
        decoding.symbol
    }

    fn apply(&mut self, field: FieldRef<'_>, multiplier: Quantity, decoding: &mut Decoding) {
        let value = field.value;
        match field.fid {
            fid if fid == fields::BID_PRICE.fid => {
                decoding
                    .bid
                    .set_price(Side::Bid, to_price(fields::BID_PRICE, value));
            }
            fid if fid == fields::BID_SIZE.fid => {
                decoding
                    .bid
                    .set_size(Side::Bid, scale(fields::BID_SIZE, value, multiplier));
            }
            fid if fid == fields::ASK_PRICE.fid => {
                decoding
                    .ask
                    .set_price(Side::Ask, to_price(fields::ASK_PRICE, value));
            }
            fid if fid == fields::ASK_SIZE.fid => {
                decoding
                    .ask
                    .set_size(Side::Ask, scale(fields::ASK_SIZE, value, multiplier));
            }
            fid if fid == fields::QUOTE_TIME.fid => store_decoded(
                &mut self.quote_time,
                &mut self.states.quote_time,
                to_timestamp(fields::QUOTE_TIME, value),
            ),
            fid if fid == fields::SRC_TIME.fid => store_decoded(
                &mut self.src_time,
                &mut self.states.src_time,
                to_timestamp(fields::SRC_TIME, value),
            ),
            fid if fid == fields::ACTIVITY_TIME.fid => store_decoded(
                &mut self.activity_time,
                &mut self.states.activity_time,
                to_timestamp(fields::ACTIVITY_TIME, value),
            ),
            fid if fid == fields::LINE_TIME.fid => store_decoded(
                &mut self.line_time,
                &mut self.states.line_time,
                to_timestamp(fields::LINE_TIME, value),
            ),
            fid if fid == fields::SEND_TIME.fid => store_decoded(
                &mut self.send_time,
                &mut self.states.send_time,
                to_timestamp(fields::SEND_TIME, value),
            ),
            fid if fid == fields::QUOTE_SEQ_NUM.fid => store_decoded(
                &mut self.quote_seq_num,
                &mut self.states.quote_seq_num,
                to_integer(fields::QUOTE_SEQ_NUM, value),
            ),
            fid if fid == fields::QUOTE_COUNT.fid => store_decoded(
                &mut self.msg_quote_count,
                &mut self.states.quote_count,
                to_integer(fields::QUOTE_COUNT, value),
            ),
            fid if fid == fields::CONFLATE_QUOTE_COUNT.fid => {
                match to_integer(fields::CONFLATE_QUOTE_COUNT, value) {
                    Ok(count) => self.conflate_count = count,
                    Err(err) => warn!(error = %err, "ignoring malformed field"),
                }
            }
            fid if fid == fields::SYMBOL.fid || fid == fields::ISSUE_SYMBOL.fid => match value {
                FieldValue::String(s) => {
                    store(&mut self.symbol, &mut self.states.symbol, s.clone());
                    decoding.symbol = Some(s.clone());
                }
                _ => warn!(field = field.name, fid, "ignoring non-string symbol"),
            },
            _ => {}
        }
    }
}

/// Apply the size multiplier to the exact field value, then truncate
fn scale(
    desc: fields::FieldDescriptor,
    value: &FieldValue,
    multiplier: Quantity,
) -> Result<Quantity> {
    let overflow = || Error::invalid_field(desc.name, desc.fid, "scaled size overflows");
    match value {
        FieldValue::F64(_) | FieldValue::Price(_) => to_price(desc, value)?
            .checked_mul(Decimal::from(multiplier))
            .and_then(|size| size.trunc().to_i64())
            .ok_or_else(overflow),
        _ => to_quantity(desc, value)?
            .checked_mul(multiplier)
            .ok_or_else(overflow),
    }
}
