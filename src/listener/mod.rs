//! Quote-to-book processing.
//!
//! [`QuoteToBookListener`] turns a stream of top-of-book quote messages into
//! a one-level-per-side [`OrderBook`] and reports what changed:
//!
//! - Recap-class messages rebuild the book and restore consistency
//! - Update-class messages add, update, delete or replace the best level
//! - Quote count sequence gaps mark the book inconsistent until the next recap
//! - Duplicate and out-of-sequence messages never touch the book
//!
//! # Example
//!
//! ```rust
//! use quote_book::listener::QuoteToBookListener;
//! use quote_book::types::{fields, FieldMessage, MsgType};
//! use quote_book::ListenerConfig;
//! use rust_decimal_macros::dec;
//!
//! let mut listener = QuoteToBookListener::new(ListenerConfig::new("IBM")).unwrap();
//! let reader = listener.reader();
//!
//! let recap = FieldMessage::new()
//!     .with_field(fields::ASK_PRICE, dec!(100.50))
//!     .with_field(fields::ASK_SIZE, 200_i64);
//! listener.on_msg(&recap, MsgType::Recap).unwrap();
//!
//! // Any thread holding the reader can look at the book.
//! assert_eq!(reader.best_ask(), Some((dec!(100.50), 200)));
//! ```

mod cache;
mod handler;

use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

pub use cache::{FieldState, FieldStates, QuoteCache};
pub use handler::{BookHandler, GapRange, ListenerState};

use crate::config::ListenerConfig;
use crate::orderbook::{CycleDeltas, Delta, LevelKey, OrderBook};
use crate::types::fields;
use crate::types::{Action, FieldAccess, MsgQual, MsgType, Price, Quality, Quantity, Side};
use crate::Result;

/// How a message is processed after reading its qualifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Regular,
    Transient,
    Duplicate,
}

/// Builds and maintains an order book from quote messages
///
/// # Thread Safety
///
/// The listener is the single writer for its book. It holds the book's write
/// lock for the whole of each message, including handler dispatch and
/// cleanup, so readers never observe a half-applied message. Readers on other
/// threads use a [`BookReader`].
pub struct QuoteToBookListener {
    book: Arc<RwLock<OrderBook>>,
    core: Processor,
}

/// Everything the listener mutates besides the book
///
/// Kept apart from the lock so a write guard on the book and `&mut` access
/// to this state can be held at the same time.
struct Processor {
    config: ListenerConfig,
    handlers: Vec<Box<dyn BookHandler + Send>>,
    regular: QuoteCache,
    transient: QuoteCache,
    msg_qual: MsgQual,
    gap: Option<GapRange>,
    cycle: CycleDeltas,
    seen_message: bool,
    seen_recap: bool,
}

impl QuoteToBookListener {
    /// Create a listener with an empty book
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is invalid.
    pub fn new(config: ListenerConfig) -> Result<Self> {
        config.validate()?;
        let book = OrderBook::with_config(config.symbol(), config.book());
        Ok(Self {
            book: Arc::new(RwLock::new(book)),
            core: Processor {
                config,
                handlers: Vec::new(),
                regular: QuoteCache::default(),
                transient: QuoteCache::default(),
                msg_qual: MsgQual::default(),
                gap: None,
                cycle: CycleDeltas::None,
                seen_message: false,
                seen_recap: false,
            },
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ListenerConfig {
        &self.core.config
    }

    /// Register a handler; handlers are called in registration order
    pub fn add_handler(&mut self, handler: Box<dyn BookHandler + Send>) {
        self.core.handlers.push(handler);
    }

    /// Drop every registered handler
    pub fn remove_handlers(&mut self) {
        self.core.handlers.clear();
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.core.handlers.len()
    }

    /// Get a read handle on the book
    pub fn reader(&self) -> BookReader {
        BookReader {
            book: Arc::clone(&self.book),
        }
    }

    /// Process one message
    ///
    /// Malformed fields are logged and skipped: a bad bid or ask field leaves
    /// that side untouched while the rest of the message still applies. On
    /// error the message is abandoned: no handler sees it and anything it
    /// detached is cleaned up.
    ///
    /// # Errors
    ///
    /// Returns any book consistency error raised while applying the message.
    pub fn on_msg<M: FieldAccess + ?Sized>(&mut self, msg: &M, msg_type: MsgType) -> Result<()> {
        self.core.regular.states.age();
        let mut book = self.book.write();
        let result = self.core.process(&mut book, msg, msg_type);
        if result.is_err() {
            self.core.cycle = CycleDeltas::None;
        }
        book.cleanup_detached();

        if let Err(err) = &result {
            error!(symbol = %book.symbol(), ?msg_type, error = %err, "abandoning message");
        }
        result
    }

    /// Set the data quality of the book
    ///
    /// Moving to a stale quality clears the book and notifies clear handlers
    /// when the listener is configured to clear stale books.
    pub fn set_quality(&mut self, quality: Quality) {
        let mut book = self.book.write();
        self.core.set_quality(&mut book, quality);
    }

    /// Reset the caches and gap bounds and empty the book
    pub fn clear(&mut self) {
        let mut book = self.book.write();
        self.core.clear(&mut book);
    }

    /// Current processing state
    pub fn state(&self) -> ListenerState {
        let book = self.book.read();
        if !book.quality().is_ok() {
            ListenerState::Stale
        } else if !self.core.seen_message {
            ListenerState::Uninitialized
        } else if !self.core.seen_recap {
            ListenerState::AwaitingRecap
        } else if !book.is_consistent() {
            ListenerState::Inconsistent
        } else {
            ListenerState::Consistent
        }
    }

    /// Most recent sequence gap, if any since the last clear
    pub fn gap(&self) -> Option<GapRange> {
        self.core.gap
    }

    /// First quote count of the most recent gap, or zero
    pub fn begin_gap_seq_num(&self) -> u32 {
        self.core.gap.map_or(0, |gap| gap.begin)
    }

    /// Last quote count of the most recent gap, or zero
    pub fn end_gap_seq_num(&self) -> u32 {
        self.core.gap.map_or(0, |gap| gap.end)
    }

    /// Qualifier of the last message
    pub fn msg_qual(&self) -> MsgQual {
        self.core.msg_qual
    }

    /// Fields from in-sequence messages
    pub fn regular_cache(&self) -> &QuoteCache {
        &self.core.regular
    }

    /// Fields from the last transient message
    pub fn transient_cache(&self) -> &QuoteCache {
        &self.core.transient
    }

    /// Get the quote count
    pub fn quote_count(&self) -> u32 {
        self.core.regular.quote_count()
    }

    /// Get the quote sequence number
    pub fn quote_seq_num(&self) -> u32 {
        self.core.regular.quote_seq_num()
    }

    /// Get the event (quote) time
    pub fn event_time(&self) -> u64 {
        self.core.regular.quote_time()
    }

    /// Get the source time
    pub fn src_time(&self) -> u64 {
        self.core.regular.src_time()
    }

    /// Get the activity time
    pub fn activity_time(&self) -> u64 {
        self.core.regular.activity_time()
    }

    /// Get the line time
    pub fn line_time(&self) -> u64 {
        self.core.regular.line_time()
    }

    /// Get the send time
    pub fn send_time(&self) -> u64 {
        self.core.regular.send_time()
    }

    /// Get the book symbol
    pub fn symbol(&self) -> String {
        self.book.read().symbol().to_string()
    }

    /// Modification state of every cached field after the last message
    pub fn field_states(&self) -> &FieldStates {
        self.core.regular.field_states()
    }

    /// Get the symbol field state
    pub fn symbol_field_state(&self) -> FieldState {
        self.field_states().symbol
    }

    /// Get the event (quote) sequence number field state
    pub fn event_seq_num_field_state(&self) -> FieldState {
        self.field_states().quote_seq_num
    }

    /// Get the event (quote) time field state
    pub fn event_time_field_state(&self) -> FieldState {
        self.field_states().quote_time
    }

    /// Get the source time field state
    pub fn src_time_field_state(&self) -> FieldState {
        self.field_states().src_time
    }

    /// Get the activity time field state
    pub fn activity_time_field_state(&self) -> FieldState {
        self.field_states().activity_time
    }

    /// Get the line time field state
    pub fn line_time_field_state(&self) -> FieldState {
        self.field_states().line_time
    }

    /// Get the send time field state
    pub fn send_time_field_state(&self) -> FieldState {
        self.field_states().send_time
    }

    /// Get the message qualifier field state
    pub fn msg_qual_field_state(&self) -> FieldState {
        self.field_states().msg_qual
    }
}

impl std::fmt::Debug for QuoteToBookListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteToBookListener")
            .field("symbol", &self.core.config.symbol())
            .field("handlers", &self.core.handlers.len())
            .field("gap", &self.core.gap)
            .finish()
    }
}

impl Processor {
    fn process<M: FieldAccess + ?Sized>(
        &mut self,
        book: &mut OrderBook,
        msg: &M,
        msg_type: MsgType,
    ) -> Result<()> {
        if msg_type.is_gated_when_stale()
            && !book.quality().is_ok()
            && !self.config.update_stale_book()
        {
            debug!(symbol = %book.symbol(), ?msg_type, "ignoring update on stale book");
            return Ok(());
        }
        if !msg_type.is_recap_class() && !msg_type.is_update_class() {
            return Ok(());
        }
        self.seen_message = true;

        match self.classify(book, msg) {
            Disposition::Duplicate => {
                debug!(symbol = %book.symbol(), qual = self.msg_qual.value(), "dropping duplicate");
                return Ok(());
            }
            Disposition::Transient => {
                self.transient = self.regular.clone();
                self.transient
                    .decode(msg, self.config.quote_size_multiplier());
                if msg.field(fields::QUOTE_COUNT).is_some() {
                    self.regular.quote_count = self.transient.msg_quote_count;
                }
                debug!(symbol = %book.symbol(), qual = self.msg_qual.value(), "transient message");
                return Ok(());
            }
            Disposition::Regular => {}
        }

        if msg_type.is_recap_class() {
            self.handle_recap(book, msg)
        } else {
            self.handle_update(book, msg, msg_type)
        }
    }

    fn classify<M: FieldAccess + ?Sized>(&mut self, book: &OrderBook, msg: &M) -> Disposition {
        let raw = lenient(book, msg.try_u16(fields::MSG_QUAL));
        let mut qual = MsgQual::new(raw.unwrap_or(0));

        if qual.is_possibly_duplicate() && self.config.resolve_possibly_duplicate() {
            let seq_num = lenient(book, msg.try_u32(fields::QUOTE_SEQ_NUM));
            let quote_time = lenient(book, msg.try_timestamp(fields::QUOTE_TIME));
            if let (Some(seq_num), Some(quote_time)) = (seq_num, quote_time) {
                if seq_num < self.regular.quote_seq_num && quote_time < self.regular.quote_time {
                    qual = qual.promoted_to_duplicate();
                }
            }
        }
        if raw.is_some() {
            cache::store(&mut self.msg_qual, &mut self.regular.states.msg_qual, qual);
        } else {
            self.msg_qual = qual;
        }

        if qual.is_definitely_duplicate() {
            Disposition::Duplicate
        } else if qual.is_possibly_duplicate() || qual.is_out_of_sequence() {
            Disposition::Transient
        } else {
            Disposition::Regular
        }
    }

    fn decode<M: FieldAccess + ?Sized>(&mut self, book: &mut OrderBook, msg: &M) {
        let symbol = self
            .regular
            .decode(msg, self.config.quote_size_multiplier());
        if let Some(symbol) = symbol {
            if book.symbol().is_empty() {
                book.set_symbol(symbol);
            }
        }
    }

    fn handle_recap<M: FieldAccess + ?Sized>(
        &mut self,
        book: &mut OrderBook,
        msg: &M,
    ) -> Result<()> {
        book.clear();
        self.regular.clear_quote();
        self.decode(book, msg);
        self.check_quote_count(book);

        if !book.is_consistent() {
            info!(symbol = %book.symbol(), "recap received, book now consistent");
        }

        let time = self.regular.quote_time;
        for side in [Side::Bid, Side::Ask] {
            let (price, size) = self.regular.side(side);
            if self.regular.got_side(side) && !price.is_zero() && size != 0 {
                let key = book.find_or_create_level(price, side);
                let level = book.level_mut(key)?;
                level.set_time(time);
                level.set_size(size);
                level.set_size_change(size);
                level.set_action(Action::Add);
            }
        }
        book.set_book_time(time);

        book.set_consistent(true);
        self.set_quality(book, Quality::Ok);
        self.seen_recap = true;
        for handler in &mut self.handlers {
            handler.on_book_recap(book);
        }
        self.cycle = CycleDeltas::None;
        Ok(())
    }

    fn handle_update<M: FieldAccess + ?Sized>(
        &mut self,
        book: &mut OrderBook,
        msg: &M,
        msg_type: MsgType,
    ) -> Result<()> {
        self.decode(book, msg);
        if msg_type != MsgType::Quote && !self.regular.got_quote() {
            return Ok(());
        }
        self.check_quote_count(book);

        for side in [Side::Bid, Side::Ask] {
            if self.regular.got_side(side) {
                self.apply_side(book, side)?;
            }
        }

        let cycle = mem::take(&mut self.cycle);
        if book.is_consistent() || self.config.update_inconsistent_book() {
            self.dispatch(book, &cycle);
        }
        Ok(())
    }

    /// Move the best level of one side to the cached quote
    fn apply_side(&mut self, book: &mut OrderBook, side: Side) -> Result<()> {
        let (price, size) = self.regular.side(side);
        let time = self.regular.quote_time;
        let empty = size == 0 || price.is_zero();

        let Some(key) = book.best_level_key(side) else {
            if size == 0 && price.is_zero() {
                warn!(symbol = %book.symbol(), ?side, "quote update with zero price and size");
            } else if !empty {
                self.add_level(book, price, size, side)?;
            }
            return Ok(());
        };

        let (level_price, level_size) = {
            let level = book.level(key)?;
            (level.price(), level.size())
        };
        if empty {
            self.delete_level(book, key)?;
        } else if price == level_price {
            let level = book.level_mut(key)?;
            level.set_time(time);
            level.set_size(size);
            level.set_size_change(size - level_size);
            level.set_action(Action::Update);
            self.record(Delta::for_level(
                key,
                side,
                price,
                size - level_size,
                Action::Update,
            ));
        } else {
            self.delete_level(book, key)?;
            self.add_level(book, price, size, side)?;
        }
        book.set_book_time(time);
        Ok(())
    }

    fn add_level(
        &mut self,
        book: &mut OrderBook,
        price: Price,
        size: Quantity,
        side: Side,
    ) -> Result<()> {
        let key = book.find_or_create_level(price, side);
        let level = book.level_mut(key)?;
        level.set_time(self.regular.quote_time);
        level.set_size(size);
        level.set_size_change(size);
        level.set_action(Action::Add);
        self.record(Delta::for_level(key, side, price, size, Action::Add));
        Ok(())
    }

    fn delete_level(&mut self, book: &mut OrderBook, key: LevelKey) -> Result<()> {
        book.detach_level(key)?;
        let level = book.level_mut(key)?;
        let (side, price, old_size) = (level.side(), level.price(), level.size());
        level.set_time(self.regular.quote_time);
        level.set_size(0);
        level.set_size_change(-old_size);
        level.set_action(Action::Delete);
        self.record(Delta::for_level(key, side, price, -old_size, Action::Delete));
        Ok(())
    }

    fn record(&mut self, delta: Delta) {
        let mode = self.config.conflation_mode();
        self.cycle = mem::take(&mut self.cycle).push(delta, mode);
    }

    fn dispatch(&mut self, book: &OrderBook, cycle: &CycleDeltas) {
        match cycle {
            CycleDeltas::None => {}
            CycleDeltas::One(delta) => {
                for handler in &mut self.handlers {
                    handler.on_book_delta(book, delta);
                }
            }
            CycleDeltas::Many(deltas) => {
                for handler in &mut self.handlers {
                    handler.on_book_complex_delta(book, deltas);
                }
            }
        }
    }

    /// Compare the message's quote count against the last one seen
    fn check_quote_count(&mut self, book: &mut OrderBook) {
        let count = self.regular.msg_quote_count;
        let last = self.regular.quote_count;
        let step = u32::from(self.regular.conflate_count);

        if count > 0 && last > 0 && count > last.saturating_add(step) {
            let gap = GapRange {
                begin: last + step,
                end: count - 1,
            };
            warn!(symbol = %book.symbol(), begin = gap.begin, end = gap.end, "quote count gap");
            self.gap = Some(gap);
            self.regular.quote_count = count;
            book.set_consistent(false);
            for handler in &mut self.handlers {
                handler.on_book_gap(book, gap);
            }
        }
        self.regular.quote_count = count;
    }

    fn set_quality(&mut self, book: &mut OrderBook, quality: Quality) {
        if book.quality() == quality {
            return;
        }
        book.set_quality(quality);
        match quality {
            Quality::Stale
            | Quality::MaybeStale
            | Quality::PartialStale
            | Quality::ForcedStale
            | Quality::Unknown => {
                if self.config.clear_stale_book() {
                    debug!(symbol = %book.symbol(), ?quality, "clearing stale book");
                    self.clear(book);
                    for handler in &mut self.handlers {
                        handler.on_book_clear(book);
                    }
                }
            }
            Quality::Ok | Quality::Duplicate => {}
        }
    }

    fn clear(&mut self, book: &mut OrderBook) {
        self.regular = QuoteCache::default();
        self.transient = QuoteCache::default();
        self.gap = None;
        self.cycle = CycleDeltas::None;
        self.seen_recap = false;
        book.clear();
    }
}

/// Read an optional field, logging and dropping malformed data
fn lenient<T>(book: &OrderBook, field: Result<Option<T>>) -> Option<T> {
    field.unwrap_or_else(|err| {
        warn!(symbol = %book.symbol(), error = %err, "ignoring malformed field");
        None
    })
}

/// Shared read access to a listener's book
///
/// Every method takes the read lock for its own duration. Do not call these
/// from inside a [`BookHandler`] of the same listener: the listener holds the
/// write lock while handlers run.
#[derive(Debug, Clone)]
pub struct BookReader {
    book: Arc<RwLock<OrderBook>>,
}

impl BookReader {
    /// Copy of the book as it is now
    pub fn snapshot(&self) -> OrderBook {
        self.book.read().clone()
    }

    /// Run `f` against the book under the read lock
    pub fn with_book<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.book.read())
    }

    /// Best bid as `(price, size)`
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.with_book(|book| book.best_bid().map(|l| (l.price(), l.size())))
    }

    /// Best ask as `(price, size)`
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.with_book(|book| book.best_ask().map(|l| (l.price(), l.size())))
    }

    /// Data quality of the book
    pub fn quality(&self) -> Quality {
        self.book.read().quality()
    }

    /// Check if the book has no unresolved gap
    pub fn is_consistent(&self) -> bool {
        self.book.read().is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldMessage;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Recap,
        Delta(Side, Price, Quantity, Action),
        Complex(usize),
        Clear,
        Gap(u32, u32),
    }

    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl BookHandler for Recorder {
        fn on_book_recap(&mut self, _book: &OrderBook) {
            self.0.lock().unwrap().push(Event::Recap);
        }

        fn on_book_delta(&mut self, _book: &OrderBook, delta: &Delta) {
            self.0.lock().unwrap().push(Event::Delta(
                delta.side(),
                delta.price(),
                delta.size_delta(),
                delta.level_action(),
            ));
        }

        fn on_book_complex_delta(&mut self, _book: &OrderBook, deltas: &crate::DeltaList) {
            self.0.lock().unwrap().push(Event::Complex(deltas.len()));
        }

        fn on_book_clear(&mut self, _book: &OrderBook) {
            self.0.lock().unwrap().push(Event::Clear);
        }

        fn on_book_gap(&mut self, _book: &OrderBook, gap: GapRange) {
            self.0.lock().unwrap().push(Event::Gap(gap.begin, gap.end));
        }
    }

    fn listener(config: ListenerConfig) -> (QuoteToBookListener, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut listener = QuoteToBookListener::new(config).unwrap();
        listener.add_handler(Box::new(Recorder(events.clone())));
        (listener, events)
    }

    fn quote(count: u64) -> FieldMessage {
        FieldMessage::new().with_field(fields::QUOTE_COUNT, count)
    }

    fn drain(events: &Arc<Mutex<Vec<Event>>>) -> Vec<Event> {
        std::mem::take(&mut *events.lock().unwrap())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ListenerConfig::new("IBM").with_quote_size_multiplier(0);
        assert!(QuoteToBookListener::new(config).is_err());
    }

    #[test]
    fn test_state_progression() {
        let (mut l, _) = listener(ListenerConfig::new("IBM"));
        assert_eq!(l.state(), ListenerState::Uninitialized);

        l.on_msg(&quote(1).with_field(fields::BID_PRICE, dec!(10)), MsgType::Quote)
            .unwrap();
        assert_eq!(l.state(), ListenerState::AwaitingRecap);

        l.on_msg(&quote(2), MsgType::Recap).unwrap();
        assert_eq!(l.state(), ListenerState::Consistent);

        l.on_msg(&quote(5), MsgType::Quote).unwrap();
        assert_eq!(l.state(), ListenerState::Inconsistent);

        l.set_quality(Quality::Stale);
        assert_eq!(l.state(), ListenerState::Stale);

        l.on_msg(&quote(6), MsgType::Recap).unwrap();
        assert_eq!(l.state(), ListenerState::Consistent);
    }

    #[test]
    fn test_recap_builds_levels_without_deltas() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        let recap = quote(1)
            .with_field(fields::BID_PRICE, dec!(10.00))
            .with_field(fields::BID_SIZE, 100_i64)
            .with_field(fields::ASK_PRICE, dec!(10.05))
            .with_field(fields::ASK_SIZE, 0_i64);
        l.on_msg(&recap, MsgType::Initial).unwrap();

        assert_eq!(drain(&events), vec![Event::Recap]);
        let book = l.reader().snapshot();
        assert_eq!(book.num_bid_levels(), 1);
        assert_eq!(book.num_ask_levels(), 0);
        assert_eq!(book.best_bid().unwrap().action(), Action::Add);
    }

    #[test]
    fn test_price_change_replaces_level() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        let recap = quote(1)
            .with_field(fields::BID_PRICE, dec!(10.00))
            .with_field(fields::BID_SIZE, 100_i64);
        l.on_msg(&recap, MsgType::Recap).unwrap();
        drain(&events);

        l.on_msg(&quote(2).with_field(fields::BID_PRICE, dec!(10.01)), MsgType::Quote)
            .unwrap();
        assert_eq!(drain(&events), vec![Event::Complex(2)]);

        let reader = l.reader();
        assert_eq!(reader.best_bid(), Some((dec!(10.01), 100)));
        assert_eq!(reader.with_book(OrderBook::total_num_levels), 1);
    }

    #[test]
    fn test_zero_size_deletes_level() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        let recap = quote(1)
            .with_field(fields::ASK_PRICE, dec!(10.05))
            .with_field(fields::ASK_SIZE, 300_i64);
        l.on_msg(&recap, MsgType::Recap).unwrap();
        drain(&events);

        l.on_msg(&quote(2).with_field(fields::ASK_SIZE, 0_i64), MsgType::Quote)
            .unwrap();
        assert_eq!(
            drain(&events),
            vec![Event::Delta(Side::Ask, dec!(10.05), -300, Action::Delete)]
        );
        assert!(l.reader().with_book(OrderBook::is_empty));
    }

    #[test]
    fn test_update_without_quote_fields_ignored() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        l.on_msg(&quote(1), MsgType::Recap).unwrap();
        drain(&events);

        // A trade with no quote fields does not consume the quote count.
        l.on_msg(&quote(9), MsgType::Trade).unwrap();
        assert!(drain(&events).is_empty());
        assert_eq!(l.quote_count(), 1);
        assert!(l.gap().is_none());
    }

    #[test]
    fn test_stale_book_cleared_and_updates_ignored() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        let recap = quote(1)
            .with_field(fields::BID_PRICE, dec!(10))
            .with_field(fields::BID_SIZE, 5_i64);
        l.on_msg(&recap, MsgType::Recap).unwrap();
        drain(&events);

        l.set_quality(Quality::Stale);
        l.set_quality(Quality::Stale);
        assert_eq!(drain(&events), vec![Event::Clear]);
        assert!(l.reader().with_book(OrderBook::is_empty));

        let update = quote(2)
            .with_field(fields::BID_PRICE, dec!(11))
            .with_field(fields::BID_SIZE, 5_i64);
        l.on_msg(&update, MsgType::Quote).unwrap();
        assert!(drain(&events).is_empty());
        assert!(l.reader().with_book(OrderBook::is_empty));
    }

    #[test]
    fn test_stale_book_kept_when_clearing_disabled() {
        let config = ListenerConfig::new("IBM")
            .with_clear_stale_book(false)
            .with_update_stale_book(true);
        let (mut l, events) = listener(config);
        let recap = quote(1)
            .with_field(fields::BID_PRICE, dec!(10))
            .with_field(fields::BID_SIZE, 5_i64);
        l.on_msg(&recap, MsgType::Recap).unwrap();
        drain(&events);

        l.set_quality(Quality::MaybeStale);
        l.on_msg(&quote(2).with_field(fields::BID_SIZE, 6_i64), MsgType::Quote)
            .unwrap();
        assert_eq!(
            drain(&events),
            vec![Event::Delta(Side::Bid, dec!(10), 1, Action::Update)]
        );
    }

    #[test]
    fn test_symbol_learned_when_empty() {
        let (mut l, _) = listener(ListenerConfig::new(""));
        l.on_msg(&quote(1).with_field(fields::SYMBOL, "MSFT"), MsgType::Recap)
            .unwrap();
        assert_eq!(l.symbol(), "MSFT");

        l.on_msg(&quote(2).with_field(fields::ISSUE_SYMBOL, "IBM"), MsgType::Recap)
            .unwrap();
        assert_eq!(l.symbol(), "MSFT");
    }

    #[test]
    fn test_bad_field_skips_only_its_side() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        let recap = quote(1)
            .with_field(fields::BID_PRICE, dec!(10.00))
            .with_field(fields::BID_SIZE, 100_i64)
            .with_field(fields::ASK_PRICE, dec!(10.05))
            .with_field(fields::ASK_SIZE, 50_i64);
        l.on_msg(&recap, MsgType::Recap).unwrap();
        drain(&events);

        let bad = quote(2)
            .with_field(fields::BID_PRICE, dec!(10.01))
            .with_field(fields::BID_SIZE, "lots")
            .with_field(fields::ASK_SIZE, 60_i64);
        l.on_msg(&bad, MsgType::Quote).unwrap();
        assert_eq!(
            drain(&events),
            vec![Event::Delta(Side::Ask, dec!(10.05), 10, Action::Update)]
        );
        let reader = l.reader();
        assert_eq!(reader.best_bid(), Some((dec!(10.00), 100)));
        assert_eq!(l.regular_cache().side(Side::Bid), (dec!(10.00), 100));

        // A clean resend of the bid still moves the book.
        let resend = quote(3)
            .with_field(fields::BID_PRICE, dec!(10.01))
            .with_field(fields::BID_SIZE, 100_i64)
            .with_field(fields::ASK_SIZE, 60_i64);
        l.on_msg(&resend, MsgType::Quote).unwrap();
        assert_eq!(drain(&events), vec![Event::Complex(2)]);
        assert_eq!(reader.best_bid(), Some((dec!(10.01), 100)));
        assert_eq!(reader.best_ask(), Some((dec!(10.05), 60)));
    }

    #[test]
    fn test_bad_qualifier_treated_as_regular() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        l.on_msg(&quote(1), MsgType::Recap).unwrap();
        drain(&events);

        let msg = quote(2)
            .with_field(fields::MSG_QUAL, "dup")
            .with_field(fields::BID_PRICE, dec!(10))
            .with_field(fields::BID_SIZE, 5_i64);
        l.on_msg(&msg, MsgType::Quote).unwrap();
        assert_eq!(
            drain(&events),
            vec![Event::Delta(Side::Bid, dec!(10), 5, Action::Add)]
        );
    }

    #[test]
    fn test_field_states_age_each_message() {
        let (mut l, _) = listener(ListenerConfig::new("IBM"));
        assert_eq!(l.src_time_field_state(), FieldState::NotInitialised);

        let msg = quote(1)
            .with_field(fields::SYMBOL, "IBM")
            .with_field(fields::SRC_TIME, 990_u64)
            .with_field(fields::MSG_QUAL, 0_u64);
        l.on_msg(&msg, MsgType::Recap).unwrap();
        assert_eq!(l.symbol_field_state(), FieldState::Modified);
        assert_eq!(l.src_time_field_state(), FieldState::Modified);
        assert_eq!(l.msg_qual_field_state(), FieldState::Modified);
        assert_eq!(l.send_time_field_state(), FieldState::NotInitialised);

        l.on_msg(&quote(2).with_field(fields::SRC_TIME, 990_u64), MsgType::Quote)
            .unwrap();
        assert_eq!(l.symbol_field_state(), FieldState::NotModified);
        assert_eq!(l.src_time_field_state(), FieldState::NotModified);
        assert_eq!(l.msg_qual_field_state(), FieldState::NotModified);

        l.on_msg(&quote(3).with_field(fields::SRC_TIME, 995_u64), MsgType::Quote)
            .unwrap();
        assert_eq!(l.src_time_field_state(), FieldState::Modified);
        assert_eq!(l.event_seq_num_field_state(), FieldState::NotInitialised);

        l.clear();
        assert_eq!(l.src_time_field_state(), FieldState::NotInitialised);
    }

    #[test]
    fn test_pre_opening_ignored_on_stale_book() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        l.on_msg(&quote(1), MsgType::Recap).unwrap();
        l.set_quality(Quality::Stale);
        drain(&events);

        let pre_open = quote(2)
            .with_field(fields::BID_PRICE, dec!(10))
            .with_field(fields::BID_SIZE, 5_i64);
        l.on_msg(&pre_open, MsgType::PreOpening).unwrap();
        assert!(drain(&events).is_empty());
        assert_eq!(l.state(), ListenerState::Stale);
        assert!(l.reader().with_book(OrderBook::is_empty));

        // A full recap still restores the book.
        l.on_msg(&pre_open, MsgType::Recap).unwrap();
        assert_eq!(drain(&events), vec![Event::Recap]);
        assert_eq!(l.state(), ListenerState::Consistent);

        // Once quality is OK, pre-opening rebuilds like any recap.
        let next = quote(3)
            .with_field(fields::BID_PRICE, dec!(11))
            .with_field(fields::BID_SIZE, 7_i64);
        l.on_msg(&next, MsgType::PreOpening).unwrap();
        assert_eq!(drain(&events), vec![Event::Recap]);
        assert_eq!(l.reader().best_bid(), Some((dec!(11), 7)));
    }

    #[test]
    fn test_metadata_accessors() {
        let (mut l, _) = listener(ListenerConfig::new("IBM"));
        let msg = quote(3)
            .with_field(fields::QUOTE_SEQ_NUM, 11_u64)
            .with_field(fields::QUOTE_TIME, 1_000_u64)
            .with_field(fields::SRC_TIME, 990_u64)
            .with_field(fields::LINE_TIME, 995_u64)
            .with_field(fields::ACTIVITY_TIME, 1_001_u64);
        l.on_msg(&msg, MsgType::Snapshot).unwrap();

        assert_eq!(l.quote_count(), 3);
        assert_eq!(l.quote_seq_num(), 11);
        assert_eq!(l.event_time(), 1_000);
        assert_eq!(l.src_time(), 990);
        assert_eq!(l.line_time(), 995);
        assert_eq!(l.activity_time(), 1_001);
        assert_eq!(l.send_time(), 0);

        l.clear();
        assert_eq!(l.quote_count(), 0);
        assert_eq!(l.state(), ListenerState::AwaitingRecap);
    }

    #[test]
    fn test_remove_handlers() {
        let (mut l, events) = listener(ListenerConfig::new("IBM"));
        assert_eq!(l.handler_count(), 1);
        l.remove_handlers();
        l.on_msg(&quote(1), MsgType::Recap).unwrap();
        assert!(drain(&events).is_empty());
    }
}
