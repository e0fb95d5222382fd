//! Core order book data structure.
//!
//! Levels are stored in a slot map and indexed per side by a `BTreeMap`
//! from price to level key, providing:
//!
//! - O(log n) level insertion, removal, and lookup by exact price
//! - O(log n) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered best-first iteration for depth-of-book queries
//! - Stable keys that deltas can hold across a processing cycle

use std::collections::BTreeMap;
use std::mem;

use rust_decimal::Decimal;
use slotmap::SlotMap;
use tracing::trace;

use super::delta::{ConflationMode, Delta, DeltaList};
use super::entry::{Entry, EntryKey};
use super::level::{LevelKey, PriceLevel};
use crate::config::BookConfig;
use crate::error::Error;
use crate::types::{Action, Price, Quality, Quantity, Side, TimestampMs};
use crate::Result;

/// Multi-level order book for a single instrument.
///
/// # Design Decisions
///
/// 1. **Exact prices**: Levels are keyed by `Decimal` price with value
///    equality, so there is at most one level per (side, price).
///
/// 2. **Slot storage**: Levels live in a generation-tagged `SlotMap`. Side maps
///    hold keys, and a [`Delta`] can refer to a level without borrowing the
///    book.
///
/// 3. **Deferred destruction**: A detached level is unlinked from its side
///    map immediately but stays resolvable until [`cleanup_detached`]
///    runs, so handlers can still read what was removed this cycle.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The
/// [`QuoteToBookListener`](crate::listener::QuoteToBookListener) shares it
/// behind a `parking_lot::RwLock`.
///
/// [`cleanup_detached`]: OrderBook::cleanup_detached
#[derive(Debug)]
pub struct OrderBook {
    /// Instrument symbol
    symbol: String,

    /// Participant the book is restricted to, if any
    participant_id: Option<String>,

    /// Bid levels: price -> level key
    /// Sorted ascending by price (best bid = highest = last)
    bids: BTreeMap<Price, LevelKey>,

    /// Ask levels: price -> level key
    /// Sorted ascending by price (best ask = lowest = first)
    asks: BTreeMap<Price, LevelKey>,

    levels: SlotMap<LevelKey, PriceLevel>,

    /// Levels unlinked since the last cleanup
    detached: Vec<LevelKey>,

    /// Levels holding detached entries
    dirty: Vec<LevelKey>,

    quality: Quality,

    /// False while a sequence gap is unresolved
    consistent: bool,

    config: BookConfig,

    book_time: TimestampMs,

    /// Deltas recorded by entry operations when delta generation is on
    generated: DeltaList,
}

impl OrderBook {
    /// Create a new empty book for the given symbol
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_config(symbol, BookConfig::default())
    }

    /// Create a new empty book with the given switches
    #[must_use]
    pub fn with_config(symbol: impl Into<String>, config: BookConfig) -> Self {
        Self {
            symbol: symbol.into(),
            participant_id: None,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            levels: SlotMap::with_key(),
            detached: Vec::new(),
            dirty: Vec::new(),
            quality: Quality::Ok,
            consistent: true,
            config,
            book_time: 0,
            generated: DeltaList::new(ConflationMode::PerEntry),
        }
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Set the symbol
    pub fn set_symbol(&mut self, symbol: impl Into<String>) {
        self.symbol = symbol.into();
    }

    /// Get the participant id
    #[must_use]
    pub fn participant_id(&self) -> Option<&str> {
        self.participant_id.as_deref()
    }

    /// Set the participant id
    pub fn set_participant_id(&mut self, id: Option<String>) {
        self.participant_id = id;
    }

    /// Get the data quality
    #[must_use]
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Set the data quality
    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    /// Check if the book has no unresolved sequence gap
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Set the consistency flag
    pub fn set_consistent(&mut self, consistent: bool) {
        self.consistent = consistent;
    }

    /// Get the time of the last change
    #[must_use]
    pub fn book_time(&self) -> TimestampMs {
        self.book_time
    }

    /// Set the time of the last change
    pub fn set_book_time(&mut self, time: TimestampMs) {
        self.book_time = time;
    }

    /// Get the book switches
    #[must_use]
    pub fn config(&self) -> BookConfig {
        self.config
    }

    fn side_map(&self, side: Side) -> &BTreeMap<Price, LevelKey> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<Price, LevelKey> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Find the level at an exact price
    #[must_use]
    pub fn find_level(&self, price: Price, side: Side) -> Option<LevelKey> {
        self.side_map(side).get(&price).copied()
    }

    /// Find the level at an exact price, creating an empty one if needed
    pub fn find_or_create_level(&mut self, price: Price, side: Side) -> LevelKey {
        self.level_for(price, side).0
    }

    fn level_for(&mut self, price: Price, side: Side) -> (LevelKey, bool) {
        if let Some(key) = self.find_level(price, side) {
            return (key, false);
        }
        let key = self
            .levels
            .insert(PriceLevel::with_config(price, side, self.config));
        self.side_map_mut(side).insert(price, key);
        (key, true)
    }

    /// Resolve a level key
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the level has been destroyed.
    pub fn level(&self, key: LevelKey) -> Result<&PriceLevel> {
        self.levels.get(key).ok_or(Error::StaleReference)
    }

    /// Resolve a level key mutably
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the level has been destroyed.
    pub fn level_mut(&mut self, key: LevelKey) -> Result<&mut PriceLevel> {
        self.levels.get_mut(key).ok_or(Error::StaleReference)
    }

    /// Check if a level is unlinked and awaiting cleanup
    #[must_use]
    pub fn is_detached(&self, key: LevelKey) -> bool {
        self.detached.contains(&key)
    }

    /// Unlink a level from the book without destroying it
    ///
    /// Detaching an already detached level does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the level has been destroyed.
    pub fn detach_level(&mut self, key: LevelKey) -> Result<()> {
        let level = self.level(key)?;
        let (side, price) = (level.side(), level.price());
        let map = self.side_map_mut(side);
        if map.get(&price) == Some(&key) {
            map.remove(&price);
            self.detached.push(key);
        }
        Ok(())
    }

    /// Unlink an entry without destroying it
    ///
    /// The level is detached too once it has no entries left. Returns the
    /// resulting change in level size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the level or entry is gone.
    pub fn detach_entry(&mut self, level: LevelKey, entry: EntryKey) -> Result<Quantity> {
        let pl = self.level_mut(level)?;
        let change = pl.detach_entry(entry)?;
        let empty = pl.is_empty();
        self.dirty.push(level);
        if empty {
            self.detach_level(level)?;
        }
        Ok(change)
    }

    /// Destroy every level and entry detached since the last call
    ///
    /// Keys to them, including those held by deltas, become stale.
    pub fn cleanup_detached(&mut self) {
        for key in self.dirty.drain(..) {
            if let Some(level) = self.levels.get_mut(key) {
                level.cleanup_detached();
            }
        }
        for key in self.detached.drain(..) {
            self.levels.remove(key);
        }
    }

    /// Destroy all levels and entries
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.levels.clear();
        self.detached.clear();
        self.dirty.clear();
        self.generated.clear();
    }

    /// Add an entry, creating its level if needed
    ///
    /// Returns the delta describing the change, or `Ok(None)` if the id
    /// already exists at that price and checking is lenient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] for an existing id in strict mode.
    pub fn add_entry(
        &mut self,
        price: Price,
        side: Side,
        id: &str,
        size: Quantity,
        time: TimestampMs,
    ) -> Result<Option<Delta>> {
        let (level_key, created) = self.level_for(price, side);
        let level = self.level_mut(level_key)?;
        let Some(entry_key) = level.add_entry(Entry::new(id, size, side, time))? else {
            return Ok(None);
        };
        let level_action = if created { Action::Add } else { Action::Update };
        level.set_action(level_action);
        level.set_time(time);
        let delta = Delta::for_level(level_key, side, price, level.size_change(), level_action)
            .with_entry(entry_key, id, Action::Add);

        self.book_time = time;
        self.record(&delta);
        Ok(Some(delta))
    }

    /// Overwrite the size of an entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for an unknown level or id in strict
    /// mode.
    pub fn update_entry(
        &mut self,
        price: Price,
        side: Side,
        id: &str,
        size: Quantity,
        time: TimestampMs,
    ) -> Result<Option<Delta>> {
        let Some(level_key) = self.find_level(price, side) else {
            return self.missing(id, price).map(|()| None);
        };
        let level = self.level_mut(level_key)?;
        let Some(size_delta) = level.update_entry(id, size, time)? else {
            return Ok(None);
        };
        let entry_key = level.entry_key(id).ok_or(Error::StaleReference)?;
        level.set_action(Action::Update);
        level.set_time(time);
        let delta = Delta::for_level(level_key, side, price, size_delta, Action::Update)
            .with_entry(entry_key, id, Action::Update);

        self.book_time = time;
        self.record(&delta);
        Ok(Some(delta))
    }

    /// Remove an entry; its level is detached once empty
    ///
    /// The entry stays resolvable through the returned delta until
    /// [`cleanup_detached`](Self::cleanup_detached).
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for an unknown level or id in strict
    /// mode.
    pub fn delete_entry(
        &mut self,
        price: Price,
        side: Side,
        id: &str,
        time: TimestampMs,
    ) -> Result<Option<Delta>> {
        let found = self
            .find_level(price, side)
            .and_then(|key| Some((key, self.level(key).ok()?.entry_key(id)?)));
        let Some((level_key, entry_key)) = found else {
            return self.missing(id, price).map(|()| None);
        };

        let size_delta = self.detach_entry(level_key, entry_key)?;
        let level = self.level_mut(level_key)?;
        let level_action = if level.is_empty() {
            Action::Delete
        } else {
            Action::Update
        };
        level.set_action(level_action);
        level.set_time(time);
        let delta = Delta::for_level(level_key, side, price, size_delta, level_action)
            .with_entry(entry_key, id, Action::Delete);

        self.book_time = time;
        self.record(&delta);
        Ok(Some(delta))
    }

    fn missing(&self, id: &str, price: Price) -> Result<()> {
        if self.config.strict_checking() {
            return Err(Error::EntryNotFound {
                id: id.to_string(),
                price,
            });
        }
        trace!(symbol = %self.symbol, id, price = %price, "ignoring operation on missing entry");
        Ok(())
    }

    fn record(&mut self, delta: &Delta) {
        if self.config.generate_deltas() {
            self.generated.push(delta.clone());
        }
    }

    /// Deltas recorded by entry operations since the last take
    #[must_use]
    pub fn generated_deltas(&self) -> &DeltaList {
        &self.generated
    }

    /// Take the recorded deltas, leaving an empty list
    pub fn take_generated_deltas(&mut self) -> DeltaList {
        mem::replace(&mut self.generated, DeltaList::new(ConflationMode::PerEntry))
    }

    /// Re-read entry visibility on every level
    ///
    /// Returns whether any level's aggregates changed.
    pub fn reevaluate(&mut self) -> bool {
        self.levels
            .values_mut()
            .fold(false, |changed, level| level.reevaluate() | changed)
    }

    /// Key of the best level on a side
    #[must_use]
    pub fn best_level_key(&self, side: Side) -> Option<LevelKey> {
        match side {
            Side::Bid => self.bids.last_key_value().map(|(_, &k)| k),
            Side::Ask => self.asks.first_key_value().map(|(_, &k)| k),
        }
    }

    /// Get the best bid (highest price)
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.best_level_key(Side::Bid)
            .and_then(|key| self.levels.get(key))
    }

    /// Get the best ask (lowest price)
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.best_level_key(Side::Ask)
            .and_then(|key| self.levels.get(key))
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.bids
            .values()
            .rev()
            .filter_map(move |&key| self.levels.get(key))
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.asks
            .values()
            .filter_map(move |&key| self.levels.get(key))
    }

    /// Get the level at a best-first position on a side
    #[must_use]
    pub fn level_at_position(&self, side: Side, position: usize) -> Option<&PriceLevel> {
        match side {
            Side::Bid => self.bids().nth(position),
            Side::Ask => self.asks().nth(position),
        }
    }

    /// Get the top N bid levels as `(price, size)`
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.bids().take(n).map(|l| (l.price(), l.size())).collect()
    }

    /// Get the top N ask levels as `(price, size)`
    #[must_use]
    pub fn top_asks(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.asks().take(n).map(|l| (l.price(), l.size())).collect()
    }

    /// Get the number of bid levels
    #[must_use]
    pub fn num_bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Get the number of ask levels
    #[must_use]
    pub fn num_ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Get the number of levels on both sides
    #[must_use]
    pub fn total_num_levels(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Check if the book has no levels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is missing.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price() + ask.price()) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price() - bid.price()),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy market but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price() >= ask.price(),
            _ => false,
        }
    }

    /// Check that two books hold the same levels and entries
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] describing the first difference found.
    pub fn assert_equal(&self, other: &OrderBook) -> Result<()> {
        if self.num_bid_levels() != other.num_bid_levels() {
            return Err(Error::Mismatch(format!(
                "{}: bid level count {} != {}",
                self.symbol,
                self.num_bid_levels(),
                other.num_bid_levels()
            )));
        }
        if self.num_ask_levels() != other.num_ask_levels() {
            return Err(Error::Mismatch(format!(
                "{}: ask level count {} != {}",
                self.symbol,
                self.num_ask_levels(),
                other.num_ask_levels()
            )));
        }
        for (a, b) in self.bids().zip(other.bids()) {
            a.assert_equal(b)?;
        }
        for (a, b) in self.asks().zip(other.asks()) {
            a.assert_equal(b)?;
        }
        Ok(())
    }
}

impl Clone for OrderBook {
    /// Snapshot copy: detached levels and entries, and level closures, are
    /// not copied.
    fn clone(&self) -> Self {
        let mut levels = self.levels.clone();
        for &key in &self.detached {
            levels.remove(key);
        }
        Self {
            symbol: self.symbol.clone(),
            participant_id: self.participant_id.clone(),
            bids: self.bids.clone(),
            asks: self.asks.clone(),
            levels,
            detached: Vec::new(),
            dirty: Vec::new(),
            quality: self.quality,
            consistent: self.consistent,
            config: self.config,
            book_time: self.book_time,
            generated: self.generated.clone(),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn set_level(book: &mut OrderBook, price: Price, size: Quantity, side: Side) -> LevelKey {
        let key = book.find_or_create_level(price, side);
        book.level_mut(key).unwrap().set_size(size);
        key
    }

    #[test]
    fn test_new_book() {
        let book = OrderBook::new("IBM");
        assert_eq!(book.symbol(), "IBM");
        assert!(book.is_empty());
        assert!(book.is_consistent());
        assert_eq!(book.quality(), Quality::Ok);
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let mut book = OrderBook::new("TEST");
        let a = book.find_or_create_level(dec!(10.0), Side::Bid);
        let b = book.find_or_create_level(dec!(10.00), Side::Bid);
        let c = book.find_or_create_level(dec!(10.00), Side::Ask);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(book.num_bid_levels(), 1);
        assert_eq!(book.num_ask_levels(), 1);
    }

    #[test]
    fn test_best_first_iteration() {
        let mut book = OrderBook::new("TEST");
        set_level(&mut book, dec!(9.98), 300, Side::Bid);
        set_level(&mut book, dec!(10.00), 100, Side::Bid);
        set_level(&mut book, dec!(9.99), 200, Side::Bid);
        set_level(&mut book, dec!(10.02), 20, Side::Ask);
        set_level(&mut book, dec!(10.01), 10, Side::Ask);

        assert_eq!(book.best_bid().unwrap().price(), dec!(10.00));
        assert_eq!(book.best_ask().unwrap().price(), dec!(10.01));
        assert_eq!(
            book.top_bids(2),
            vec![(dec!(10.00), 100), (dec!(9.99), 200)]
        );
        assert_eq!(book.level_at_position(Side::Ask, 1).unwrap().size(), 20);
        assert_eq!(book.total_num_levels(), 5);
    }

    #[test]
    fn test_mid_price_and_spread() {
        let mut book = OrderBook::new("TEST");
        set_level(&mut book, dec!(10.00), 100, Side::Bid);
        set_level(&mut book, dec!(10.05), 100, Side::Ask);

        assert_eq!(book.mid_price(), Some(dec!(10.025)));
        assert_eq!(book.spread(), Some(dec!(0.05)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_crossed_book() {
        let mut book = OrderBook::new("TEST");
        set_level(&mut book, dec!(10.05), 100, Side::Bid);
        set_level(&mut book, dec!(10.00), 100, Side::Ask);
        assert!(book.is_crossed());
    }

    #[test]
    fn test_detach_and_cleanup() {
        let mut book = OrderBook::new("TEST");
        let key = set_level(&mut book, dec!(10), 100, Side::Bid);

        book.detach_level(key).unwrap();
        assert!(book.find_level(dec!(10), Side::Bid).is_none());
        assert!(book.is_detached(key));
        assert_eq!(book.level(key).unwrap().size(), 100);

        // A new level at the same price is a different object.
        let fresh = book.find_or_create_level(dec!(10), Side::Bid);
        assert_ne!(fresh, key);

        book.cleanup_detached();
        assert!(matches!(book.level(key), Err(Error::StaleReference)));
        assert!(book.level(fresh).is_ok());
    }

    #[test]
    fn test_entry_operations_produce_deltas() {
        let mut book = OrderBook::new("TEST");

        let add = book.add_entry(dec!(10), Side::Bid, "A", 100, 1).unwrap().unwrap();
        assert_eq!(add.level_action(), Action::Add);
        assert_eq!(add.entry_action(), Action::Add);
        assert_eq!(add.size_delta(), 100);

        let add_b = book.add_entry(dec!(10), Side::Bid, "B", 50, 2).unwrap().unwrap();
        assert_eq!(add_b.level_action(), Action::Update);

        let update = book.update_entry(dec!(10), Side::Bid, "A", 70, 3).unwrap().unwrap();
        assert_eq!(update.size_delta(), -30);
        assert_eq!(book.best_bid().unwrap().size(), 120);

        book.delete_entry(dec!(10), Side::Bid, "B", 4).unwrap().unwrap();
        let last = book.delete_entry(dec!(10), Side::Bid, "A", 5).unwrap().unwrap();
        assert_eq!(last.level_action(), Action::Delete);
        assert_eq!(last.size_delta(), -70);
        assert!(book.is_empty());
        assert_eq!(book.book_time(), 5);

        // Still resolvable until cleanup.
        assert_eq!(last.resolve_entry(&book).unwrap().unwrap().id(), "A");
        book.cleanup_detached();
        assert!(matches!(last.resolve_level(&book), Err(Error::StaleReference)));
    }

    #[test]
    fn test_missing_entry_lenient_and_strict() {
        let mut lenient = OrderBook::new("TEST");
        assert!(lenient
            .update_entry(dec!(10), Side::Bid, "A", 1, 0)
            .unwrap()
            .is_none());
        assert!(lenient.delete_entry(dec!(10), Side::Ask, "A", 0).unwrap().is_none());

        let mut strict =
            OrderBook::with_config("TEST", BookConfig::new().with_strict_checking(true));
        assert!(matches!(
            strict.delete_entry(dec!(10), Side::Ask, "A", 0),
            Err(Error::EntryNotFound { .. })
        ));
        strict.add_entry(dec!(10), Side::Ask, "A", 1, 0).unwrap();
        assert!(matches!(
            strict.add_entry(dec!(10), Side::Ask, "A", 1, 0),
            Err(Error::DuplicateEntry { .. })
        ));
        assert_eq!(strict.best_ask().unwrap().size(), 1);
    }

    #[test]
    fn test_generated_deltas() {
        let mut book = OrderBook::with_config("TEST", BookConfig::new().with_generate_deltas(true));
        book.add_entry(dec!(10), Side::Bid, "A", 5, 0).unwrap();
        book.add_entry(dec!(10), Side::Bid, "B", 5, 0).unwrap();
        book.delete_entry(dec!(10), Side::Bid, "A", 1).unwrap();

        let deltas = book.take_generated_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas.iter().next().unwrap().entry_id(), Some("B"));
        assert!(book.generated_deltas().is_empty());

        let mut quiet = OrderBook::new("TEST");
        quiet.add_entry(dec!(10), Side::Bid, "A", 5, 0).unwrap();
        assert!(quiet.generated_deltas().is_empty());
    }

    #[test]
    fn test_clone_is_snapshot() {
        let mut book = OrderBook::new("TEST");
        let keep = set_level(&mut book, dec!(10), 100, Side::Bid);
        let gone = set_level(&mut book, dec!(9), 100, Side::Bid);
        book.level_mut(keep).unwrap().set_closure("ui-row-3");
        book.detach_level(gone).unwrap();

        let snapshot = book.clone();
        assert!(snapshot.level(gone).is_err());
        assert!(snapshot.level(keep).unwrap().closure::<&str>().is_none());
        snapshot.assert_equal(&book).unwrap();

        book.level_mut(keep).unwrap().set_size(1);
        assert!(snapshot.assert_equal(&book).is_err());
    }

    #[test]
    fn test_assert_equal_level_counts() {
        let mut a = OrderBook::new("TEST");
        let b = OrderBook::new("TEST");
        set_level(&mut a, dec!(10), 1, Side::Ask);
        assert!(matches!(a.assert_equal(&b), Err(Error::Mismatch(_))));
    }

    #[test]
    fn test_clear() {
        let mut book = OrderBook::new("TEST");
        let key = set_level(&mut book, dec!(10), 100, Side::Bid);
        set_level(&mut book, dec!(11), 100, Side::Ask);

        assert!(!book.is_empty());
        book.clear();

        assert!(book.is_empty());
        assert!(book.level(key).is_err());
    }
}
