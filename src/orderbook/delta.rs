//! Change records and conflating delta lists.
//!
//! A [`Delta`] records one transition of a level (and optionally one entry).
//! A [`DeltaList`] collects deltas in one of three shapes:
//!
//! - **Unconflated**: arrival-order sequence, repeats allowed
//! - **Per level**: at most one delta per (side, price), updated in place
//! - **Per entry**: at most one delta per (side, price, entry id), grouped by
//!   price
//!
//! All three are walked through the same [`Iter`]: bids before asks, each
//! side in ascending price, and within a price in recording order.

use std::collections::btree_map::{self, BTreeMap};
use std::iter::{Chain, Flatten};

use serde::{Deserialize, Serialize};

use super::book::OrderBook;
use super::entry::{Entry, EntryKey};
use super::level::{LevelKey, PriceLevel};
use crate::types::{Action, EntryId, Price, Quantity, Side};
use crate::Result;

/// One net change to a level, and optionally to one of its entries
///
/// A delta holds keys rather than references. Once the book has cleaned up
/// the objects it names, resolving it fails with
/// [`Error::StaleReference`](crate::Error::StaleReference).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    level: LevelKey,
    entry: Option<EntryKey>,
    entry_id: Option<EntryId>,
    side: Side,
    price: Price,
    size_delta: Quantity,
    level_action: Action,
    entry_action: Action,
}

impl Delta {
    /// Create a level-only delta
    pub fn for_level(
        level: LevelKey,
        side: Side,
        price: Price,
        size_delta: Quantity,
        level_action: Action,
    ) -> Self {
        Self {
            level,
            entry: None,
            entry_id: None,
            side,
            price,
            size_delta,
            level_action,
            entry_action: Action::Unknown,
        }
    }

    /// Attach the entry this delta concerns
    #[must_use]
    pub fn with_entry(mut self, key: EntryKey, id: impl Into<EntryId>, action: Action) -> Self {
        self.entry = Some(key);
        self.entry_id = Some(id.into());
        self.entry_action = action;
        self
    }

    /// Key of the affected level
    pub fn level_key(&self) -> LevelKey {
        self.level
    }

    /// Key of the affected entry, if any
    pub fn entry_key(&self) -> Option<EntryKey> {
        self.entry
    }

    /// Id of the affected entry, if any
    pub fn entry_id(&self) -> Option<&str> {
        self.entry_id.as_deref()
    }

    /// Side of the affected level
    pub fn side(&self) -> Side {
        self.side
    }

    /// Price of the affected level
    pub fn price(&self) -> Price {
        self.price
    }

    /// Net change in level size
    pub fn size_delta(&self) -> Quantity {
        self.size_delta
    }

    /// Action applied to the level
    pub fn level_action(&self) -> Action {
        self.level_action
    }

    /// Action applied to the entry
    pub fn entry_action(&self) -> Action {
        self.entry_action
    }

    /// Resolve the level against the book that produced this delta
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`](crate::Error::StaleReference) if the
    /// level has been cleaned up.
    pub fn resolve_level<'a>(&self, book: &'a OrderBook) -> Result<&'a PriceLevel> {
        book.level(self.level)
    }

    /// Resolve the entry against the book that produced this delta
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`](crate::Error::StaleReference) if the
    /// level or entry has been cleaned up.
    pub fn resolve_entry<'a>(&self, book: &'a OrderBook) -> Result<Option<&'a Entry>> {
        match self.entry {
            None => Ok(None),
            Some(key) => self.resolve_level(book)?.entry(key).map(Some),
        }
    }

    fn into_level_delete(self) -> Self {
        Self {
            entry: None,
            entry_id: None,
            entry_action: Action::Unknown,
            level_action: Action::Delete,
            ..self
        }
    }

    /// Fold a later transition of the same level into this delta
    fn absorb(&mut self, later: Delta) {
        self.size_delta += later.size_delta;
        self.level = later.level;
        self.entry = later.entry;
        self.entry_id = later.entry_id;
        self.entry_action = later.entry_action;
    }
}

/// How a [`DeltaList`] conflates the deltas pushed into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflationMode {
    /// Keep every delta in arrival order
    #[default]
    Unconflated,
    /// One delta per (side, price)
    PerLevel,
    /// One delta per (side, price, entry id)
    PerEntry,
}

impl ConflationMode {
    /// Select a mode from the `conflate` and `process_entries` flags
    pub fn from_flags(conflate: bool, process_entries: bool) -> Self {
        match (conflate, process_entries) {
            (false, _) => ConflationMode::Unconflated,
            (true, false) => ConflationMode::PerLevel,
            (true, true) => ConflationMode::PerEntry,
        }
    }
}

/// Which book sides a delta list has touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifiedSides {
    /// No side touched
    #[default]
    None,
    /// Only bids touched
    Bid,
    /// Only asks touched
    Ask,
    /// Both sides touched
    BidAndAsk,
}

impl ModifiedSides {
    fn record(self, side: Side) -> Self {
        match (self, side) {
            (ModifiedSides::None, Side::Bid) => ModifiedSides::Bid,
            (ModifiedSides::None, Side::Ask) => ModifiedSides::Ask,
            (ModifiedSides::Bid, Side::Ask) | (ModifiedSides::Ask, Side::Bid) => {
                ModifiedSides::BidAndAsk
            }
            (current, _) => current,
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    Sequence(Vec<Delta>),
    PerLevel {
        bids: BTreeMap<Price, Delta>,
        asks: BTreeMap<Price, Delta>,
    },
    PerEntry {
        bids: BTreeMap<Price, Vec<Delta>>,
        asks: BTreeMap<Price, Vec<Delta>>,
    },
}

impl Storage {
    fn new(mode: ConflationMode) -> Self {
        match mode {
            ConflationMode::Unconflated => Storage::Sequence(Vec::new()),
            ConflationMode::PerLevel => Storage::PerLevel {
                bids: BTreeMap::new(),
                asks: BTreeMap::new(),
            },
            ConflationMode::PerEntry => Storage::PerEntry {
                bids: BTreeMap::new(),
                asks: BTreeMap::new(),
            },
        }
    }
}

/// A collection of deltas with optional conflation
///
/// # Example
///
/// ```rust
/// use quote_book::orderbook::{ConflationMode, DeltaList, OrderBook};
/// use quote_book::types::Side;
/// use rust_decimal_macros::dec;
///
/// let mut book = OrderBook::new("IBM");
/// let mut deltas = DeltaList::new(ConflationMode::PerLevel);
///
/// deltas.push(book.add_entry(dec!(10), Side::Bid, "A", 5, 0).unwrap().unwrap());
/// deltas.push(book.update_entry(dec!(10), Side::Bid, "A", 8, 1).unwrap().unwrap());
///
/// assert_eq!(deltas.len(), 1);
/// let net = deltas.iter().next().unwrap();
/// assert_eq!(net.size_delta(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct DeltaList {
    storage: Storage,
    modified: ModifiedSides,
    send_immediately: bool,
    keep_deltas: bool,
}

impl Default for DeltaList {
    fn default() -> Self {
        Self::new(ConflationMode::Unconflated)
    }
}

impl DeltaList {
    /// Create an empty list
    pub fn new(mode: ConflationMode) -> Self {
        Self {
            storage: Storage::new(mode),
            modified: ModifiedSides::None,
            send_immediately: false,
            keep_deltas: true,
        }
    }

    /// Create an empty list from the two conflation flags
    pub fn with_flags(conflate: bool, process_entries: bool) -> Self {
        Self::new(ConflationMode::from_flags(conflate, process_entries))
    }

    /// Get the conflation mode
    pub fn mode(&self) -> ConflationMode {
        match self.storage {
            Storage::Sequence(_) => ConflationMode::Unconflated,
            Storage::PerLevel { .. } => ConflationMode::PerLevel,
            Storage::PerEntry { .. } => ConflationMode::PerEntry,
        }
    }

    /// Switch conflation mode; the list is cleared
    pub fn set_mode(&mut self, mode: ConflationMode) {
        self.storage = Storage::new(mode);
        self.modified = ModifiedSides::None;
        self.send_immediately = false;
    }

    /// Stop or resume storing deltas; modified sides are tracked either way
    pub fn set_keep_deltas(&mut self, keep: bool) {
        self.keep_deltas = keep;
    }

    /// Check if deltas are being stored
    pub fn keep_deltas(&self) -> bool {
        self.keep_deltas
    }

    /// Sides touched since the last clear
    pub fn modified_sides(&self) -> ModifiedSides {
        self.modified
    }

    /// Whether a whole level vanished and consumers should flush now
    pub fn send_immediately(&self) -> bool {
        self.send_immediately
    }

    /// Number of logically distinct changes currently held
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Sequence(deltas) => deltas.len(),
            Storage::PerLevel { bids, asks } => bids.len() + asks.len(),
            Storage::PerEntry { bids, asks } => {
                bids.values().chain(asks.values()).map(Vec::len).sum()
            }
        }
    }

    /// Check if the list holds no deltas
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every delta and reset the flags
    pub fn clear(&mut self) {
        self.set_mode(self.mode());
    }

    /// Record a transition, conflating according to the mode
    pub fn push(&mut self, delta: Delta) {
        self.modified = self.modified.record(delta.side);
        if !self.keep_deltas {
            return;
        }
        match &mut self.storage {
            Storage::Sequence(deltas) => deltas.push(delta),
            Storage::PerLevel { bids, asks } => {
                let side = match delta.side {
                    Side::Bid => bids,
                    Side::Ask => asks,
                };
                conflate_level(side, delta);
            }
            Storage::PerEntry { bids, asks } => {
                let side = match delta.side {
                    Side::Bid => bids,
                    Side::Ask => asks,
                };
                if conflate_entry(side, delta) {
                    self.send_immediately = true;
                }
            }
        }
    }

    /// Iterate the held deltas
    pub fn iter(&self) -> Iter<'_> {
        match &self.storage {
            Storage::Sequence(deltas) => Iter::Sequence(deltas.iter()),
            Storage::PerLevel { bids, asks } => Iter::PerLevel(bids.values().chain(asks.values())),
            Storage::PerEntry { bids, asks } => {
                Iter::PerEntry(bids.values().chain(asks.values()).flatten())
            }
        }
    }

    /// Make runs of same-level deltas replay-safe
    ///
    /// For each run of consecutive deltas on the same level: if the run starts
    /// with `Add` the whole run becomes `Add`, otherwise if it ends with
    /// `Delete` the whole run becomes `Delete`. Only unconflated lists have
    /// runs; conflated lists are left unchanged.
    pub fn fix_price_level_actions(&mut self) {
        let Storage::Sequence(deltas) = &mut self.storage else {
            return;
        };
        for run in deltas.chunk_by_mut(|a, b| a.level == b.level) {
            let first = run.first().map(|d| d.level_action);
            let last = run.last().map(|d| d.level_action);
            let forced = match (first, last) {
                (Some(Action::Add), _) => Action::Add,
                (_, Some(Action::Delete)) => Action::Delete,
                _ => continue,
            };
            for delta in run.iter_mut() {
                delta.level_action = forced;
            }
        }
    }
}

fn conflate_level(side: &mut BTreeMap<Price, Delta>, delta: Delta) {
    let mut existing = match side.entry(delta.price) {
        btree_map::Entry::Vacant(slot) => {
            slot.insert(delta);
            return;
        }
        btree_map::Entry::Occupied(existing) => existing,
    };
    match delta.level_action {
        Action::Delete => {
            if existing.get().level_action == Action::Add {
                // The level never existed outside this interval.
                existing.remove();
            } else {
                let held = existing.get_mut();
                held.level_action = Action::Delete;
                held.absorb(delta);
            }
        }
        Action::Add => {
            let held = existing.get_mut();
            held.level_action = Action::Update;
            held.absorb(delta);
        }
        Action::Update => existing.get_mut().absorb(delta),
        Action::Unknown => {}
    }
}

/// Returns whether the list should be flushed immediately
fn conflate_entry(side: &mut BTreeMap<Price, Vec<Delta>>, delta: Delta) -> bool {
    let price = delta.price;
    let bucket = side.entry(price).or_default();
    if bucket.is_empty() {
        bucket.push(delta);
        return false;
    }

    let flush = match delta.entry_id.as_deref() {
        None if delta.level_action == Action::Delete => {
            let first = bucket[0].level_action;
            bucket.clear();
            if first == Action::Add {
                false
            } else {
                bucket.push(delta);
                true
            }
        }
        None => {
            bucket.retain(|held| held.entry_id.is_some());
            bucket.push(delta);
            false
        }
        Some(id) => {
            let prior = bucket
                .iter()
                .position(|held| held.entry_id.as_deref() == Some(id))
                .map(|pos| bucket.remove(pos));
            let added_this_interval = prior.map_or(false, |p| p.entry_action == Action::Add);

            if delta.entry_action == Action::Delete && added_this_interval {
                if bucket.is_empty() {
                    bucket.push(delta.into_level_delete());
                    true
                } else {
                    false
                }
            } else {
                bucket.push(delta);
                false
            }
        }
    };

    if bucket.is_empty() {
        side.remove(&price);
    }
    flush
}

type LevelValues<'a> = btree_map::Values<'a, Price, Delta>;
type BucketValues<'a> = btree_map::Values<'a, Price, Vec<Delta>>;

/// Iterator over the deltas of a [`DeltaList`], whatever its shape
pub enum Iter<'a> {
    /// Unconflated sequence
    Sequence(std::slice::Iter<'a, Delta>),
    /// One delta per price
    PerLevel(Chain<LevelValues<'a>, LevelValues<'a>>),
    /// Buckets of deltas per price
    PerEntry(Flatten<Chain<BucketValues<'a>, BucketValues<'a>>>),
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Delta;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Iter::Sequence(inner) => inner.next(),
            Iter::PerLevel(inner) => inner.next(),
            Iter::PerEntry(inner) => inner.next(),
        }
    }
}

impl<'a> IntoIterator for &'a DeltaList {
    type Item = &'a Delta;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<Delta> for DeltaList {
    fn extend<I: IntoIterator<Item = Delta>>(&mut self, iter: I) {
        for delta in iter {
            self.push(delta);
        }
    }
}

/// Deltas produced while processing one message
///
/// The common case of a single change needs no list; the second change
/// promotes to a [`DeltaList`].
#[derive(Debug, Clone, Default)]
pub enum CycleDeltas {
    /// Nothing changed
    #[default]
    None,
    /// Exactly one change
    One(Delta),
    /// Two or more changes
    Many(DeltaList),
}

impl CycleDeltas {
    /// Record one more change
    #[must_use]
    pub fn push(self, delta: Delta, mode: ConflationMode) -> Self {
        match self {
            CycleDeltas::None => CycleDeltas::One(delta),
            CycleDeltas::One(first) => {
                let mut list = DeltaList::new(mode);
                list.push(first);
                list.push(delta);
                CycleDeltas::Many(list)
            }
            CycleDeltas::Many(mut list) => {
                list.push(delta);
                CycleDeltas::Many(list)
            }
        }
    }

    /// Number of changes held
    pub fn len(&self) -> usize {
        match self {
            CycleDeltas::None => 0,
            CycleDeltas::One(_) => 1,
            CycleDeltas::Many(list) => list.len(),
        }
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
