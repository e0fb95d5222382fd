//! Price levels and their entry collections.
//!
//! A [`PriceLevel`] owns its entries in a slot map and keeps two indexes
//! over them: an id map for lookup and an ordered key list for iteration.
//! Aggregates are maintained incrementally on every entry operation:
//!
//! - `size` is the sum of visible entry sizes
//! - `num_entries` is the number of visible entries
//! - `num_entries_total` is the number of attached entries
//!
//! Levels used in top-of-book mode carry no entries; their size is set
//! directly with [`PriceLevel::set_size`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use tracing::trace;

use super::entry::{Entry, EntryKey, SourceState};
use crate::config::BookConfig;
use crate::error::Error;
use crate::types::{Action, EntryId, OrderType, Price, Quantity, Side, TimestampMs};
use crate::Result;

new_key_type! {
    /// Key of a level within its book's slot map
    pub struct LevelKey;
}

/// Opaque caller data attached to a level
///
/// Cloning a level never clones its closure: the copy starts with an empty
/// slot.
#[derive(Default)]
pub struct ClosureSlot(Option<Box<dyn Any + Send + Sync>>);

impl ClosureSlot {
    fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|value| value.downcast_ref())
    }

    fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl Clone for ClosureSlot {
    fn clone(&self) -> Self {
        Self(None)
    }
}

impl fmt::Debug for ClosureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_set() { "Some(..)" } else { "None" })
    }
}

/// One price point on one side of the book
#[derive(Debug)]
pub struct PriceLevel {
    price: Price,
    side: Side,
    size: Quantity,
    size_change: Quantity,
    num_entries: usize,
    action: Action,
    order_type: OrderType,
    time: TimestampMs,
    closure: ClosureSlot,
    config: BookConfig,

    /// Entry storage, including detached entries awaiting cleanup
    entries: SlotMap<EntryKey, Entry>,
    /// Attached entries in iteration order
    order: Vec<EntryKey>,
    /// Attached entries by id
    index: FxHashMap<EntryId, EntryKey>,
    detached: Vec<EntryKey>,
}

impl PriceLevel {
    /// Create an empty level with default switches
    pub fn new(price: Price, side: Side) -> Self {
        Self::with_config(price, side, BookConfig::default())
    }

    /// Create an empty level with the given switches
    pub fn with_config(price: Price, side: Side, config: BookConfig) -> Self {
        Self {
            price,
            side,
            size: 0,
            size_change: 0,
            num_entries: 0,
            action: Action::Add,
            order_type: OrderType::Regular,
            time: 0,
            closure: ClosureSlot::default(),
            config,
            entries: SlotMap::with_key(),
            order: Vec::new(),
            index: FxHashMap::default(),
            detached: Vec::new(),
        }
    }

    /// Get the price
    pub fn price(&self) -> Price {
        self.price
    }

    /// Get the side
    pub fn side(&self) -> Side {
        self.side
    }

    /// Get the aggregate visible size
    pub fn size(&self) -> Quantity {
        self.size
    }

    /// Get the size change applied by the last operation
    pub fn size_change(&self) -> Quantity {
        self.size_change
    }

    /// Get the number of visible entries
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Get the number of attached entries, visible or not
    pub fn num_entries_total(&self) -> usize {
        self.order.len()
    }

    /// Check if the level has no attached entries
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get the action tag
    pub fn action(&self) -> Action {
        self.action
    }

    /// Get the order type
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Get the last update time
    pub fn time(&self) -> TimestampMs {
        self.time
    }

    /// Get the switches this level was created with
    pub fn config(&self) -> BookConfig {
        self.config
    }

    /// Set the aggregate size directly (top-of-book mode)
    pub fn set_size(&mut self, size: Quantity) {
        self.size = size;
    }

    /// Set the size change
    pub fn set_size_change(&mut self, change: Quantity) {
        self.size_change = change;
    }

    /// Set the action tag
    pub fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    /// Set the order type
    pub fn set_order_type(&mut self, order_type: OrderType) {
        self.order_type = order_type;
    }

    /// Set the last update time
    pub fn set_time(&mut self, time: TimestampMs) {
        self.time = time;
    }

    /// Attach caller data to the level, replacing any previous value
    pub fn set_closure<T: Any + Send + Sync>(&mut self, value: T) {
        self.closure = ClosureSlot(Some(Box::new(value)));
    }

    /// Get the caller data if it is of type `T`
    pub fn closure<T: Any>(&self) -> Option<&T> {
        self.closure.get()
    }

    /// Remove the caller data
    pub fn clear_closure(&mut self) {
        self.closure = ClosureSlot::default();
    }

    /// Copy the level-wide details of `other` without touching entries
    pub fn set_details(&mut self, other: &PriceLevel) {
        self.price = other.price;
        self.side = other.side;
        self.size = other.size;
        self.size_change = other.size_change;
        self.num_entries = other.num_entries;
        self.action = other.action;
        self.order_type = other.order_type;
        self.time = other.time;
    }

    /// Iterate attached entries in order
    ///
    /// Entries are in arrival order, or in timestamp order when the level
    /// sorts entries by time.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.order.iter().filter_map(|&key| self.entries.get(key))
    }

    /// Keys of the attached entries, in iteration order
    pub fn entry_keys(&self) -> &[EntryKey] {
        &self.order
    }

    /// Get the entry at a position in iteration order
    pub fn entry_at(&self, position: usize) -> Option<&Entry> {
        self.order
            .get(position)
            .and_then(|&key| self.entries.get(key))
    }

    /// Find an attached entry by id
    pub fn find_entry(&self, id: &str) -> Option<&Entry> {
        self.index.get(id).and_then(|&key| self.entries.get(key))
    }

    /// Find the key of an attached entry by id
    pub fn entry_key(&self, id: &str) -> Option<EntryKey> {
        self.index.get(id).copied()
    }

    /// Resolve an entry key
    ///
    /// Detached entries still resolve until [`cleanup_detached`](Self::cleanup_detached).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry has been destroyed.
    pub fn entry(&self, key: EntryKey) -> Result<&Entry> {
        self.entries.get(key).ok_or(Error::StaleReference)
    }

    /// Find an entry by id or create an empty one
    ///
    /// Returns the key and whether the entry was created.
    pub fn find_or_create_entry(&mut self, id: &str, time: TimestampMs) -> (EntryKey, bool) {
        match self.index.get(id).copied() {
            Some(key) => (key, false),
            None => (self.insert(Entry::new(id, 0, self.side, time)), true),
        }
    }

    /// Add an entry to the level
    ///
    /// Returns `Ok(None)` if an entry with the same id already exists and
    /// checking is lenient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] for an existing id in strict mode.
    pub fn add_entry(&mut self, entry: Entry) -> Result<Option<EntryKey>> {
        if self.index.contains_key(entry.id()) {
            if self.config.strict_checking() {
                return Err(Error::DuplicateEntry {
                    id: entry.id().to_string(),
                    price: self.price,
                });
            }
            trace!(id = entry.id(), price = %self.price, "ignoring duplicate entry add");
            return Ok(None);
        }
        Ok(Some(self.insert(entry)))
    }

    fn insert(&mut self, mut entry: Entry) -> EntryKey {
        entry.set_side(self.side);
        entry.set_action(Action::Add);
        let visible = entry.source_visibility(self.config.check_source_state());
        entry.set_visible(visible);

        let id = entry.id().to_string();
        let size = entry.size();
        let time = entry.time();
        let key = self.entries.insert(entry);
        self.index.insert(id, key);
        self.place(key, time);

        self.size_change = if visible { size } else { 0 };
        if visible {
            self.size += size;
            self.num_entries += 1;
        }
        key
    }

    fn place(&mut self, key: EntryKey, time: TimestampMs) {
        if self.config.sort_entries_by_time() {
            let entries = &self.entries;
            let pos = self
                .order
                .partition_point(|&k| entries.get(k).map_or(true, |e| e.time() <= time));
            self.order.insert(pos, key);
        } else {
            self.order.push(key);
        }
    }

    fn is_attached(&self, key: EntryKey) -> bool {
        self.entries
            .get(key)
            .map_or(false, |entry| self.index.get(entry.id()) == Some(&key))
    }

    fn not_found(&self, id: &str) -> Result<()> {
        if self.config.strict_checking() {
            return Err(Error::EntryNotFound {
                id: id.to_string(),
                price: self.price,
            });
        }
        trace!(id, price = %self.price, "ignoring operation on missing entry");
        Ok(())
    }

    /// Overwrite the size and time of an entry, located by id
    ///
    /// Returns the resulting change in level size, or `Ok(None)` if the id is
    /// unknown and checking is lenient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for an unknown id in strict mode.
    pub fn update_entry(
        &mut self,
        id: &str,
        size: Quantity,
        time: TimestampMs,
    ) -> Result<Option<Quantity>> {
        match self.index.get(id).copied() {
            Some(key) => self.update_entry_by_key(key, size, time).map(Some),
            None => self.not_found(id).map(|()| None),
        }
    }

    /// Overwrite the size and time of an entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry is not attached.
    pub fn update_entry_by_key(
        &mut self,
        key: EntryKey,
        size: Quantity,
        time: TimestampMs,
    ) -> Result<Quantity> {
        if !self.is_attached(key) {
            return Err(Error::StaleReference);
        }
        let entry = self.entries.get_mut(key).ok_or(Error::StaleReference)?;
        let old = entry.size();
        entry.set_size(size);
        entry.set_time(time);
        entry.set_action(Action::Update);
        let change = if entry.is_visible() { size - old } else { 0 };

        self.size += change;
        self.size_change = change;
        if self.config.sort_entries_by_time() {
            self.order.retain(|&k| k != key);
            self.place(key, time);
        }
        Ok(change)
    }

    /// Remove and destroy an entry, located by id
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for an unknown id in strict mode.
    pub fn remove_entry(&mut self, id: &str) -> Result<Option<Entry>> {
        match self.index.get(id).copied() {
            Some(key) => self.remove_entry_by_key(key).map(Some),
            None => self.not_found(id).map(|()| None),
        }
    }

    /// Remove and destroy an entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry is not attached.
    pub fn remove_entry_by_key(&mut self, key: EntryKey) -> Result<Entry> {
        self.unlink(key)?;
        self.entries.remove(key).ok_or(Error::StaleReference)
    }

    /// Unlink an entry but keep it resolvable until cleanup
    ///
    /// Returns the resulting change in level size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry is not attached.
    pub fn detach_entry(&mut self, key: EntryKey) -> Result<Quantity> {
        let change = self.unlink(key)?;
        self.detached.push(key);
        Ok(change)
    }

    fn unlink(&mut self, key: EntryKey) -> Result<Quantity> {
        if !self.is_attached(key) {
            return Err(Error::StaleReference);
        }
        let entry = self.entries.get_mut(key).ok_or(Error::StaleReference)?;
        entry.set_action(Action::Delete);
        let visible = entry.is_visible();
        let size = entry.size();
        self.index.remove(entry.id());
        self.order.retain(|&k| k != key);

        let change = if visible { -size } else { 0 };
        if visible {
            self.num_entries -= 1;
        }
        self.size += change;
        self.size_change = change;
        Ok(change)
    }

    /// Destroy entries detached since the last call
    pub fn cleanup_detached(&mut self) {
        for key in self.detached.drain(..) {
            self.entries.remove(key);
        }
    }

    /// Set the visibility of an entry, adjusting aggregates on a transition
    ///
    /// Returns whether the visibility changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry is not attached.
    pub fn set_entry_visible(&mut self, key: EntryKey, visible: bool) -> Result<bool> {
        if !self.is_attached(key) {
            return Err(Error::StaleReference);
        }
        let entry = self.entries.get_mut(key).ok_or(Error::StaleReference)?;
        if entry.is_visible() == visible {
            return Ok(false);
        }
        entry.set_visible(visible);
        let size = entry.size();
        if visible {
            self.size += size;
            self.num_entries += 1;
            self.size_change = size;
        } else {
            self.size -= size;
            self.num_entries -= 1;
            self.size_change = -size;
        }
        Ok(true)
    }

    /// Replace the source-state handle of an entry and re-read its visibility
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] if the entry is not attached.
    pub fn set_entry_source(
        &mut self,
        key: EntryKey,
        source: Option<Arc<dyn SourceState>>,
    ) -> Result<bool> {
        if !self.is_attached(key) {
            return Err(Error::StaleReference);
        }
        let entry = self.entries.get_mut(key).ok_or(Error::StaleReference)?;
        entry.set_source(source);
        let visible = entry.source_visibility(self.config.check_source_state());
        self.set_entry_visible(key, visible)
    }

    /// Re-read entry visibility and recompute the aggregates
    ///
    /// Returns whether the size or visible count changed.
    pub fn reevaluate(&mut self) -> bool {
        let check = self.config.check_source_state();
        let mut size = 0;
        let mut count = 0;
        for &key in &self.order {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.refresh_visibility(check);
                if entry.is_visible() {
                    size += entry.size();
                    count += 1;
                }
            }
        }

        let changed = size != self.size || count != self.num_entries;
        self.size_change = size - self.size;
        self.size = size;
        self.num_entries = count;
        changed
    }

    /// Zero the level and tag it and every entry `Delete`
    ///
    /// Entries stay attached but are hidden, so they no longer count towards
    /// the visible aggregates.
    pub fn mark_all_deleted(&mut self) {
        self.size_change = -self.size;
        self.size = 0;
        self.num_entries = 0;
        self.action = Action::Delete;
        for &key in &self.order {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.set_size(0);
                entry.set_action(Action::Delete);
                entry.set_visible(false);
            }
        }
    }

    /// Make this level the entry-level difference between two snapshots of
    /// the same price
    ///
    /// Entries whose size changed are tagged `Update`, entries only in `rhs`
    /// are tagged `Add`, and entries only in `lhs` are kept with size zero and
    /// tagged `Delete`. Unchanged entries are omitted. The level aggregates are
    /// taken from `rhs` and the size change is `rhs.size - lhs.size`, so a
    /// difference level does not satisfy the entry-sum aggregate rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] if the two levels differ in price or side.
    pub fn set_as_difference(&mut self, lhs: &PriceLevel, rhs: &PriceLevel) -> Result<()> {
        if lhs.price != rhs.price || lhs.side != rhs.side {
            return Err(Error::Mismatch(format!(
                "cannot diff {:?} {} against {:?} {}",
                lhs.side, lhs.price, rhs.side, rhs.price
            )));
        }
        self.clear_entries();

        for entry in rhs.entries() {
            let action = match lhs.find_entry(entry.id()) {
                Some(old) if old.size() == entry.size() => continue,
                Some(_) => Action::Update,
                None => Action::Add,
            };
            let mut diff = entry.clone();
            diff.set_action(action);
            self.push_raw(diff);
        }
        for entry in lhs.entries() {
            if rhs.find_entry(entry.id()).is_none() {
                let mut gone = entry.clone();
                gone.set_size(0);
                gone.set_action(Action::Delete);
                self.push_raw(gone);
            }
        }

        self.set_details(rhs);
        self.size_change = rhs.size - lhs.size;
        self.action = if lhs.is_empty() {
            Action::Add
        } else if rhs.is_empty() {
            Action::Delete
        } else {
            Action::Update
        };
        Ok(())
    }

    /// Attach an entry as-is, leaving aggregates untouched
    fn push_raw(&mut self, entry: Entry) {
        let id = entry.id().to_string();
        let key = self.entries.insert(entry);
        self.index.insert(id, key);
        self.order.push(key);
    }

    /// Destroy every entry and zero the aggregates
    pub fn clear_entries(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.index.clear();
        self.detached.clear();
        self.size = 0;
        self.num_entries = 0;
    }

    /// Check that two levels hold the same state
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] describing the first difference found.
    pub fn assert_equal(&self, other: &PriceLevel) -> Result<()> {
        let mismatch = |what: &str| {
            Err(Error::Mismatch(format!(
                "{what} differs at {:?} {}",
                self.side, self.price
            )))
        };
        if self.price != other.price || self.side != other.side {
            return mismatch("price");
        }
        if self.size != other.size {
            return mismatch("size");
        }
        if self.num_entries != other.num_entries
            || self.num_entries_total() != other.num_entries_total()
        {
            return mismatch("entry count");
        }
        if !self
            .entries()
            .zip(other.entries())
            .all(|(a, b)| a.same_state(b))
        {
            return mismatch("entry");
        }
        Ok(())
    }
}

impl Clone for PriceLevel {
    /// Snapshot copy: detached entries and the closure are not copied.
    fn clone(&self) -> Self {
        let mut entries = self.entries.clone();
        for &key in &self.detached {
            entries.remove(key);
        }
        Self {
            price: self.price,
            side: self.side,
            size: self.size,
            size_change: self.size_change,
            num_entries: self.num_entries,
            action: self.action,
            order_type: self.order_type,
            time: self.time,
            closure: ClosureSlot::default(),
            config: self.config,
            entries,
            order: self.order.clone(),
            index: self.index.clone(),
            detached: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(AtomicBool);

    impl SourceState for Flag {
        fn is_contributing(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn level() -> PriceLevel {
        PriceLevel::new(dec!(10.00), Side::Bid)
    }

    fn strict_level() -> PriceLevel {
        PriceLevel::with_config(
            dec!(10.00),
            Side::Bid,
            BookConfig::new().with_strict_checking(true),
        )
    }

    #[test]
    fn test_add_update_remove_aggregates() {
        let mut pl = level();
        pl.add_entry(Entry::new("A", 100, Side::Bid, 1)).unwrap();
        pl.add_entry(Entry::new("B", 50, Side::Bid, 2)).unwrap();
        assert_eq!(pl.size(), 150);
        assert_eq!(pl.num_entries(), 2);

        assert_eq!(pl.update_entry("A", 80, 3).unwrap(), Some(-20));
        assert_eq!(pl.size(), 130);
        assert_eq!(pl.find_entry("A").unwrap().action(), Action::Update);

        let removed = pl.remove_entry("B").unwrap().unwrap();
        assert_eq!(removed.size(), 50);
        assert_eq!(pl.size(), 80);
        assert_eq!(pl.num_entries(), 1);
        assert_eq!(pl.num_entries_total(), 1);
    }

    #[test]
    fn test_entry_side_inherited() {
        let mut pl = PriceLevel::new(dec!(10.05), Side::Ask);
        let key = pl.add_entry(Entry::new("A", 1, Side::Bid, 0)).unwrap().unwrap();
        assert_eq!(pl.entry(key).unwrap().side(), Side::Ask);
    }

    #[test]
    fn test_lenient_ignores_missing_and_duplicate() {
        let mut pl = level();
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();

        assert_eq!(pl.update_entry("X", 5, 0).unwrap(), None);
        assert!(pl.remove_entry("X").unwrap().is_none());
        assert!(pl.add_entry(Entry::new("A", 7, Side::Bid, 0)).unwrap().is_none());
        assert_eq!(pl.size(), 100);
    }

    #[test]
    fn test_strict_raises_consistency_errors() {
        let mut pl = strict_level();
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();

        assert!(matches!(
            pl.update_entry("X", 5, 0),
            Err(Error::EntryNotFound { .. })
        ));
        assert!(matches!(
            pl.remove_entry("X"),
            Err(Error::EntryNotFound { .. })
        ));
        assert!(matches!(
            pl.add_entry(Entry::new("A", 7, Side::Bid, 0)),
            Err(Error::DuplicateEntry { .. })
        ));
        // Nothing was partially applied.
        assert_eq!(pl.size(), 100);
        assert_eq!(pl.num_entries_total(), 1);
    }

    #[test]
    fn test_detach_keeps_entry_until_cleanup() {
        let mut pl = level();
        let key = pl.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap().unwrap();

        assert_eq!(pl.detach_entry(key).unwrap(), -100);
        assert!(pl.is_empty());
        assert_eq!(pl.entry(key).unwrap().action(), Action::Delete);
        assert!(matches!(pl.detach_entry(key), Err(Error::StaleReference)));

        pl.cleanup_detached();
        assert!(matches!(pl.entry(key), Err(Error::StaleReference)));
    }

    #[test]
    fn test_sort_by_time() {
        let mut pl = PriceLevel::with_config(
            dec!(10),
            Side::Ask,
            BookConfig::new().with_sort_entries_by_time(true),
        );
        pl.add_entry(Entry::new("late", 1, Side::Ask, 30)).unwrap();
        pl.add_entry(Entry::new("early", 1, Side::Ask, 10)).unwrap();
        pl.add_entry(Entry::new("mid", 1, Side::Ask, 20)).unwrap();

        let ids: Vec<_> = pl.entries().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, ["early", "mid", "late"]);

        pl.update_entry("early", 1, 40).unwrap();
        assert_eq!(pl.entry_at(2).unwrap().id(), "early");
    }

    #[test]
    fn test_arrival_order_default() {
        let mut pl = level();
        pl.add_entry(Entry::new("late", 1, Side::Bid, 30)).unwrap();
        pl.add_entry(Entry::new("early", 1, Side::Bid, 10)).unwrap();
        assert_eq!(pl.entry_at(0).unwrap().id(), "late");
    }

    #[test]
    fn test_visibility_adjusts_aggregates() {
        let flag = Arc::new(Flag(AtomicBool::new(true)));
        let mut pl = PriceLevel::with_config(
            dec!(10),
            Side::Bid,
            BookConfig::new().with_check_source_state(true),
        );
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0).with_source(flag.clone()))
            .unwrap();
        pl.add_entry(Entry::new("B", 50, Side::Bid, 0)).unwrap();
        assert_eq!(pl.size(), 150);

        flag.0.store(false, Ordering::SeqCst);
        assert!(pl.reevaluate());
        assert_eq!(pl.size(), 50);
        assert_eq!(pl.num_entries(), 1);
        assert_eq!(pl.num_entries_total(), 2);
        assert!(!pl.reevaluate());

        let b = pl.entry_key("B").unwrap();
        assert!(pl.set_entry_visible(b, false).unwrap());
        assert_eq!(pl.size(), 0);
        assert!(!pl.set_entry_visible(b, false).unwrap());
    }

    #[test]
    fn test_invisible_entry_added() {
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let mut pl = PriceLevel::with_config(
            dec!(10),
            Side::Bid,
            BookConfig::new().with_check_source_state(true),
        );
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0).with_source(flag))
            .unwrap();
        assert_eq!(pl.size(), 0);
        assert_eq!(pl.num_entries(), 0);
        assert_eq!(pl.num_entries_total(), 1);

        // Updating an invisible entry leaves the aggregates alone.
        assert_eq!(pl.update_entry("A", 300, 1).unwrap(), Some(0));
        assert_eq!(pl.size(), 0);
    }

    #[test]
    fn test_mark_all_deleted() {
        let mut pl = level();
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();
        pl.add_entry(Entry::new("B", 50, Side::Bid, 0)).unwrap();
        pl.mark_all_deleted();

        assert_eq!(pl.size(), 0);
        assert_eq!(pl.size_change(), -150);
        assert_eq!(pl.num_entries(), 0);
        assert_eq!(pl.action(), Action::Delete);
        assert!(pl
            .entries()
            .all(|e| e.size() == 0 && e.action() == Action::Delete && !e.is_visible()));
    }

    #[test]
    fn test_remove_after_mark_all_deleted() {
        let mut pl = level();
        pl.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();
        pl.add_entry(Entry::new("B", 50, Side::Bid, 0)).unwrap();
        pl.mark_all_deleted();
        pl.add_entry(Entry::new("C", 20, Side::Bid, 0)).unwrap();
        assert_eq!(pl.num_entries(), 1);
        assert_eq!(pl.size(), 20);

        assert_eq!(pl.remove_entry("A").unwrap().unwrap().size(), 0);
        assert_eq!(pl.remove_entry("B").unwrap().unwrap().size(), 0);
        assert_eq!(pl.num_entries(), 1);
        pl.remove_entry("C").unwrap();
        assert_eq!(pl.num_entries(), 0);
        assert_eq!(pl.size(), 0);
        assert!(pl.is_empty());
    }

    #[test]
    fn test_set_as_difference() {
        let mut lhs = level();
        lhs.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();
        lhs.add_entry(Entry::new("B", 50, Side::Bid, 0)).unwrap();
        lhs.add_entry(Entry::new("C", 10, Side::Bid, 0)).unwrap();

        let mut rhs = level();
        rhs.add_entry(Entry::new("A", 100, Side::Bid, 0)).unwrap();
        rhs.add_entry(Entry::new("B", 70, Side::Bid, 0)).unwrap();
        rhs.add_entry(Entry::new("D", 5, Side::Bid, 0)).unwrap();

        let mut diff = level();
        diff.set_as_difference(&lhs, &rhs).unwrap();

        assert!(diff.find_entry("A").is_none());
        assert_eq!(diff.find_entry("B").unwrap().action(), Action::Update);
        assert_eq!(diff.find_entry("D").unwrap().action(), Action::Add);
        let c = diff.find_entry("C").unwrap();
        assert_eq!((c.size(), c.action()), (0, Action::Delete));
        assert_eq!(diff.size(), 175);
        assert_eq!(diff.size_change(), 15);
        assert_eq!(diff.action(), Action::Update);
    }

    #[test]
    fn test_set_as_difference_price_mismatch() {
        let lhs = level();
        let rhs = PriceLevel::new(dec!(10.01), Side::Bid);
        assert!(matches!(
            level().set_as_difference(&lhs, &rhs),
            Err(Error::Mismatch(_))
        ));
    }

    #[test]
    fn test_clone_drops_closure_and_detached() {
        let mut pl = level();
        pl.set_closure(42u32);
        let a = pl.add_entry(Entry::new("A", 1, Side::Bid, 0)).unwrap().unwrap();
        pl.add_entry(Entry::new("B", 2, Side::Bid, 0)).unwrap();
        pl.detach_entry(a).unwrap();

        let copy = pl.clone();
        assert_eq!(pl.closure::<u32>(), Some(&42));
        assert_eq!(copy.closure::<u32>(), None);
        assert!(matches!(copy.entry(a), Err(Error::StaleReference)));
        copy.assert_equal(&pl).unwrap();
    }

    #[test]
    fn test_assert_equal_reports_size() {
        let mut a = level();
        let mut b = level();
        a.add_entry(Entry::new("A", 1, Side::Bid, 0)).unwrap();
        b.add_entry(Entry::new("A", 2, Side::Bid, 0)).unwrap();
        assert!(matches!(a.assert_equal(&b), Err(Error::Mismatch(m)) if m.contains("size")));
    }
}
