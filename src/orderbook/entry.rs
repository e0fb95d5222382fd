//! Individual order or quote contributions at a price level.

use std::fmt;
use std::sync::Arc;

use slotmap::new_key_type;

use crate::types::{Action, EntryId, Quantity, Side, TimestampMs};

new_key_type! {
    /// Key of an entry within its level's slot map
    pub struct EntryKey;
}

/// Reports whether the origin of an entry is still contributing
///
/// Only consulted when source-state filtering is enabled on the book.
pub trait SourceState: Send + Sync {
    /// Check if the source is still contributing to the book
    fn is_contributing(&self) -> bool;
}

/// One contribution to a [`PriceLevel`](super::PriceLevel)
///
/// The side is inherited from the owning level. Visibility is cached and only
/// changes when the owning level refreshes it, so aggregates stay in step with
/// what the entries report.
#[derive(Clone)]
pub struct Entry {
    id: EntryId,
    size: Quantity,
    side: Side,
    time: TimestampMs,
    action: Action,
    visible: bool,
    source: Option<Arc<dyn SourceState>>,
}

impl Entry {
    /// Create a visible entry with action `Add`
    pub fn new(id: impl Into<EntryId>, size: Quantity, side: Side, time: TimestampMs) -> Self {
        Self {
            id: id.into(),
            size,
            side,
            time,
            action: Action::Add,
            visible: true,
            source: None,
        }
    }

    /// Attach a source-state handle
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SourceState>) -> Self {
        self.source = Some(source);
        self
    }

    /// Get the entry id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the size
    pub fn size(&self) -> Quantity {
        self.size
    }

    /// Get the side
    pub fn side(&self) -> Side {
        self.side
    }

    /// Get the last update time
    pub fn time(&self) -> TimestampMs {
        self.time
    }

    /// Get the last applied action
    pub fn action(&self) -> Action {
        self.action
    }

    /// Check if the entry counts towards its level's aggregates
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Get the source-state handle, if any
    pub fn source(&self) -> Option<&Arc<dyn SourceState>> {
        self.source.as_ref()
    }

    pub(crate) fn set_size(&mut self, size: Quantity) {
        self.size = size;
    }

    pub(crate) fn set_time(&mut self, time: TimestampMs) {
        self.time = time;
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub(crate) fn set_side(&mut self, side: Side) {
        self.side = side;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_source(&mut self, source: Option<Arc<dyn SourceState>>) {
        self.source = source;
    }

    /// Visibility as reported by the source right now
    pub(crate) fn source_visibility(&self, check_source_state: bool) -> bool {
        if !check_source_state {
            return true;
        }
        self.source
            .as_ref()
            .map_or(true, |source| source.is_contributing())
    }

    /// Re-read the source and cache the result; returns whether it changed
    pub(crate) fn refresh_visibility(&mut self, check_source_state: bool) -> bool {
        let visible = self.source_visibility(check_source_state);
        let changed = visible != self.visible;
        self.visible = visible;
        changed
    }

    /// Compare the observable state of two entries
    pub fn same_state(&self, other: &Entry) -> bool {
        self.id == other.id
            && self.size == other.size
            && self.side == other.side
            && self.visible == other.visible
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("side", &self.side)
            .field("time", &self.time)
            .field("action", &self.action)
            .field("visible", &self.visible)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
