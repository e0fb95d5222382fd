//! Callbacks invoked by the listener and the states it reports.

use serde::{Deserialize, Serialize};

use crate::orderbook::{Delta, DeltaList, OrderBook};

/// Inclusive range of quote counts missed in a sequence gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GapRange {
    /// First missing quote count
    pub begin: u32,
    /// Last missing quote count
    pub end: u32,
}

impl GapRange {
    /// Number of missing quotes
    pub fn missed(&self) -> u32 {
        self.end.saturating_sub(self.begin) + 1
    }
}

/// Processing state of a listener
///
/// ```text
/// Uninitialized -> AwaitingRecap -> Consistent <-> Inconsistent
///                                        \            /
///                                         `-> Stale <'
/// ```
///
/// A recap returns a stale or inconsistent book to `Consistent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    /// No message processed yet
    Uninitialized,
    /// Updates seen but no recap since creation or the last clear
    AwaitingRecap,
    /// Book matches the upstream sequence
    Consistent,
    /// A sequence gap is unresolved
    Inconsistent,
    /// Data quality is not OK
    Stale,
}

/// Receives book events from a [`QuoteToBookListener`](super::QuoteToBookListener)
///
/// All methods default to doing nothing, so handlers implement only what
/// they need. Handlers run while the listener holds the book's write lock:
/// they see the book as `&OrderBook` and must not go through a
/// [`BookReader`](super::BookReader) for the same book.
#[allow(unused_variables)]
pub trait BookHandler {
    /// The book was rebuilt from a recap
    fn on_book_recap(&mut self, book: &OrderBook) {}

    /// Exactly one level changed
    ///
    /// The delta's level stays resolvable for the duration of the call,
    /// even if it was removed from the book.
    fn on_book_delta(&mut self, book: &OrderBook, delta: &Delta) {}

    /// Two or more levels changed in one message
    fn on_book_complex_delta(&mut self, book: &OrderBook, deltas: &DeltaList) {}

    /// The book was cleared because its data went stale
    fn on_book_clear(&mut self, book: &OrderBook) {}

    /// Quotes were missed; the book is inconsistent until the next recap
    fn on_book_gap(&mut self, book: &OrderBook, gap: GapRange) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_missed() {
        assert_eq!(GapRange { begin: 4, end: 6 }.missed(), 3);
        assert_eq!(GapRange { begin: 9, end: 9 }.missed(), 1);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&ListenerState::AwaitingRecap).unwrap();
        assert_eq!(json, "\"awaiting_recap\"");
    }
}
