//! Incremental limit order book.
//!
//! This module provides the book data structures and change records:
//!
//! - Fast updates (O(log n) for price level operations)
//! - Stable generation-tagged keys for levels and entries
//! - Deferred destruction so removed objects stay readable for one cycle
//! - Conflation of change bursts into net per-level or per-entry deltas
//!
//! # Example
//!
//! ```rust
//! use quote_book::orderbook::OrderBook;
//! use quote_book::types::{Action, Side};
//! use rust_decimal_macros::dec;
//!
//! let mut book = OrderBook::new("IBM");
//!
//! book.add_entry(dec!(100.25), Side::Bid, "MM1", 300, 0).unwrap();
//! book.add_entry(dec!(100.25), Side::Bid, "MM2", 200, 0).unwrap();
//! let delta = book.delete_entry(dec!(100.25), Side::Bid, "MM1", 1).unwrap().unwrap();
//!
//! assert_eq!(delta.level_action(), Action::Update);
//! assert_eq!(book.best_bid().unwrap().size(), 200);
//!
//! book.cleanup_detached();
//! ```

pub mod book;
pub mod delta;
pub mod entry;
pub mod level;

pub use book::OrderBook;
pub use delta::{ConflationMode, CycleDeltas, Delta, DeltaList, ModifiedSides};
pub use entry::{Entry, EntryKey, SourceState};
pub use level::{LevelKey, PriceLevel};
