//! # quote-book
//!
//! An incremental limit order book engine that builds and maintains a
//! multi-level book from a stream of field-level quote updates.
//!
//! ## Features
//!
//! - **Arena-Backed Book** - Price levels and entries addressed by
//!   generation-tagged keys, O(log n) level updates
//! - **Delta Conflation** - Bursts of changes collapsed into net per-level or
//!   per-entry deltas
//! - **Quote Listener** - Recap/update state machine with sequence gap
//!   detection and duplicate suppression
//! - **Shared Reads** - Book published behind a `parking_lot` read/write lock
//!
//! ## Quick Start
//!
//! ```rust
//! use quote_book::listener::{BookHandler, QuoteToBookListener};
//! use quote_book::types::{fields, FieldMessage, MsgType};
//! use quote_book::{Delta, ListenerConfig, OrderBook};
//! use rust_decimal_macros::dec;
//!
//! struct Printer;
//!
//! impl BookHandler for Printer {
//!     fn on_book_delta(&mut self, book: &OrderBook, delta: &Delta) {
//!         let (side, price) = (delta.side(), delta.price());
//!         println!("{} {side:?} {price} {:+}", book.symbol(), delta.size_delta());
//!     }
//! }
//!
//! # fn main() -> quote_book::Result<()> {
//! let mut listener = QuoteToBookListener::new(ListenerConfig::new("IBM"))?;
//! listener.add_handler(Box::new(Printer));
//!
//! let recap = FieldMessage::new()
//!     .with_field(fields::BID_PRICE, dec!(100.25))
//!     .with_field(fields::BID_SIZE, 300_i64)
//!     .with_field(fields::QUOTE_COUNT, 1_u64);
//! listener.on_msg(&recap, MsgType::Recap)?;
//!
//! let quote = FieldMessage::new()
//!     .with_field(fields::BID_SIZE, 500_i64)
//!     .with_field(fields::QUOTE_COUNT, 2_u64);
//! listener.on_msg(&quote, MsgType::Quote)?;
//!
//! assert_eq!(listener.reader().best_bid(), Some((dec!(100.25), 500)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Price Representation
//!
//! Prices are `rust_decimal::Decimal`, compared by value:
//! - `10.0` and `10.00` address the same level
//! - No floating point drift between a recap and later updates
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`orderbook`] - Book, level, entry, and delta data structures
//! - [`listener`] - Quote-to-book processor and handler callbacks
//! - [`types`] - Value types and the field-access seam for decoded messages
//! - [`config`] - Book and listener switches
//! - [`error`] - Error types for the crate
//!
//! ## Performance
//!
//! This crate is designed for low-latency market data workloads:
//!
//! - `FxHashMap` for faster hashing of entry ids
//! - `parking_lot` locks (faster than std)
//! - Minimal allocations in hot paths
//! - `BTreeMap` for sorted price levels

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod listener;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::{BookConfig, ListenerConfig};
pub use error::Error;
pub use listener::{BookHandler, BookReader, QuoteToBookListener};
pub use orderbook::{Delta, DeltaList, Entry, OrderBook, PriceLevel};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
