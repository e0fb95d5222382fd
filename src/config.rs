//! Configuration for order books and quote listeners.
//!
//! This module provides [`BookConfig`] for the per-book switches and
//! [`ListenerConfig`] for the listener state machine. Both follow the builder
//! pattern and can be deserialized with serde.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::orderbook::delta::ConflationMode;

/// Switches that change how an [`OrderBook`](crate::orderbook::OrderBook)
/// and its price levels behave
///
/// # Example
///
/// ```rust
/// use quote_book::config::BookConfig;
///
/// let config = BookConfig::new()
///     .with_strict_checking(true)
///     .with_check_source_state(true);
/// assert!(config.strict_checking());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Raise data-consistency errors instead of ignoring bad entry operations
    strict_checking: bool,

    /// Exclude entries whose source has stopped contributing from aggregates
    check_source_state: bool,

    /// Record a delta for every entry-level book mutation
    generate_deltas: bool,

    /// Iterate entries by timestamp rather than arrival order
    sort_entries_by_time: bool,
}

impl BookConfig {
    /// Create a configuration with every switch off
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable strict checking (intended for validation and test builds)
    #[must_use]
    pub fn with_strict_checking(mut self, strict: bool) -> Self {
        self.strict_checking = strict;
        self
    }

    /// Enable source-state filtering of entry visibility
    #[must_use]
    pub fn with_check_source_state(mut self, check: bool) -> Self {
        self.check_source_state = check;
        self
    }

    /// Enable delta generation for entry-level book operations
    #[must_use]
    pub fn with_generate_deltas(mut self, generate: bool) -> Self {
        self.generate_deltas = generate;
        self
    }

    /// Sort entries by timestamp at the start of each iteration
    #[must_use]
    pub fn with_sort_entries_by_time(mut self, sort: bool) -> Self {
        self.sort_entries_by_time = sort;
        self
    }

    /// Get the strict checking switch
    pub fn strict_checking(&self) -> bool {
        self.strict_checking
    }

    /// Get the source-state filtering switch
    pub fn check_source_state(&self) -> bool {
        self.check_source_state
    }

    /// Get the delta generation switch
    pub fn generate_deltas(&self) -> bool {
        self.generate_deltas
    }

    /// Get the sort-by-time switch
    pub fn sort_entries_by_time(&self) -> bool {
        self.sort_entries_by_time
    }
}

/// Configuration for a [`QuoteToBookListener`](crate::listener::QuoteToBookListener)
///
/// # Example
///
/// ```rust
/// use quote_book::config::ListenerConfig;
///
/// let config = ListenerConfig::new("IBM")
///     .with_resolve_possibly_duplicate(true)
///     .with_quote_size_multiplier(100);
/// assert_eq!(config.symbol(), "IBM");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Instrument symbol (may be learned from the first message when empty)
    symbol: String,

    /// Book switches
    book: BookConfig,

    /// Keep applying update messages while quality is not OK
    update_stale_book: bool,

    /// Clear the book when quality degrades
    clear_stale_book: bool,

    /// Dispatch deltas while a sequence gap is unresolved
    update_inconsistent_book: bool,

    /// Try to promote possibly-duplicate messages to definitely-duplicate
    resolve_possibly_duplicate: bool,

    /// Multiplier applied to decoded bid/ask sizes
    quote_size_multiplier: i64,

    /// Conflate deltas held in the complex delta list
    conflate_deltas: bool,

    /// Conflate per entry rather than per level
    process_entries: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            book: BookConfig::default(),
            update_stale_book: false,
            clear_stale_book: true,
            update_inconsistent_book: false,
            resolve_possibly_duplicate: false,
            quote_size_multiplier: 1,
            conflate_deltas: false,
            process_entries: false,
        }
    }
}

impl ListenerConfig {
    /// Create a configuration for the given symbol with default switches
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Set the book switches
    #[must_use]
    pub fn with_book(mut self, book: BookConfig) -> Self {
        self.book = book;
        self
    }

    /// Keep applying update messages while quality is not OK
    #[must_use]
    pub fn with_update_stale_book(mut self, update: bool) -> Self {
        self.update_stale_book = update;
        self
    }

    /// Clear the book (and notify clear handlers) when quality degrades
    #[must_use]
    pub fn with_clear_stale_book(mut self, clear: bool) -> Self {
        self.clear_stale_book = clear;
        self
    }

    /// Dispatch deltas even while the book is inconsistent
    #[must_use]
    pub fn with_update_inconsistent_book(mut self, update: bool) -> Self {
        self.update_inconsistent_book = update;
        self
    }

    /// Resolve possibly-duplicate messages using sequence number and event time
    #[must_use]
    pub fn with_resolve_possibly_duplicate(mut self, resolve: bool) -> Self {
        self.resolve_possibly_duplicate = resolve;
        self
    }

    /// Set the multiplier applied to decoded sizes (lot size, usually 1 or 100)
    #[must_use]
    pub fn with_quote_size_multiplier(mut self, multiplier: i64) -> Self {
        self.quote_size_multiplier = multiplier;
        self
    }

    /// Set the delta list conflation flags
    #[must_use]
    pub fn with_conflation(mut self, conflate: bool, process_entries: bool) -> Self {
        self.conflate_deltas = conflate;
        self.process_entries = process_entries;
        self
    }

    /// Check the configuration for values that cannot work
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the size multiplier is not positive.
    pub fn validate(&self) -> Result<(), Error> {
        if self.quote_size_multiplier <= 0 {
            return Err(Error::Config(format!(
                "quote size multiplier must be positive, got {}",
                self.quote_size_multiplier
            )));
        }
        Ok(())
    }

    /// Get the symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the book switches
    pub fn book(&self) -> BookConfig {
        self.book
    }

    /// Get the update-stale-book switch
    pub fn update_stale_book(&self) -> bool {
        self.update_stale_book
    }

    /// Get the clear-stale-book switch
    pub fn clear_stale_book(&self) -> bool {
        self.clear_stale_book
    }

    /// Get the update-inconsistent-book switch
    pub fn update_inconsistent_book(&self) -> bool {
        self.update_inconsistent_book
    }

    /// Get the resolve-possibly-duplicate switch
    pub fn resolve_possibly_duplicate(&self) -> bool {
        self.resolve_possibly_duplicate
    }

    /// Get the size multiplier
    pub fn quote_size_multiplier(&self) -> i64 {
        self.quote_size_multiplier
    }

    /// Get the conflation mode selected by the two conflation flags
    pub fn conflation_mode(&self) -> ConflationMode {
        ConflationMode::from_flags(self.conflate_deltas, self.process_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::new("IBM");
        assert_eq!(config.symbol(), "IBM");
        assert!(config.clear_stale_book());
        assert!(!config.update_stale_book());
        assert!(!config.update_inconsistent_book());
        assert!(!config.resolve_possibly_duplicate());
        assert_eq!(config.quote_size_multiplier(), 1);
        assert_eq!(config.conflation_mode(), ConflationMode::Unconflated);
        assert_eq!(config.book(), BookConfig::default());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ListenerConfig::new("IBM")
            .with_book(BookConfig::new().with_strict_checking(true))
            .with_update_inconsistent_book(true)
            .with_clear_stale_book(false)
            .with_conflation(true, true);

        assert!(config.book().strict_checking());
        assert!(config.update_inconsistent_book());
        assert!(!config.clear_stale_book());
        assert_eq!(config.conflation_mode(), ConflationMode::PerEntry);
    }

    #[test]
    fn test_validate_rejects_zero_multiplier() {
        let config = ListenerConfig::new("IBM").with_quote_size_multiplier(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ListenerConfig =
            serde_json::from_str(r#"{"symbol":"MSFT","update_stale_book":true}"#).unwrap();
        assert_eq!(config.symbol(), "MSFT");
        assert!(config.update_stale_book());
        assert!(config.clear_stale_book());
    }
}
