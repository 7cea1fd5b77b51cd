//! A name → [`Book`] registry sharing one [`Store`].
//!
//! A single database shared across every book, following the same pattern
//! matching engines typically use; this crate makes that registry an
//! explicit type rather than a package-level map, so no ambient singleton
//! state sneaks in.

use crate::book::{Book, BookConfig, BookError};
use crate::quote::{InvalidQuote, Quote, Side, Trade};
use crate::store::{Store, StoreError};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::fmt;

/// Errors surfaced by [`Engine`] operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// A [`Book`] operation failed.
    Book(BookError),
    /// The inbound quote map failed to parse.
    InvalidQuote(InvalidQuote),
    /// The backing store failed outside of a book operation (e.g. `commit`).
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Book(e) => write!(f, "{e}"),
            EngineError::InvalidQuote(e) => write!(f, "{e}"),
            EngineError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<BookError> for EngineError {
    fn from(e: BookError) -> Self {
        EngineError::Book(e)
    }
}

impl From<InvalidQuote> for EngineError {
    fn from(e: InvalidQuote) -> Self {
        EngineError::InvalidQuote(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

/// A name → [`Book`] registry. All books share one `Store`; this is the
/// crate's only top-level mutable state, constructed once and passed by
/// reference rather than held as an ambient singleton.
pub struct Engine<S: Store> {
    store: S,
    books: HashMap<String, Book>,
}

impl<S: Store> Engine<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            books: HashMap::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Look up an already-loaded book, without creating one.
    #[must_use]
    pub fn orderbook(&self, pair_name: &str) -> Option<&Book> {
        self.books.get(&pair_name.to_lowercase())
    }

    /// Fetch the book for `pair_name`, lazily loading (or creating, if
    /// nothing was ever persisted under that name) it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a persisted record fails to decode.
    pub fn get_orderbook(&mut self, pair_name: &str) -> Result<&mut Book, StoreError> {
        let key = pair_name.to_lowercase();
        if !self.books.contains_key(&key) {
            let book = Book::load(&self.store, &key)?;
            self.books.insert(key.clone(), book);
        }
        Ok(self
            .books
            .get_mut(&key)
            .expect("just ensured presence above"))
    }

    /// Parse `quote_map`, route it to the named book by its `pair_name`
    /// field, and process it there.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuote`] if the map fails to parse, or
    /// [`EngineError::Book`] if the book fails to persist the result.
    pub fn process_order(
        &mut self,
        quote_map: &HashMap<String, String>,
    ) -> Result<(Vec<Trade>, Option<Quote>), EngineError> {
        let quote = Quote::from_map(quote_map)?;
        let key = quote.pair_name.to_lowercase();
        self.get_orderbook(&key)?;
        let book = self
            .books
            .get_mut(&key)
            .expect("get_orderbook just ensured presence");
        Ok(book.process_order(&mut self.store, quote)?)
    }

    /// Cancel a resting order on `pair_name`'s book; a no-op if absent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the book fails to persist the result.
    pub fn cancel_order(
        &mut self,
        pair_name: &str,
        side: Side,
        order_id: u64,
        price: &BigUint,
    ) -> Result<(), EngineError> {
        let key = pair_name.to_lowercase();
        self.get_orderbook(&key)?;
        let book = self
            .books
            .get_mut(&key)
            .expect("get_orderbook just ensured presence");
        book.cancel_order(&mut self.store, side, order_id, price)?;
        Ok(())
    }

    /// Modify a resting order's price and/or quantity on `pair_name`'s book.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the book fails to persist the result.
    #[allow(clippy::too_many_arguments)]
    pub fn modify_order(
        &mut self,
        pair_name: &str,
        side: Side,
        order_id: u64,
        current_price: &BigUint,
        new_price: BigUint,
        new_quantity: BigUint,
    ) -> Result<(), EngineError> {
        let key = pair_name.to_lowercase();
        self.get_orderbook(&key)?;
        let book = self
            .books
            .get_mut(&key)
            .expect("get_orderbook just ensured presence");
        book.modify_order(
            &mut self.store,
            side,
            order_id,
            current_price,
            new_price,
            new_quantity,
        )?;
        Ok(())
    }

    /// Set `pair_name`'s book configuration (e.g. its
    /// [`MarketResidualPolicy`](crate::book::MarketResidualPolicy)), lazily
    /// loading the book if it is not already registered. Callers who want a
    /// stricter "fail on shortage" market-order policy apply it here rather
    /// than at the book directly, since the Engine owns book lifecycles.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the book fails to load.
    pub fn set_book_config(
        &mut self,
        pair_name: &str,
        config: BookConfig,
    ) -> Result<(), EngineError> {
        let key = pair_name.to_lowercase();
        self.get_orderbook(&key)?;
        let book = self
            .books
            .get_mut(&key)
            .expect("get_orderbook just ensured presence");
        book.set_config(config);
        Ok(())
    }

    /// Atomically apply every buffered write/delete across every touched
    /// book.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the underlying store rejects the
    /// batch.
    pub fn commit(&mut self) -> Result<(), EngineError> {
        self.store.commit().map_err(Into::into)
    }

    /// Drop every buffered write/delete without committing.
    pub fn discard(&mut self) {
        self.store.discard();
    }
}
