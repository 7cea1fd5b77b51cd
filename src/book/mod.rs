//! A trading pair: two [`OrderTree`] sides plus the engine-assigned
//! order-id counter, matched via [`matching`].
//!
//! A book's key is a `sha2::Sha256` hash of its lowercased name; each
//! side's slot is a hash of the book's key concatenated with a one-byte
//! segment discriminant, keeping bids/asks/orders collision-free within one
//! shared [`Store`] even across many books.

mod error;
mod matching;

pub use error::BookError;

use crate::orderlist::Order;
use crate::ordertree::OrderTree;
use crate::quote::{OrderKind, Quote, Side, Trade};
use crate::store::{Store, StoreError};
use crate::utils::{Key, biguint_to_u64, key_from_biguint};
use num_bigint::BigUint;
use num_traits::ops::checked::CheckedSub;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, trace, warn};

/// How a market order's unfilled remainder is handled once the opposing
/// side runs dry.
///
/// The default silently drops the remainder; `FailOnShortage` is the
/// stricter variant, surfaced as an Engine-level configuration knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarketResidualPolicy {
    #[default]
    DropRemainder,
    FailOnShortage,
}

/// Per-book configuration knobs. Not persisted — a caller reconstructing a
/// [`Book`] via [`Book::load`] after a restart gets [`BookConfig::default`]
/// unless it re-applies one via [`Book::with_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BookConfig {
    pub market_residual_policy: MarketResidualPolicy,
}

/// The record persisted under a book's own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub name: String,
    pub timestamp: u64,
    pub next_order_id: u64,
}

/// A trading pair: two price-time-priority sides sharing one order-id
/// namespace.
pub struct Book {
    pub key: Key,
    slot: BigUint,
    pub bids: OrderTree,
    pub asks: OrderTree,
    item: BookRecord,
    config: BookConfig,
}

fn segment_hash(base: &Key, segment: u8) -> Key {
    let mut hasher = Sha256::new();
    hasher.update(base);
    hasher.update([segment]);
    hasher.finalize().into()
}

impl Book {
    /// Create a fresh, empty book for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_config(name, BookConfig::default())
    }

    /// Create a fresh, empty book for `name` with non-default configuration.
    #[must_use]
    pub fn with_config(name: &str, config: BookConfig) -> Self {
        let lowered = name.to_lowercase();
        let key: Key = Sha256::digest(lowered.as_bytes()).into();
        let bids_key = segment_hash(&key, 1);
        let asks_key = segment_hash(&key, 2);
        Self {
            key,
            slot: crate::utils::biguint_from_key(&key),
            bids: OrderTree::new(bids_key),
            asks: OrderTree::new(asks_key),
            item: BookRecord {
                name: lowered,
                timestamp: crate::utils::current_time_millis(),
                next_order_id: 0,
            },
            config,
        }
    }

    /// Load a book for `name` from `store`, restoring both sides. Returns a
    /// fresh empty book if nothing has been persisted under that name yet.
    /// Configuration is not persisted; callers that rely on a non-default
    /// [`BookConfig`] must re-apply it after `load` (e.g. via
    /// [`Book::set_config`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a persisted record fails to decode.
    pub fn load<S: Store>(store: &S, name: &str) -> Result<Self, StoreError> {
        let lowered = name.to_lowercase();
        let key: Key = Sha256::digest(lowered.as_bytes()).into();
        let bids_key = segment_hash(&key, 1);
        let asks_key = segment_hash(&key, 2);

        let item: Option<BookRecord> = store.get(&key)?;
        let item = item.unwrap_or(BookRecord {
            name: lowered,
            timestamp: crate::utils::current_time_millis(),
            next_order_id: 0,
        });
        Ok(Self {
            key,
            slot: crate::utils::biguint_from_key(&key),
            bids: OrderTree::load(store, bids_key)?,
            asks: OrderTree::load(store, asks_key)?,
            item,
            config: BookConfig::default(),
        })
    }

    /// Persist the book record and both sides.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any touched record fails to persist.
    pub fn save<S: Store>(&mut self, store: &mut S) -> Result<(), StoreError> {
        self.bids.save(store)?;
        self.asks.save(store)?;
        store.put(self.key, &self.item)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.item.name
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.item.timestamp
    }

    #[must_use]
    pub fn next_order_id(&self) -> u64 {
        self.item.next_order_id
    }

    #[must_use]
    pub fn config(&self) -> BookConfig {
        self.config
    }

    pub fn set_config(&mut self, config: BookConfig) {
        self.config = config;
    }

    fn order_key_from_id(&self, order_id: u64) -> Key {
        key_from_biguint(&(&self.slot + BigUint::from(order_id)))
    }

    /// Recover the plain numeric order-id a stored order key was derived
    /// from — the inverse of the book-slot arithmetic every order key is
    /// built with.
    #[must_use]
    pub fn order_id_from_key(&self, key: &Key) -> u64 {
        let order_slot = crate::utils::biguint_from_key(key);
        let diff = order_slot.checked_sub(&self.slot).unwrap_or_default();
        biguint_to_u64(&diff)
    }

    /// Fetch a resting order directly by engine-assigned id, independent of
    /// which side or price it rests at.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored record fails to decode.
    pub fn get_order<S: Store>(
        &self,
        store: &S,
        order_id: u64,
    ) -> Result<Option<Order>, StoreError> {
        let key = self.order_key_from_id(order_id);
        let item: Option<crate::orderlist::OrderRecord> = store.get(&key)?;
        Ok(item.map(|item| Order { key, item }))
    }

    /// Highest resting bid price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn best_bid<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        self.bids.max_price(store)
    }

    /// Lowest resting ask price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn best_ask<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        self.asks.min_price(store)
    }

    /// Lowest resting bid price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn worst_bid<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        self.bids.min_price(store)
    }

    /// Highest resting ask price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn worst_ask<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        self.asks.max_price(store)
    }

    /// All orders resting at the best ask price, head→tail (earliest
    /// first). `None` if the ask side is empty. Returns exactly the price
    /// level's `length` entries — no pre-allocated leading empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn best_ask_list<S: Store>(&self, store: &S) -> Result<Option<Vec<Order>>, StoreError> {
        match self.asks.min_price_list(store)? {
            Some(list) => Ok(Some(list.iter_orders(store)?)),
            None => Ok(None),
        }
    }

    /// All orders resting at the best bid price, tail→head. `None` if the
    /// bid side is empty. Returns exactly the price level's `length`
    /// entries — no pre-allocated leading empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn best_bid_list<S: Store>(&self, store: &S) -> Result<Option<Vec<Order>>, StoreError> {
        match self.bids.max_price_list(store)? {
            Some(list) => {
                let mut orders = list.iter_orders(store)?;
                orders.reverse();
                Ok(Some(orders))
            }
            None => Ok(None),
        }
    }

    /// Resting volume at `price` on `side`, zero if nothing rests there.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn volume_at_price<S: Store>(
        &self,
        store: &S,
        side: Side,
        price: &BigUint,
    ) -> Result<BigUint, StoreError> {
        let tree = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        Ok(tree
            .price_list(store, price)?
            .map_or_else(|| BigUint::from(0u32), |l| l.item.volume))
    }

    /// Dispatch an inbound quote: updates the book's timestamp, assigns a
    /// fresh order-id, matches against the opposing side, and rests any
    /// residual (limit orders only). Persists the book and both sides
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns [`BookError`] if any touched record fails to persist.
    pub fn process_order<S: Store>(
        &mut self,
        store: &mut S,
        mut quote: Quote,
    ) -> Result<(Vec<Trade>, Option<Quote>), BookError> {
        self.item.timestamp = crate::utils::current_time_millis();
        self.item.next_order_id += 1;
        quote.order_id = Some(self.item.next_order_id);
        trace!(book = %self.item.name, order_id = self.item.next_order_id, side = %quote.side, kind = ?quote.kind, "process_order");

        let (trades, resting) = match quote.kind {
            OrderKind::Market => (matching::process_market_order(self, store, &quote)?, None),
            OrderKind::Limit => matching::process_limit_order(self, store, &quote)?,
        };
        debug!(book = %self.item.name, trades = trades.len(), resting = resting.is_some(), "process_order complete");

        self.save(store)?;
        Ok((trades, resting))
    }

    /// Cancel a resting order; a no-op (not an error) if it is already
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`BookError`] if a touched record fails to persist.
    pub fn cancel_order<S: Store>(
        &mut self,
        store: &mut S,
        side: Side,
        order_id: u64,
        price: &BigUint,
    ) -> Result<(), BookError> {
        let key = self.order_key_from_id(order_id);
        let tree = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        match tree.get_order(store, &key, price)? {
            Some(order) => {
                tree.remove_order(store, &order)?;
                self.item.timestamp = crate::utils::current_time_millis();
                debug!(book = %self.item.name, order_id, %side, "cancel_order removed resting order");
                self.save(store)?;
            }
            None => {
                warn!(book = %self.item.name, order_id, %side, "cancel_order found no resting order, silent no-op")
            }
        }
        Ok(())
    }

    /// Modify a resting order's price and/or quantity in place. A no-op if
    /// the order is not found at `current_price`.
    ///
    /// # Errors
    ///
    /// Returns [`BookError`] if a touched record fails to persist.
    pub fn modify_order<S: Store>(
        &mut self,
        store: &mut S,
        side: Side,
        order_id: u64,
        current_price: &BigUint,
        new_price: BigUint,
        new_quantity: BigUint,
    ) -> Result<(), BookError> {
        let key = self.order_key_from_id(order_id);
        let existing = match side {
            Side::Bid => self.bids.get_order(store, &key, current_price)?,
            Side::Ask => self.asks.get_order(store, &key, current_price)?,
        };
        if let Some(order) = existing {
            self.item.timestamp = crate::utils::current_time_millis();
            let timestamp = self.item.timestamp;
            let tree = match side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            tree.update_order(store, order, new_price, new_quantity, timestamp)?;
            self.save(store)?;
        }
        Ok(())
    }

    /// An indented summary of both sides, the Rust equivalent of
    /// `Orderbook.String(startDepth)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn render<S: Store>(&self, _store: &S) -> Result<String, StoreError> {
        Ok(format!(
            "Book {{\n\tname: {}\n\ttimestamp: {}\n\tnext_order_id: {}\n\tbids: {{ depth: {}, length: {}, volume: {} }}\n\tasks: {{ depth: {}, length: {}, volume: {} }}\n}}",
            self.item.name,
            self.item.timestamp,
            self.item.next_order_id,
            self.bids.depth(),
            self.bids.length(),
            self.bids.item.volume,
            self.asks.depth(),
            self.asks.length(),
            self.asks.item.volume,
        ))
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("name", &self.item.name)
            .field("timestamp", &self.item.timestamp)
            .field("next_order_id", &self.item.next_order_id)
            .finish()
    }
}
