//! A doubly-linked FIFO queue of orders resting at a single price.
//!
//! Grounded in `order.go`'s `OrderItem`/`Order` pair: `prev`/`next`/
//! `order_list` are keys, not pointers, resolved through the same
//! [`Store`] every other record lives in.

use crate::quote::Side;
use crate::store::{Store, StoreError};
use crate::utils::{Key, empty_key, is_empty_key};
use num_bigint::BigUint;
use num_traits::ops::checked::CheckedSub;
use serde::{Deserialize, Serialize};

/// The record persisted under an order's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub timestamp: u64,
    pub quantity: BigUint,
    pub price: BigUint,
    pub trade_id: String,
    pub side: Side,
    pub next_order_key: Key,
    pub prev_order_key: Key,
    pub order_list_key: Key,
}

/// An order's key paired with its fetched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub key: Key,
    pub item: OrderRecord,
}

impl Order {
    #[must_use]
    pub fn new(
        key: Key,
        timestamp: u64,
        quantity: BigUint,
        price: BigUint,
        trade_id: String,
        side: Side,
    ) -> Self {
        Self {
            key,
            item: OrderRecord {
                timestamp,
                quantity,
                price,
                trade_id,
                side,
                next_order_key: empty_key(),
                prev_order_key: empty_key(),
                order_list_key: empty_key(),
            },
        }
    }
}

/// The record persisted under an `OrderList`'s key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListRecord {
    pub head_order_key: Key,
    pub tail_order_key: Key,
    pub length: u64,
    pub volume: BigUint,
    pub price: BigUint,
}

/// A FIFO queue of orders at a single price, plus its store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderList {
    pub key: Key,
    pub item: OrderListRecord,
}

impl OrderList {
    #[must_use]
    pub fn new(key: Key, price: BigUint) -> Self {
        Self {
            key,
            item: OrderListRecord {
                head_order_key: empty_key(),
                tail_order_key: empty_key(),
                length: 0,
                volume: BigUint::from(0u32),
                price,
            },
        }
    }

    pub fn get_order<S: Store>(&self, store: &S, key: &Key) -> Result<Option<Order>, StoreError> {
        if is_empty_key(key) {
            return Ok(None);
        }
        let item: Option<OrderRecord> = store.get(key)?;
        Ok(item.map(|item| Order { key: *key, item }))
    }

    #[must_use]
    pub fn order_exists<S: Store>(&self, store: &S, key: &Key) -> bool {
        !is_empty_key(key) && store.has(key)
    }

    pub fn save_order<S: Store>(&self, store: &mut S, order: &Order) -> Result<(), StoreError> {
        store.put(order.key, &order.item)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item.length == 0
    }

    /// Append an order to the tail of the queue: O(1) given the tracked
    /// tail key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persisting the touched records fails.
    pub fn append_order<S: Store>(
        &mut self,
        store: &mut S,
        mut order: Order,
    ) -> Result<(), StoreError> {
        order.item.order_list_key = self.key;
        order.item.next_order_key = empty_key();

        if self.is_empty() {
            order.item.prev_order_key = empty_key();
            self.item.head_order_key = order.key;
        } else {
            order.item.prev_order_key = self.item.tail_order_key;
            let mut tail = self
                .get_order(store, &self.item.tail_order_key)?
                .expect("nonempty list has a resolvable tail");
            tail.item.next_order_key = order.key;
            self.save_order(store, &tail)?;
        }
        self.item.tail_order_key = order.key;
        self.item.length += 1;
        self.item.volume = &self.item.volume + &order.item.quantity;

        self.save_order(store, &order)
    }

    /// Unlink `order` from its neighbors and delete its record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persisting the touched records fails.
    pub fn remove_order<S: Store>(
        &mut self,
        store: &mut S,
        order: &Order,
    ) -> Result<(), StoreError> {
        let has_prev = !is_empty_key(&order.item.prev_order_key);
        let has_next = !is_empty_key(&order.item.next_order_key);

        match (has_prev, has_next) {
            (false, false) => {
                self.item.head_order_key = empty_key();
                self.item.tail_order_key = empty_key();
            }
            (false, true) => {
                let mut next = self
                    .get_order(store, &order.item.next_order_key)?
                    .expect("next order resolves");
                next.item.prev_order_key = empty_key();
                self.item.head_order_key = next.key;
                self.save_order(store, &next)?;
            }
            (true, false) => {
                let mut prev = self
                    .get_order(store, &order.item.prev_order_key)?
                    .expect("prev order resolves");
                prev.item.next_order_key = empty_key();
                self.item.tail_order_key = prev.key;
                self.save_order(store, &prev)?;
            }
            (true, true) => {
                let mut prev = self
                    .get_order(store, &order.item.prev_order_key)?
                    .expect("prev order resolves");
                let mut next = self
                    .get_order(store, &order.item.next_order_key)?
                    .expect("next order resolves");
                prev.item.next_order_key = next.key;
                next.item.prev_order_key = prev.key;
                self.save_order(store, &prev)?;
                self.save_order(store, &next)?;
            }
        }

        self.item.length -= 1;
        self.item.volume = self
            .item
            .volume
            .checked_sub(&order.item.quantity)
            .expect("removed order's quantity never exceeds tracked volume");
        store.delete(&order.key, false);
        Ok(())
    }

    /// Move `order` to the tail, dropping its time priority. Used when an
    /// order's quantity is increased.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persisting the touched records fails.
    pub fn move_to_tail<S: Store>(
        &mut self,
        store: &mut S,
        order: &mut Order,
    ) -> Result<(), StoreError> {
        if self.item.tail_order_key == order.key {
            return Ok(());
        }

        let has_prev = !is_empty_key(&order.item.prev_order_key);
        if has_prev {
            let mut prev = self
                .get_order(store, &order.item.prev_order_key)?
                .expect("prev order resolves");
            prev.item.next_order_key = order.item.next_order_key;
            self.save_order(store, &prev)?;
        } else {
            self.item.head_order_key = order.item.next_order_key;
        }

        let mut next = self
            .get_order(store, &order.item.next_order_key)?
            .expect("order is not tail, so it has a next neighbor");
        next.item.prev_order_key = order.item.prev_order_key;
        self.save_order(store, &next)?;

        order.item.prev_order_key = self.item.tail_order_key;
        order.item.next_order_key = empty_key();
        let mut tail = self
            .get_order(store, &self.item.tail_order_key)?
            .expect("list is nonempty so tail resolves");
        tail.item.next_order_key = order.key;
        self.save_order(store, &tail)?;
        self.item.tail_order_key = order.key;

        self.save_order(store, order)
    }

    /// Change a resting order's quantity in place, preserving time priority on
    /// a decrease and dropping it (move to tail) on an increase.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persisting the touched records fails.
    pub fn update_order_quantity<S: Store>(
        &mut self,
        store: &mut S,
        order: &mut Order,
        new_quantity: BigUint,
        new_timestamp: u64,
    ) -> Result<(), StoreError> {
        if new_quantity > order.item.quantity && self.item.tail_order_key != order.key {
            self.move_to_tail(store, order)?;
        }
        self.item.volume = (&self.item.volume + &new_quantity)
            .checked_sub(&order.item.quantity)
            .expect("order quantity never exceeds tracked volume");
        order.item.quantity = new_quantity;
        order.item.timestamp = new_timestamp;
        self.save_order(store, order)
    }

    /// Walk head-to-tail, for tests and integrity checks.
    pub fn iter_orders<S: Store>(&self, store: &S) -> Result<Vec<Order>, StoreError> {
        let mut out = Vec::with_capacity(self.item.length as usize);
        let mut key = self.item.head_order_key;
        while !is_empty_key(&key) {
            let order = self
                .get_order(store, &key)?
                .expect("linked key resolves to an order");
            key = order.item.next_order_key;
            out.push(order);
        }
        Ok(out)
    }
}
