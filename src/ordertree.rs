//! One side of a [`Book`](crate::book::Book): an RBTree of price levels,
//! each an [`OrderList`].
//!
//! Grounded in `ordertree.go`'s `OrderTree`. The price tree's keys are
//! derived by plain big-integer addition of this side's slot and the price
//! (`getKeyFromPrice`), not by hashing — that keeps the tree's key ordering
//! monotonic in price, which `min_price`/`max_price` rely on.

use crate::orderlist::{Order, OrderList};
use crate::rbtree::Tree;
use crate::store::{Store, StoreError, decode_bytes, encode_to_bytes};
use crate::utils::{Key, biguint_from_key, empty_key, key_from_biguint};
use num_bigint::BigUint;
use num_traits::ops::checked::CheckedSub;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// The record persisted under an `OrderTree`'s own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTreeRecord {
    pub volume: BigUint,
    pub num_orders: u64,
    pub price_tree_root_key: Key,
    pub price_tree_size: u64,
}

/// One side (bids or asks) of a book's price-level tree.
#[derive(Debug, Clone)]
pub struct OrderTree {
    pub key: Key,
    slot: BigUint,
    tree: Tree,
    pub item: OrderTreeRecord,
}

impl OrderTree {
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            slot: biguint_from_key(&key),
            tree: Tree::new(),
            item: OrderTreeRecord {
                volume: BigUint::from(0u32),
                num_orders: 0,
                price_tree_root_key: empty_key(),
                price_tree_size: 0,
            },
        }
    }

    /// Load a previously persisted side from `store`, restoring the price
    /// tree's root/size without a traversal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record fails to decode.
    pub fn load<S: Store>(store: &S, key: Key) -> Result<Self, StoreError> {
        let item: Option<OrderTreeRecord> = store.get(&key)?;
        let item = item.unwrap_or(OrderTreeRecord {
            volume: BigUint::from(0u32),
            num_orders: 0,
            price_tree_root_key: empty_key(),
            price_tree_size: 0,
        });
        let mut tree = Tree::new();
        tree.set_root_key(item.price_tree_root_key, item.price_tree_size);
        Ok(Self {
            key,
            slot: biguint_from_key(&key),
            tree,
            item,
        })
    }

    /// Persist this side's counters and price-tree root/size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record fails to encode or store.
    pub fn save<S: Store>(&mut self, store: &mut S) -> Result<(), StoreError> {
        self.item.price_tree_root_key = self.tree.root_key();
        self.item.price_tree_size = self.tree.size();
        store.put(self.key, &self.item)
    }

    #[must_use]
    pub fn length(&self) -> u64 {
        self.item.num_orders
    }

    #[must_use]
    pub fn not_empty(&self) -> bool {
        self.item.num_orders > 0
    }

    /// Number of distinct prices resting on this side.
    #[must_use]
    pub fn depth(&self) -> u64 {
        self.tree.size()
    }

    fn key_from_price(&self, price: &BigUint) -> Key {
        key_from_biguint(&(&self.slot + price))
    }

    /// Fetch the price level at `price`, if any rest there.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored record fails to decode.
    pub fn price_list<S: Store>(
        &self,
        store: &S,
        price: &BigUint,
    ) -> Result<Option<OrderList>, StoreError> {
        let list_key = self.key_from_price(price);
        match self.tree.get(store, &list_key)? {
            Some(bytes) => {
                let record = decode_bytes(&bytes)?;
                Ok(Some(OrderList {
                    key: list_key,
                    item: record,
                }))
            }
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn price_exist<S: Store>(&self, store: &S, price: &BigUint) -> bool {
        self.tree.has(store, &self.key_from_price(price))
    }

    /// True iff an order with `order_key` rests at `price` on this side.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the price level's record fails to decode.
    pub fn order_exist<S: Store>(
        &self,
        store: &S,
        order_key: &Key,
        price: &BigUint,
    ) -> Result<bool, StoreError> {
        match self.price_list(store, price)? {
            Some(list) => Ok(list.order_exists(store, order_key)),
            None => Ok(false),
        }
    }

    /// Fetch a resting order by key, given the price it rests at.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode.
    pub fn get_order<S: Store>(
        &self,
        store: &S,
        order_key: &Key,
        price: &BigUint,
    ) -> Result<Option<Order>, StoreError> {
        match self.price_list(store, price)? {
            Some(list) => list.get_order(store, order_key),
            None => Ok(None),
        }
    }

    fn create_price<S: Store>(
        &mut self,
        store: &mut S,
        price: &BigUint,
    ) -> Result<OrderList, StoreError> {
        let list_key = self.key_from_price(price);
        let list = OrderList::new(list_key, price.clone());
        self.tree
            .put(store, list_key, encode_to_bytes(&list.item)?)?;
        self.save(store)?;
        Ok(list)
    }

    fn save_order_list<S: Store>(
        &mut self,
        store: &mut S,
        list: &OrderList,
    ) -> Result<(), StoreError> {
        self.tree.put(store, list.key, encode_to_bytes(&list.item)?)
    }

    fn remove_price<S: Store>(&mut self, store: &mut S, price: &BigUint) -> Result<(), StoreError> {
        if self.depth() > 0 {
            self.tree.remove(store, &self.key_from_price(price))?;
            self.save(store)?;
        }
        Ok(())
    }

    /// Insert `order` into the price level it names, displacing any existing
    /// order with the same key at that price (idempotent re-insert).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to persist.
    pub fn insert_order<S: Store>(
        &mut self,
        store: &mut S,
        order: Order,
    ) -> Result<(), StoreError> {
        let price = order.item.price.clone();
        let mut list = match self.price_list(store, &price)? {
            Some(list) => list,
            None => self.create_price(store, &price)?,
        };
        if list.order_exists(store, &order.key) {
            let existing = list
                .get_order(store, &order.key)?
                .expect("checked existence immediately above");
            self.remove_order(store, &existing)?;
            list = match self.price_list(store, &price)? {
                Some(list) => list,
                None => self.create_price(store, &price)?,
            };
        }
        let quantity = order.item.quantity.clone();
        trace!(price = %price, %quantity, "insert_order");
        list.append_order(store, order)?;
        self.save_order_list(store, &list)?;
        self.item.volume = &self.item.volume + &quantity;
        self.item.num_orders += 1;
        self.save(store)
    }

    /// Remove `order` from an already-fetched `list`, dropping the price
    /// level entirely if it empties.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to persist.
    pub fn remove_order_from_order_list<S: Store>(
        &mut self,
        store: &mut S,
        order: &Order,
        mut list: OrderList,
    ) -> Result<(), StoreError> {
        list.remove_order(store, order)?;
        if list.is_empty() {
            trace!(price = %order.item.price, "remove_order emptied price level, dropping it");
            self.remove_price(store, &order.item.price)?;
        } else {
            self.save_order_list(store, &list)?;
        }
        self.item.volume = self
            .item
            .volume
            .checked_sub(&order.item.quantity)
            .expect("removed order's quantity never exceeds tracked volume");
        self.item.num_orders -= 1;
        self.save(store)
    }

    /// Remove `order`, looking its price level up first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if `order`'s price level cannot be found or a
    /// touched record fails to persist.
    pub fn remove_order<S: Store>(
        &mut self,
        store: &mut S,
        order: &Order,
    ) -> Result<(), StoreError> {
        let list = self
            .price_list(store, &order.item.price)?
            .expect("order's price level must exist while the order rests");
        self.remove_order_from_order_list(store, order, list)
    }

    /// Change a resting order's price and/or quantity. A price change loses
    /// time priority (remove, then re-insert as a fresh order); an
    /// in-place quantity change preserves priority on a decrease and drops
    /// it (moves to tail) on an increase.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to persist.
    pub fn update_order<S: Store>(
        &mut self,
        store: &mut S,
        mut order: Order,
        new_price: BigUint,
        new_quantity: BigUint,
        new_timestamp: u64,
    ) -> Result<(), StoreError> {
        if new_price != order.item.price {
            self.remove_order(store, &order)?;
            order.item.price = new_price;
            order.item.quantity = new_quantity;
            order.item.timestamp = new_timestamp;
            order.item.prev_order_key = empty_key();
            order.item.next_order_key = empty_key();
            order.item.order_list_key = empty_key();
            self.insert_order(store, order)
        } else {
            let mut list = self
                .price_list(store, &order.item.price)?
                .expect("order's price level must exist while the order rests");
            let original_quantity = order.item.quantity.clone();
            list.update_order_quantity(store, &mut order, new_quantity, new_timestamp)?;
            self.save_order_list(store, &list)?;
            if order.item.quantity >= original_quantity {
                self.item.volume = &self.item.volume + (&order.item.quantity - &original_quantity);
            } else {
                self.item.volume = self
                    .item
                    .volume
                    .checked_sub(&(&original_quantity - &order.item.quantity))
                    .expect("order-level volume never exceeds tree-level volume");
            }
            self.save(store)
        }
    }

    /// Highest resting price on this side, or `None` if empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the max node's record fails to decode.
    pub fn max_price<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        Ok(self.max_price_list(store)?.map(|l| l.item.price))
    }

    /// Lowest resting price on this side, or `None` if empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the min node's record fails to decode.
    pub fn min_price<S: Store>(&self, store: &S) -> Result<Option<BigUint>, StoreError> {
        Ok(self.min_price_list(store)?.map(|l| l.item.price))
    }

    /// The price level at the best (highest) price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the max node's record fails to decode.
    pub fn max_price_list<S: Store>(&self, store: &S) -> Result<Option<OrderList>, StoreError> {
        let Some((key, bytes)) = self.tree.get_max(store)? else {
            return Ok(None);
        };
        Ok(Some(OrderList {
            key,
            item: decode_bytes(&bytes)?,
        }))
    }

    /// The price level at the worst (lowest) price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the min node's record fails to decode.
    pub fn min_price_list<S: Store>(&self, store: &S) -> Result<Option<OrderList>, StoreError> {
        let Some((key, bytes)) = self.tree.get_min(store)? else {
            return Ok(None);
        };
        Ok(Some(OrderList {
            key,
            item: decode_bytes(&bytes)?,
        }))
    }

    /// Recompute `volume`/`num_orders` by walking every price level and
    /// compare against the tracked counters. Off the hot path; intended as
    /// an optional integrity check, not part of ordinary restore.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a touched record fails to decode, or a
    /// mismatch is found (surfaced as [`StoreError::Decode`] with a
    /// descriptive message).
    pub fn verify_integrity<S: Store>(&self, store: &S) -> Result<(), StoreError> {
        let mut volume = BigUint::from(0u32);
        let mut num_orders = 0u64;
        for (_, bytes) in self.tree.in_order(store)? {
            let record: crate::orderlist::OrderListRecord = decode_bytes(&bytes)?;
            volume = &volume + &record.volume;
            num_orders += record.length;
        }
        if volume != self.item.volume || num_orders != self.item.num_orders {
            return Err(StoreError::Decode {
                message: format!(
                    "order tree integrity check failed: tracked volume={}, num_orders={}; recomputed volume={volume}, num_orders={num_orders}",
                    self.item.volume, self.item.num_orders
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::Side;
    use crate::store::MemoryStore;

    fn side_key() -> Key {
        let mut k = [0u8; 32];
        k[0] = 7;
        k
    }

    fn order(id: u8, qty: u32, price: u32, side: Side) -> Order {
        let mut key = [0u8; 32];
        key[31] = id;
        Order::new(
            key,
            id as u64,
            BigUint::from(qty),
            BigUint::from(price),
            format!("t{id}"),
            side,
        )
    }

    #[test]
    fn insert_creates_price_level_and_tracks_volume() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 5, 100, Side::Ask))
            .unwrap();
        tree.insert_order(&mut store, order(2, 3, 100, Side::Ask))
            .unwrap();

        assert_eq!(tree.item.volume, BigUint::from(8u32));
        assert_eq!(tree.length(), 2);
        assert_eq!(tree.depth(), 1);
        assert!(tree.price_exist(&store, &BigUint::from(100u32)));
    }

    #[test]
    fn remove_order_drops_empty_price_level() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 5, 100, Side::Ask))
            .unwrap();
        let o = tree
            .get_order(
                &store,
                &order(1, 0, 0, Side::Ask).key,
                &BigUint::from(100u32),
            )
            .unwrap()
            .unwrap();
        tree.remove_order(&mut store, &o).unwrap();

        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.length(), 0);
        assert_eq!(tree.item.volume, BigUint::from(0u32));
        assert!(!tree.price_exist(&store, &BigUint::from(100u32)));
    }

    #[test]
    fn min_max_price_track_distinct_levels() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 1, 50, Side::Ask))
            .unwrap();
        tree.insert_order(&mut store, order(2, 1, 20, Side::Ask))
            .unwrap();
        tree.insert_order(&mut store, order(3, 1, 80, Side::Ask))
            .unwrap();

        assert_eq!(tree.min_price(&store).unwrap(), Some(BigUint::from(20u32)));
        assert_eq!(tree.max_price(&store).unwrap(), Some(BigUint::from(80u32)));
    }

    #[test]
    fn update_order_price_change_moves_level_and_drops_old_if_empty() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 5, 100, Side::Ask))
            .unwrap();
        let o = tree
            .get_order(
                &store,
                &order(1, 0, 0, Side::Ask).key,
                &BigUint::from(100u32),
            )
            .unwrap()
            .unwrap();

        tree.update_order(
            &mut store,
            o,
            BigUint::from(110u32),
            BigUint::from(5u32),
            42,
        )
        .unwrap();

        assert!(!tree.price_exist(&store, &BigUint::from(100u32)));
        assert!(tree.price_exist(&store, &BigUint::from(110u32)));
        assert_eq!(tree.item.volume, BigUint::from(5u32));
        assert_eq!(tree.length(), 1);
    }

    #[test]
    fn update_order_same_price_quantity_increase_drops_priority() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 1, 100, Side::Ask))
            .unwrap();
        tree.insert_order(&mut store, order(2, 1, 100, Side::Ask))
            .unwrap();
        let o = tree
            .get_order(
                &store,
                &order(1, 0, 0, Side::Ask).key,
                &BigUint::from(100u32),
            )
            .unwrap()
            .unwrap();

        tree.update_order(
            &mut store,
            o,
            BigUint::from(100u32),
            BigUint::from(5u32),
            42,
        )
        .unwrap();

        let list = tree
            .price_list(&store, &BigUint::from(100u32))
            .unwrap()
            .unwrap();
        assert_eq!(list.item.tail_order_key, order(1, 0, 0, Side::Ask).key);
        assert_eq!(tree.item.volume, BigUint::from(6u32));
    }

    #[test]
    fn verify_integrity_passes_after_normal_use() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 5, 100, Side::Ask))
            .unwrap();
        tree.insert_order(&mut store, order(2, 3, 105, Side::Ask))
            .unwrap();
        tree.verify_integrity(&store).unwrap();
    }

    #[test]
    fn save_then_load_restores_without_traversal() {
        let mut store = MemoryStore::new();
        let mut tree = OrderTree::new(side_key());
        tree.insert_order(&mut store, order(1, 5, 100, Side::Ask))
            .unwrap();
        tree.save(&mut store).unwrap();

        let restored = OrderTree::load(&store, side_key()).unwrap();
        assert_eq!(restored.item, tree.item);
        assert_eq!(
            restored.max_price(&store).unwrap(),
            Some(BigUint::from(100u32))
        );
    }
}
