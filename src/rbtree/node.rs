//! Persistent tree node records.
//!
//! Grounded in `node.go`'s `KeyMeta`/`Item`/`Node` triple: a node's
//! left/right/parent are keys, not pointers, so the only thing actually
//! written to the [`Store`](crate::store::Store) is an [`Item`]; [`Node`] is
//! the in-memory pairing of a key with the `Item` fetched for it, built
//! fresh on every lookup.

use crate::utils::{Key, empty_key};
use serde::{Deserialize, Serialize};

/// A node's color. `Color::Black` for an absent (empty-key) child, per the
/// standard convention that nil nodes are black.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Red,
    Black,
}

/// Left/right/parent linkage, stored by key rather than by pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMeta {
    pub left: Key,
    pub right: Key,
    pub parent: Key,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            left: empty_key(),
            right: empty_key(),
            parent: empty_key(),
        }
    }
}

/// The record actually persisted under a node's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub value: Vec<u8>,
    pub color: Color,
    pub keys: KeyMeta,
}

impl Item {
    pub fn new_red(value: Vec<u8>) -> Self {
        Self {
            value,
            color: Color::Red,
            keys: KeyMeta::default(),
        }
    }
}

/// A node's key paired with its fetched [`Item`]. Built on demand by
/// [`Tree::get_node`](super::Tree::get_node) — never stored as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: Key,
    pub item: Item,
}

impl Node {
    pub fn new(key: Key, item: Item) -> Self {
        Self { key, item }
    }

    pub fn color(&self) -> Color {
        self.item.color
    }
}

/// Color of a possibly-absent node: absent counts as black.
pub fn node_color(node: Option<&Node>) -> Color {
    node.map_or(Color::Black, Node::color)
}
