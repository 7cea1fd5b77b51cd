//! In-memory [`Store`] implementation.
//!
//! A committed `HashMap` plus a pending-write buffer: a simpler stand-in
//! for an on-disk store while preserving the same public contract.

use super::Store;
use super::codec::{decode_bytes, encode_to_bytes};
use super::error::StoreError;
use crate::utils::Key;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::trace;

/// A buffered write is either a value to persist or a tombstone.
enum Pending {
    Put(Vec<u8>),
    Delete,
}

/// An in-memory, buffered key-value store.
#[derive(Default)]
pub struct MemoryStore {
    committed: HashMap<Key, Vec<u8>>,
    pending: HashMap<Key, Pending>,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            committed: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Number of committed records (ignores anything still buffered).
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    fn raw_get(&self, key: &Key) -> Option<&[u8]> {
        match self.pending.get(key) {
            Some(Pending::Put(bytes)) => Some(bytes.as_slice()),
            Some(Pending::Delete) => None,
            None => self.committed.get(key).map(Vec::as_slice),
        }
    }
}

impl Store for MemoryStore {
    fn put<T: Serialize>(&mut self, key: Key, record: &T) -> Result<(), StoreError> {
        let bytes = encode_to_bytes(record)?;
        trace!(key = %hex_preview(&key), len = bytes.len(), "store put");
        self.pending.insert(key, Pending::Put(bytes));
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, StoreError> {
        match self.raw_get(key) {
            Some(bytes) => Ok(Some(decode_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    fn has(&self, key: &Key) -> bool {
        self.raw_get(key).is_some()
    }

    fn delete(&mut self, key: &Key, force: bool) {
        trace!(key = %hex_preview(key), force, "store delete");
        self.pending.insert(*key, Pending::Delete);
        if force {
            self.committed.remove(key);
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        for (key, pending) in self.pending.drain() {
            match pending {
                Pending::Put(bytes) => {
                    self.committed.insert(key, bytes);
                }
                Pending::Delete => {
                    self.committed.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.pending.clear();
    }
}

fn hex_preview(key: &Key) -> String {
    key.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
