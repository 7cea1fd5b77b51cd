//! Batched key-value persistence.
//!
//! [`Store`] is the single shared mutable structure: every
//! write from the RBTree, OrderList, OrderTree, and Book goes through it as
//! a buffered, uncommitted mutation until the caller calls
//! [`Store::commit`]. Reads prefer the pending-write buffer over the
//! committed layer, giving read-your-writes within a single `ProcessOrder`
//! call without requiring a commit.

mod codec;
pub mod error;
pub mod memory;

#[cfg(feature = "persistence")]
pub mod file;

pub use codec::{decode_bytes, encode_to_bytes};
pub use error::StoreError;
pub use memory::MemoryStore;

#[cfg(feature = "persistence")]
pub use file::FileStore;

use crate::utils::Key;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Batched key-value persistence.
///
/// Implementations buffer writes and deletes until [`commit`](Store::commit)
/// is called; reads always prefer the pending buffer over the committed
/// layer (read-your-writes). In-memory implementations are as valid as
/// on-disk ones as long as this contract holds — see [`MemoryStore`].
pub trait Store {
    /// Buffer an encoded write. Does not block on I/O.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if `record` cannot be encoded.
    fn put<T: Serialize>(&mut self, key: Key, record: &T) -> Result<(), StoreError>;

    /// Fetch and decode the latest value for `key`, preferring the
    /// pending-write buffer over the committed layer.
    ///
    /// Returns `Ok(None)` if the key is absent (a buffered tombstone counts
    /// as absent).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the stored bytes do not match `T`.
    fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, StoreError>;

    /// True iff `key` resolves to a value, preferring the pending-write
    /// buffer over the committed layer.
    fn has(&self, key: &Key) -> bool;

    /// Buffer a tombstone for `key`. If `force`, additionally remove the
    /// key from the committed layer immediately.
    fn delete(&mut self, key: &Key, force: bool);

    /// Atomically apply all buffered writes/deletes. On success the buffer
    /// is cleared; on failure it is retained so the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the underlying storage rejects the
    /// batch.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Drop the pending-write buffer without committing, for callers that
    /// must abort mid-operation.
    fn discard(&mut self);

    /// True iff `key` equals the all-zero sentinel ("no link").
    fn is_empty_key(&self, key: &Key) -> bool {
        crate::utils::is_empty_key(key)
    }
}
