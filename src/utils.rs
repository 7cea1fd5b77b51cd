//! Small helpers shared across the crate.

use num_bigint::BigUint;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Standardized on milliseconds at the `Engine` boundary and used
/// everywhere a fresh timestamp is needed (book mutation time, order
/// cancel/modify time).
#[must_use]
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Width, in bytes, of every key in the system: book/side/price/order keys
/// and RBTree node keys all share this shape.
pub const KEY_WIDTH: usize = 32;

/// A fixed-width byte key. `[0u8; KEY_WIDTH]` is the empty-key sentinel.
pub type Key = [u8; KEY_WIDTH];

/// The all-zero sentinel meaning "no link".
#[must_use]
pub const fn empty_key() -> Key {
    [0u8; KEY_WIDTH]
}

/// True iff `key` is the empty-key sentinel.
#[must_use]
pub fn is_empty_key(key: &Key) -> bool {
    key == &empty_key()
}

/// Widen a big integer to a fixed-width, big-endian key. Values wider than
/// `KEY_WIDTH` bytes are truncated to their least-significant bytes, mirroring
/// `common.BigToHash`'s behavior in the slot-arithmetic this crate's key
/// derivation is grounded on.
#[must_use]
pub fn key_from_biguint(n: &BigUint) -> Key {
    let bytes = n.to_bytes_be();
    let mut key = empty_key();
    if bytes.len() >= KEY_WIDTH {
        key.copy_from_slice(&bytes[bytes.len() - KEY_WIDTH..]);
    } else {
        key[KEY_WIDTH - bytes.len()..].copy_from_slice(&bytes);
    }
    key
}

/// The inverse of [`key_from_biguint`]: interpret a key as a big-endian
/// unsigned integer.
#[must_use]
pub fn biguint_from_key(key: &Key) -> BigUint {
    BigUint::from_bytes_be(key)
}

/// Narrow a big integer to `u64`, truncating to its least-significant 8
/// bytes. Order-ids never approach that width in practice.
#[must_use]
pub fn biguint_to_u64(n: &BigUint) -> u64 {
    let bytes = n.to_bytes_be();
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}
