//! Errors surfaced by [`Book`](super::Book) operations.

use crate::quote::{InvalidQuote, Trade};
use crate::store::StoreError;
use std::fmt;

/// Everything that can go wrong while processing, cancelling, or modifying
/// an order against a [`Book`](super::Book).
#[derive(Debug)]
#[non_exhaustive]
pub enum BookError {
    /// The backing store failed to persist or decode a record.
    Store(StoreError),
    /// The inbound quote map failed to parse into a typed [`Quote`](crate::quote::Quote).
    InvalidQuote(InvalidQuote),
    /// A cancel/modify named an order-id this book has no record of resting.
    OrderNotFound { order_id: u64 },
    /// An internal invariant was violated (e.g. a nonempty price level's
    /// head order key did not resolve).
    Internal { message: String },
    /// A market order could not be filled in full under
    /// [`MarketResidualPolicy::FailOnShortage`](super::MarketResidualPolicy::FailOnShortage).
    /// `trades` carries whatever was already matched (and persisted to the
    /// store's pending buffer) before the shortage was detected, so a
    /// caller that still commits does not lose the record of those fills.
    InsufficientLiquidity {
        requested: String,
        filled: String,
        trades: Vec<Trade>,
    },
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookError::Store(e) => write!(f, "{e}"),
            BookError::InvalidQuote(e) => write!(f, "{e}"),
            BookError::OrderNotFound { order_id } => {
                write!(f, "no resting order with id {order_id}")
            }
            BookError::Internal { message } => {
                write!(f, "internal book invariant violation: {message}")
            }
            BookError::InsufficientLiquidity {
                requested, filled, ..
            } => {
                write!(
                    f,
                    "market order requested {requested} but only {filled} was available"
                )
            }
        }
    }
}

impl std::error::Error for BookError {}

impl From<StoreError> for BookError {
    fn from(e: StoreError) -> Self {
        BookError::Store(e)
    }
}

impl From<InvalidQuote> for BookError {
    fn from(e: InvalidQuote) -> Self {
        BookError::InvalidQuote(e)
    }
}
