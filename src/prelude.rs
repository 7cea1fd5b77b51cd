//! Convenience re-exports for downstream crates: `use orderbook_rs::prelude::*;`.

pub use crate::book::{Book, BookConfig, BookError, MarketResidualPolicy};
pub use crate::engine::{Engine, EngineError};
pub use crate::orderlist::{Order, OrderList};
pub use crate::ordertree::OrderTree;
pub use crate::quote::{InvalidQuote, OrderKind, Quote, Side, Trade};
pub use crate::store::{MemoryStore, Store, StoreError};

#[cfg(feature = "persistence")]
pub use crate::store::FileStore;
