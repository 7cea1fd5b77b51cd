//! A persistent, price-time-priority limit order book matching engine
//! backed by a pluggable key-value store.
//!
//! The core is three tightly coupled subsystems: a persistent red-black
//! tree ([`rbtree`]) whose nodes are store records rather than in-memory
//! pointers, a two-level book structure ([`ordertree`] over [`orderlist`])
//! giving O(log P) best-price lookup with O(1) FIFO append/pop, and a
//! matching engine ([`book`], [`engine`]) that walks the opposing side with
//! price-time priority while keeping all three consistent under one
//! batched [`store::Store::commit`].

pub mod book;
pub mod engine;
pub mod orderlist;
pub mod ordertree;
pub mod prelude;
pub mod quote;
pub mod rbtree;
pub mod store;
pub mod utils;

pub use book::{Book, BookConfig, BookError, MarketResidualPolicy};
pub use engine::{Engine, EngineError};
pub use quote::{OrderKind, Quote, Side, Trade};
pub use store::{MemoryStore, Store, StoreError};

#[cfg(feature = "persistence")]
pub use store::FileStore;
