//! Core order book implementation module
//!
//! Lock-free order lists, the per-instrument registry that holds them, and the
//! matching engine that trades across them.

pub mod config;
pub mod error;
pub mod matching;
pub mod order_list;
pub mod registry;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use config::{EngineConfig, PartialFillPolicy};
pub use error::{OrderBookError, OrderBookResult};
pub use matching::{EngineStats, MatchResult, MatchingEngine};
pub use order_list::{ConcurrentOrderList, NodeRef};
pub use registry::{InstrumentBook, OrderBookRegistry};
pub use sink::{ChannelSink, LoggingSink, NullSink, TradeSink};
pub use types::{
    InstrumentId, OrderId, OrderRecord, OrderSnapshot, Price, Quantity, Side, Trade,
};
