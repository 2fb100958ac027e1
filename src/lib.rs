//! Lock-free Matching Engine
//!
//! A multi-instrument order book where any number of threads rest orders and
//! match incoming orders concurrently, coordinating only through atomic
//! compare-and-swap loops. No mutex is taken anywhere on the order path.
//!
//! # Features
//!
//! - **Lock-free lists**: one singly-linked list per (instrument, side) with
//!   push-to-head insertion and single-winner removal by node identity
//! - **Epoch-based reclamation**: removed orders are freed through
//!   `crossbeam::epoch` once no thread can still be walking over them
//! - **Fixed registry**: instruments are allocated once up front and looked up in O(1)
//! - **Pluggable trade sinks**: log, channel, closure or discard
//! - **Monitoring**: latency and throughput counters exported through `metrics`
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use lockfree_matching_engine::orderbook::{EngineConfig, LoggingSink, MatchingEngine, Side};
//!
//! let engine = MatchingEngine::new(EngineConfig::default(), Arc::new(LoggingSink))?;
//!
//! // Rest a sell, then match a buy against it
//! engine.submit_order(Side::Sell, 7, 10, 100)?;
//! let result = engine.match_incoming(7, Side::Buy, 4, 100)?;
//!
//! assert_eq!(result.filled, 4);
//! assert_eq!(result.trades[0].price, 100);
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Matching discipline
//!
//! New orders land at the head of their list, so matching visits the newest
//! compatible order first. There is no price-time priority. A resting order
//! consumed by a match leaves the book whole unless the engine is configured
//! with [`PartialFillPolicy::Requeue`](orderbook::PartialFillPolicy::Requeue).
//! Unmatched incoming quantity is never rested by the engine.

pub mod metrics;
pub mod orderbook;
pub mod simulation;

// Re-export commonly used types
pub use orderbook::{
    error::{OrderBookError, OrderBookResult},
    types::{InstrumentId, OrderId, Price, Quantity, Side, Trade},
    EngineConfig, MatchingEngine, OrderBookRegistry, PartialFillPolicy, TradeSink,
};

pub use crate::metrics::EngineMetrics;
