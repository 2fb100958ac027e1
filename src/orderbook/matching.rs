use crossbeam::epoch;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::metrics::EngineMetrics;
use crate::orderbook::config::{EngineConfig, PartialFillPolicy};
use crate::orderbook::error::{OrderBookError, OrderBookResult};
use crate::orderbook::registry::OrderBookRegistry;
use crate::orderbook::sink::TradeSink;
use crate::orderbook::types::{
    InstrumentId, OrderId, OrderRecord, Price, Quantity, Side, Trade,
};

/// Outcome of one `match_incoming` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub requested: Quantity,
    pub filled: Quantity,
    pub trades: Vec<Trade>,
}

impl MatchResult {
    fn new(instrument_id: InstrumentId, side: Side, requested: Quantity) -> Self {
        Self {
            instrument_id,
            side,
            requested,
            filled: 0,
            trades: Vec::new(),
        }
    }

    /// Incoming quantity left unmatched. The engine does not rest it.
    pub fn remaining(&self) -> Quantity {
        self.requested - self.filled
    }

    pub fn is_filled(&self) -> bool {
        self.filled == self.requested
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub instruments: usize,
    pub resting_orders: usize,
    pub orders_submitted: u64,
    pub orders_rejected: u64,
    pub trades_executed: u64,
    pub total_volume: u64,
    pub lost_races: u64,
}

/// Lock-free matching engine over a fixed set of instruments.
///
/// Orders rest in per-(instrument, side) lists with the newest order at the
/// head, so there is no price-time priority: a walk visits the most recently
/// inserted compatible order first.
pub struct MatchingEngine {
    config: EngineConfig,
    registry: Arc<OrderBookRegistry>,
    sink: Arc<dyn TradeSink>,
    metrics: Arc<EngineMetrics>,
}

impl MatchingEngine {
    pub fn new(config: EngineConfig, sink: Arc<dyn TradeSink>) -> OrderBookResult<Self> {
        config.validate()?;
        let registry = Arc::new(OrderBookRegistry::new(config.instruments)?);
        Self::with_registry(config, registry, sink)
    }

    /// Build an engine over an existing registry. The registry size must match
    /// the configured instrument count.
    pub fn with_registry(
        config: EngineConfig,
        registry: Arc<OrderBookRegistry>,
        sink: Arc<dyn TradeSink>,
    ) -> OrderBookResult<Self> {
        config.validate()?;
        if registry.len() != config.instruments {
            return Err(OrderBookError::InvalidConfig(format!(
                "registry holds {} instruments, config expects {}",
                registry.len(),
                config.instruments
            )));
        }

        info!(
            "Matching engine ready: {} instruments, max qty {}, max price {}, partial fills {:?}",
            config.instruments, config.max_quantity, config.max_price, config.partial_fill
        );

        Ok(Self {
            config,
            registry,
            sink,
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Rest a new order at the head of its (instrument, side) list.
    ///
    /// The order can be matched by other threads as soon as this returns, or
    /// earlier. Nothing is inserted when validation fails.
    pub fn submit_order(
        &self,
        side: Side,
        instrument_id: InstrumentId,
        quantity: Quantity,
        price: Price,
    ) -> OrderBookResult<OrderId> {
        self.validate(instrument_id, quantity, price)?;

        self.metrics.time_submit(|| -> OrderBookResult<OrderId> {
            let list = self.registry.side(instrument_id, side)?;
            let guard = &epoch::pin();
            let node = list.insert(OrderRecord::new(side, instrument_id, quantity, price), guard);

            debug!(
                "Order {} rested: {} {} @ {} on instrument {}",
                node.id, side, quantity, price, instrument_id
            );
            self.metrics.increment_orders_submitted();
            Ok(node.id)
        })
    }

    /// Match an incoming order against the opposite side of the book.
    ///
    /// Each compatible resting order that this thread manages to remove trades
    /// `min(remaining, resting quantity)` at the resting price and is reported
    /// to the sink. Orders lost to a concurrent matcher are skipped.
    pub fn match_incoming(
        &self,
        instrument_id: InstrumentId,
        incoming_side: Side,
        quantity: Quantity,
        price: Price,
    ) -> OrderBookResult<MatchResult> {
        self.validate(instrument_id, quantity, price)?;
        self.metrics.increment_match_calls();

        self.metrics.time_match(|| -> OrderBookResult<MatchResult> {
            let opposite = self.registry.side(instrument_id, incoming_side.opposite())?;
            let mut result = MatchResult::new(instrument_id, incoming_side, quantity);
            let mut remaining = quantity;

            debug!(
                "Matching incoming {} {} @ {} on instrument {}",
                incoming_side, quantity, price, instrument_id
            );

            let guard = &epoch::pin();
            for node in opposite.iter(guard) {
                if remaining == 0 {
                    break;
                }

                let resting_price = node.price;
                if node.is_dead() || !incoming_side.crosses(price, resting_price) {
                    continue;
                }

                if !opposite.remove(node, guard) {
                    trace!("Order {} taken by a concurrent matcher", node.id);
                    self.metrics.increment_lost_races();
                    continue;
                }

                // This thread owns the node from here on.
                let traded = node.fill(remaining);
                remaining -= traded;

                let leftover = node.quantity();
                if leftover > 0 && self.config.partial_fill == PartialFillPolicy::Requeue {
                    opposite.insert(
                        OrderRecord::with_id(
                            node.id,
                            node.side,
                            instrument_id,
                            leftover,
                            resting_price,
                        ),
                        guard,
                    );
                    self.metrics.increment_orders_requeued();
                    debug!("Order {} requeued with {} left", node.id, leftover);
                }

                let trade = Trade::new(instrument_id, resting_price, traded, incoming_side, node.id);
                self.metrics
                    .increment_trades_executed(trade.quantity, trade.notional());
                self.sink.on_trade(&trade);

                result.filled += traded;
                result.trades.push(trade);
            }

            debug!(
                "Incoming {} on instrument {} filled {}/{} in {} trades",
                incoming_side,
                instrument_id,
                result.filled,
                result.requested,
                result.trades.len()
            );
            Ok(result)
        })
    }

    fn validate(
        &self,
        instrument_id: InstrumentId,
        quantity: Quantity,
        price: Price,
    ) -> OrderBookResult<()> {
        self.config
            .validate_order(instrument_id, quantity, price)
            .map_err(|e| {
                warn!("Rejected order: {}", e);
                self.metrics.increment_orders_rejected();
                e
            })
    }

    /// Point-in-time count of resting orders on one side of an instrument
    pub fn depth(&self, instrument_id: InstrumentId, side: Side) -> OrderBookResult<usize> {
        self.registry.depth(instrument_id, side)
    }

    pub fn stats(&self) -> EngineStats {
        let resting_orders = self.registry.resting_orders();
        self.metrics.set_resting_orders(resting_orders as u64);

        EngineStats {
            instruments: self.registry.len(),
            resting_orders,
            orders_submitted: self.metrics.get_orders_submitted(),
            orders_rejected: self.metrics.get_orders_rejected(),
            trades_executed: self.metrics.get_trades_executed(),
            total_volume: self.metrics.get_total_volume(),
            lost_races: self.metrics.get_lost_races(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OrderBookRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::sink::{ChannelSink, NullSink};
    use crossbeam::channel::{unbounded, Receiver};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::thread;

    fn engine_with(config: EngineConfig) -> (MatchingEngine, Receiver<Trade>) {
        let (tx, rx) = unbounded();
        let engine = MatchingEngine::new(config, Arc::new(ChannelSink::new(tx))).unwrap();
        (engine, rx)
    }

    fn engine() -> (MatchingEngine, Receiver<Trade>) {
        engine_with(EngineConfig::default().with_instruments(16))
    }

    #[test]
    fn test_partial_match_discards_resting_remainder() {
        let (engine, trades) = engine();

        engine.submit_order(Side::Sell, 7, 10, 100).unwrap();
        let result = engine.match_incoming(7, Side::Buy, 4, 100).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.filled, 4);
        assert!(result.is_filled());

        let trade = trades.try_recv().unwrap();
        assert_eq!(trade.instrument_id, 7);
        assert_eq!(trade.price, 100);
        assert_eq!(trade.quantity, 4);
        assert!(trades.try_recv().is_err());

        // Resting sell left whole, nothing to match any more
        assert_eq!(engine.depth(7, Side::Sell).unwrap(), 0);
        let again = engine.match_incoming(7, Side::Buy, 4, 100).unwrap();
        assert!(again.trades.is_empty());
    }

    #[test]
    fn test_price_incompatible_no_trade() {
        let (engine, trades) = engine();

        engine.submit_order(Side::Sell, 3, 5, 50).unwrap();
        let result = engine.match_incoming(3, Side::Buy, 5, 40).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.remaining(), 5);
        assert!(trades.try_recv().is_err());
        assert_eq!(engine.depth(3, Side::Sell).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_sellers_one_buyer() {
        let (engine, trades) = engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = [100u64, 90u64]
            .into_iter()
            .map(|price| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.submit_order(Side::Sell, 5, 10, price).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let result = engine.match_incoming(5, Side::Buy, 10, 100).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = trades.try_recv().unwrap();
        assert!(trade.price == 90 || trade.price == 100);
        assert_eq!(trade.quantity, 10);

        let resting = engine.registry().snapshot(5, Side::Sell).unwrap();
        assert_eq!(resting.len(), 1);
        assert_ne!(resting[0].price, trade.price);
    }

    #[test]
    fn test_incoming_sell_hits_bids_at_or_above() {
        let (engine, _trades) = engine();

        engine.submit_order(Side::Buy, 1, 10, 40).unwrap();
        engine.submit_order(Side::Buy, 1, 10, 60).unwrap();
        engine.submit_order(Side::Buy, 1, 10, 50).unwrap();

        let result = engine.match_incoming(1, Side::Sell, 25, 50).unwrap();

        let prices: Vec<_> = result.trades.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![50, 60]);
        assert_eq!(result.filled, 20);
        assert_eq!(result.remaining(), 5);
        assert!(result.trades.iter().all(|t| t.aggressor_side == Side::Sell));

        let resting = engine.registry().snapshot(1, Side::Buy).unwrap();
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].price, 40);
    }

    #[test]
    fn test_newest_order_matches_first() {
        let (engine, _trades) = engine();

        let older = engine.submit_order(Side::Sell, 2, 5, 10).unwrap();
        let newer = engine.submit_order(Side::Sell, 2, 5, 20).unwrap();

        let result = engine.match_incoming(2, Side::Buy, 5, 20).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].resting_order_id, newer);

        let resting = engine.registry().snapshot(2, Side::Sell).unwrap();
        assert_eq!(resting[0].id, older);
    }

    #[test]
    fn test_requeue_keeps_resting_remainder() {
        let (engine, _trades) = engine_with(
            EngineConfig::default()
                .with_instruments(16)
                .with_partial_fill(PartialFillPolicy::Requeue),
        );

        let id = engine.submit_order(Side::Sell, 7, 10, 100).unwrap();
        let first = engine.match_incoming(7, Side::Buy, 4, 100).unwrap();
        assert_eq!(first.filled, 4);

        let resting = engine.registry().snapshot(7, Side::Sell).unwrap();
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].id, id);
        assert_eq!(resting[0].quantity, 6);
        assert_eq!(resting[0].price, 100);

        let second = engine.match_incoming(7, Side::Buy, 10, 100).unwrap();
        assert_eq!(second.filled, 6);
        assert_eq!(second.remaining(), 4);
        assert_eq!(engine.depth(7, Side::Sell).unwrap(), 0);
        assert_eq!(engine.metrics().get_orders_requeued(), 1);
    }

    #[test]
    fn test_incoming_is_never_rested() {
        let (engine, _trades) = engine();

        engine.match_incoming(0, Side::Buy, 10, 100).unwrap();
        assert_eq!(engine.depth(0, Side::Buy).unwrap(), 0);
        assert_eq!(engine.stats().resting_orders, 0);
    }

    #[test]
    fn test_validation_errors_have_no_effect() {
        let (engine, _trades) = engine();

        assert_eq!(
            engine.submit_order(Side::Buy, 0, 0, 10),
            Err(OrderBookError::InvalidQuantity)
        );
        assert_eq!(
            engine.submit_order(Side::Buy, 0, 10, 0),
            Err(OrderBookError::InvalidPrice)
        );
        assert!(matches!(
            engine.submit_order(Side::Buy, 16, 10, 10),
            Err(OrderBookError::InvalidInstrument { .. })
        ));
        assert!(matches!(
            engine.submit_order(Side::Buy, 0, 1001, 10),
            Err(OrderBookError::OrderTooLarge { .. })
        ));
        assert!(matches!(
            engine.match_incoming(0, Side::Buy, 10, 501),
            Err(OrderBookError::PriceOutOfRange { .. })
        ));
        assert!(matches!(
            engine.match_incoming(99, Side::Sell, 10, 10),
            Err(OrderBookError::InvalidInstrument { .. })
        ));

        let stats = engine.stats();
        assert_eq!(stats.resting_orders, 0);
        assert_eq!(stats.orders_submitted, 0);
        assert_eq!(stats.orders_rejected, 6);
    }

    #[test]
    fn test_registry_size_must_match_config() {
        let registry = Arc::new(OrderBookRegistry::new(8).unwrap());
        let result = MatchingEngine::with_registry(
            EngineConfig::default().with_instruments(16),
            Arc::clone(&registry),
            Arc::new(NullSink),
        );
        assert!(matches!(result, Err(OrderBookError::InvalidConfig(_))));

        let engine = MatchingEngine::with_registry(
            EngineConfig::default().with_instruments(8),
            Arc::clone(&registry),
            Arc::new(NullSink),
        )
        .unwrap();
        engine.submit_order(Side::Sell, 7, 1, 1).unwrap();
        assert_eq!(registry.depth(7, Side::Sell).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_matchers_never_double_trade() {
        let (engine, trades) = engine();
        let engine = Arc::new(engine);

        let mut submitted = HashSet::new();
        for _ in 0..2000 {
            submitted.insert(engine.submit_order(Side::Sell, 9, 1, 100).unwrap());
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let mut filled = 0;
                    for _ in 0..100 {
                        filled += engine.match_incoming(9, Side::Buy, 3, 100).unwrap().filled;
                    }
                    filled
                })
            })
            .collect();
        let filled: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let mut consumed = HashSet::new();
        for trade in trades.try_iter() {
            assert_eq!(trade.quantity, 1);
            assert!(submitted.contains(&trade.resting_order_id));
            assert!(consumed.insert(trade.resting_order_id), "order traded twice");
        }

        // 2400 units of demand against 2000 units of supply drains the book
        assert_eq!(filled, 2000);
        assert_eq!(consumed.len(), 2000);
        assert_eq!(engine.depth(9, Side::Sell).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_requeue_conserves_quantity() {
        let (engine, trades) = engine_with(
            EngineConfig::default()
                .with_instruments(16)
                .with_partial_fill(PartialFillPolicy::Requeue),
        );
        let engine = Arc::new(engine);

        let mut submitted = HashSet::new();
        for _ in 0..500 {
            submitted.insert(engine.submit_order(Side::Sell, 5, 7, 100).unwrap());
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let mut filled = 0;
                    for _ in 0..200 {
                        filled += engine.match_incoming(5, Side::Buy, 3, 100).unwrap().filled;
                    }
                    filled
                })
            })
            .collect();
        let filled: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let mut traded_per_order = std::collections::HashMap::new();
        for trade in trades.try_iter() {
            assert!(submitted.contains(&trade.resting_order_id));
            *traded_per_order.entry(trade.resting_order_id).or_insert(0) += trade.quantity;
        }

        let resting = engine.registry().snapshot(5, Side::Sell).unwrap();
        let mut resting_ids = HashSet::new();
        for order in &resting {
            // A requeued remainder replaces its predecessor, never sits beside it
            assert!(resting_ids.insert(order.id), "order resting twice");
            let traded = traded_per_order.get(&order.id).copied().unwrap_or(0);
            assert_eq!(traded + order.quantity, 7);
        }
        for id in submitted.difference(&resting_ids) {
            assert_eq!(traded_per_order.get(id).copied(), Some(7));
        }

        let resting_quantity: u64 = resting.iter().map(|o| o.quantity).sum();
        assert_eq!(filled + resting_quantity, 500 * 7);
        assert_eq!(filled, traded_per_order.values().sum::<u64>());
    }

    proptest! {
        #[test]
        fn prop_trades_respect_price_and_quantity(
            resting in prop::collection::vec((1u64..=1000, 1u64..=500), 0..40),
            incoming_qty in 1u64..=1000,
            incoming_price in 1u64..=500,
            incoming_buy in any::<bool>(),
        ) {
            let (engine, _trades) = engine();
            let incoming_side = if incoming_buy { Side::Buy } else { Side::Sell };
            let resting_side = incoming_side.opposite();

            let mut originals = std::collections::HashMap::new();
            for (qty, price) in &resting {
                let id = engine.submit_order(resting_side, 4, *qty, *price).unwrap();
                originals.insert(id, (*qty, *price));
            }

            let result = engine.match_incoming(4, incoming_side, incoming_qty, incoming_price).unwrap();

            let mut remaining = incoming_qty;
            let mut seen = HashSet::new();
            for trade in &result.trades {
                let (qty, price) = originals[&trade.resting_order_id];
                prop_assert!(seen.insert(trade.resting_order_id));
                prop_assert_eq!(trade.price, price);
                prop_assert_eq!(trade.quantity, remaining.min(qty));
                prop_assert!(incoming_side.crosses(incoming_price, trade.price));
                remaining -= trade.quantity;
            }
            prop_assert_eq!(result.remaining(), remaining);
            prop_assert_eq!(
                engine.depth(4, resting_side).unwrap(),
                resting.len() - result.trades.len()
            );
        }
    }
}
