use crossbeam::channel::Sender;
use tracing::{info, warn};

use crate::orderbook::types::Trade;

/// Receives every trade the engine executes, on the matching thread, right
/// after the trade completes.
pub trait TradeSink: Send + Sync {
    fn on_trade(&self, trade: &Trade);
}

impl<F> TradeSink for F
where
    F: Fn(&Trade) + Send + Sync,
{
    fn on_trade(&self, trade: &Trade) {
        self(trade)
    }
}

/// Writes one log line per trade
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl TradeSink for LoggingSink {
    fn on_trade(&self, trade: &Trade) {
        info!(
            "[TRADE] instrument={} price={} qty={}",
            trade.instrument_id, trade.price, trade.quantity
        );
    }
}

/// Drops every trade
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TradeSink for NullSink {
    fn on_trade(&self, _trade: &Trade) {}
}

/// Forwards trades to a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Trade>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Trade>) -> Self {
        Self { sender }
    }
}

impl TradeSink for ChannelSink {
    fn on_trade(&self, trade: &Trade) {
        if self.sender.send(trade.clone()).is_err() {
            warn!("Trade receiver dropped, trade {} not delivered", trade.id);
        }
    }
}
