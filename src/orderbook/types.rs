use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub type OrderId = Uuid;
pub type InstrumentId = usize;
pub type Price = u64; // Price in ticks
pub type Quantity = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether an incoming order on this side at `limit` may execute against a
    /// resting opposite-side order priced at `resting`.
    pub fn crosses(self, limit: Price, resting: Price) -> bool {
        match self {
            Side::Buy => resting <= limit,
            Side::Sell => resting >= limit,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A resting order. Everything except the quantity is fixed at construction.
///
/// The quantity is atomic so that matchers walking the list can snapshot it
/// while the record is resting; it is only written by the thread that won the
/// removal of the record.
#[derive(Debug)]
pub struct OrderRecord {
    pub id: OrderId,
    pub side: Side,
    pub instrument_id: InstrumentId,
    pub price: Price,
    quantity: AtomicU64,
}

impl OrderRecord {
    pub fn new(side: Side, instrument_id: InstrumentId, quantity: Quantity, price: Price) -> Self {
        Self::with_id(Uuid::new_v4(), side, instrument_id, quantity, price)
    }

    pub(crate) fn with_id(
        id: OrderId,
        side: Side,
        instrument_id: InstrumentId,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        Self {
            id,
            side,
            instrument_id,
            price,
            quantity: AtomicU64::new(quantity),
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity.load(Ordering::Acquire)
    }

    /// Consume up to `quantity` and return the amount actually taken.
    pub(crate) fn fill(&self, quantity: Quantity) -> Quantity {
        let mut current = self.quantity.load(Ordering::Acquire);
        loop {
            let take = quantity.min(current);
            match self.quantity.compare_exchange_weak(
                current,
                current - take,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_dead(&self) -> bool {
        self.quantity() == 0
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            side: self.side,
            instrument_id: self.instrument_id,
            price: self.price,
            quantity: self.quantity(),
        }
    }
}

/// Point-in-time copy of a resting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub side: Side,
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub quantity: Quantity,
    pub aggressor_side: Side,
    pub resting_order_id: OrderId,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        instrument_id: InstrumentId,
        price: Price,
        quantity: Quantity,
        aggressor_side: Side,
        resting_order_id: OrderId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument_id,
            price,
            quantity,
            aggressor_side,
            resting_order_id,
            timestamp: Utc::now(),
        }
    }

    pub fn notional(&self) -> u64 {
        self.price.saturating_mul(self.quantity)
    }
}
