use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::orderbook::error::{OrderBookError, OrderBookResult};
use crate::orderbook::types::{InstrumentId, Price, Quantity};

pub const DEFAULT_INSTRUMENTS: usize = 1024;
pub const DEFAULT_MAX_QUANTITY: Quantity = 1000;
pub const DEFAULT_MAX_PRICE: Price = 500;

/// What happens to the unfilled part of a resting order consumed by a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFillPolicy {
    /// The resting order leaves the book whole; any remainder is dropped.
    #[default]
    Discard,
    /// The remainder goes back to the head of the list under the same order id.
    Requeue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub instruments: usize,
    pub max_quantity: Quantity,
    pub max_price: Price,
    pub partial_fill: PartialFillPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: DEFAULT_INSTRUMENTS,
            max_quantity: DEFAULT_MAX_QUANTITY,
            max_price: DEFAULT_MAX_PRICE,
            partial_fill: PartialFillPolicy::Discard,
        }
    }
}

impl EngineConfig {
    pub fn with_instruments(mut self, instruments: usize) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn with_max_quantity(mut self, max_quantity: Quantity) -> Self {
        self.max_quantity = max_quantity;
        self
    }

    pub fn with_max_price(mut self, max_price: Price) -> Self {
        self.max_price = max_price;
        self
    }

    pub fn with_partial_fill(mut self, policy: PartialFillPolicy) -> Self {
        self.partial_fill = policy;
        self
    }

    pub fn validate(&self) -> OrderBookResult<()> {
        if self.instruments == 0 {
            return Err(OrderBookError::InvalidConfig(
                "instruments must be positive".to_string(),
            ));
        }
        if self.max_quantity == 0 {
            return Err(OrderBookError::InvalidConfig(
                "max_quantity must be positive".to_string(),
            ));
        }
        if self.max_price == 0 {
            return Err(OrderBookError::InvalidConfig(
                "max_price must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> OrderBookResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OrderBookError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> OrderBookResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            OrderBookError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Reject order parameters outside the configured bounds
    pub fn validate_order(
        &self,
        instrument_id: InstrumentId,
        quantity: Quantity,
        price: Price,
    ) -> OrderBookResult<()> {
        if instrument_id >= self.instruments {
            return Err(OrderBookError::InvalidInstrument {
                instrument_id,
                instruments: self.instruments,
            });
        }
        if quantity == 0 {
            return Err(OrderBookError::InvalidQuantity);
        }
        if quantity > self.max_quantity {
            return Err(OrderBookError::OrderTooLarge {
                quantity,
                max: self.max_quantity,
            });
        }
        if price == 0 {
            return Err(OrderBookError::InvalidPrice);
        }
        if price > self.max_price {
            return Err(OrderBookError::PriceOutOfRange {
                price,
                max: self.max_price,
            });
        }
        Ok(())
    }
}
