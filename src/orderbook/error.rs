use serde::{Deserialize, Serialize};
use std::fmt;

use crate::orderbook::types::{InstrumentId, Price, Quantity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBookError {
    /// Instrument id outside the registry range
    InvalidInstrument {
        instrument_id: InstrumentId,
        instruments: usize,
    },

    /// Invalid price (zero)
    InvalidPrice,

    /// Invalid quantity (zero)
    InvalidQuantity,

    /// Order size exceeds maximum allowed
    OrderTooLarge { quantity: Quantity, max: Quantity },

    /// Price is outside allowed range
    PriceOutOfRange { price: Price, max: Price },

    /// Engine or registry configuration rejected
    InvalidConfig(String),

    /// System error
    SystemError(String),
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::InvalidInstrument {
                instrument_id,
                instruments,
            } => write!(
                f,
                "Invalid instrument {} (registry holds {})",
                instrument_id, instruments
            ),
            OrderBookError::InvalidPrice => write!(f, "Invalid price"),
            OrderBookError::InvalidQuantity => write!(f, "Invalid quantity"),
            OrderBookError::OrderTooLarge { quantity, max } => {
                write!(f, "Order size {} exceeds maximum {}", quantity, max)
            }
            OrderBookError::PriceOutOfRange { price, max } => {
                write!(f, "Price {} outside allowed range 1..={}", price, max)
            }
            OrderBookError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            OrderBookError::SystemError(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl std::error::Error for OrderBookError {}

/// Result type for order book operations
pub type OrderBookResult<T> = Result<T, OrderBookError>;
