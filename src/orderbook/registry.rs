use tracing::info;

use crate::orderbook::error::{OrderBookError, OrderBookResult};
use crate::orderbook::order_list::ConcurrentOrderList;
use crate::orderbook::types::{InstrumentId, OrderSnapshot, Side};

/// Buy and sell lists for one instrument
#[derive(Debug, Default)]
pub struct InstrumentBook {
    pub bids: ConcurrentOrderList,
    pub asks: ConcurrentOrderList,
}

impl InstrumentBook {
    pub fn side(&self, side: Side) -> &ConcurrentOrderList {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }
}

/// Fixed-size table of per-instrument books.
///
/// Built once with its final size; lookups never lock and never allocate.
#[derive(Debug)]
pub struct OrderBookRegistry {
    books: Box<[InstrumentBook]>,
}

impl OrderBookRegistry {
    pub fn new(instruments: usize) -> OrderBookResult<Self> {
        if instruments == 0 {
            return Err(OrderBookError::InvalidConfig(
                "registry needs at least one instrument".to_string(),
            ));
        }

        info!("Creating order book registry for {} instruments", instruments);

        let books = (0..instruments)
            .map(|_| InstrumentBook::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { books })
    }

    /// Look up the (buy, sell) lists of an instrument
    pub fn get(
        &self,
        instrument_id: InstrumentId,
    ) -> OrderBookResult<(&ConcurrentOrderList, &ConcurrentOrderList)> {
        let book = self.book(instrument_id)?;
        Ok((&book.bids, &book.asks))
    }

    pub fn book(&self, instrument_id: InstrumentId) -> OrderBookResult<&InstrumentBook> {
        self.books
            .get(instrument_id)
            .ok_or(OrderBookError::InvalidInstrument {
                instrument_id,
                instruments: self.books.len(),
            })
    }

    pub fn side(
        &self,
        instrument_id: InstrumentId,
        side: Side,
    ) -> OrderBookResult<&ConcurrentOrderList> {
        Ok(self.book(instrument_id)?.side(side))
    }

    /// Number of instruments
    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Point-in-time count of resting orders on one side of an instrument
    pub fn depth(&self, instrument_id: InstrumentId, side: Side) -> OrderBookResult<usize> {
        Ok(self.side(instrument_id, side)?.len())
    }

    /// Point-in-time count of resting orders across the whole registry
    pub fn resting_orders(&self) -> usize {
        self.books
            .iter()
            .map(|book| book.bids.len() + book.asks.len())
            .sum()
    }

    pub fn snapshot(
        &self,
        instrument_id: InstrumentId,
        side: Side,
    ) -> OrderBookResult<Vec<OrderSnapshot>> {
        Ok(self.side(instrument_id, side)?.snapshot())
    }
}
