//! The decoded trade event record.
//!
//! Produced by the stream decoder, moved through one of the transports
//! unchanged, and consumed by downstream workers. Price and quantity are kept
//! as the exchange's decimal text so no floating-point rounding is introduced
//! on the hot path.

use serde::{Deserialize, Serialize};

/// A single trade print.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Exchange event time, milliseconds since Unix epoch.
    pub event_time_ms: u64,
    pub symbol: String,
    pub trade_id: u32,
    /// Decimal price as sent by the exchange.
    pub price: String,
    /// Decimal quantity as sent by the exchange.
    pub quantity: String,
    /// `true` when the buyer was the resting (maker) order.
    pub is_buyer_maker: bool,
}

impl TradeEvent {
    pub fn new(
        event_time_ms: u64,
        symbol: impl Into<String>,
        trade_id: u32,
        price: impl Into<String>,
        quantity: impl Into<String>,
        is_buyer_maker: bool,
    ) -> Self {
        Self {
            event_time_ms,
            symbol: symbol.into(),
            trade_id,
            price: price.into(),
            quantity: quantity.into(),
            is_buyer_maker,
        }
    }

    /// Aggressor side as seen by the tape: a maker buyer means a taker sell.
    pub fn side(&self) -> &'static str {
        if self.is_buyer_maker { "SELL" } else { "BUY" }
    }
}

impl std::fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade({} {} {}x{} id={})",
            self.symbol,
            self.side(),
            self.price,
            self.quantity,
            self.trade_id
        )
    }
}
