//! Binance `trade` event decoder.
//!
//! Handles the raw payload
//!
//! ```json
//! {"e":"trade","E":1672515782136,"s":"BNBBTC","t":12345,"p":"0.001","q":"100","T":1672515782136,"m":true,"M":true}
//! ```
//!
//! and the combined-stream wrapper `{"stream":"bnbbtc@trade","data":{...}}`.
//! Price and quantity are copied as text.

use feed_core::{FeedError, TradeEvent};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawTrade<'a> {
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: &'a str,
    #[serde(rename = "t")]
    trade_id: u64,
    #[serde(rename = "p")]
    price: &'a str,
    #[serde(rename = "q")]
    quantity: &'a str,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

/// Decode a stream message.
///
/// - `Ok(Some(_))`: a trade event
/// - `Ok(None)`: not a trade (subscription ack, other event type)
/// - `Err(FeedError::Parse)`: a trade payload that could not be decoded
pub fn parse_trade(text: &str) -> Result<Option<TradeEvent>, FeedError> {
    let v: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FeedError::Parse(format!("invalid json: {e}")))?;

    let payload = v.get("data").unwrap_or(&v);
    if payload.get("e").and_then(|e| e.as_str()) != Some("trade") {
        return Ok(None);
    }

    let raw = RawTrade::deserialize(payload)
        .map_err(|e| FeedError::Parse(format!("bad trade payload: {e}")))?;
    let trade_id = u32::try_from(raw.trade_id)
        .map_err(|_| FeedError::Parse(format!("trade id {} exceeds 32 bits", raw.trade_id)))?;

    Ok(Some(TradeEvent::new(
        raw.event_time,
        raw.symbol,
        trade_id,
        raw.price,
        raw.quantity,
        raw.is_buyer_maker,
    )))
}
