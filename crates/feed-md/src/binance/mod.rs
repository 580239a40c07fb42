//! Binance raw trade streams.
//!
//! The market-data-only endpoint serves one raw stream per connection at
//! `wss://{endpoint}:443/ws/{stream}`; extra streams are added on the same
//! connection with a SUBSCRIBE frame.

pub mod trade_parser;

pub use feed_core::config::{DEFAULT_ENDPOINT, DEFAULT_STREAM};
pub use trade_parser::parse_trade;

/// Raw-stream URL for a single stream on `endpoint`.
pub fn stream_url(endpoint: &str, stream: &str) -> String {
    format!("wss://{endpoint}:443/ws/{stream}")
}

/// SUBSCRIBE frame for `streams`, or `None` when there is nothing to add.
pub fn build_subscribe(streams: &[String], id: u64) -> Option<String> {
    if streams.is_empty() {
        return None;
    }
    Some(
        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": streams,
            "id": id
        })
        .to_string(),
    )
}
