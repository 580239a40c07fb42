//! # feed-md
//!
//! Market data ingestion and consumption around the feed-core transports.
//!
//! ## Architecture
//!
//! ```text
//! WsConnection ──text──► binance::parse_trade ──TradeEvent──► EventSink
//!                                                               │
//!                                   (LockFreeQueue | RingBuffer)│
//!                                                               ▼
//!                                 consumer threads ◄── EventSource
//! ```
//!
//! - [`binance`]: stream URLs, subscription frames, trade decoding
//! - [`consumer`]: consumer worker loop and its report
//! - [`pipeline`]: [`pipeline::TradePipeline`] wiring it all together

pub mod binance;
pub mod consumer;
pub mod pipeline;
