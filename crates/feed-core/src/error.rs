//! Typed error definitions for the market feed pipeline.
//!
//! [`FeedError`] covers the few places where the pipeline can fail in a way
//! the caller should see. Transient races inside the transports are retried
//! internally and never surface here. All variants implement
//! `std::error::Error` via `thiserror`, so they compose with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the market feed pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Ring buffer constructed with a capacity outside the supported range.
    #[error("ring capacity {capacity} out of range: must be between {min} and {max}")]
    CapacityOutOfRange {
        capacity: usize,
        min: usize,
        max: usize,
    },

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Wire message could not be decoded into a trade event.
    #[error("parse error: {0}")]
    Parse(String),
}
