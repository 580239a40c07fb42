//! # feed-core
//!
//! Core crate for the market feed pipeline, providing:
//!
//! - **Types** (`types`): the decoded trade event record
//! - **Lock-free queue** (`queue`): unbounded Michael–Scott MPMC queue
//! - **Ring buffer** (`ring_buffer`): bounded per-slot-locked circular buffer
//! - **Transport seams** (`transport`): producer/consumer traits over both
//! - **Error types** (`error`): domain-specific `FeedError` via thiserror
//! - **Configuration** (`config`): JSON config deserialization
//! - **Logging** (`logging`): tracing-based structured logging
//! - **WebSocket** (`ws`): WS session with auto-reconnect
//! - **CPU affinity** (`cpu_affinity`): thread-to-core pinning
//! - **Time utilities** (`time_util`): wall-clock timestamps

pub mod config;
pub mod cpu_affinity;
pub mod error;
pub mod logging;
pub mod queue;
pub mod ring_buffer;
pub mod time_util;
pub mod transport;
pub mod types;
pub mod ws;

pub use error::FeedError;
pub use queue::LockFreeQueue;
pub use ring_buffer::{RingBuffer, RingReader, RingWriter};
pub use transport::{EventSink, EventSource};
pub use types::*;
