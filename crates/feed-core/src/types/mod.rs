//! Data types flowing through the transports.

pub mod trade;

pub use trade::*;
