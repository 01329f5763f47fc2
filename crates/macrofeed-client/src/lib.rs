//! HTTP client for the market-data vendor gateway.
//!
//! Implements [`macrofeed_core::client::MarketDataClient`] on top of the
//! gateway's `wsd` (dense daily series) and `edb` (economic database) calls.

mod client;
mod wire;

pub mod error;

pub use client::{ClientConfig, HttpMarketDataClient};
pub use error::{Error, Result};
