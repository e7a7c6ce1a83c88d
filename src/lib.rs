//! Cross-Venue Arbitrage Scanner
//!
//! Serves cached spot quotes from an upstream aggregator, scans venue
//! tickers for fee-aware spread opportunities, scores funding-rate carry,
//! and fills accepted trades on paper behind a persistent risk gate.

pub mod config;
pub mod types;
pub mod errors;
pub mod network;
pub mod cache;
pub mod arbitrage;
pub mod risk;
pub mod execution;
pub mod storage;
pub mod api;
pub mod utils;

// Re-export commonly used items
pub use config::Config;
pub use errors::{ArbError, ArbResult};
pub use types::*;
