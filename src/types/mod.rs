//! Core data types and structures

pub mod quote;
pub mod arbitrage;
pub mod execution;
pub mod risk;
pub mod metrics;
pub mod health;

pub use quote::*;
pub use arbitrage::*;
pub use execution::*;
pub use risk::*;
pub use metrics::*;
pub use health::*;
