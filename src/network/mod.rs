//! Upstream provider access and request pacing

pub mod provider;
pub mod rate_limit;
pub mod symbols;

pub use provider::*;
pub use rate_limit::*;
