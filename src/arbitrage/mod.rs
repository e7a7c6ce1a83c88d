//! Opportunity detection and pricing

pub mod fees;
pub mod funding;
pub mod scanner;

pub use fees::*;
pub use funding::*;
pub use scanner::*;
