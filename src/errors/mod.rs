//! Error handling for the service

pub mod arb_error;

pub use arb_error::*;
