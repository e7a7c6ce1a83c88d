//! Quote caching, request coalescing, and data quality classification

pub mod layer;
pub mod quality;

pub use layer::*;
pub use quality::*;
