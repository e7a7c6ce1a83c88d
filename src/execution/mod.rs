//! Paper trade execution

pub mod dispatcher;

pub use dispatcher::*;
