//! Physical execution module
//!
//! Pull-based operators exchanging chunks through `open` / `next` / `close`

pub mod operators;
mod plan;

pub use operators::*;
pub use plan::*;
