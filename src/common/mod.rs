//! Data model shared by every component: typed values, schemas and chunks

mod chunk;
mod schema;
mod value;

pub use chunk::*;
pub use schema::*;
pub use value::{AttrType, Value};
pub(crate) use value::type_mismatch;

/// Outcome of a successful pull from an operator or scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The output chunk holds the produced rows
    Ready,
    /// No more rows; the output chunk is left untouched
    EndOfStream,
}
