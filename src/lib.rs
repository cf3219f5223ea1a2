//! Vectorized grouped-aggregation engine
//!
//! Pull-based operators exchange columnar chunks; grouped aggregation folds
//! its input into an aggregate hash table, either a generic table over
//! arbitrary key tuples or a SIMD linear-probing table for a single integer
//! key summed into one value.

pub mod common;
pub mod datagen;
pub mod error;
pub mod execution;
pub mod expr;
pub mod physical;

// Re-export main types
pub use common::{AttrType, Chunk, Column, Schema, SchemaField, StreamState, Value};
pub use error::{QueryError, Result};
pub use execution::{EngineConfig, ExecutionContext, QueryResult};
pub use expr::{AggregateExpr, AggregateFunction, Expr, HashTableStrategy};
pub use physical::{display_plan, PhysicalOperator, Transaction};
