//! Physical operators

mod aggregate;
mod group_by;
mod scan;

pub use aggregate::AggregateVecExec;
pub use group_by::GroupByVecExec;
pub use scan::{MemoryTable, MemoryTableExec};
