//! Aggregate hash tables: grouping key → running aggregate values
//!
//! Two implementations share the `AggregateHashTable` trait:
//! - `StandardAggregateHashTable` accepts any number of grouping and value
//!   columns of any type
//! - `LinearProbingHashTable` handles one INTEGER key with one SUM value and
//!   probes in SIMD-width lanes

mod linear_probing;
mod simd;
mod standard;

pub use linear_probing::{LinearProbingHashTable, ProbeValue, DEFAULT_CAPACITY, EMPTY_KEY};
pub use simd::SIMD_WIDTH;
pub use standard::StandardAggregateHashTable;

use super::AggregateFunction;
use crate::common::{AttrType, Chunk, StreamState};
use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Table keyed by grouping values, holding one running value per aggregate
pub trait AggregateHashTable: fmt::Debug + Send {
    /// Fold one chunk of grouping columns and the matching value columns into
    /// the table. Both chunks must have the same row count.
    fn add_chunk(&mut self, groups_chunk: &Chunk, aggrs_chunk: &Chunk) -> Result<()>;

    /// Scanner positioned at the first stored entry
    fn scanner(&self) -> Box<dyn Scanner + '_>;

    /// Number of distinct groups
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self) -> &str;
}

/// Cursor over the entries of an `AggregateHashTable`
pub trait Scanner {
    /// Append up to `output.capacity()` entries to `output`, grouping columns
    /// first. Returns `EndOfStream` once no entry was appended.
    fn next(&mut self, output: &mut Chunk) -> Result<StreamState>;
}

/// Which table `create_hash_table` builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashTableStrategy {
    /// Linear probing when the shape allows it, standard otherwise
    #[default]
    Auto,
    Standard,
    LinearProbing,
}

impl fmt::Display for HashTableStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashTableStrategy::Auto => write!(f, "auto"),
            HashTableStrategy::Standard => write!(f, "standard"),
            HashTableStrategy::LinearProbing => write!(f, "linear_probing"),
        }
    }
}

impl FromStr for HashTableStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(HashTableStrategy::Auto),
            "standard" => Ok(HashTableStrategy::Standard),
            "linear_probing" | "linear" => Ok(HashTableStrategy::LinearProbing),
            other => Err(format!("unknown hash table strategy: {}", other)),
        }
    }
}

/// Whether the linear-probing table can hold this grouping shape
fn supports_linear_probing(
    group_types: &[AttrType],
    aggregates: &[AggregateFunction],
    value_types: &[AttrType],
) -> bool {
    matches!(group_types, [AttrType::Integer])
        && matches!(aggregates, [AggregateFunction::Sum])
        && matches!(value_types, [AttrType::Integer] | [AttrType::Float])
}

/// Build the table for a grouping shape.
///
/// `aggregates` and `value_types` are parallel: one entry per value column.
pub fn create_hash_table(
    strategy: HashTableStrategy,
    initial_capacity: usize,
    group_types: &[AttrType],
    aggregates: &[AggregateFunction],
    value_types: &[AttrType],
) -> Result<Box<dyn AggregateHashTable>> {
    if aggregates.len() != value_types.len() {
        return Err(QueryError::InvalidArgument(format!(
            "{} aggregates but {} value columns",
            aggregates.len(),
            value_types.len()
        )));
    }

    let linear = supports_linear_probing(group_types, aggregates, value_types);
    let use_linear = match strategy {
        HashTableStrategy::Standard => false,
        HashTableStrategy::Auto => linear,
        HashTableStrategy::LinearProbing if linear => true,
        HashTableStrategy::LinearProbing => {
            return Err(QueryError::InvalidArgument(format!(
                "linear probing requires one INTEGER key and one SUM over INTEGER or FLOAT, \
                 got keys {:?} and aggregates {:?} over {:?}",
                group_types, aggregates, value_types
            )))
        }
    };

    if !use_linear {
        debug!(keys = group_types.len(), values = value_types.len(), "Using standard hash table");
        return Ok(Box::new(StandardAggregateHashTable::new()));
    }

    debug!(initial_capacity, value_type = %value_types[0], "Using linear probing hash table");
    match value_types[0] {
        AttrType::Float => Ok(Box::new(LinearProbingHashTable::<f32>::try_new(
            AggregateFunction::Sum,
            initial_capacity,
        )?)),
        _ => Ok(Box::new(LinearProbingHashTable::<i32>::try_new(
            AggregateFunction::Sum,
            initial_capacity,
        )?)),
    }
}
