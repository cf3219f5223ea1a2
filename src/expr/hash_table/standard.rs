//! Generic grouping table over arbitrary key and value tuples

use super::{AggregateHashTable, Scanner};
use crate::common::{Chunk, StreamState, Value};
use crate::error::{QueryError, Result};
use hashbrown::hash_map::{Entry, Iter};
use hashbrown::HashMap;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// Grouping key: one value per grouping column
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupKey(Vec<Value>);

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // XOR of the per-element hashes of each value's display form;
        // equality stays element-wise and ordered
        let combined = self
            .0
            .iter()
            .fold(0u64, |acc, v| acc ^ hash_bytes(v.to_string().as_bytes()));
        combined.hash(state);
    }
}

/// FNV-1a
#[inline(always)]
fn hash_bytes(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Add `value` into `slot` when the slot is numeric. STRING, DATE and
/// BOOLEAN slots keep the value they were inserted with.
fn fold_slot(slot: &mut Value, value: &Value) {
    match slot {
        Value::Integer(sum) => *sum = value.get_int().wrapping_add(*sum),
        Value::Float(sum) => *sum += value.get_float(),
        _ => {}
    }
}

/// Rows to read from a grouping/value chunk pair. A chunk without columns
/// places no constraint on the row count.
pub(super) fn paired_rows(groups_chunk: &Chunk, aggrs_chunk: &Chunk) -> Result<usize> {
    match (groups_chunk.column_num(), aggrs_chunk.column_num()) {
        (0, _) => Ok(aggrs_chunk.rows()),
        (_, 0) => Ok(groups_chunk.rows()),
        _ if groups_chunk.rows() != aggrs_chunk.rows() => {
            warn!(
                group_rows = groups_chunk.rows(),
                value_rows = aggrs_chunk.rows(),
                "Rejecting chunks with mismatched row counts"
            );
            Err(QueryError::InvalidArgument(format!(
                "grouping chunk has {} rows but value chunk has {}",
                groups_chunk.rows(),
                aggrs_chunk.rows()
            )))
        }
        _ => Ok(groups_chunk.rows()),
    }
}

#[derive(Debug, Default)]
pub struct StandardAggregateHashTable {
    groups: HashMap<GroupKey, Vec<Value>>,
}

impl StandardAggregateHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored aggregate tuple for `key`
    pub fn get(&self, key: &[Value]) -> Option<&[Value]> {
        self.groups.get(&GroupKey(key.to_vec())).map(Vec::as_slice)
    }
}

impl AggregateHashTable for StandardAggregateHashTable {
    fn add_chunk(&mut self, groups_chunk: &Chunk, aggrs_chunk: &Chunk) -> Result<()> {
        let rows = paired_rows(groups_chunk, aggrs_chunk)?;

        for row in 0..rows {
            let key = GroupKey(
                groups_chunk
                    .columns()
                    .iter()
                    .map(|c| c.get_value(row))
                    .collect(),
            );
            let values = aggrs_chunk.columns().iter().map(|c| c.get_value(row));

            match self.groups.entry(key) {
                Entry::Occupied(mut entry) => {
                    for (slot, value) in entry.get_mut().iter_mut().zip(values) {
                        fold_slot(slot, &value);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(values.collect());
                }
            }
        }
        Ok(())
    }

    fn scanner(&self) -> Box<dyn Scanner + '_> {
        Box::new(StandardScanner {
            iter: self.groups.iter(),
        })
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn name(&self) -> &str {
        "StandardAggregateHashTable"
    }
}

struct StandardScanner<'a> {
    iter: Iter<'a, GroupKey, Vec<Value>>,
}

impl Scanner for StandardScanner<'_> {
    fn next(&mut self, output: &mut Chunk) -> Result<StreamState> {
        let limit = output.capacity().max(1);
        let mut appended = 0;

        while appended < limit {
            let Some((key, values)) = self.iter.next() else {
                break;
            };
            let width = key.0.len() + values.len();
            if output.column_num() != width {
                return Err(QueryError::InvalidArgument(format!(
                    "output chunk has {} columns, entries have {}",
                    output.column_num(),
                    width
                )));
            }
            for (i, value) in key.0.iter().chain(values.iter()).enumerate() {
                output.column_mut(i).append_value(value)?;
            }
            appended += 1;
        }

        if appended == 0 {
            Ok(StreamState::EndOfStream)
        } else {
            Ok(StreamState::Ready)
        }
    }
}
