//! Open-addressing SUM table for a single INTEGER grouping key
//!
//! Keys and values live in two parallel arrays. Inserts probe linearly from
//! `hash(key)`, and batches are processed `SIMD_WIDTH` lanes at a time so
//! that the slot loads for a whole round are done with one gather.
//!
//! `EMPTY_KEY` marks a free slot, so that key is accumulated in a separate
//! slot outside the arrays.

use super::simd::{self, SIMD_WIDTH};
use super::standard::paired_rows;
use super::{AggregateHashTable, Scanner};
use crate::common::{AttrType, Chunk, Column, StreamState, Value};
use crate::expr::AggregateFunction;
use crate::error::{QueryError, Result};
use std::fmt;
use tracing::{debug, warn};

/// Marker stored in free key slots
pub const EMPTY_KEY: i32 = -1;

/// Slot count of a table created without an explicit capacity
pub const DEFAULT_CAPACITY: usize = 16384;

/// Value type a linear-probing table can sum
pub trait ProbeValue: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    const ATTR_TYPE: AttrType;

    fn column_values(column: &Column) -> Option<&[Self]>;

    fn sum(&mut self, other: Self);

    fn into_value(self) -> Value;
}

impl ProbeValue for i32 {
    const ATTR_TYPE: AttrType = AttrType::Integer;

    fn column_values(column: &Column) -> Option<&[Self]> {
        column.as_integers()
    }

    fn sum(&mut self, other: Self) {
        *self = self.wrapping_add(other);
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl ProbeValue for f32 {
    const ATTR_TYPE: AttrType = AttrType::Float;

    fn column_values(column: &Column) -> Option<&[Self]> {
        column.as_floats()
    }

    fn sum(&mut self, other: Self) {
        *self += other;
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

/// Probe state of one input pair while it searches for its slot
#[derive(Debug, Clone, Copy, Default)]
struct Lane<V> {
    pending: bool,
    probe_offset: i32,
    key: i32,
    value: V,
    slot: usize,
}

impl<V> Lane<V> {
    fn release(&mut self) {
        self.pending = false;
        self.probe_offset = 0;
    }
}

#[derive(Debug)]
pub struct LinearProbingHashTable<V: ProbeValue> {
    keys: Vec<i32>,
    values: Vec<V>,
    capacity: usize,
    /// Occupied array slots; the out-of-band `EMPTY_KEY` entry is not counted
    size: usize,
    aggregate: AggregateFunction,
    empty_key_value: Option<V>,
}

impl<V: ProbeValue> Default for LinearProbingHashTable<V> {
    fn default() -> Self {
        Self::allocate(AggregateFunction::Sum, DEFAULT_CAPACITY)
    }
}

impl<V: ProbeValue> LinearProbingHashTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for `aggregate` with at least `initial_capacity` slots.
    ///
    /// Capacity is rounded up to a power of two. Only SUM is supported.
    pub fn try_new(aggregate: AggregateFunction, initial_capacity: usize) -> Result<Self> {
        if aggregate != AggregateFunction::Sum {
            return Err(QueryError::InvalidArgument(format!(
                "linear probing hash table only supports SUM, got {}",
                aggregate
            )));
        }
        Ok(Self::allocate(aggregate, initial_capacity))
    }

    fn allocate(aggregate: AggregateFunction, initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(SIMD_WIDTH).next_power_of_two();
        Self {
            keys: vec![EMPTY_KEY; capacity],
            values: vec![V::default(); capacity],
            capacity,
            size: 0,
            aggregate,
            empty_key_value: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied array slots
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn hash(&self, key: i32) -> usize {
        let capacity = self.capacity as i64;
        (((key as i64 % capacity) + capacity) % capacity) as usize
    }

    fn aggregate_into(aggregate: AggregateFunction, slot: &mut V, value: V) {
        match aggregate {
            AggregateFunction::Sum => slot.sum(value),
            other => panic!("unsupported aggregate type: {}", other),
        }
    }

    fn accumulate_empty_key(&mut self, value: V) {
        match self.empty_key_value.as_mut() {
            Some(slot) => Self::aggregate_into(self.aggregate, slot, value),
            None => self.empty_key_value = Some(value),
        }
    }

    /// Fold `(keys[i], values[i])` pairs into the table, growing it as needed.
    pub fn add_batch(&mut self, keys: &[i32], values: &[V]) -> Result<()> {
        if keys.len() != values.len() {
            return Err(QueryError::InvalidArgument(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }

        // each piece fits in the free half of the table, so probing always
        // finds an empty slot
        let mut start = 0;
        while start < keys.len() {
            let end = (start + self.capacity / 2).min(keys.len());
            self.add_batch_lanes(&keys[start..end], &values[start..end]);
            self.resize_if_need();
            start = end;
        }
        Ok(())
    }

    fn add_batch_lanes(&mut self, keys: &[i32], values: &[V]) {
        let len = keys.len();
        let mut lanes = [Lane::<V>::default(); SIMD_WIDTH];
        let mut next = 0;

        while next + SIMD_WIDTH <= len {
            // load
            for lane in lanes.iter_mut().filter(|lane| !lane.pending) {
                while next < len {
                    let (key, value) = (keys[next], values[next]);
                    next += 1;
                    if key == EMPTY_KEY {
                        self.accumulate_empty_key(value);
                        continue;
                    }
                    *lane = Lane {
                        pending: true,
                        probe_offset: 0,
                        key,
                        value,
                        slot: 0,
                    };
                    break;
                }
            }

            // hash
            for lane in lanes.iter_mut().filter(|lane| lane.pending) {
                lane.slot = self.hash(lane.key.wrapping_add(lane.probe_offset));
            }

            // direct hit
            for lane in lanes.iter_mut().filter(|lane| lane.pending) {
                if self.keys[lane.slot] == lane.key {
                    Self::aggregate_into(self.aggregate, &mut self.values[lane.slot], lane.value);
                    lane.release();
                }
            }

            // gather
            let mut indices = [0i32; SIMD_WIDTH];
            for (index, lane) in indices.iter_mut().zip(lanes.iter()) {
                if lane.pending {
                    *index = lane.slot as i32;
                }
            }
            let table_keys = simd::gather_i32(&self.keys, &indices);

            // resolve
            for (lane, &table_key) in lanes.iter_mut().zip(table_keys.iter()) {
                if !lane.pending {
                    continue;
                }
                // a lane earlier in this round may have claimed the slot
                let current = if table_key == EMPTY_KEY {
                    self.keys[lane.slot]
                } else {
                    table_key
                };
                if current == EMPTY_KEY {
                    self.keys[lane.slot] = lane.key;
                    self.values[lane.slot] = lane.value;
                    self.size += 1;
                    lane.release();
                } else if current == lane.key {
                    Self::aggregate_into(self.aggregate, &mut self.values[lane.slot], lane.value);
                    lane.release();
                } else {
                    lane.probe_offset += 1;
                }
            }
        }

        for lane in lanes.iter().filter(|lane| lane.pending) {
            self.insert_scalar(lane.key, lane.value);
        }
        for (&key, &value) in keys[next..].iter().zip(&values[next..]) {
            self.insert_scalar(key, value);
        }
    }

    fn insert_scalar(&mut self, key: i32, value: V) {
        if key == EMPTY_KEY {
            self.accumulate_empty_key(value);
            return;
        }
        let mut slot = self.hash(key);
        loop {
            match self.keys[slot] {
                EMPTY_KEY => {
                    self.keys[slot] = key;
                    self.values[slot] = value;
                    self.size += 1;
                    return;
                }
                k if k == key => {
                    Self::aggregate_into(self.aggregate, &mut self.values[slot], value);
                    return;
                }
                _ => slot = (slot + 1) % self.capacity,
            }
        }
    }

    /// Double the capacity once the table is half full
    pub fn resize_if_need(&mut self) {
        if self.size >= self.capacity / 2 {
            self.resize(self.capacity * 2);
        }
    }

    fn resize(&mut self, new_capacity: usize) {
        debug!(
            from = self.capacity,
            to = new_capacity,
            size = self.size,
            "Resizing linear probing hash table"
        );
        let old_keys = std::mem::replace(&mut self.keys, vec![EMPTY_KEY; new_capacity]);
        let old_values = std::mem::replace(&mut self.values, vec![V::default(); new_capacity]);
        self.capacity = new_capacity;

        for (key, value) in old_keys.into_iter().zip(old_values) {
            if key == EMPTY_KEY {
                continue;
            }
            let mut slot = self.hash(key);
            while self.keys[slot] != EMPTY_KEY {
                slot = (slot + 1) % self.capacity;
            }
            self.keys[slot] = key;
            self.values[slot] = value;
        }
    }

    /// Running sum for `key`
    pub fn get(&self, key: i32) -> Result<V> {
        let not_found = || QueryError::NotFound(format!("key {}", key));
        if key == EMPTY_KEY {
            return self.empty_key_value.ok_or_else(not_found);
        }

        let mut slot = self.hash(key);
        for _ in 0..self.capacity {
            match self.keys[slot] {
                EMPTY_KEY => break,
                k if k == key => return Ok(self.values[slot]),
                _ => slot = (slot + 1) % self.capacity,
            }
        }
        Err(not_found())
    }

    /// Entry stored at array slot `pos`, if occupied
    fn slot_entry(&self, pos: usize) -> Option<(i32, V)> {
        match self.keys[pos] {
            EMPTY_KEY => None,
            key => Some((key, self.values[pos])),
        }
    }

    /// All `(key, sum)` entries in slot order, the `EMPTY_KEY` entry last
    pub fn iter(&self) -> impl Iterator<Item = (i32, V)> + '_ {
        (0..self.capacity)
            .filter_map(|pos| self.slot_entry(pos))
            .chain(self.empty_key_value.map(|v| (EMPTY_KEY, v)))
    }
}

impl<V: ProbeValue> AggregateHashTable for LinearProbingHashTable<V> {
    fn add_chunk(&mut self, groups_chunk: &Chunk, aggrs_chunk: &Chunk) -> Result<()> {
        if groups_chunk.column_num() != 1 || aggrs_chunk.column_num() != 1 {
            warn!(
                group_columns = groups_chunk.column_num(),
                value_columns = aggrs_chunk.column_num(),
                "Linear probing hash table needs exactly one key and one value column"
            );
            return Err(QueryError::InvalidArgument(format!(
                "expected 1 key and 1 value column, got {} and {}",
                groups_chunk.column_num(),
                aggrs_chunk.column_num()
            )));
        }
        paired_rows(groups_chunk, aggrs_chunk)?;

        let key_column = groups_chunk.column(0);
        let keys = key_column.as_integers().ok_or_else(|| {
            QueryError::InvalidArgument(format!(
                "key column must be INTEGER, got {}",
                key_column.attr_type()
            ))
        })?;
        let value_column = aggrs_chunk.column(0);
        let values = V::column_values(value_column).ok_or_else(|| {
            QueryError::InvalidArgument(format!(
                "value column must be {}, got {}",
                V::ATTR_TYPE,
                value_column.attr_type()
            ))
        })?;

        self.add_batch(keys, values)
    }

    fn scanner(&self) -> Box<dyn Scanner + '_> {
        Box::new(LinearProbingScanner {
            table: self,
            scan_pos: 0,
            scan_count: 0,
            empty_key_done: false,
        })
    }

    fn len(&self) -> usize {
        self.size + usize::from(self.empty_key_value.is_some())
    }

    fn name(&self) -> &str {
        "LinearProbingHashTable"
    }
}

struct LinearProbingScanner<'a, V: ProbeValue> {
    table: &'a LinearProbingHashTable<V>,
    scan_pos: usize,
    scan_count: usize,
    empty_key_done: bool,
}

impl<V: ProbeValue> Scanner for LinearProbingScanner<'_, V> {
    fn next(&mut self, output: &mut Chunk) -> Result<StreamState> {
        if output.column_num() != 2 {
            return Err(QueryError::InvalidArgument(format!(
                "output chunk must have 2 columns, got {}",
                output.column_num()
            )));
        }

        let table = self.table;
        let limit = output.capacity().max(1);
        let mut appended = 0;

        while appended < limit && self.scan_pos < table.capacity && self.scan_count < table.size {
            let pos = self.scan_pos;
            self.scan_pos += 1;
            if let Some((key, value)) = table.slot_entry(pos) {
                output.column_mut(0).append_value(&Value::Integer(key))?;
                output.column_mut(1).append_value(&value.into_value())?;
                self.scan_count += 1;
                appended += 1;
            }
        }

        let slots_done = self.scan_pos >= table.capacity || self.scan_count >= table.size;
        if slots_done && appended < limit && !self.empty_key_done {
            if let Some(value) = table.empty_key_value {
                output.column_mut(0).append_value(&Value::Integer(EMPTY_KEY))?;
                output.column_mut(1).append_value(&value.into_value())?;
                appended += 1;
            }
            self.empty_key_done = true;
        }

        if appended == 0 {
            Ok(StreamState::EndOfStream)
        } else {
            Ok(StreamState::Ready)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn pair_chunks(keys: Vec<i32>, values: Column) -> (Chunk, Chunk) {
        (
            Chunk::from_columns(vec![Column::from(keys)]).unwrap(),
            Chunk::from_columns(vec![values]).unwrap(),
        )
    }

    fn scan_all<V: ProbeValue>(table: &LinearProbingHashTable<V>, step: usize) -> Vec<(i32, Value)> {
        let mut rows = Vec::new();
        let mut scanner = table.scanner();
        loop {
            let mut output = Chunk::with_capacity(step);
            output.add_column(Column::new(AttrType::Integer).unwrap()).unwrap();
            output.add_column(Column::new(V::ATTR_TYPE).unwrap()).unwrap();
            if scanner.next(&mut output).unwrap() == StreamState::EndOfStream {
                break;
            }
            for r in 0..output.rows() {
                rows.push((output.get_value(0, r).get_int(), output.get_value(1, r)));
            }
        }
        rows
    }

    #[test]
    fn test_same_key_accumulates() {
        let mut table = LinearProbingHashTable::<i32>::new();
        table.add_batch(&[42], &[3]).unwrap();
        table.add_batch(&[42], &[4]).unwrap();
        assert_eq!(table.get(42).unwrap(), 7);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn test_many_keys_trigger_resize() {
        let mut table = LinearProbingHashTable::<i32>::new();
        assert_eq!(table.capacity(), DEFAULT_CAPACITY);

        let keys: Vec<i32> = (0..20000).collect();
        let (groups, values) = pair_chunks(keys, Column::from(vec![1; 20000]));
        table.add_chunk(&groups, &values).unwrap();

        assert!(table.capacity() > DEFAULT_CAPACITY);
        assert_eq!(table.size(), 20000);
        assert!(table.size() < table.capacity() / 2);
        for k in 0..20000 {
            assert_eq!(table.get(k).unwrap(), 1, "key {}", k);
        }
    }

    #[test]
    fn test_duplicate_keys_within_one_round() {
        let mut table = LinearProbingHashTable::<i32>::new();
        table.add_batch(&[5; 16], &[1; 16]).unwrap();
        assert_eq!(table.size(), 1);
        assert_eq!(table.get(5).unwrap(), 16);
    }

    #[test]
    fn test_colliding_and_negative_keys() {
        let mut table = LinearProbingHashTable::<f32>::try_new(AggregateFunction::Sum, 16).unwrap();
        // all of these hash to slot 3 of a 16 slot table
        let keys = [3, 19, 35, -13, 3, 19, 51, -29, 3];
        let values = [1.0f32; 9];
        table.add_batch(&keys, &values).unwrap();

        assert_eq!(table.get(3).unwrap(), 3.0);
        assert_eq!(table.get(19).unwrap(), 2.0);
        assert_eq!(table.get(-13).unwrap(), 1.0);
        assert_eq!(table.get(-29).unwrap(), 1.0);
        assert_eq!(table.size(), 6);
    }

    #[test]
    fn test_empty_key_marker_is_a_valid_key() {
        let mut table = LinearProbingHashTable::<i32>::new();
        let keys = vec![-1, 7, -1, 7, -1, 0, 1, 2, 3, 4];
        table.add_batch(&keys, &[10; 10]).unwrap();

        assert_eq!(table.get(EMPTY_KEY).unwrap(), 30);
        assert_eq!(table.get(7).unwrap(), 20);
        assert_eq!(table.size(), 6);
        assert_eq!(table.len(), 7);

        let rows = scan_all(&table, 1024);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows.last().unwrap(), &(EMPTY_KEY, Value::Integer(30)));
    }

    #[test]
    fn test_get_missing_key() {
        let mut table = LinearProbingHashTable::<i32>::new();
        table.add_batch(&[1, 2, 3], &[1, 1, 1]).unwrap();
        assert!(matches!(table.get(4), Err(QueryError::NotFound(_))));
        assert!(matches!(table.get(EMPTY_KEY), Err(QueryError::NotFound(_))));
    }

    #[test]
    fn test_matches_reference_map() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut table = LinearProbingHashTable::<i32>::try_new(AggregateFunction::Sum, 64).unwrap();
        let mut expected: BTreeMap<i32, i32> = BTreeMap::new();

        for _ in 0..20 {
            let keys: Vec<i32> = (0..500).map(|_| rng.gen_range(-300..300)).collect();
            let values: Vec<i32> = (0..500).map(|_| rng.gen_range(0..100)).collect();
            for (k, v) in keys.iter().zip(&values) {
                *expected.entry(*k).or_default() += v;
            }
            table.add_batch(&keys, &values).unwrap();
        }

        let actual: BTreeMap<i32, i32> = table.iter().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_scan_round_trip() {
        let mut table = LinearProbingHashTable::<f32>::new();
        let keys: Vec<i32> = (0..100).map(|k| k * 7 - 50).collect();
        let values: Vec<f32> = (0..100).map(|v| v as f32 * 0.5).collect();
        table.add_batch(&keys, &values).unwrap();

        let rows = scan_all(&table, 16);
        assert_eq!(rows.len(), 100);

        let mut copy = LinearProbingHashTable::<f32>::new();
        let (copy_keys, copy_values): (Vec<i32>, Vec<f32>) =
            rows.iter().map(|(k, v)| (*k, v.get_float())).unzip();
        copy.add_batch(&copy_keys, &copy_values).unwrap();

        assert_eq!(copy.len(), table.len());
        for k in &keys {
            assert_eq!(copy.get(*k).unwrap(), table.get(*k).unwrap());
        }
    }

    #[test]
    fn test_rejects_non_sum() {
        let err = LinearProbingHashTable::<i32>::try_new(AggregateFunction::Max, 16).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_rejects_bad_chunks() {
        let mut table = LinearProbingHashTable::<i32>::new();

        let two_keys = Chunk::from_columns(vec![Column::from(vec![1]), Column::from(vec![2])]).unwrap();
        let values = Chunk::from_columns(vec![Column::from(vec![1])]).unwrap();
        assert!(matches!(
            table.add_chunk(&two_keys, &values),
            Err(QueryError::InvalidArgument(_))
        ));

        let (string_keys, values) = (
            Chunk::from_columns(vec![Column::from(vec!["a"])]).unwrap(),
            Chunk::from_columns(vec![Column::from(vec![1])]).unwrap(),
        );
        assert!(matches!(
            table.add_chunk(&string_keys, &values),
            Err(QueryError::InvalidArgument(_))
        ));

        let (keys, float_values) = pair_chunks(vec![1], Column::from(vec![1.0f32]));
        assert!(matches!(
            table.add_chunk(&keys, &float_values),
            Err(QueryError::InvalidArgument(_))
        ));

        let (keys, short_values) = pair_chunks(vec![1, 2], Column::from(vec![1]));
        assert!(matches!(
            table.add_chunk(&keys, &short_values),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(table.is_empty());
    }
}
