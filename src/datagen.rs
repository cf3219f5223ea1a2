//! Synthetic grouped data generator
//!
//! Produces a `sales` table with a bounded number of distinct group keys:
//!
//! | column   | type    |
//! |----------|---------|
//! | k        | Int32   |
//! | region   | Utf8    |
//! | quantity | Int32   |
//! | price    | Float32 |
//! | day      | Date32  |

use crate::error::Result;
use arrow::array::{Date32Array, Float32Array, Int32Array, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rand::prelude::*;
use std::sync::Arc;

const REGIONS: [&str; 5] = ["AFRICA", "AMERICA", "ASIA", "EUROPE", "MIDDLE EAST"];

pub fn sales_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("k", DataType::Int32, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("quantity", DataType::Int32, false),
        Field::new("price", DataType::Float32, false),
        Field::new("day", DataType::Date32, false),
    ]))
}

/// Seeded generator of grouped rows
pub struct GroupedDataGenerator {
    groups: i32,
    rng: StdRng,
}

impl GroupedDataGenerator {
    pub fn new(groups: usize) -> Self {
        Self::with_seed(groups, 42)
    }

    pub fn with_seed(groups: usize, seed: u64) -> Self {
        Self {
            groups: groups.clamp(1, i32::MAX as usize) as i32,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `rows` rows split into batches of at most `batch_rows`
    pub fn generate(&mut self, rows: usize, batch_rows: usize) -> Result<Vec<RecordBatch>> {
        let batch_rows = batch_rows.max(1);
        let mut batches = Vec::with_capacity(rows.div_ceil(batch_rows));
        let mut remaining = rows;
        while remaining > 0 {
            let count = remaining.min(batch_rows);
            batches.push(self.generate_batch(count)?);
            remaining -= count;
        }
        Ok(batches)
    }

    fn generate_batch(&mut self, count: usize) -> Result<RecordBatch> {
        // 1994-01-01 in days since epoch, plus about five years
        let base_date = 8766;
        let date_range = 1826;

        let mut k = Vec::with_capacity(count);
        let mut region = StringBuilder::new();
        let mut quantity = Vec::with_capacity(count);
        let mut price = Vec::with_capacity(count);
        let mut day = Vec::with_capacity(count);

        for _ in 0..count {
            let key = self.rng.gen_range(0..self.groups);
            k.push(key);
            region.append_value(REGIONS[key as usize % REGIONS.len()]);
            quantity.push(self.rng.gen_range(1..=50));
            price.push(self.rng.gen_range(4..4000) as f32 * 0.25);
            day.push(base_date + self.rng.gen_range(0..date_range));
        }

        Ok(RecordBatch::try_new(
            sales_schema(),
            vec![
                Arc::new(Int32Array::from(k)),
                Arc::new(region.finish()),
                Arc::new(Int32Array::from(quantity)),
                Arc::new(Float32Array::from(price)),
                Arc::new(Date32Array::from(day)),
            ],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_batches() {
        let batches = GroupedDataGenerator::new(10).generate(2500, 1000).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].num_rows(), 500);

        let keys = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert!(keys.values().iter().all(|k| (0..10).contains(k)));
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = GroupedDataGenerator::with_seed(100, 7).generate(100, 100).unwrap();
        let b = GroupedDataGenerator::with_seed(100, 7).generate(100, 100).unwrap();
        assert_eq!(a, b);
    }
}
