//! Table scan operator

use crate::common::{Chunk, Schema, StreamState};
use crate::error::{QueryError, Result};
use crate::physical::{PhysicalOperator, Transaction};
use arrow::array::RecordBatch;
use std::fmt;
use tracing::debug;

/// In-memory table: a schema plus the chunks holding its rows
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: Schema,
    chunks: Vec<Chunk>,
}

impl MemoryTable {
    pub fn new(schema: Schema, chunks: Vec<Chunk>) -> Result<Self> {
        for chunk in &chunks {
            if chunk.column_num() != schema.len() {
                return Err(QueryError::InvalidArgument(format!(
                    "chunk has {} columns, schema has {}",
                    chunk.column_num(),
                    schema.len()
                )));
            }
            for (column, field) in chunk.columns().iter().zip(schema.fields()) {
                if column.attr_type() != field.attr_type {
                    return Err(QueryError::TypeMismatch(format!(
                        "column {} is {}, schema says {}",
                        field.name,
                        column.attr_type(),
                        field.attr_type
                    )));
                }
            }
        }
        Ok(Self { schema, chunks })
    }

    /// Build from arrow batches; the schema comes from the first batch
    pub fn try_from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let schema = match batches.first() {
            Some(batch) => Schema::from_arrow(&batch.schema())?,
            None => Schema::empty(),
        };
        let chunks = batches
            .iter()
            .map(Chunk::from_record_batch)
            .collect::<Result<Vec<_>>>()?;
        Self::new(schema, chunks)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn row_count(&self) -> usize {
        self.chunks.iter().map(Chunk::rows).sum()
    }
}

/// Memory table scan operator.
///
/// Yields one stored chunk per `next`. Output columns alias the table's
/// storage.
#[derive(Debug)]
pub struct MemoryTableExec {
    table_name: String,
    table: MemoryTable,
    schema: Schema,
    projection: Option<Vec<usize>>,
    position: usize,
    opened: bool,
}

impl MemoryTableExec {
    pub fn new(
        table_name: impl Into<String>,
        table: MemoryTable,
        projection: Option<Vec<usize>>,
    ) -> Result<Self> {
        let schema = match &projection {
            Some(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= table.schema().len()) {
                    return Err(QueryError::InvalidArgument(format!(
                        "projection index {} out of range for {} columns",
                        bad,
                        table.schema().len()
                    )));
                }
                table.schema().project(indices)
            }
            None => table.schema().clone(),
        };

        Ok(Self {
            table_name: table_name.into(),
            table,
            schema,
            projection,
            position: 0,
            opened: false,
        })
    }

    pub fn try_from_batches(
        table_name: impl Into<String>,
        batches: &[RecordBatch],
        projection: Option<Vec<usize>>,
    ) -> Result<Self> {
        Self::new(table_name, MemoryTable::try_from_batches(batches)?, projection)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl PhysicalOperator for MemoryTableExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![]
    }

    fn open(&mut self, txn: &Transaction) -> Result<()> {
        debug!(table = %self.table_name, %txn, chunks = self.table.chunks().len(), "Opening memory scan");
        self.position = 0;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> Result<StreamState> {
        if !self.opened {
            return Err(QueryError::Internal(format!(
                "scan of {} polled before open",
                self.table_name
            )));
        }
        let Some(source) = self.table.chunks().get(self.position) else {
            return Ok(StreamState::EndOfStream);
        };
        self.position += 1;

        chunk.reset();
        match &self.projection {
            Some(indices) => {
                for &i in indices {
                    chunk.add_column(source.column(i).clone())?;
                }
            }
            None => {
                for column in source.columns() {
                    chunk.add_column(column.clone())?;
                }
            }
        }
        Ok(StreamState::Ready)
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "MemoryScan"
    }
}

impl fmt::Display for MemoryTableExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryScan: {}", self.table_name)?;
        if let Some(proj) = &self.projection {
            write!(f, " projection={:?}", proj)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AttrType, Column, SchemaField, Value};

    fn test_table() -> MemoryTable {
        let schema = Schema::new(vec![
            SchemaField::new("k", AttrType::Integer),
            SchemaField::new("v", AttrType::Float),
        ]);
        let chunks = vec![
            Chunk::from_columns(vec![Column::from(vec![1, 2]), Column::from(vec![1.0f32, 2.0])]).unwrap(),
            Chunk::from_columns(vec![Column::from(vec![3]), Column::from(vec![3.0f32])]).unwrap(),
        ];
        MemoryTable::new(schema, chunks).unwrap()
    }

    #[test]
    fn test_scan_yields_chunks_in_order() {
        let mut scan = MemoryTableExec::new("t", test_table(), None).unwrap();
        scan.open(&Transaction::new(1)).unwrap();

        let mut chunk = Chunk::new();
        assert_eq!(scan.next(&mut chunk).unwrap(), StreamState::Ready);
        assert_eq!(chunk.rows(), 2);
        assert_eq!(scan.next(&mut chunk).unwrap(), StreamState::Ready);
        assert_eq!(chunk.get_value(0, 0), Value::Integer(3));
        assert_eq!(scan.next(&mut chunk).unwrap(), StreamState::EndOfStream);
        scan.close().unwrap();
    }

    #[test]
    fn test_scan_projection() {
        let table = test_table();
        let mut scan = MemoryTableExec::new("t", table.clone(), Some(vec![1])).unwrap();
        assert_eq!(scan.schema().field(0).name, "v");

        scan.open(&Transaction::new(1)).unwrap();
        let mut chunk = Chunk::new();
        scan.next(&mut chunk).unwrap();
        assert_eq!(chunk.column_num(), 1);
        assert!(chunk.column(0).shares_storage(table.chunks()[0].column(1)));
    }

    #[test]
    fn test_scan_before_open() {
        let mut scan = MemoryTableExec::new("t", test_table(), None).unwrap();
        let err = scan.next(&mut Chunk::new()).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
    }

    #[test]
    fn test_bad_projection() {
        assert!(MemoryTableExec::new("t", test_table(), Some(vec![2])).is_err());
    }

    #[test]
    fn test_table_rejects_wrong_column_type() {
        let schema = Schema::new(vec![SchemaField::new("k", AttrType::Integer)]);
        let chunk = Chunk::from_columns(vec![Column::from(vec!["a"])]).unwrap();
        let err = MemoryTable::new(schema, vec![chunk]).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));
    }
}
