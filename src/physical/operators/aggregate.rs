//! Scalar aggregation operator (aggregates without GROUP BY)

use crate::common::{AttrType, Chunk, Column, Schema, SchemaField, StreamState, Value};
use crate::error::{QueryError, Result};
use crate::expr::{create_aggregator, AggregateExpr, Aggregator};
use crate::physical::{PhysicalOperator, Transaction};
use std::fmt;
use tracing::{debug, info};

/// Folds every input row into one aggregator per expression and emits a
/// single row
#[derive(Debug)]
pub struct AggregateVecExec {
    input: Box<dyn PhysicalOperator>,
    aggregates: Vec<AggregateExpr>,
    aggregators: Vec<Box<dyn Aggregator>>,
    schema: Schema,
    chunk_capacity: usize,
    built: bool,
    emitted: bool,
}

impl AggregateVecExec {
    pub fn try_new(
        input: Box<dyn PhysicalOperator>,
        aggregates: Vec<AggregateExpr>,
        chunk_capacity: usize,
    ) -> Result<Self> {
        let fields = aggregates
            .iter()
            .map(|agg| Ok(SchemaField::new(agg.output_name(), agg.output_type(input.schema())?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            aggregators: Vec::new(),
            input,
            aggregates,
            schema: Schema::new(fields),
            chunk_capacity,
            built: false,
            emitted: false,
        })
    }

    fn build(&mut self) -> Result<()> {
        self.aggregators = self.aggregates.iter().map(|a| create_aggregator(a.func)).collect();

        let mut chunk = Chunk::with_capacity(self.chunk_capacity);
        let mut rows = 0usize;
        while self.input.next(&mut chunk)? == StreamState::Ready {
            for (agg, aggregator) in self.aggregates.iter().zip(self.aggregators.iter_mut()) {
                let column = agg.child().get_column(&chunk)?;
                for row in 0..column.len() {
                    aggregator.accumulate(&column.get_value(row))?;
                }
            }
            rows += chunk.rows();
        }
        debug!(rows, aggregates = self.aggregates.len(), "Scalar aggregate build finished");
        Ok(())
    }
}

/// Fit an evaluated aggregate into its output column type
fn cast_for_output(value: Value, attr_type: AttrType) -> Result<Value> {
    match (value, attr_type) {
        (v, t) if v.attr_type() == t => Ok(v),
        (Value::Undefined, t) => {
            let mut zero = Value::Undefined;
            zero.set_type(t);
            Ok(zero)
        }
        (Value::Integer(v), AttrType::Float) => Ok(Value::Float(v as f32)),
        (v, t) => Err(QueryError::TypeMismatch(format!(
            "cannot emit {} as {}",
            v.attr_type(),
            t
        ))),
    }
}

impl PhysicalOperator for AggregateVecExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn open(&mut self, txn: &Transaction) -> Result<()> {
        self.built = false;
        if let Err(e) = self.input.open(txn) {
            info!(error = %e, %txn, "Failed to open child operator");
            return Err(e);
        }
        if let Err(e) = self.build() {
            info!(error = %e, %txn, "Failed to compute scalar aggregates");
            return Err(e);
        }
        self.built = true;
        self.emitted = false;
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> Result<StreamState> {
        if !self.built {
            return Err(QueryError::Internal(
                "scalar aggregate polled before open completed".into(),
            ));
        }
        if self.emitted {
            return Ok(StreamState::EndOfStream);
        }

        chunk.reset();
        for (field, aggregator) in self.schema.fields().iter().zip(&self.aggregators) {
            let value = cast_for_output(aggregator.evaluate()?, field.attr_type)?;
            let mut column = Column::with_capacity(field.attr_type, 1)?;
            column.append_value(&value)?;
            chunk.add_column(column)?;
        }
        self.emitted = true;
        Ok(StreamState::Ready)
    }

    fn close(&mut self) -> Result<()> {
        self.built = false;
        self.input.close()
    }

    fn name(&self) -> &str {
        "ScalarAggregate"
    }
}

impl fmt::Display for AggregateVecExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aggs: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
        write!(f, "ScalarAggregate: aggs=[{}]", aggs.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AggregateFunction, Expr};
    use crate::physical::{MemoryTable, MemoryTableExec};

    fn scan(chunks: Vec<Chunk>) -> Box<dyn PhysicalOperator> {
        let schema = Schema::new(vec![
            SchemaField::new("v", AttrType::Integer),
            SchemaField::new("name", AttrType::String),
        ]);
        Box::new(MemoryTableExec::new("t", MemoryTable::new(schema, chunks).unwrap(), None).unwrap())
    }

    fn all_aggregates() -> Vec<AggregateExpr> {
        vec![
            AggregateExpr::new(AggregateFunction::Sum, Expr::column_at(0, "v")),
            AggregateExpr::new(AggregateFunction::Min, Expr::column_at(1, "name")),
            AggregateExpr::new(AggregateFunction::Max, Expr::column_at(0, "v")),
            AggregateExpr::new(AggregateFunction::Avg, Expr::column_at(0, "v")),
            AggregateExpr::new(AggregateFunction::Count, Expr::column_at(1, "name")),
        ]
    }

    #[test]
    fn test_scalar_aggregates() {
        let chunks = vec![
            Chunk::from_columns(vec![Column::from(vec![3, 9]), Column::from(vec!["b", "c"])]).unwrap(),
            Chunk::from_columns(vec![Column::from(vec![4]), Column::from(vec!["a"])]).unwrap(),
        ];
        let mut agg = AggregateVecExec::try_new(scan(chunks), all_aggregates(), 1024).unwrap();
        agg.open(&Transaction::new(7)).unwrap();

        let mut chunk = Chunk::new();
        assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::Ready);
        assert_eq!(chunk.rows(), 1);
        assert_eq!(chunk.get_value(0, 0), Value::Integer(16));
        assert_eq!(chunk.get_value(1, 0), Value::from("a"));
        assert_eq!(chunk.get_value(2, 0), Value::Integer(9));
        // 16 / 3 does not divide evenly
        assert_eq!(chunk.get_value(3, 0), Value::Float(16.0 / 3.0));
        assert_eq!(chunk.get_value(4, 0), Value::Integer(3));

        assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::EndOfStream);
        agg.close().unwrap();
    }

    #[test]
    fn test_even_average_emitted_as_float() {
        let chunks =
            vec![Chunk::from_columns(vec![Column::from(vec![4, 4]), Column::from(vec!["x", "y"])]).unwrap()];
        let aggs = vec![AggregateExpr::new(AggregateFunction::Avg, Expr::column_at(0, "v"))];
        let mut agg = AggregateVecExec::try_new(scan(chunks), aggs, 1024).unwrap();
        agg.open(&Transaction::new(1)).unwrap();

        let mut chunk = Chunk::new();
        agg.next(&mut chunk).unwrap();
        assert_eq!(chunk.get_value(0, 0), Value::Float(4.0));
    }

    #[test]
    fn test_empty_input() {
        let mut agg = AggregateVecExec::try_new(scan(vec![]), all_aggregates(), 1024).unwrap();
        agg.open(&Transaction::new(1)).unwrap();

        let mut chunk = Chunk::new();
        assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::Ready);
        assert_eq!(chunk.get_value(0, 0), Value::Integer(0));
        assert_eq!(chunk.get_value(1, 0), Value::from(""));
        assert_eq!(chunk.get_value(4, 0), Value::Integer(0));
    }

    #[test]
    fn test_sum_of_strings_fails_open() {
        let chunks =
            vec![Chunk::from_columns(vec![Column::from(vec![1]), Column::from(vec!["a"])]).unwrap()];
        let aggs = vec![AggregateExpr::new(AggregateFunction::Sum, Expr::column_at(1, "name"))];
        let mut agg = AggregateVecExec::try_new(scan(chunks), aggs, 1024).unwrap();
        let err = agg.open(&Transaction::new(1)).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
        assert!(agg.next(&mut Chunk::new()).is_err());
    }
}
