//! Expressions evaluated against chunks, aggregate descriptors, aggregators
//! and the aggregate hash tables

pub mod aggregator;
pub mod hash_table;

use crate::common::{AttrType, Chunk, Column, Schema, Value};
use crate::error::{QueryError, Result};
use std::fmt;

pub use aggregator::{create_aggregator, Aggregator};
pub use hash_table::{
    create_hash_table, AggregateHashTable, HashTableStrategy, LinearProbingHashTable, Scanner,
    StandardAggregateHashTable,
};

/// Projection expression producing one column per input chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column of the input chunk at `index`
    Column { index: usize, name: String },
    /// Constant repeated for every input row
    Literal(Value),
}

impl Expr {
    /// Column reference resolved by name against `schema`
    pub fn column(schema: &Schema, name: &str) -> Result<Self> {
        let index = schema.index_of(name)?;
        Ok(Expr::Column {
            index,
            name: name.to_string(),
        })
    }

    pub fn column_at(index: usize, name: impl Into<String>) -> Self {
        Expr::Column {
            index,
            name: name.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Evaluate against `chunk`.
    ///
    /// Column references alias the input column's storage; nothing is copied.
    pub fn get_column(&self, chunk: &Chunk) -> Result<Column> {
        match self {
            Expr::Column { index, name } => {
                if *index >= chunk.column_num() {
                    return Err(QueryError::ColumnNotFound(format!(
                        "{} (index {} of {} columns)",
                        name,
                        index,
                        chunk.column_num()
                    )));
                }
                let source = chunk.column(*index);
                let mut column = Column::with_capacity(source.attr_type(), 0)?;
                column.reference(source);
                Ok(column)
            }
            Expr::Literal(value) => Column::repeat(value, chunk.rows()),
        }
    }

    pub fn data_type(&self, schema: &Schema) -> Result<AttrType> {
        match self {
            Expr::Column { index, name } => {
                if *index >= schema.len() {
                    return Err(QueryError::ColumnNotFound(name.clone()));
                }
                Ok(schema.field(*index).attr_type)
            }
            Expr::Literal(value) => Ok(value.attr_type()),
        }
    }

    pub fn output_name(&self) -> String {
        match self {
            Expr::Column { name, .. } => name.clone(),
            Expr::Literal(value) => value.to_string(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { index, name } => write!(f, "{}#{}", name, index),
            Expr::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Expr::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// Aggregate function tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Count => write!(f, "COUNT"),
        }
    }
}

/// Aggregate expression: function applied to a single child expression
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub child: Expr,
}

impl AggregateExpr {
    pub fn new(func: AggregateFunction, child: Expr) -> Self {
        Self { func, child }
    }

    pub fn child(&self) -> &Expr {
        &self.child
    }

    pub fn output_name(&self) -> String {
        format!("{}({})", self.func, self.child.output_name())
    }

    /// Type of the finalized aggregate value when computed by an `Aggregator`
    pub fn output_type(&self, schema: &Schema) -> Result<AttrType> {
        match self.func {
            AggregateFunction::Count => Ok(AttrType::Integer),
            AggregateFunction::Avg => Ok(AttrType::Float),
            AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                self.child.data_type(schema)
            }
        }
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.func, self.child)
    }
}
