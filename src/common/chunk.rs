//! Columnar batches
//!
//! A `Chunk` is a set of equally long typed columns. Column storage is shared
//! behind an `Arc`, so re-exposing a column in another chunk (`reference`) is a
//! pointer copy; appending to a shared column copies it first.

use crate::common::{AttrType, Schema, Value};
use crate::error::{QueryError, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float32Array, Int32Array, StringArray,
};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Default number of rows a chunk is sized for
pub const DEFAULT_CHUNK_CAPACITY: usize = 1024;

/// Typed storage of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<String>),
    Date(Vec<i32>),
    Boolean(Vec<bool>),
}

impl ColumnData {
    fn with_capacity(attr_type: AttrType, capacity: usize) -> Result<Self> {
        match attr_type {
            AttrType::Integer => Ok(ColumnData::Integer(Vec::with_capacity(capacity))),
            AttrType::Float => Ok(ColumnData::Float(Vec::with_capacity(capacity))),
            AttrType::String => Ok(ColumnData::String(Vec::with_capacity(capacity))),
            AttrType::Date => Ok(ColumnData::Date(Vec::with_capacity(capacity))),
            AttrType::Boolean => Ok(ColumnData::Boolean(Vec::with_capacity(capacity))),
            AttrType::Undefined => Err(QueryError::Internal(
                "cannot create a column of undefined type".into(),
            )),
        }
    }

    fn attr_type(&self) -> AttrType {
        match self {
            ColumnData::Integer(_) => AttrType::Integer,
            ColumnData::Float(_) => AttrType::Float,
            ColumnData::String(_) => AttrType::String,
            ColumnData::Date(_) => AttrType::Date,
            ColumnData::Boolean(_) => AttrType::Boolean,
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) | ColumnData::Date(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            ColumnData::Integer(v) | ColumnData::Date(v) => v.clear(),
            ColumnData::Float(v) => v.clear(),
            ColumnData::String(v) => v.clear(),
            ColumnData::Boolean(v) => v.clear(),
        }
    }
}

/// A single typed column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    data: Arc<ColumnData>,
}

impl Column {
    pub fn new(attr_type: AttrType) -> Result<Self> {
        Self::with_capacity(attr_type, DEFAULT_CHUNK_CAPACITY)
    }

    pub fn with_capacity(attr_type: AttrType, capacity: usize) -> Result<Self> {
        Ok(Self {
            data: Arc::new(ColumnData::with_capacity(attr_type, capacity)?),
        })
    }

    pub fn attr_type(&self) -> AttrType {
        self.data.attr_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Value at `row`.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    pub fn get_value(&self, row: usize) -> Value {
        match self.data.as_ref() {
            ColumnData::Integer(v) => Value::Integer(v[row]),
            ColumnData::Float(v) => Value::Float(v[row]),
            ColumnData::String(v) => Value::String(v[row].clone()),
            ColumnData::Date(v) => Value::Date(v[row]),
            ColumnData::Boolean(v) => Value::Boolean(v[row]),
        }
    }

    /// Append one value. The value's type must match the column's type.
    pub fn append_value(&mut self, value: &Value) -> Result<()> {
        match (Arc::make_mut(&mut self.data), value) {
            (ColumnData::Integer(v), Value::Integer(x)) => v.push(*x),
            (ColumnData::Float(v), Value::Float(x)) => v.push(*x),
            (ColumnData::String(v), Value::String(x)) => v.push(x.clone()),
            (ColumnData::Date(v), Value::Date(x)) => v.push(*x),
            (ColumnData::Boolean(v), Value::Boolean(x)) => v.push(*x),
            (data, value) => {
                return Err(QueryError::TypeMismatch(format!(
                    "cannot append {} value to {} column",
                    value.attr_type(),
                    data.attr_type()
                )))
            }
        }
        Ok(())
    }

    /// Alias `other`'s storage without copying
    pub fn reference(&mut self, other: &Column) {
        self.data = Arc::clone(&other.data);
    }

    /// Whether both columns point at the same storage
    pub fn shares_storage(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn clear(&mut self) {
        Arc::make_mut(&mut self.data).clear();
    }

    pub fn as_integers(&self) -> Option<&[i32]> {
        match self.data.as_ref() {
            ColumnData::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self.data.as_ref() {
            ColumnData::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Column holding `len` copies of `value`
    pub fn repeat(value: &Value, len: usize) -> Result<Self> {
        let data = match value {
            Value::Integer(x) => ColumnData::Integer(vec![*x; len]),
            Value::Float(x) => ColumnData::Float(vec![*x; len]),
            Value::String(x) => ColumnData::String(vec![x.clone(); len]),
            Value::Date(x) => ColumnData::Date(vec![*x; len]),
            Value::Boolean(x) => ColumnData::Boolean(vec![*x; len]),
            Value::Undefined => {
                return Err(QueryError::Internal(
                    "cannot materialize an undefined literal".into(),
                ))
            }
        };
        Ok(Self {
            data: Arc::new(data),
        })
    }

    pub fn to_arrow(&self) -> ArrayRef {
        match self.data.as_ref() {
            ColumnData::Integer(v) => Arc::new(Int32Array::from(v.clone())),
            ColumnData::Float(v) => Arc::new(Float32Array::from(v.clone())),
            ColumnData::String(v) => Arc::new(StringArray::from_iter_values(v.iter())),
            ColumnData::Date(v) => Arc::new(Date32Array::from(v.clone())),
            ColumnData::Boolean(v) => Arc::new(BooleanArray::from(v.clone())),
        }
    }

    pub fn from_arrow(array: &ArrayRef) -> Result<Self> {
        if array.null_count() > 0 {
            return Err(QueryError::InvalidArgument(
                "null values are not supported in chunks".into(),
            ));
        }

        let data = if let Some(a) = array.as_any().downcast_ref::<Int32Array>() {
            ColumnData::Integer(a.values().to_vec())
        } else if let Some(a) = array.as_any().downcast_ref::<Float32Array>() {
            ColumnData::Float(a.values().to_vec())
        } else if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
            ColumnData::String(a.iter().map(|s| s.unwrap_or_default().to_string()).collect())
        } else if let Some(a) = array.as_any().downcast_ref::<Date32Array>() {
            ColumnData::Date(a.values().to_vec())
        } else if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
            ColumnData::Boolean(a.iter().map(|b| b.unwrap_or_default()).collect())
        } else {
            return Err(QueryError::InvalidArgument(format!(
                "unsupported arrow type {:?}",
                array.data_type()
            )));
        };

        Ok(Self {
            data: Arc::new(data),
        })
    }
}

impl From<Vec<i32>> for Column {
    fn from(v: Vec<i32>) -> Self {
        Self {
            data: Arc::new(ColumnData::Integer(v)),
        }
    }
}

impl From<Vec<f32>> for Column {
    fn from(v: Vec<f32>) -> Self {
        Self {
            data: Arc::new(ColumnData::Float(v)),
        }
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Self {
            data: Arc::new(ColumnData::String(
                v.into_iter().map(str::to_string).collect(),
            )),
        }
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Self {
            data: Arc::new(ColumnData::Boolean(v)),
        }
    }
}

impl From<ColumnData> for Column {
    fn from(data: ColumnData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

/// Columnar batch of rows
#[derive(Debug, Clone)]
pub struct Chunk {
    columns: Vec<Column>,
    capacity: usize,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::new(),
            capacity,
        }
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut chunk = Self::new();
        for column in columns {
            chunk.add_column(column)?;
        }
        Ok(chunk)
    }

    /// Empty chunk with one column per schema field
    pub fn from_schema(schema: &Schema, capacity: usize) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column::with_capacity(f.attr_type, capacity))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, capacity })
    }

    /// Add a column. Its length must match the chunk's current row count.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.rows() {
            return Err(QueryError::InvalidArgument(format!(
                "column has {} rows, chunk has {}",
                column.len(),
                self.rows()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_num(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn get_value(&self, col: usize, row: usize) -> Value {
        self.columns[col].get_value(row)
    }

    /// Append one logical row, one value per column
    pub fn append_row(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(QueryError::InvalidArgument(format!(
                "row has {} values, chunk has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.append_value(value)?;
        }
        Ok(())
    }

    /// Drop all columns
    pub fn reset(&mut self) {
        self.columns.clear();
    }

    /// Keep the columns but drop their rows
    pub fn reset_data(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
    }

    pub fn to_record_batch(&self, schema: &Schema) -> Result<RecordBatch> {
        if schema.len() != self.columns.len() {
            return Err(QueryError::InvalidArgument(format!(
                "schema has {} fields, chunk has {} columns",
                schema.len(),
                self.columns.len()
            )));
        }
        let arrays: Vec<ArrayRef> = self.columns.iter().map(Column::to_arrow).collect();
        RecordBatch::try_new(schema.to_arrow()?, arrays).map_err(Into::into)
    }

    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let columns = batch
            .columns()
            .iter()
            .map(Column::from_arrow)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            capacity: DEFAULT_CHUNK_CAPACITY.max(batch.num_rows()),
        })
    }
}
