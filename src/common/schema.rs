//! Schema types for chunks flowing between operators

use crate::common::AttrType;
use crate::error::{QueryError, Result};
use arrow::datatypes::{Field, Schema as ArrowSchema, SchemaRef};
use hashbrown::HashMap;
use std::sync::Arc;

/// Schema field: column name and attribute type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub attr_type: AttrType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }

    pub fn to_arrow_field(&self) -> Result<Field> {
        Ok(Field::new(&self.name, self.attr_type.to_arrow()?, false))
    }
}

/// Ordered list of fields describing the columns of a chunk
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<SchemaField>,
    name_index: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        let mut name_index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            // first occurrence wins for duplicate names
            name_index.entry(field.name.clone()).or_insert(i);
        }
        Self { fields, name_index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &SchemaField {
        &self.fields[index]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::ColumnNotFound(name.to_string()))
    }

    /// Keep only the fields at `indices`, in that order
    pub fn project(&self, indices: &[usize]) -> Self {
        Self::new(indices.iter().map(|&i| self.fields[i].clone()).collect())
    }

    pub fn to_arrow(&self) -> Result<SchemaRef> {
        let fields = self
            .fields
            .iter()
            .map(|f| f.to_arrow_field())
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(ArrowSchema::new(fields)))
    }

    pub fn from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| Ok(SchemaField::new(f.name().clone(), AttrType::from_arrow(f.data_type())?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }
}
