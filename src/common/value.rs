//! Typed scalar values
//!
//! `Value` is the engine's tagged scalar. Every operation that combines two
//! values (add, compare) matches on both tags and only proceeds when they agree.

use crate::error::{QueryError, Result};
use arrow::datatypes::DataType;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Attribute type tag of a `Value` or `Column`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Undefined,
    Integer,
    Float,
    String,
    Date,
    Boolean,
}

impl AttrType {
    /// Arrow type used when a column of this type leaves the engine
    pub fn to_arrow(&self) -> Result<DataType> {
        match self {
            AttrType::Integer => Ok(DataType::Int32),
            AttrType::Float => Ok(DataType::Float32),
            AttrType::String => Ok(DataType::Utf8),
            AttrType::Date => Ok(DataType::Date32),
            AttrType::Boolean => Ok(DataType::Boolean),
            AttrType::Undefined => Err(QueryError::Internal(
                "undefined attribute type has no arrow representation".into(),
            )),
        }
    }

    pub fn from_arrow(data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::Int32 => Ok(AttrType::Integer),
            DataType::Float32 => Ok(AttrType::Float),
            DataType::Utf8 => Ok(AttrType::String),
            DataType::Date32 => Ok(AttrType::Date),
            DataType::Boolean => Ok(AttrType::Boolean),
            other => Err(QueryError::InvalidArgument(format!(
                "unsupported arrow type {:?}",
                other
            ))),
        }
    }

    /// Whether values of this type can be summed
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttrType::Integer | AttrType::Float)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Undefined => write!(f, "UNDEFINED"),
            AttrType::Integer => write!(f, "INTEGER"),
            AttrType::Float => write!(f, "FLOAT"),
            AttrType::String => write!(f, "STRING"),
            AttrType::Date => write!(f, "DATE"),
            AttrType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// Tagged scalar value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Integer(i32),
    Float(f32),
    String(String),
    /// Days since 1970-01-01
    Date(i32),
    Boolean(bool),
}

impl Value {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Undefined => AttrType::Undefined,
            Value::Integer(_) => AttrType::Integer,
            Value::Float(_) => AttrType::Float,
            Value::String(_) => AttrType::String,
            Value::Date(_) => AttrType::Date,
            Value::Boolean(_) => AttrType::Boolean,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Build a DATE value from a calendar date
    pub fn date_from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Value::Date(date_to_days(date)))
    }

    /// Change the type tag in place. The payload is reset to the new type's
    /// zero value.
    pub fn set_type(&mut self, attr_type: AttrType) {
        if self.attr_type() == attr_type {
            return;
        }
        *self = match attr_type {
            AttrType::Undefined => Value::Undefined,
            AttrType::Integer => Value::Integer(0),
            AttrType::Float => Value::Float(0.0),
            AttrType::String => Value::String(String::new()),
            AttrType::Date => Value::Date(0),
            AttrType::Boolean => Value::Boolean(false),
        };
    }

    /// Integer view of the value, converting where a conversion is defined
    pub fn get_int(&self) -> i32 {
        match self {
            Value::Integer(v) => *v,
            Value::Float(v) => *v as i32,
            Value::String(s) => s.trim().parse().unwrap_or(0),
            Value::Date(d) => *d,
            Value::Boolean(b) => *b as i32,
            Value::Undefined => 0,
        }
    }

    /// Float view of the value, converting where a conversion is defined
    pub fn get_float(&self) -> f32 {
        match self {
            Value::Integer(v) => *v as f32,
            Value::Float(v) => *v,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            Value::Date(d) => *d as f32,
            Value::Boolean(b) => *b as i32 as f32,
            Value::Undefined => 0.0,
        }
    }

    /// Ordering between two values of the same type.
    ///
    /// Returns `None` when the tags differ; values are never coerced for
    /// comparison. Floats use a total order so that equal keys hash equally.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => Some(Ordering::Equal),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(OrderedFloat(*a).cmp(&OrderedFloat(*b))),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Sum of two INTEGER or two FLOAT values
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (a, b) if a.attr_type() != b.attr_type() => Err(type_mismatch(a, b)),
            (a, _) => Err(QueryError::Internal(format!(
                "add is not supported for {}",
                a.attr_type()
            ))),
        }
    }
}

pub(crate) fn type_mismatch(value: &Value, state: &Value) -> QueryError {
    QueryError::TypeMismatch(format!(
        "value type: {}, state type: {}",
        value.attr_type(),
        state.attr_type()
    ))
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Integer(v) => write!(f, "{}", v),
            // -0.0 + 0.0 == +0.0, so both zeros print (and hash) alike
            Value::Float(v) => write!(f, "{}", v + 0.0),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => match days_to_date(*d) {
                Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                None => write!(f, "{}", d),
            },
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
