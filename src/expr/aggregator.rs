//! Single-group aggregators
//!
//! Each aggregator owns one running state. The first defined value seeds the
//! state and every later value must carry the same type as the state, so an
//! UNDEFINED value after seeding is a type mismatch. COUNT accepts anything.

use super::AggregateFunction;
use crate::common::{type_mismatch, AttrType, Value};
use crate::error::{QueryError, Result};
use std::cmp::Ordering;
use std::fmt;

/// Running aggregate over a stream of values
pub trait Aggregator: fmt::Debug + Send {
    fn accumulate(&mut self, value: &Value) -> Result<()>;

    /// Final value. UNDEFINED when nothing has been accumulated.
    fn evaluate(&self) -> Result<Value>;
}

pub fn create_aggregator(func: AggregateFunction) -> Box<dyn Aggregator> {
    match func {
        AggregateFunction::Sum => Box::new(SumAggregator::default()),
        AggregateFunction::Min => Box::new(MinAggregator::default()),
        AggregateFunction::Max => Box::new(MaxAggregator::default()),
        AggregateFunction::Avg => Box::new(AvgAggregator::default()),
        AggregateFunction::Count => Box::new(CountAggregator::default()),
    }
}

fn check_numeric(func: AggregateFunction, value: &Value) -> Result<()> {
    if value.attr_type().is_numeric() {
        Ok(())
    } else {
        Err(QueryError::Internal(format!(
            "{} is not supported for {}",
            func,
            value.attr_type()
        )))
    }
}

fn check_ordered(func: AggregateFunction, value: &Value) -> Result<()> {
    match value.attr_type() {
        AttrType::Integer | AttrType::Float | AttrType::String | AttrType::Date => Ok(()),
        other => Err(QueryError::Internal(format!(
            "{} is not supported for {}",
            func, other
        ))),
    }
}

#[derive(Debug, Default)]
pub struct SumAggregator {
    value: Value,
}

impl Aggregator for SumAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<()> {
        if self.value.is_undefined() {
            if !value.is_undefined() {
                check_numeric(AggregateFunction::Sum, value)?;
                self.value = value.clone();
            }
            return Ok(());
        }
        if value.attr_type() != self.value.attr_type() {
            return Err(type_mismatch(value, &self.value));
        }
        self.value = self.value.add(value)?;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// Keeps the value that `keep` prefers over the running state
#[derive(Debug)]
struct ExtremeState {
    func: AggregateFunction,
    keep: Ordering,
    value: Value,
}

impl ExtremeState {
    fn accumulate(&mut self, value: &Value) -> Result<()> {
        if self.value.is_undefined() {
            if !value.is_undefined() {
                check_ordered(self.func, value)?;
                self.value = value.clone();
            }
            return Ok(());
        }
        match value.compare(&self.value) {
            Some(ord) if ord == self.keep => self.value = value.clone(),
            Some(_) => {}
            None => return Err(type_mismatch(value, &self.value)),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MinAggregator(ExtremeState);

impl Default for MinAggregator {
    fn default() -> Self {
        Self(ExtremeState {
            func: AggregateFunction::Min,
            keep: Ordering::Less,
            value: Value::Undefined,
        })
    }
}

impl Aggregator for MinAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<()> {
        self.0.accumulate(value)
    }

    fn evaluate(&self) -> Result<Value> {
        Ok(self.0.value.clone())
    }
}

#[derive(Debug)]
pub struct MaxAggregator(ExtremeState);

impl Default for MaxAggregator {
    fn default() -> Self {
        Self(ExtremeState {
            func: AggregateFunction::Max,
            keep: Ordering::Greater,
            value: Value::Undefined,
        })
    }
}

impl Aggregator for MaxAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<()> {
        self.0.accumulate(value)
    }

    fn evaluate(&self) -> Result<Value> {
        Ok(self.0.value.clone())
    }
}

/// Sum and row count. An INTEGER sum that divides evenly stays INTEGER,
/// anything else evaluates to FLOAT.
#[derive(Debug, Default)]
pub struct AvgAggregator {
    sum: Value,
    count: i32,
}

impl Aggregator for AvgAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<()> {
        if self.sum.is_undefined() {
            if value.is_undefined() {
                return Ok(());
            }
            check_numeric(AggregateFunction::Avg, value)?;
            self.sum = value.clone();
        } else if value.attr_type() != self.sum.attr_type() {
            return Err(type_mismatch(value, &self.sum));
        } else {
            self.sum = self.sum.add(value)?;
        }
        self.count += 1;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value> {
        if self.count == 0 {
            return Ok(Value::Undefined);
        }
        match self.sum {
            Value::Integer(sum) if sum % self.count == 0 => Ok(Value::Integer(sum / self.count)),
            Value::Integer(sum) => Ok(Value::Float(sum as f32 / self.count as f32)),
            Value::Float(sum) => Ok(Value::Float(sum / self.count as f32)),
            ref other => Err(QueryError::Internal(format!(
                "AVG is not supported for {}",
                other.attr_type()
            ))),
        }
    }
}

/// Counts every accumulated value, UNDEFINED included
#[derive(Debug, Default)]
pub struct CountAggregator {
    count: i32,
}

impl Aggregator for CountAggregator {
    fn accumulate(&mut self, _value: &Value) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value> {
        Ok(Value::Integer(self.count))
    }
}
