//! Physical plan types

use crate::common::{Chunk, Schema, StreamState};
use crate::error::Result;
use arrow::array::RecordBatch;
use futures::stream::BoxStream;
use std::fmt::{self, Debug};

/// Stream of record batches
pub type RecordBatchStream = BoxStream<'static, Result<RecordBatch>>;

/// Handle of the transaction an operator tree runs in.
///
/// Operators only pass it down to their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.id)
    }
}

/// Pull-based physical operator
pub trait PhysicalOperator: Debug + Send {
    /// Schema of the chunks produced by `next`
    fn schema(&self) -> &Schema;

    /// Get child operators
    fn children(&self) -> Vec<&dyn PhysicalOperator>;

    fn open(&mut self, txn: &Transaction) -> Result<()>;

    /// Produce the next chunk into `chunk`.
    ///
    /// End of data is `Ok(StreamState::EndOfStream)`, never an error.
    fn next(&mut self, chunk: &mut Chunk) -> Result<StreamState>;

    fn close(&mut self) -> Result<()>;

    /// Name of this operator for display
    fn name(&self) -> &str;
}

/// Display helper for physical plans
pub fn display_plan(plan: &dyn PhysicalOperator, indent: usize) -> String {
    let mut result = format!("{}{}\n", "  ".repeat(indent), plan.name());
    for child in plan.children() {
        result.push_str(&display_plan(child, indent + 1));
    }
    result
}
