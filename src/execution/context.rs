//! Execution context - main entry point for running operator trees

use crate::common::{Chunk, StreamState};
use crate::error::{QueryError, Result};
use crate::execution::EngineConfig;
use crate::expr::{AggregateExpr, Expr};
use crate::physical::{
    AggregateVecExec, GroupByVecExec, MemoryTable, MemoryTableExec, PhysicalOperator,
    RecordBatchStream, Transaction,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::stream;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Query execution result
#[derive(Debug)]
pub struct QueryResult {
    /// Output schema
    pub schema: SchemaRef,
    /// Result batches
    pub batches: Vec<RecordBatch>,
    /// Total row count
    pub row_count: usize,
    /// Execution metrics
    pub metrics: QueryMetrics,
}

/// Query execution metrics
#[derive(Debug, Default)]
pub struct QueryMetrics {
    /// Time spent in `open`, which includes building aggregate tables
    pub open_time: Duration,
    /// Time spent pulling chunks
    pub execute_time: Duration,
    /// Total time
    pub total_time: Duration,
}

/// Execution context - holds configuration and tables, and runs plans
#[derive(Debug, Default)]
pub struct ExecutionContext {
    config: EngineConfig,
    tables: HashMap<String, MemoryTable>,
    next_txn: AtomicU64,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a table from record batches
    pub fn register_batches(&mut self, name: impl Into<String>, batches: &[RecordBatch]) -> Result<()> {
        let table = MemoryTable::try_from_batches(batches)?;
        self.register_table(name, table);
        Ok(())
    }

    pub fn register_table(&mut self, name: impl Into<String>, table: MemoryTable) {
        let name = name.into();
        debug!(table = %name, rows = table.row_count(), "Registering table");
        self.tables.insert(name, table);
    }

    /// List registered tables
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| QueryError::NotFound(format!("table {}", name)))
    }

    /// Scan of a registered table
    pub fn scan(&self, name: &str, projection: Option<Vec<usize>>) -> Result<Box<dyn PhysicalOperator>> {
        let table = self.table(name)?.clone();
        Ok(Box::new(MemoryTableExec::new(name, table, projection)?))
    }

    /// Aggregation over `input`: grouped when `group_by` is non-empty,
    /// scalar otherwise
    pub fn aggregate(
        &self,
        input: Box<dyn PhysicalOperator>,
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
    ) -> Result<Box<dyn PhysicalOperator>> {
        if group_by.is_empty() {
            Ok(Box::new(AggregateVecExec::try_new(
                input,
                aggregates,
                self.config.chunk_capacity,
            )?))
        } else {
            Ok(Box::new(GroupByVecExec::try_new(
                input,
                group_by,
                aggregates,
                &self.config,
            )?))
        }
    }

    fn begin(&self) -> Transaction {
        Transaction::new(self.next_txn.fetch_add(1, Ordering::Relaxed))
    }

    /// Run `plan` to completion: open, drain, close
    pub fn execute(&self, plan: &mut dyn PhysicalOperator) -> Result<QueryResult> {
        let start = Instant::now();
        let mut metrics = QueryMetrics::default();
        let txn = self.begin();
        let schema = plan.schema().to_arrow()?;

        let open_start = Instant::now();
        plan.open(&txn)?;
        metrics.open_time = open_start.elapsed();

        let execute_start = Instant::now();
        let drained = drain(plan, self.config.chunk_capacity);
        let closed = plan.close();
        let batches = drained?;
        closed?;
        metrics.execute_time = execute_start.elapsed();
        metrics.total_time = start.elapsed();

        let row_count: usize = batches.iter().map(|b| b.num_rows()).sum();
        info!(
            %txn,
            plan = plan.name(),
            rows = row_count,
            elapsed_ms = metrics.total_time.as_millis() as u64,
            "Query finished"
        );

        Ok(QueryResult {
            schema,
            batches,
            row_count,
            metrics,
        })
    }

    /// Run `plan` lazily as a stream of record batches.
    ///
    /// The plan is opened on the first poll and closed after the last chunk
    /// or the first error.
    pub fn execute_stream(&self, plan: Box<dyn PhysicalOperator>) -> RecordBatchStream {
        let driver = StreamDriver {
            plan,
            txn: self.begin(),
            chunk_capacity: self.config.chunk_capacity,
            phase: StreamPhase::Unopened,
        };
        Box::pin(stream::unfold(driver, |mut driver| async move {
            driver.poll_batch().map(|item| (item, driver))
        }))
    }
}

fn drain(plan: &mut dyn PhysicalOperator, chunk_capacity: usize) -> Result<Vec<RecordBatch>> {
    let schema = plan.schema().clone();
    let mut batches = Vec::new();
    loop {
        let mut chunk = Chunk::with_capacity(chunk_capacity);
        match plan.next(&mut chunk)? {
            StreamState::Ready => batches.push(chunk.to_record_batch(&schema)?),
            StreamState::EndOfStream => return Ok(batches),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Unopened,
    Running,
    Done,
}

struct StreamDriver {
    plan: Box<dyn PhysicalOperator>,
    txn: Transaction,
    chunk_capacity: usize,
    phase: StreamPhase,
}

impl StreamDriver {
    fn poll_batch(&mut self) -> Option<Result<RecordBatch>> {
        if self.phase == StreamPhase::Done {
            return None;
        }
        if self.phase == StreamPhase::Unopened {
            if let Err(e) = self.plan.open(&self.txn) {
                self.phase = StreamPhase::Done;
                return Some(Err(e));
            }
            self.phase = StreamPhase::Running;
        }

        let mut chunk = Chunk::with_capacity(self.chunk_capacity);
        let batch = match self.plan.next(&mut chunk) {
            Ok(StreamState::Ready) => chunk.to_record_batch(self.plan.schema()),
            Ok(StreamState::EndOfStream) => {
                self.phase = StreamPhase::Done;
                return self.plan.close().err().map(Err);
            }
            Err(e) => Err(e),
        };
        if batch.is_err() {
            self.phase = StreamPhase::Done;
            let _ = self.plan.close();
        }
        Some(batch)
    }
}

/// Utility to print a record batch
pub fn print_batch(batch: &RecordBatch) -> Result<()> {
    use arrow::util::pretty::print_batches;
    print_batches(std::slice::from_ref(batch))?;
    Ok(())
}

/// Utility to print query results
pub fn print_results(result: &QueryResult) -> Result<()> {
    use arrow::util::pretty::print_batches;

    println!("Row count: {}", result.row_count);
    println!(
        "Timing: open={:?}, exec={:?}, total={:?}",
        result.metrics.open_time, result.metrics.execute_time, result.metrics.total_time
    );
    println!();

    if !result.batches.is_empty() {
        print_batches(&result.batches)?;
    }
    Ok(())
}
