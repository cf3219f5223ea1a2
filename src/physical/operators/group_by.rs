//! Grouped aggregation operator
//!
//! Consumes the whole child during `open`, folding every chunk into an
//! `AggregateHashTable`, then emits the table in a single output chunk on the
//! first `next`.

use crate::common::{AttrType, Chunk, Column, Schema, SchemaField, StreamState};
use crate::error::{QueryError, Result};
use crate::execution::EngineConfig;
use crate::expr::{
    create_hash_table, AggregateExpr, AggregateFunction, AggregateHashTable, Expr,
    HashTableStrategy,
};
use crate::physical::{PhysicalOperator, Transaction};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupByState {
    Closed,
    Building,
    Built,
    Emitted,
}

/// Hash aggregate execution operator
#[derive(Debug)]
pub struct GroupByVecExec {
    input: Box<dyn PhysicalOperator>,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateExpr>,
    schema: Schema,
    table_shape: TableShape,
    hash_table: Box<dyn AggregateHashTable>,
    chunk_capacity: usize,
    state: GroupByState,
}

/// Everything `create_hash_table` needs, kept so each `open` starts from an
/// empty table
#[derive(Debug, Clone)]
struct TableShape {
    strategy: HashTableStrategy,
    initial_capacity: usize,
    group_types: Vec<AttrType>,
    funcs: Vec<AggregateFunction>,
    value_types: Vec<AttrType>,
}

impl TableShape {
    fn create(&self) -> Result<Box<dyn AggregateHashTable>> {
        create_hash_table(
            self.strategy,
            self.initial_capacity,
            &self.group_types,
            &self.funcs,
            &self.value_types,
        )
    }
}

impl GroupByVecExec {
    /// Grouped aggregation of `input`.
    ///
    /// Output columns are the grouping expressions followed by one column
    /// per aggregate, each typed by its expression over the input schema.
    ///
    /// Every aggregate folds the same way whatever its function: INTEGER and
    /// FLOAT slots keep a running sum, slots of other types keep the first
    /// value seen for the group.
    pub fn try_new(
        input: Box<dyn PhysicalOperator>,
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let input_schema = input.schema();
        let mut fields = Vec::with_capacity(group_by.len() + aggregates.len());

        let mut group_types = Vec::with_capacity(group_by.len());
        for expr in &group_by {
            let attr_type = expr.data_type(input_schema)?;
            fields.push(SchemaField::new(expr.output_name(), attr_type));
            group_types.push(attr_type);
        }

        let mut value_types = Vec::with_capacity(aggregates.len());
        for agg in &aggregates {
            let attr_type = agg.child().data_type(input_schema)?;
            fields.push(SchemaField::new(agg.output_name(), attr_type));
            value_types.push(attr_type);
        }

        if let Some(field) = fields.iter().find(|f| f.attr_type == AttrType::Undefined) {
            return Err(QueryError::InvalidArgument(format!(
                "column {} has no type",
                field.name
            )));
        }

        let table_shape = TableShape {
            strategy: config.hash_table,
            initial_capacity: config.linear_probing_capacity,
            group_types,
            funcs: aggregates.iter().map(|a| a.func).collect(),
            value_types,
        };
        let hash_table = table_shape.create()?;

        Ok(Self {
            input,
            group_by,
            aggregates,
            schema: Schema::new(fields),
            table_shape,
            hash_table,
            chunk_capacity: config.chunk_capacity,
            state: GroupByState::Closed,
        })
    }

    /// Name of the hash table implementation in use
    pub fn hash_table_name(&self) -> &str {
        self.hash_table.name()
    }

    fn build(&mut self) -> Result<()> {
        let mut input_chunk = Chunk::with_capacity(self.chunk_capacity);
        let mut chunks = 0usize;

        while self.input.next(&mut input_chunk)? == StreamState::Ready {
            let mut groups_chunk = Chunk::with_capacity(input_chunk.rows());
            for expr in &self.group_by {
                groups_chunk.add_column(expr.get_column(&input_chunk)?)?;
            }
            let mut aggrs_chunk = Chunk::with_capacity(input_chunk.rows());
            for agg in &self.aggregates {
                aggrs_chunk.add_column(agg.child().get_column(&input_chunk)?)?;
            }
            self.hash_table.add_chunk(&groups_chunk, &aggrs_chunk)?;
            chunks += 1;
        }

        debug!(
            chunks,
            groups = self.hash_table.len(),
            table = self.hash_table.name(),
            "Hash aggregate build finished"
        );
        Ok(())
    }
}

impl PhysicalOperator for GroupByVecExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn open(&mut self, txn: &Transaction) -> Result<()> {
        if let Err(e) = self.input.open(txn) {
            info!(error = %e, %txn, "Failed to open child operator");
            return Err(e);
        }

        self.state = GroupByState::Building;
        self.hash_table = self.table_shape.create()?;
        if let Err(e) = self.build() {
            info!(error = %e, %txn, "Failed to build aggregate hash table");
            return Err(e);
        }
        self.state = GroupByState::Built;
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> Result<StreamState> {
        match self.state {
            GroupByState::Emitted => return Ok(StreamState::EndOfStream),
            GroupByState::Built => {}
            GroupByState::Closed | GroupByState::Building => {
                return Err(QueryError::Internal(
                    "hash aggregate polled before open completed".into(),
                ))
            }
        }

        chunk.reset();
        for field in self.schema.fields() {
            chunk.add_column(Column::with_capacity(field.attr_type, self.hash_table.len())?)?;
        }

        {
            let mut scanner = self.hash_table.scanner();
            while scanner.next(chunk)? == StreamState::Ready {}
        }

        self.state = GroupByState::Emitted;
        Ok(StreamState::Ready)
    }

    fn close(&mut self) -> Result<()> {
        self.state = GroupByState::Closed;
        self.input.close()
    }

    fn name(&self) -> &str {
        "HashAggregate"
    }
}

impl fmt::Display for GroupByVecExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.group_by.iter().map(|e| e.to_string()).collect();
        let aggs: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
        write!(
            f,
            "HashAggregate: group_by=[{}], aggs=[{}], table={}",
            groups.join(", "),
            aggs.join(", "),
            self.hash_table.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use crate::expr::HashTableStrategy;
    use crate::physical::{MemoryTable, MemoryTableExec};
    use std::collections::BTreeMap;

    fn kv_scan(batches: Vec<(Vec<i32>, Vec<i32>)>) -> Box<dyn PhysicalOperator> {
        let schema = Schema::new(vec![
            SchemaField::new("k", AttrType::Integer),
            SchemaField::new("v", AttrType::Integer),
        ]);
        let chunks = batches
            .into_iter()
            .map(|(k, v)| Chunk::from_columns(vec![Column::from(k), Column::from(v)]).unwrap())
            .collect();
        Box::new(MemoryTableExec::new("t", MemoryTable::new(schema, chunks).unwrap(), None).unwrap())
    }

    fn sum_by_key(input: Box<dyn PhysicalOperator>, strategy: HashTableStrategy) -> GroupByVecExec {
        let config = EngineConfig::default().with_hash_table(strategy);
        GroupByVecExec::try_new(
            input,
            vec![Expr::column_at(0, "k")],
            vec![AggregateExpr::new(AggregateFunction::Sum, Expr::column_at(1, "v"))],
            &config,
        )
        .unwrap()
    }

    fn rows(chunk: &Chunk) -> BTreeMap<i32, Value> {
        (0..chunk.rows())
            .map(|r| (chunk.get_value(0, r).get_int(), chunk.get_value(1, r)))
            .collect()
    }

    #[test]
    fn test_group_by_sum() {
        for strategy in [HashTableStrategy::Standard, HashTableStrategy::LinearProbing] {
            let input = kv_scan(vec![(vec![1, 2], vec![10, 20]), (vec![1], vec![5])]);
            let mut agg = sum_by_key(input, strategy);
            agg.open(&Transaction::new(1)).unwrap();

            let mut chunk = Chunk::new();
            assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::Ready);
            assert_eq!(chunk.rows(), 2);
            let result = rows(&chunk);
            assert_eq!(result[&1], Value::Integer(15));
            assert_eq!(result[&2], Value::Integer(20));

            assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::EndOfStream);
            agg.close().unwrap();
        }
    }

    #[test]
    fn test_output_schema() {
        let agg = sum_by_key(kv_scan(vec![]), HashTableStrategy::Auto);
        let schema = agg.schema();
        assert_eq!(schema.field(0).name, "k");
        assert_eq!(schema.field(1).name, "SUM(v)");
        assert_eq!(schema.field(1).attr_type, AttrType::Integer);
        assert_eq!(agg.hash_table_name(), "LinearProbingHashTable");
    }

    #[test]
    fn test_emits_more_groups_than_chunk_capacity() {
        let keys: Vec<i32> = (0..5000).collect();
        let values = vec![2; 5000];
        let mut agg = sum_by_key(kv_scan(vec![(keys, values)]), HashTableStrategy::Standard);
        agg.open(&Transaction::new(1)).unwrap();

        let mut chunk = Chunk::with_capacity(64);
        agg.next(&mut chunk).unwrap();
        assert_eq!(chunk.rows(), 5000);
        assert!(rows(&chunk).values().all(|v| *v == Value::Integer(2)));
    }

    #[test]
    fn test_next_before_open() {
        let mut agg = sum_by_key(kv_scan(vec![]), HashTableStrategy::Auto);
        let err = agg.next(&mut Chunk::new()).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
    }

    #[test]
    fn test_reopen_starts_from_empty_table() {
        for strategy in [HashTableStrategy::Standard, HashTableStrategy::LinearProbing] {
            let input = kv_scan(vec![(vec![1, 2], vec![10, 20]), (vec![1], vec![5])]);
            let mut agg = sum_by_key(input, strategy);

            for round in 0..2 {
                agg.open(&Transaction::new(round)).unwrap();
                let mut chunk = Chunk::new();
                assert_eq!(agg.next(&mut chunk).unwrap(), StreamState::Ready);
                let result = rows(&chunk);
                assert_eq!(result[&1], Value::Integer(15), "{} round {}", strategy, round);
                assert_eq!(result[&2], Value::Integer(20), "{} round {}", strategy, round);
                agg.close().unwrap();
            }
        }
    }

    #[test]
    fn test_non_sum_aggregates_fold_like_sum() {
        let schema = Schema::new(vec![
            SchemaField::new("k", AttrType::Integer),
            SchemaField::new("v", AttrType::Integer),
            SchemaField::new("name", AttrType::String),
        ]);
        let chunk = Chunk::from_columns(vec![
            Column::from(vec![1, 2, 1]),
            Column::from(vec![10, 20, 5]),
            Column::from(vec!["b", "c", "a"]),
        ])
        .unwrap();
        let input = MemoryTableExec::new("t", MemoryTable::new(schema, vec![chunk]).unwrap(), None).unwrap();

        let mut agg = GroupByVecExec::try_new(
            Box::new(input),
            vec![Expr::column_at(0, "k")],
            vec![
                AggregateExpr::new(AggregateFunction::Max, Expr::column_at(1, "v")),
                AggregateExpr::new(AggregateFunction::Count, Expr::column_at(1, "v")),
                AggregateExpr::new(AggregateFunction::Min, Expr::column_at(2, "name")),
            ],
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(agg.hash_table_name(), "StandardAggregateHashTable");
        assert_eq!(agg.schema().field(1).name, "MAX(v)");
        assert_eq!(agg.schema().field(3).attr_type, AttrType::String);

        agg.open(&Transaction::new(1)).unwrap();
        let mut out = Chunk::new();
        assert_eq!(agg.next(&mut out).unwrap(), StreamState::Ready);
        assert_eq!(out.rows(), 2);

        let mut by_key = BTreeMap::new();
        for r in 0..out.rows() {
            by_key.insert(
                out.get_value(0, r).get_int(),
                (out.get_value(1, r), out.get_value(2, r), out.get_value(3, r)),
            );
        }
        // INTEGER slots are summed, the STRING slot keeps its first value
        assert_eq!(
            by_key[&1],
            (Value::Integer(15), Value::Integer(15), Value::from("b"))
        );
        assert_eq!(
            by_key[&2],
            (Value::Integer(20), Value::Integer(20), Value::from("c"))
        );
    }

    #[test]
    fn test_non_sum_with_forced_linear_probing_fails() {
        let config = EngineConfig::default().with_hash_table(HashTableStrategy::LinearProbing);
        let err = GroupByVecExec::try_new(
            kv_scan(vec![]),
            vec![Expr::column_at(0, "k")],
            vec![AggregateExpr::new(AggregateFunction::Max, Expr::column_at(1, "v"))],
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[derive(Debug)]
    struct FailingExec {
        schema: Schema,
        fail_open: bool,
        polls: usize,
    }

    impl PhysicalOperator for FailingExec {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn children(&self) -> Vec<&dyn PhysicalOperator> {
            vec![]
        }

        fn open(&mut self, _txn: &Transaction) -> Result<()> {
            if self.fail_open {
                return Err(QueryError::Execution("open failed".into()));
            }
            Ok(())
        }

        fn next(&mut self, chunk: &mut Chunk) -> Result<StreamState> {
            self.polls += 1;
            if self.polls > 1 {
                return Err(QueryError::Execution("read failed".into()));
            }
            chunk.reset();
            chunk.add_column(Column::from(vec![1]))?;
            chunk.add_column(Column::from(vec![1]))?;
            Ok(StreamState::Ready)
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "Failing"
        }
    }

    fn failing(fail_open: bool) -> Box<dyn PhysicalOperator> {
        Box::new(FailingExec {
            schema: Schema::new(vec![
                SchemaField::new("k", AttrType::Integer),
                SchemaField::new("v", AttrType::Integer),
            ]),
            fail_open,
            polls: 0,
        })
    }

    #[test]
    fn test_child_open_failure_propagates() {
        let mut agg = sum_by_key(failing(true), HashTableStrategy::Auto);
        let err = agg.open(&Transaction::new(1)).unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
        assert!(agg.next(&mut Chunk::new()).is_err());
    }

    #[test]
    fn test_child_read_failure_propagates() {
        let mut agg = sum_by_key(failing(false), HashTableStrategy::Auto);
        let err = agg.open(&Transaction::new(1)).unwrap_err();
        assert!(matches!(err, QueryError::Execution(msg) if msg == "read failed"));
        assert!(matches!(
            agg.next(&mut Chunk::new()),
            Err(QueryError::Internal(_))
        ));
    }
}
