//! Aggregation Engine CLI

use aggregation_engine::datagen::GroupedDataGenerator;
use aggregation_engine::execution::{print_batch, print_results, EngineConfig, ExecutionContext, QueryResult};
use aggregation_engine::expr::{AggregateExpr, AggregateFunction, Expr, HashTableStrategy};
use aggregation_engine::physical::display_plan;
use aggregation_engine::{QueryError, Result};
use arrow::array::{Array, Float32Array, Int32Array};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "aggregation_engine")]
#[command(about = "Vectorized GROUP BY aggregation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate generated sales data
    Run {
        /// Number of generated rows
        #[arg(short, long, default_value = "100000")]
        rows: usize,

        /// Number of distinct group keys
        #[arg(short, long, default_value = "1000")]
        groups: usize,

        /// Rows per generated batch
        #[arg(short, long, default_value = "1024")]
        batch_rows: usize,

        /// Grouping columns (k, region, quantity, price, day); empty for a scalar aggregate
        #[arg(long, value_delimiter = ',', default_value = "k")]
        group_by: Vec<String>,

        /// Column to sum
        #[arg(long, default_value = "quantity")]
        sum: String,

        /// Hash table strategy (auto, standard, linear_probing)
        #[arg(long, default_value = "auto")]
        strategy: HashTableStrategy,

        /// JSON engine configuration; --strategy overrides its hash table
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Show the operator tree
        #[arg(short, long)]
        plan: bool,

        /// Print batches as the stream yields them
        #[arg(long)]
        stream: bool,
    },

    /// Run both hash tables on the same data and check they agree
    Compare {
        /// Number of generated rows
        #[arg(short, long, default_value = "100000")]
        rows: usize,

        /// Number of distinct group keys
        #[arg(short, long, default_value = "1000")]
        groups: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print the default engine configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run {
            rows,
            groups,
            batch_rows,
            group_by,
            sum,
            strategy,
            config,
            seed,
            plan,
            stream,
        } => {
            let options = RunOptions {
                rows,
                groups,
                batch_rows,
                group_by,
                sum,
                strategy,
                config,
                seed,
                plan,
                stream,
            };
            run(options).await
        }
        Commands::Compare { rows, groups, seed } => compare(rows, groups, seed),
        Commands::Config => EngineConfig::default().to_json().map(|json| println!("{}", json)),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct RunOptions {
    rows: usize,
    groups: usize,
    batch_rows: usize,
    group_by: Vec<String>,
    sum: String,
    strategy: HashTableStrategy,
    config: Option<PathBuf>,
    seed: u64,
    plan: bool,
    stream: bool,
}

fn load_sales(config: EngineConfig, rows: usize, groups: usize, batch_rows: usize, seed: u64) -> Result<ExecutionContext> {
    let start = Instant::now();
    let batches = GroupedDataGenerator::with_seed(groups, seed).generate(rows, batch_rows)?;
    println!("Generated {} rows in {:?}", rows, start.elapsed());

    let mut ctx = ExecutionContext::with_config(config);
    ctx.register_batches("sales", &batches)?;
    Ok(ctx)
}

async fn run(options: RunOptions) -> Result<()> {
    let config = match &options.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    }
    .with_hash_table(options.strategy);

    let ctx = load_sales(config, options.rows, options.groups, options.batch_rows, options.seed)?;

    let scan = ctx.scan("sales", None)?;
    let schema = scan.schema().clone();
    let group_by = options
        .group_by
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| Expr::column(&schema, name))
        .collect::<Result<Vec<_>>>()?;
    let aggregates = vec![AggregateExpr::new(
        AggregateFunction::Sum,
        Expr::column(&schema, &options.sum)?,
    )];
    let mut plan = ctx.aggregate(scan, group_by, aggregates)?;

    if options.plan {
        println!("Plan:\n{}", display_plan(plan.as_ref(), 0));
    }

    if options.stream {
        let mut stream = ctx.execute_stream(plan);
        while let Some(batch) = stream.try_next().await? {
            print_batch(&batch)?;
        }
    } else {
        let result = ctx.execute(plan.as_mut())?;
        print_results(&result)?;
    }
    Ok(())
}

fn sum_by_key(ctx: &ExecutionContext, column: &str) -> Result<QueryResult> {
    let scan = ctx.scan("sales", None)?;
    let schema = scan.schema().clone();
    let mut plan = ctx.aggregate(
        scan,
        vec![Expr::column(&schema, "k")?],
        vec![AggregateExpr::new(AggregateFunction::Sum, Expr::column(&schema, column)?)],
    )?;
    ctx.execute(plan.as_mut())
}

/// Group key → summed value as f64, from a two-column result
fn collect_sums(result: &QueryResult) -> Result<BTreeMap<i32, f64>> {
    let mut sums = BTreeMap::new();
    for batch in &result.batches {
        let keys = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int32Array>()
            .ok_or_else(|| QueryError::Execution("group key column is not Int32".into()))?;
        let values = batch.column(1);
        for row in 0..batch.num_rows() {
            let value = if let Some(ints) = values.as_any().downcast_ref::<Int32Array>() {
                ints.value(row) as f64
            } else if let Some(floats) = values.as_any().downcast_ref::<Float32Array>() {
                floats.value(row) as f64
            } else {
                return Err(QueryError::Execution(format!(
                    "unexpected sum type {:?}",
                    values.data_type()
                )));
            };
            sums.insert(keys.value(row), value);
        }
    }
    Ok(sums)
}

fn compare(rows: usize, groups: usize, seed: u64) -> Result<()> {
    let mut mismatches = 0usize;

    for column in ["quantity", "price"] {
        let mut results = Vec::new();
        for strategy in [HashTableStrategy::Standard, HashTableStrategy::LinearProbing] {
            let config = EngineConfig::default().with_hash_table(strategy);
            let ctx = load_sales(config, rows, groups, 1024, seed)?;
            let result = sum_by_key(&ctx, column)?;
            println!(
                "SUM({}) with {} table: {} groups in {:?}",
                column, strategy, result.row_count, result.metrics.total_time
            );
            results.push(collect_sums(&result)?);
        }

        let (standard, linear) = (&results[0], &results[1]);
        if standard.len() != linear.len() {
            println!(
                "  group count differs: standard={}, linear_probing={}",
                standard.len(),
                linear.len()
            );
            mismatches += 1;
            continue;
        }
        for (key, expected) in standard {
            let actual = linear.get(key).copied().unwrap_or(f64::NAN);
            // float sums depend on insertion order
            let tolerance = 1e-4 * expected.abs().max(1.0);
            if actual.is_nan() || (actual - expected).abs() > tolerance {
                println!("  key {}: standard={}, linear_probing={}", key, expected, actual);
                mismatches += 1;
            }
        }
    }

    if mismatches > 0 {
        return Err(QueryError::Execution(format!("{} mismatching groups", mismatches)));
    }
    println!("Both hash tables agree");
    Ok(())
}
