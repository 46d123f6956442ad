use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dynabatch::config::{AwsConfig, DemoConfig, DEFAULT_REGION};
use dynabatch::dataset::Dataset;
use dynabatch::model::{KeyAttribute, ScalarType, Throughput};
use dynabatch::{demo, BatchAgent, BatchError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_URL: &str =
    "https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/samples/tradedata.zip";

/// Amazon DynamoDB batch usage demo
#[derive(Parser, Debug)]
#[command(name = "dynabatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON file mapping collection names to arrays of records
    #[arg(long, default_value = "ead.json")]
    data_file: PathBuf,

    /// Custom DynamoDB endpoint, e.g. http://localhost:8000
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Prefix for the demo table names
    #[arg(long, default_value = "demo-batch")]
    table_prefix: String,

    /// Collections to load (defaults to all of them)
    #[arg(long = "collection", value_name = "NAME")]
    collections: Vec<String>,

    /// Partition key attribute (string)
    #[arg(long, default_value = "address_hash")]
    hash_key: String,

    /// Sort key attribute (string)
    #[arg(long, default_value = "valid_time")]
    range_key: Option<String>,

    /// Drop the sort key and use the partition key alone
    #[arg(long, conflicts_with = "range_key")]
    no_range_key: bool,

    #[arg(long, default_value_t = 10)]
    read_capacity: i64,

    #[arg(long, default_value_t = 10)]
    write_capacity: i64,

    /// Records loaded per collection
    #[arg(long, default_value_t = 500)]
    max_items: usize,

    /// Records of the first collection to archive
    #[arg(long, default_value_t = 10)]
    archive_count: usize,

    /// Typed TimeSeries records to save into a table with a transaction-time index
    #[arg(long, default_value_t = 0)]
    time_series: usize,

    /// Delete the demo tables when done
    #[arg(long)]
    cleanup: bool,
}

impl Cli {
    fn aws_config(&self) -> AwsConfig {
        AwsConfig {
            endpoint_url: self.endpoint_url.clone(),
            region: self.region.clone(),
        }
    }

    fn demo_config(&self) -> DemoConfig {
        let mut key_schema = vec![KeyAttribute::hash(&self.hash_key, ScalarType::S)];
        if let Some(range_key) = self.range_key.as_ref().filter(|_| !self.no_range_key) {
            key_schema.push(KeyAttribute::range(range_key, ScalarType::S));
        }
        DemoConfig {
            data_file: self.data_file.clone(),
            table_prefix: self.table_prefix.clone(),
            collections: self.collections.clone(),
            key_schema,
            throughput: Throughput {
                read_capacity: self.read_capacity,
                write_capacity: self.write_capacity,
            },
            max_items: self.max_items,
            archive_count: self.archive_count,
            time_series_records: self.time_series,
            cleanup: self.cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dynabatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let aws_config = cli.aws_config();
    let demo_config = cli.demo_config();

    println!("{}", "-".repeat(88));
    println!("Welcome to the Amazon DynamoDB batch usage demo.");
    println!("{}", "-".repeat(88));
    println!("Target: {}", aws_config.target_display());

    println!("Getting data from {}.", demo_config.data_file.display());
    let dataset = match Dataset::load(&demo_config.data_file) {
        Ok(dataset) => dataset,
        Err(BatchError::DataFile { path, cwd }) => {
            println!(
                "The file {} was not found in the current working directory {}.\n\
                 1. Download the zip file from {SAMPLE_URL}.\n\
                 2. Extract '{}' to {}.\n\
                 3. Run the usage demo again.",
                path.display(),
                cwd.display(),
                path.display(),
                cwd.display(),
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let agent = BatchAgent::connect(&aws_config).await;
    let report = demo::run(&agent, &dataset, &demo_config).await?;

    tracing::info!(
        tables = report.tables.len(),
        archived = report.archive.is_some(),
        "demo complete"
    );
    println!("Thanks for watching!");
    Ok(())
}
