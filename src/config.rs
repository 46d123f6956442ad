//! Connection and demo settings.

use std::path::PathBuf;

use crate::model::{KeyAttribute, ScalarType, Throughput};

pub const DEFAULT_REGION: &str = "us-west-2";

/// Where the DynamoDB client points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// Custom endpoint URL, e.g. DynamoDB Local at `http://localhost:8000`.
    pub endpoint_url: Option<String>,
    pub region: String,
}

impl AwsConfig {
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({url})"),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub data_file: PathBuf,
    /// Tables are named `{prefix}-{collection}-{nanos}`.
    pub table_prefix: String,
    /// Collections to load; empty means every collection in the data file.
    pub collections: Vec<String>,
    pub key_schema: Vec<KeyAttribute>,
    pub throughput: Throughput,
    /// Records loaded per collection.
    pub max_items: usize,
    /// Records of the first collection copied to the archive table.
    pub archive_count: usize,
    /// Typed time-series records saved into an indexed table; 0 skips that step.
    pub time_series_records: usize,
    pub cleanup: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("ead.json"),
            table_prefix: "demo-batch".to_string(),
            collections: Vec::new(),
            key_schema: vec![
                KeyAttribute::hash("address_hash", ScalarType::S),
                KeyAttribute::range("valid_time", ScalarType::S),
            ],
            throughput: Throughput::default(),
            max_items: 500,
            archive_count: 10,
            time_series_records: 0,
            cleanup: false,
        }
    }
}
