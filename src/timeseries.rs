//! Typed time-series records, saved one at a time into a table that carries
//! a local secondary index on transaction time.

use chrono::{Days, NaiveDate, Utc};
use serde_derive::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::agent::BatchAgent;
use crate::error::Result;
use crate::model::{KeyAttribute, ScalarType, TableSpec, Throughput};
use crate::store::BatchStore;

pub const TRANSACTION_TIME_INDEX: &str = "TransactionTime_index";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeSeries {
    pub time_series_key: String,
    pub valid_time: String,
    pub transaction_time: String,
}

impl TimeSeries {
    pub fn new(time_series_key: impl Into<String>, valid: NaiveDate, transaction: NaiveDate) -> Self {
        Self {
            time_series_key: time_series_key.into(),
            valid_time: valid.format(DATE_FORMAT).to_string(),
            transaction_time: transaction.format(DATE_FORMAT).to_string(),
        }
    }
}

/// `TimeSeriesKey`/`ValidTime` primary key, plus [`TRANSACTION_TIME_INDEX`]
/// sorting the same partition by `TransactionTime`.
pub fn table_spec(name: impl Into<String>, throughput: Throughput) -> TableSpec {
    TableSpec::new(
        name,
        vec![
            KeyAttribute::hash("TimeSeriesKey", ScalarType::S),
            KeyAttribute::range("ValidTime", ScalarType::S),
        ],
    )
    .with_throughput(throughput)
    .with_local_index(
        TRANSACTION_TIME_INDEX,
        KeyAttribute::range("TransactionTime", ScalarType::S),
    )
}

/// Creates the indexed table and saves `count` records of one new series,
/// valid on consecutive days up to today and all recorded today.
pub async fn run<S: BatchStore>(
    agent: &BatchAgent<S>,
    spec: &TableSpec,
    count: usize,
) -> Result<Vec<TimeSeries>> {
    println!("Creating table {}.", spec.name);
    agent.create_table(spec).await?;
    println!("Table {} created.", spec.name);

    let series = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();
    let mut saved = Vec::with_capacity(count);
    for offset in 0..count {
        let valid = today
            .checked_sub_days(Days::new(offset as u64))
            .unwrap_or(NaiveDate::MIN);
        let record = TimeSeries::new(&series, valid, today);
        agent.save(spec, &record).await?;
        println!("TimeSeries {} valid {} created.", record.time_series_key, record.valid_time);
        saved.push(record);
    }
    info!(table = %spec.name, count = saved.len(), "saved time series");
    Ok(saved)
}
