//! Batch reads and writes against DynamoDB.
//!
//! [`agent::BatchAgent`] creates tables, loads them through a buffered
//! [`writer::BatchWriter`], fetches keys across tables with bounded retry of
//! unprocessed keys, and archives rows into a `{table}-archive` copy.

pub mod agent;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod demo;
pub mod error;
pub mod model;
pub mod retry;
pub mod store;
pub mod timeseries;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{BatchAgent, MAX_GET_SIZE};
pub use error::{BatchError, Result};
pub use model::{Item, KeyBatch, TableSpec};
