use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AwsConfig;
use crate::convert::json_to_item;
use crate::error::{BatchError, Result};
use crate::model::{Item, KeyBatch, TableSpec};
use crate::retry::RetryPolicy;
use crate::store::BatchStore;
use crate::writer::BatchWriter;

/// DynamoDB rejects a `BatchGetItem` asking for more than 100 keys.
pub const MAX_GET_SIZE: usize = 100;

pub struct BatchAgent<S = Client> {
    pub store: S,
    /// Backoff for unprocessed keys and write requests.
    pub retry: RetryPolicy,
    /// Retries of a table creation that failed with a transient error.
    pub create_retry: RetryPolicy,
}

impl BatchAgent<Client> {
    /// Connects to DynamoDB, or to a local endpoint when one is configured.
    pub async fn connect(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        Self::new(Client::new(&shared_config))
    }
}

impl<S: BatchStore> BatchAgent<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            create_retry: RetryPolicy::fixed(10, Duration::from_secs(10)),
        }
    }

    pub fn writer(&self, table_name: &str) -> BatchWriter<'_, S> {
        BatchWriter::new(&self.store, table_name, self.retry)
    }

    /// Creates the table and waits until it exists. Throttled or failed
    /// creations are sent again, up to `create_retry.max_attempts` times.
    pub async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let created = async {
            self.create_with_retries(spec).await?;
            self.store.wait_until_exists(&spec.name).await
        }
        .await;
        match created {
            Ok(()) => {
                info!(table = %spec.name, "Created table");
                Ok(())
            }
            Err(e) => {
                error!(table = %spec.name, error = %e, "Couldn't create table");
                Err(e)
            }
        }
    }

    async fn create_with_retries(&self, spec: &TableSpec) -> Result<()> {
        let max_attempts = self.create_retry.max_attempts;
        let mut attempt = 1;
        loop {
            match self.store.create_table(spec).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        table = %spec.name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Failed to create table, retrying"
                    );
                    tokio::time::sleep(self.create_retry.delay_for(attempt - 1)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn delete_table(&self, spec: &TableSpec) -> Result<()> {
        match self.store.delete_table(&spec.name).await {
            Ok(()) => {
                info!(table = %spec.name, "Deleted table");
                Ok(())
            }
            Err(e) => {
                error!(table = %spec.name, error = %e, "Couldn't delete table");
                Err(e)
            }
        }
    }

    /// Puts one typed record into the table with a single `PutItem`.
    /// The record must serialize to an object carrying the table's key.
    pub async fn save<M: Serialize>(&self, spec: &TableSpec, record: &M) -> Result<()> {
        let value =
            serde_json::to_value(record).map_err(|e| BatchError::Serialization(e.to_string()))?;
        let item = json_to_item(value)?;
        if spec.key_of(&item).is_none() {
            return Err(BatchError::Validation(format!(
                "record is missing one of the key attributes {:?} of table '{}'",
                spec.key_names(),
                spec.name
            )));
        }
        self.store.put_item(&spec.name, item).await?;
        info!(table = %spec.name, "Saved item");
        Ok(())
    }

    /// Puts every item into the table through a batch writer.
    pub async fn fill_table(&self, spec: &TableSpec, items: Vec<Item>) -> Result<()> {
        let count = items.len();
        match self.put_all(self.writer(&spec.name), items).await {
            Ok(()) => {
                info!(table = %spec.name, count, "Loaded data into table");
                Ok(())
            }
            Err(e) => {
                error!(table = %spec.name, error = %e, "Couldn't load data into table");
                Err(e)
            }
        }
    }

    /// Fetches a batch of keys that may span several tables.
    ///
    /// Keys the service leaves unprocessed are requested again after an
    /// exponential backoff, for at most `retry.max_attempts` requests in
    /// total. The result maps every requested table to the items retrieved
    /// for it; when the attempts run out it simply holds fewer items than
    /// were asked for.
    pub async fn batch_get(&self, keys: KeyBatch) -> Result<HashMap<String, Vec<Item>>> {
        let requested = count_keys(&keys);
        if requested > MAX_GET_SIZE {
            return Err(BatchError::Validation(format!(
                "a batch get holds at most {MAX_GET_SIZE} keys, got {requested}"
            )));
        }

        let mut retrieved: HashMap<String, Vec<Item>> =
            keys.keys().map(|table| (table.clone(), Vec::new())).collect();
        let mut pending = without_empty(keys);
        if pending.is_empty() {
            return Ok(retrieved);
        }

        let mut attempt = 0;
        while attempt < self.retry.max_attempts {
            let page = self.store.batch_get_item(pending).await?;
            for (table, items) in page.responses {
                retrieved.entry(table).or_default().extend(items);
            }

            pending = without_empty(page.unprocessed);
            if pending.is_empty() {
                break;
            }

            attempt += 1;
            info!(count = count_keys(&pending), "unprocessed keys returned, retrying");
            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt - 1);
                info!(delay_secs = delay.as_secs(), "sleeping before retry");
                tokio::time::sleep(delay).await;
            } else {
                warn!(
                    count = count_keys(&pending),
                    attempts = attempt,
                    "batch get gave up with unprocessed keys"
                );
            }
        }

        Ok(retrieved)
    }

    /// Fetches keys from several tables in one batch and logs what came back.
    pub async fn get_batch_data(
        &self,
        requests: &[(&TableSpec, Vec<Item>)],
    ) -> Result<HashMap<String, Vec<Item>>> {
        let mut keys = KeyBatch::new();
        for (spec, table_keys) in requests {
            keys.entry(spec.name.clone())
                .or_default()
                .extend(table_keys.iter().cloned());
        }

        match self.batch_get(keys).await {
            Ok(retrieved) => {
                for (table, items) in &retrieved {
                    info!(table = %table, count = items.len(), "Got items");
                }
                Ok(retrieved)
            }
            Err(e) => {
                let tables: Vec<&str> = requests.iter().map(|(s, _)| s.name.as_str()).collect();
                error!(?tables, error = %e, "Couldn't get items");
                Err(e)
            }
        }
    }

    /// Copies `items` into a new `{name}-archive` table, then deletes them
    /// from the source table. Returns the archive table.
    ///
    /// The first copy goes through a plain writer, so duplicate keys in
    /// `items` make DynamoDB answer with `ValidationException`; that error is
    /// logged and ignored. The second copy deduplicates by primary key.
    pub async fn archive(&self, source: &TableSpec, items: &[Item]) -> Result<TableSpec> {
        let archive = source.archive_spec();
        if let Err(e) = self.create_table(&archive).await {
            error!(table = %source.name, error = %e, "Couldn't create archive table");
            return Err(e);
        }

        match self.put_all(self.writer(&archive.name), items.to_vec()).await {
            Ok(()) => info!(table = %archive.name, "Put items into archive"),
            Err(e) if e.is_validation() => {
                info!("Got expected exception when trying to put duplicate records into the archive table")
            }
            Err(e) => {
                error!(
                    table = %archive.name,
                    error = %e,
                    "Got unexpected exception when trying to put duplicate records into the archive table"
                );
                return Err(e);
            }
        }

        let dedup = self
            .writer(&archive.name)
            .overwrite_by_keys(archive.key_names());
        if let Err(e) = self.put_all(dedup, items.to_vec()).await {
            error!(table = %archive.name, error = %e, "Couldn't put items into archive");
            return Err(e);
        }
        info!(table = %archive.name, "Put items into archive");

        if let Err(e) = self.delete_all(source, items).await {
            error!(table = %source.name, error = %e, "Couldn't delete items");
            return Err(e);
        }
        info!(table = %source.name, "Deleted items");

        Ok(archive)
    }

    async fn put_all(&self, mut writer: BatchWriter<'_, S>, items: Vec<Item>) -> Result<()> {
        for item in items {
            writer.put(item).await?;
        }
        writer.close().await
    }

    async fn delete_all(&self, spec: &TableSpec, items: &[Item]) -> Result<()> {
        let mut writer = self.writer(&spec.name).overwrite_by_keys(spec.key_names());
        for item in items {
            let key = spec.key_of(item).ok_or_else(|| {
                BatchError::Validation(format!(
                    "item is missing a key attribute of table '{}'",
                    spec.name
                ))
            })?;
            writer.delete(key).await?;
        }
        writer.close().await
    }
}

fn count_keys(keys: &KeyBatch) -> usize {
    keys.values().map(Vec::len).sum()
}

fn without_empty(mut keys: KeyBatch) -> KeyBatch {
    keys.retain(|_, table_keys| !table_keys.is_empty());
    keys
}
