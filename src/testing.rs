//! In-memory `BatchStore` for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::{BatchError, Result};
use crate::model::{Item, KeyBatch, TableSpec};
use crate::store::{BatchGetPage, BatchStore, WriteOp};

/// Builds an item whose attributes are all strings.
pub(crate) fn item(attrs: &[(&str, &str)]) -> Item {
    attrs
        .iter()
        .map(|(k, v)| (k.to_string(), AttributeValue::S(v.to_string())))
        .collect()
}

#[derive(Default)]
struct State {
    tables: HashMap<String, TableSpec>,
    items: HashMap<String, Vec<Item>>,
    get_script: VecDeque<BatchGetPage>,
    get_calls: Vec<KeyBatch>,
    write_calls: Vec<(String, Vec<WriteOp>)>,
    stalled_writes: usize,
    throttled_writes: bool,
    failed_creates: usize,
    failed_create_code: String,
    create_calls: usize,
    put_calls: Vec<(String, Item)>,
    deleted_tables: Vec<String>,
}

#[derive(Default)]
pub(crate) struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    pub fn with_tables(specs: impl IntoIterator<Item = TableSpec>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for spec in specs {
                state.items.insert(spec.name.clone(), Vec::new());
                state.tables.insert(spec.name.clone(), spec);
            }
        }
        store
    }

    /// Queues pages returned by `batch_get_item` ahead of the stored data.
    pub fn script_gets(&self, pages: impl IntoIterator<Item = BatchGetPage>) {
        self.state.lock().unwrap().get_script.extend(pages);
    }

    /// The next `n` writes come back entirely unprocessed.
    pub fn stall_writes(&self, n: usize) {
        self.state.lock().unwrap().stalled_writes = n;
    }

    /// Every multi-request write leaves its last request unprocessed.
    pub fn throttle_writes(&self) {
        self.state.lock().unwrap().throttled_writes = true;
    }

    /// The next `n` table creations fail with the given service error code.
    pub fn fail_creates(&self, n: usize, code: &str) {
        let mut state = self.state.lock().unwrap();
        state.failed_creates = n;
        state.failed_create_code = code.to_string();
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn put_calls(&self) -> Vec<(String, Item)> {
        self.state.lock().unwrap().put_calls.clone()
    }

    pub fn seed(&self, table: &str, items: Vec<Item>) {
        self.state
            .lock()
            .unwrap()
            .items
            .entry(table.to_string())
            .or_default()
            .extend(items);
    }

    pub fn items(&self, table: &str) -> Vec<Item> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn table(&self, name: &str) -> Option<TableSpec> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn deleted_tables(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_tables.clone()
    }

    pub fn get_calls(&self) -> Vec<KeyBatch> {
        self.state.lock().unwrap().get_calls.clone()
    }

    pub fn write_calls(&self) -> Vec<(String, Vec<WriteOp>)> {
        self.state.lock().unwrap().write_calls.clone()
    }
}

fn service_error(code: &str, message: &str) -> BatchError {
    BatchError::DynamoDb {
        code: Some(code.to_string()),
        message: message.to_string(),
    }
}

fn matches_key(item: &Item, key: &Item) -> bool {
    key.iter().all(|(name, value)| item.get(name) == Some(value))
}

#[async_trait]
impl BatchStore for MockStore {
    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if state.failed_creates > 0 {
            state.failed_creates -= 1;
            return Err(service_error(
                &state.failed_create_code,
                "Rate of requests exceeds the allowed throughput",
            ));
        }
        if !spec.local_indexes.is_empty() && spec.hash_key().is_none() {
            return Err(BatchError::Validation(format!(
                "table '{}' needs a partition key to carry local secondary indexes",
                spec.name
            )));
        }
        if state.tables.contains_key(&spec.name) {
            return Err(service_error(
                "ResourceInUseException",
                &format!("Table already exists: {}", spec.name),
            ));
        }
        state.items.insert(spec.name.clone(), Vec::new());
        state.tables.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn wait_until_exists(&self, table_name: &str) -> Result<()> {
        if self.state.lock().unwrap().tables.contains_key(table_name) {
            Ok(())
        } else {
            Err(service_error(
                "ResourceNotFoundException",
                &format!("Requested resource not found: Table: {table_name} not found"),
            ))
        }
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.tables.remove(table_name).is_none() {
            return Err(service_error(
                "ResourceNotFoundException",
                "Requested resource not found",
            ));
        }
        state.items.remove(table_name);
        state.deleted_tables.push(table_name.to_string());
        Ok(())
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.put_calls.push((table_name.to_string(), item.clone()));
        let key = state
            .tables
            .get(table_name)
            .ok_or_else(|| service_error("ResourceNotFoundException", "Requested resource not found"))?
            .key_of(&item)
            .ok_or_else(|| {
                service_error(
                    "ValidationException",
                    "One of the required keys was not given a value",
                )
            })?;
        let stored = state.items.entry(table_name.to_string()).or_default();
        stored.retain(|existing| !matches_key(existing, &key));
        stored.push(item);
        Ok(())
    }

    async fn batch_get_item(&self, keys: KeyBatch) -> Result<BatchGetPage> {
        let mut state = self.state.lock().unwrap();
        state.get_calls.push(keys.clone());
        if let Some(page) = state.get_script.pop_front() {
            return Ok(page);
        }

        let mut page = BatchGetPage::default();
        for (table, table_keys) in keys {
            let stored = state.items.get(&table).ok_or_else(|| {
                service_error("ResourceNotFoundException", "Requested resource not found")
            })?;
            let found = table_keys
                .iter()
                .filter_map(|key| stored.iter().find(|item| matches_key(item, key)).cloned())
                .collect();
            page.responses.insert(table, found);
        }
        Ok(page)
    }

    async fn batch_write_item(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        let mut state = self.state.lock().unwrap();
        state.write_calls.push((table_name.to_string(), ops.clone()));

        let key_names = state
            .tables
            .get(table_name)
            .ok_or_else(|| service_error("ResourceNotFoundException", "Requested resource not found"))?
            .key_names();

        if state.stalled_writes > 0 {
            state.stalled_writes -= 1;
            return Ok(ops);
        }
        let mut ops = ops;
        let unprocessed = if state.throttled_writes && ops.len() > 1 {
            ops.pop().into_iter().collect()
        } else {
            Vec::new()
        };

        let keys: Vec<Item> = ops
            .iter()
            .filter_map(|op| crate::model::key_of(op.item(), &key_names))
            .collect();
        if keys.len() != ops.len() {
            return Err(service_error(
                "ValidationException",
                "The provided key element does not match the schema",
            ));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(service_error(
                    "ValidationException",
                    "Provided list of item keys contains duplicates",
                ));
            }
        }

        let stored = state.items.entry(table_name.to_string()).or_default();
        for (op, key) in ops.into_iter().zip(keys) {
            stored.retain(|existing| !matches_key(existing, &key));
            if let WriteOp::Put(item) = op {
                stored.push(item);
            }
        }
        Ok(unprocessed)
    }
}
