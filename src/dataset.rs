//! Demo data: a JSON object mapping collection names to arrays of records.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::convert::json_to_item;
use crate::error::{BatchError, Result};
use crate::model::Item;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    collections: BTreeMap<String, Vec<Value>>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BatchError::DataFile {
                    path: path.to_path_buf(),
                    cwd: std::env::current_dir()?,
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let collections = serde_json::from_str(text)
            .map_err(|e| BatchError::Deserialization(e.to_string()))?;
        Ok(Self { collections })
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// The first `limit` records of a collection as DynamoDB items.
    pub fn items(&self, name: &str, limit: usize) -> Result<Vec<Item>> {
        let records = self.collections.get(name).ok_or_else(|| {
            BatchError::Validation(format!("collection '{name}' not found in data file"))
        })?;
        records.iter().take(limit).cloned().map(json_to_item).collect()
    }
}
