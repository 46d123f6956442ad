use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_derive::{Deserialize, Serialize};

/// A DynamoDB item, or the key part of one.
pub type Item = HashMap<String, AttributeValue>;

/// Keys to fetch, grouped by table name.
pub type KeyBatch = HashMap<String, Vec<Item>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    S,
    N,
    B,
}

/// One attribute of a table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub key_type: KeyType,
    #[serde(rename = "type")]
    pub attribute_type: ScalarType,
}

impl KeyAttribute {
    pub fn hash(name: impl Into<String>, attribute_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::Hash,
            attribute_type,
        }
    }

    pub fn range(name: impl Into<String>, attribute_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::Range,
            attribute_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub read_capacity: i64,
    pub write_capacity: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            read_capacity: 10,
            write_capacity: 10,
        }
    }
}

/// A local secondary index: the table's partition key with another sort key.
/// Every attribute is projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIndex {
    pub name: String,
    pub range_key: KeyAttribute,
}

/// Everything needed to create a table, and to create its archive twin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub key_schema: Vec<KeyAttribute>,
    #[serde(default)]
    pub throughput: Throughput,
    #[serde(default)]
    pub local_indexes: Vec<LocalIndex>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, key_schema: Vec<KeyAttribute>) -> Self {
        Self {
            name: name.into(),
            key_schema,
            throughput: Throughput::default(),
            local_indexes: Vec::new(),
        }
    }

    pub fn with_local_index(mut self, name: impl Into<String>, range_key: KeyAttribute) -> Self {
        self.local_indexes.push(LocalIndex {
            name: name.into(),
            range_key: KeyAttribute {
                key_type: KeyType::Range,
                ..range_key
            },
        });
        self
    }

    pub fn hash_key(&self) -> Option<&KeyAttribute> {
        self.key_schema.iter().find(|k| k.key_type == KeyType::Hash)
    }

    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn key_names(&self) -> Vec<String> {
        self.key_schema.iter().map(|k| k.name.clone()).collect()
    }

    /// Projects an item onto this table's primary key.
    /// Returns `None` when the item lacks one of the key attributes.
    pub fn key_of(&self, item: &Item) -> Option<Item> {
        key_of(item, &self.key_names())
    }

    /// Same keys, indexes and throughput, named `{name}-archive`.
    pub fn archive_spec(&self) -> TableSpec {
        TableSpec {
            name: format!("{}-archive", self.name),
            key_schema: self.key_schema.clone(),
            throughput: self.throughput,
            local_indexes: self.local_indexes.clone(),
        }
    }
}

pub(crate) fn key_of(item: &Item, key_names: &[String]) -> Option<Item> {
    key_names
        .iter()
        .map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}
