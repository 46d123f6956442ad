use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, DeleteRequest, KeySchemaElement, KeysAndAttributes,
    LocalSecondaryIndex, Projection, ProjectionType, ProvisionedThroughput, PutRequest,
    ScalarAttributeType, TableStatus, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::info;

use crate::error::{BatchError, Result};
use crate::model::{Item, KeyAttribute, KeyBatch, KeyType, ScalarType, TableSpec};

/// Upper bound on write requests in one `BatchWriteItem` call.
pub const MAX_WRITE_SIZE: usize = 25;

const TABLE_POLL_ATTEMPTS: usize = 60;
const TABLE_POLL_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Item),
    /// Carries only the primary key of the item to delete.
    Delete(Item),
}

impl WriteOp {
    pub fn item(&self) -> &Item {
        match self {
            WriteOp::Put(item) | WriteOp::Delete(item) => item,
        }
    }
}

/// One `BatchGetItem` round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetPage {
    pub responses: HashMap<String, Vec<Item>>,
    pub unprocessed: KeyBatch,
}

/// The calls this crate makes against DynamoDB.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn create_table(&self, spec: &TableSpec) -> Result<()>;

    async fn wait_until_exists(&self, table_name: &str) -> Result<()>;

    async fn delete_table(&self, table_name: &str) -> Result<()>;

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()>;

    async fn batch_get_item(&self, keys: KeyBatch) -> Result<BatchGetPage>;

    /// Sends the requests for one table and hands back whatever the service left unprocessed.
    async fn batch_write_item(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>>;
}

#[async_trait]
impl BatchStore for Client {
    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let mut key_schema = Vec::with_capacity(spec.key_schema.len());
        let mut attribute_definitions: Vec<AttributeDefinition> = Vec::new();
        for key in &spec.key_schema {
            key_schema.push(key_schema_element(key)?);
            attribute_definitions.push(attribute_definition(key)?);
        }

        let mut local_indexes = Vec::with_capacity(spec.local_indexes.len());
        if !spec.local_indexes.is_empty() {
            let hash_key = spec.hash_key().ok_or_else(|| {
                BatchError::Validation(format!(
                    "table '{}' needs a partition key to carry local secondary indexes",
                    spec.name
                ))
            })?;
            for index in &spec.local_indexes {
                let range_name = index.range_key.name.as_str();
                if !attribute_definitions
                    .iter()
                    .any(|a| a.attribute_name() == range_name)
                {
                    attribute_definitions.push(attribute_definition(&index.range_key)?);
                }
                local_indexes.push(
                    LocalSecondaryIndex::builder()
                        .index_name(&index.name)
                        .key_schema(key_schema_element(hash_key)?)
                        .key_schema(key_schema_element(&index.range_key)?)
                        .projection(
                            Projection::builder()
                                .projection_type(ProjectionType::All)
                                .build(),
                        )
                        .build()
                        .map_err(BatchError::from_build)?,
                );
            }
        }

        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(spec.throughput.read_capacity)
            .write_capacity_units(spec.throughput.write_capacity)
            .build()
            .map_err(BatchError::from_build)?;

        self.create_table()
            .table_name(&spec.name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions))
            .billing_mode(BillingMode::Provisioned)
            .provisioned_throughput(throughput)
            .set_local_secondary_indexes((!local_indexes.is_empty()).then_some(local_indexes))
            .send()
            .await
            .map_err(BatchError::from_sdk)?;
        Ok(())
    }

    async fn wait_until_exists(&self, table_name: &str) -> Result<()> {
        info!(table = table_name, "Waiting for table to be available");
        for attempt in 1..=TABLE_POLL_ATTEMPTS {
            let output = self
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(BatchError::from_sdk)?;
            let status = output.table().and_then(|t| t.table_status());
            if status == Some(&TableStatus::Active) {
                return Ok(());
            }
            info!(
                table = table_name,
                ?status,
                attempt,
                max_attempts = TABLE_POLL_ATTEMPTS,
                "Table not available yet"
            );
            tokio::time::sleep(TABLE_POLL_DELAY).await;
        }
        Err(BatchError::TableActivationTimeout(table_name.to_string()))
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        self.delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(BatchError::from_sdk)?;
        Ok(())
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        self.put_item()
            .table_name(table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(BatchError::from_sdk)?;
        Ok(())
    }

    async fn batch_get_item(&self, keys: KeyBatch) -> Result<BatchGetPage> {
        let mut request_items = HashMap::with_capacity(keys.len());
        for (table, table_keys) in keys {
            let keys_and_attributes = KeysAndAttributes::builder()
                .set_keys(Some(table_keys))
                .build()
                .map_err(BatchError::from_build)?;
            request_items.insert(table, keys_and_attributes);
        }

        let output = self
            .batch_get_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(BatchError::from_sdk)?;

        let unprocessed = output
            .unprocessed_keys()
            .map(|pending| {
                pending
                    .iter()
                    .map(|(table, kaa)| (table.clone(), kaa.keys().to_vec()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(BatchGetPage {
            responses: output.responses.unwrap_or_default(),
            unprocessed,
        })
    }

    async fn batch_write_item(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        let mut requests = Vec::with_capacity(ops.len());
        for op in ops {
            let request = match op {
                WriteOp::Put(item) => WriteRequest::builder()
                    .put_request(
                        PutRequest::builder()
                            .set_item(Some(item))
                            .build()
                            .map_err(BatchError::from_build)?,
                    )
                    .build(),
                WriteOp::Delete(key) => WriteRequest::builder()
                    .delete_request(
                        DeleteRequest::builder()
                            .set_key(Some(key))
                            .build()
                            .map_err(BatchError::from_build)?,
                    )
                    .build(),
            };
            requests.push(request);
        }

        let output = self
            .batch_write_item()
            .request_items(table_name, requests)
            .send()
            .await
            .map_err(BatchError::from_sdk)?;

        let mut unprocessed = Vec::new();
        for requests in output.unprocessed_items.unwrap_or_default().into_values() {
            for request in requests {
                if let Some(put) = request.put_request() {
                    unprocessed.push(WriteOp::Put(put.item().clone()));
                }
                if let Some(delete) = request.delete_request() {
                    unprocessed.push(WriteOp::Delete(delete.key().clone()));
                }
            }
        }
        Ok(unprocessed)
    }
}

fn key_schema_element(key: &KeyAttribute) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(&key.name)
        .key_type(match key.key_type {
            KeyType::Hash => aws_sdk_dynamodb::types::KeyType::Hash,
            KeyType::Range => aws_sdk_dynamodb::types::KeyType::Range,
        })
        .build()
        .map_err(BatchError::from_build)
}

fn attribute_definition(key: &KeyAttribute) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(&key.name)
        .attribute_type(to_scalar_type(key.attribute_type))
        .build()
        .map_err(BatchError::from_build)
}

fn to_scalar_type(attribute_type: ScalarType) -> ScalarAttributeType {
    match attribute_type {
        ScalarType::S => ScalarAttributeType::S,
        ScalarType::N => ScalarAttributeType::N,
        ScalarType::B => ScalarAttributeType::B,
    }
}
