//! Buffered batch writer.
//!
//! Collects put and delete requests for one table and sends them as
//! `BatchWriteItem` calls of at most [`MAX_WRITE_SIZE`] requests. Items the
//! service leaves unprocessed go back into the buffer and are resent after a
//! backoff. Nothing is sent for requests still buffered when the writer is
//! dropped, so finish with [`BatchWriter::close`].

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::{BatchError, Result};
use crate::model::{key_of, Item};
use crate::retry::RetryPolicy;
use crate::store::{BatchStore, WriteOp, MAX_WRITE_SIZE};

pub struct BatchWriter<'a, S: BatchStore + ?Sized> {
    store: &'a S,
    table_name: String,
    retry: RetryPolicy,
    overwrite_by_keys: Option<Vec<String>>,
    buffer: VecDeque<WriteOp>,
    stalled_flushes: usize,
}

impl<'a, S: BatchStore + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, table_name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            table_name: table_name.into(),
            retry,
            overwrite_by_keys: None,
            buffer: VecDeque::new(),
            stalled_flushes: 0,
        }
    }

    /// A later request for the same primary key replaces the buffered one,
    /// so a single batch never carries duplicate keys.
    pub fn overwrite_by_keys(mut self, key_names: Vec<String>) -> Self {
        self.overwrite_by_keys = Some(key_names);
        self
    }

    pub async fn put(&mut self, item: Item) -> Result<()> {
        self.push(WriteOp::Put(item)).await
    }

    pub async fn delete(&mut self, key: Item) -> Result<()> {
        self.push(WriteOp::Delete(key)).await
    }

    /// Sends everything still buffered.
    pub async fn close(mut self) -> Result<()> {
        while !self.buffer.is_empty() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn push(&mut self, op: WriteOp) -> Result<()> {
        if let Some(key_names) = &self.overwrite_by_keys {
            let key = key_of(op.item(), key_names).ok_or_else(|| {
                BatchError::Validation(format!(
                    "write request for '{}' is missing one of the key attributes {:?}",
                    self.table_name, key_names
                ))
            })?;
            if let Some(pos) = self
                .buffer
                .iter()
                .position(|queued| key_of(queued.item(), key_names).as_ref() == Some(&key))
            {
                debug!(table = %self.table_name, "dropping buffered request with duplicate key");
                self.buffer.remove(pos);
            }
        }
        self.buffer.push_back(op);
        if self.buffer.len() >= MAX_WRITE_SIZE {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let take = self.buffer.len().min(MAX_WRITE_SIZE);
        let batch: Vec<WriteOp> = self.buffer.drain(..take).collect();
        let sent = batch.len();

        let unprocessed = self.store.batch_write_item(&self.table_name, batch).await?;
        debug!(table = %self.table_name, sent, unprocessed = unprocessed.len(), "flushed write batch");

        if unprocessed.is_empty() {
            self.stalled_flushes = 0;
            return Ok(());
        }

        // Only a round that wrote nothing counts toward giving up.
        if unprocessed.len() < sent {
            self.stalled_flushes = 0;
        } else {
            self.stalled_flushes += 1;
            if self.stalled_flushes >= self.retry.max_attempts {
                warn!(
                    table = %self.table_name,
                    count = unprocessed.len(),
                    "giving up on unprocessed write requests"
                );
                return Err(BatchError::UnprocessedWrites {
                    table: self.table_name.clone(),
                    count: unprocessed.len(),
                });
            }
        }

        let delay = self.retry.delay_for(self.stalled_flushes.saturating_sub(1));
        debug!(
            table = %self.table_name,
            count = unprocessed.len(),
            delay_secs = delay.as_secs_f64(),
            "requeueing unprocessed write requests"
        );
        self.buffer.extend(unprocessed);
        tokio::time::sleep(delay).await;
        Ok(())
    }
}
