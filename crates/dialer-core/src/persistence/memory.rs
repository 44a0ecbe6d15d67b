//! In-memory call-log sink

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::CallLogSink;
use crate::error::{DialerError, Result};
use crate::types::{CallLogRecord, DispositionUpdate, PersistedId, SubmitReceipt};

/// Call-log sink holding records in memory, deduplicating on the device
/// call-log id the way the backend does
#[derive(Default)]
pub struct InMemoryCallLogStore {
    records: Arc<DashMap<PersistedId, CallLogRecord>>,
    by_device_id: Arc<DashMap<String, PersistedId>>,
    writes: AtomicUsize,
}

impl InMemoryCallLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PersistedId) -> Option<CallLogRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn find_by_device_id(&self, device_id: &str) -> Option<CallLogRecord> {
        self.by_device_id
            .get(device_id)
            .and_then(|id| self.records.get(id.value()).map(|r| r.value().clone()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of `log_call` invocations, duplicates included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallLogSink for InMemoryCallLogStore {
    async fn log_call(&self, record: CallLogRecord) -> Result<SubmitReceipt> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = PersistedId::new(Uuid::new_v4().to_string());

        if let Some(device_id) = record.device_call_log_id.clone() {
            match self.by_device_id.entry(device_id) {
                Entry::Occupied(existing) => {
                    debug!(device_id = %existing.key(), "duplicate device call log id");
                    return Ok(SubmitReceipt {
                        id: existing.get().clone(),
                        duplicate: true,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(id.clone());
                }
            }
        }

        self.records.insert(id.clone(), record);
        Ok(SubmitReceipt { id, duplicate: false })
    }

    async fn update_disposition(&self, id: &PersistedId, update: &DispositionUpdate) -> Result<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| DialerError::NotFound(format!("call log {}", id)))?;
        if update.disposition.is_some() {
            record.disposition = update.disposition.clone();
        }
        if update.notes.is_some() {
            record.notes = update.notes.clone();
        }
        Ok(())
    }
}
