//! Best-effort persistence of finalized call outcomes.
//!
//! Writes are attempted exactly once. A retry could create a second record
//! for a call whose device log id the backend cannot dedup yet, so a failed
//! write is logged and reported back to the caller, never retried.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::{DialerError, Result};
use crate::types::{CallLogRecord, CallOutcome, DispositionUpdate, PersistedId, SubmitReceipt};

pub use memory::InMemoryCallLogStore;
pub use sqlite::SqliteCallLogStore;

/// The backend call-log endpoint
#[async_trait]
pub trait CallLogSink: Send + Sync {
    /// Store a call record. A record whose `device_call_log_id` is already
    /// known returns the existing id with `duplicate = true`.
    async fn log_call(&self, record: CallLogRecord) -> Result<SubmitReceipt>;

    /// Patch disposition and notes onto an existing record
    async fn update_disposition(&self, id: &PersistedId, update: &DispositionUpdate) -> Result<()>;
}

/// Writes outcomes to a [`CallLogSink`] with a bounded single attempt
#[derive(Clone)]
pub struct PersistenceAdapter {
    sink: Arc<dyn CallLogSink>,
    write_timeout: Duration,
}

impl PersistenceAdapter {
    pub fn new(sink: Arc<dyn CallLogSink>, write_timeout: Duration) -> Self {
        Self { sink, write_timeout }
    }

    /// Submit a finalized outcome; on success its `persisted_id` is filled in
    pub async fn submit(&self, outcome: &mut CallOutcome) -> Result<PersistedId> {
        let record = outcome.to_record(&DispositionUpdate::default());
        match self.write(record).await {
            Ok(receipt) => {
                if receipt.duplicate {
                    debug!(id = %receipt.id, device_id = ?outcome.device_call_log_id, "call already logged");
                } else {
                    info!(id = %receipt.id, phone = %outcome.phone_number, call_type = %outcome.call_type, "call logged");
                }
                outcome.persisted_id = Some(receipt.id.clone());
                Ok(receipt.id)
            }
            Err(e) => {
                error!(phone = %outcome.phone_number, source = %outcome.source, "call log persistence failed: {}", e);
                Err(e)
            }
        }
    }

    /// Submit and report whether the endpoint already had the record
    pub async fn submit_with_receipt(&self, outcome: &mut CallOutcome) -> Result<SubmitReceipt> {
        let receipt = self.write(outcome.to_record(&DispositionUpdate::default())).await?;
        outcome.persisted_id = Some(receipt.id.clone());
        Ok(receipt)
    }

    /// Save the user's disposition for a call.
    ///
    /// Patches the existing record when the outcome was already persisted,
    /// otherwise creates the record with the disposition attached (fallback
    /// outcomes are only written once the user saves them).
    pub async fn save_disposition(
        &self,
        outcome: &mut CallOutcome,
        update: &DispositionUpdate,
    ) -> Result<PersistedId> {
        if let Some(id) = outcome.persisted_id.clone() {
            self.with_timeout("disposition update", self.sink.update_disposition(&id, update))
                .await?;
            info!(id = %id, disposition = ?update.disposition, "disposition updated");
            return Ok(id);
        }

        let receipt = self.write(outcome.to_record(update)).await?;
        if receipt.duplicate && !update.is_empty() {
            self.with_timeout("disposition update", self.sink.update_disposition(&receipt.id, update))
                .await?;
        }
        info!(id = %receipt.id, disposition = ?update.disposition, "call logged with disposition");
        outcome.persisted_id = Some(receipt.id.clone());
        Ok(receipt.id)
    }

    async fn write(&self, record: CallLogRecord) -> Result<SubmitReceipt> {
        self.with_timeout("call log write", self.sink.log_call(record)).await
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.write_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DialerError::Timeout(format!(
                "{} exceeded {}ms",
                what,
                self.write_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallSource, CallType};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outcome(device_id: Option<&str>) -> CallOutcome {
        let now = Utc::now();
        CallOutcome {
            phone_number: "+15550100".to_string(),
            lead_id: None,
            call_type: CallType::Outgoing,
            start_time: now,
            end_time: now,
            duration_secs: 0,
            device_call_log_id: device_id.map(str::to_string),
            source: CallSource::CallLog,
            persisted_id: None,
        }
    }

    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl CallLogSink for FailingSink {
        async fn log_call(&self, _record: CallLogRecord) -> Result<SubmitReceipt> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DialerError::persistence("backend unavailable"))
        }

        async fn update_disposition(&self, _id: &PersistedId, _update: &DispositionUpdate) -> Result<()> {
            Err(DialerError::persistence("backend unavailable"))
        }
    }

    struct StalledSink;

    #[async_trait]
    impl CallLogSink for StalledSink {
        async fn log_call(&self, _record: CallLogRecord) -> Result<SubmitReceipt> {
            std::future::pending().await
        }

        async fn update_disposition(&self, _id: &PersistedId, _update: &DispositionUpdate) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_submit_attaches_persisted_id() {
        let sink = Arc::new(InMemoryCallLogStore::new());
        let adapter = PersistenceAdapter::new(sink.clone(), Duration::from_secs(1));
        let mut out = outcome(Some("77"));

        let id = adapter.submit(&mut out).await.unwrap();
        assert_eq!(out.persisted_id, Some(id.clone()));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_is_single_attempt() {
        let sink = Arc::new(FailingSink { attempts: AtomicUsize::new(0) });
        let adapter = PersistenceAdapter::new(sink.clone(), Duration::from_secs(1));
        let mut out = outcome(None);

        assert!(matches!(adapter.submit(&mut out).await, Err(DialerError::Persistence(_))));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
        assert!(out.persisted_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_times_out() {
        let adapter = PersistenceAdapter::new(Arc::new(StalledSink), Duration::from_secs(2));
        let mut out = outcome(None);
        assert!(matches!(adapter.submit(&mut out).await, Err(DialerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_save_disposition_creates_then_patches() {
        let sink = Arc::new(InMemoryCallLogStore::new());
        let adapter = PersistenceAdapter::new(sink.clone(), Duration::from_secs(1));
        let mut out = outcome(None);

        let id = adapter
            .save_disposition(&mut out, &DispositionUpdate::new("Not Answered"))
            .await
            .unwrap();
        assert_eq!(sink.get(&id).unwrap().disposition.as_deref(), Some("Not Answered"));

        let same = adapter
            .save_disposition(&mut out, &DispositionUpdate::new("Call Back Later").with_notes("after 6pm"))
            .await
            .unwrap();
        assert_eq!(same, id);
        let record = sink.get(&id).unwrap();
        assert_eq!(record.disposition.as_deref(), Some("Call Back Later"));
        assert_eq!(record.notes.as_deref(), Some("after 6pm"));
        assert_eq!(sink.len(), 1);
    }
}
