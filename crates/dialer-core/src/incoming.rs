//! Logging of calls that no outgoing session accounts for: incoming and
//! missed calls reported by the native monitor, and call-log history pulled
//! in by a bulk sync.
//!
//! This path never reads or touches the pending session. Duplicates are left
//! to the sink, which recognizes a known `device_call_log_id`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::adapters::LeadDirectory;
use crate::classifier::classify_call_type;
use crate::error::{DialerError, Result};
use crate::events::CallLogEntry;
use crate::persistence::PersistenceAdapter;
use crate::types::{talk_time, CallOutcome, CallSource, LeadId};

/// Summary of one bulk sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

enum EntryResult {
    Logged(CallOutcome),
    Duplicate(CallOutcome),
    Skipped(&'static str),
    Failed(CallOutcome, DialerError),
}

/// Builds and persists outcomes for calls outside the reconciler
pub struct IncomingCallLogger {
    leads: Arc<dyn LeadDirectory>,
    persistence: PersistenceAdapter,
    sync_window: Option<Duration>,
    syncing: AtomicBool,
}

impl IncomingCallLogger {
    pub fn new(leads: Arc<dyn LeadDirectory>, persistence: PersistenceAdapter, sync_window_days: u32) -> Self {
        Self {
            leads,
            persistence,
            sync_window: Duration::try_days(i64::from(sync_window_days)),
            syncing: AtomicBool::new(false),
        }
    }

    /// Log one unsolicited call.
    ///
    /// Returns `Ok(None)` when the entry has no number, the number belongs to
    /// no lead, or the sink already holds the call. A failed write still
    /// returns the outcome so the user can record a disposition.
    pub async fn handle_unsolicited(
        &self,
        entry: &CallLogEntry,
        source: CallSource,
    ) -> Result<Option<CallOutcome>> {
        match self.log_entry(entry, source, Utc::now()).await? {
            EntryResult::Logged(outcome) => Ok(Some(outcome)),
            EntryResult::Failed(outcome, e) => {
                error!(phone = %outcome.phone_number, %source, "unsolicited call not persisted: {}", e);
                Ok(Some(outcome))
            }
            EntryResult::Duplicate(outcome) => {
                debug!(device_id = ?outcome.device_call_log_id, "unsolicited call already logged");
                Ok(None)
            }
            EntryResult::Skipped(reason) => {
                debug!(%source, reason, "unsolicited call skipped");
                Ok(None)
            }
        }
    }

    /// Push a batch of device call-log entries to the sink.
    ///
    /// Only one batch runs at a time; a concurrent call returns at once with
    /// an error in its report. Entries older than the sync window are skipped.
    pub async fn sync_batch(&self, entries: Vec<CallLogEntry>) -> SyncReport {
        let mut report = SyncReport {
            total: entries.len(),
            ..Default::default()
        };

        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("call log sync requested while another is running");
            report.errors.push("sync already in progress".to_string());
            return report;
        }
        let _guard = SyncGuard(&self.syncing);

        let now = Utc::now();
        let cutoff = self.sync_window.and_then(|window| now.checked_sub_signed(window));
        info!(entries = report.total, "call log sync started");

        for entry in &entries {
            if matches!((entry.call_log_date, cutoff), (Some(date), Some(cutoff)) if date < cutoff) {
                report.skipped += 1;
                continue;
            }
            match self.log_entry(entry, CallSource::BulkSync, now).await {
                Ok(EntryResult::Logged(_)) => report.synced += 1,
                Ok(EntryResult::Duplicate(_)) | Ok(EntryResult::Skipped(_)) => report.skipped += 1,
                Ok(EntryResult::Failed(outcome, e)) => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{} ({:?}): {}", outcome.phone_number, outcome.device_call_log_id, e));
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }

        info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            "call log sync finished"
        );
        report
    }

    async fn log_entry(
        &self,
        entry: &CallLogEntry,
        source: CallSource,
        now: DateTime<Utc>,
    ) -> Result<EntryResult> {
        let Some(phone_number) = entry.phone_number.as_deref() else {
            return Ok(EntryResult::Skipped("no phone number"));
        };

        let Some(lead_id) = self.leads.resolve(phone_number).await? else {
            info!(phone = %phone_number, "no lead for unsolicited call, not logged");
            return Ok(EntryResult::Skipped("no matching lead"));
        };

        let mut outcome = unsolicited_outcome(entry, phone_number, lead_id, source, now);
        match self.persistence.submit_with_receipt(&mut outcome).await {
            Ok(receipt) if receipt.duplicate => Ok(EntryResult::Duplicate(outcome)),
            Ok(receipt) => {
                info!(id = %receipt.id, phone = %outcome.phone_number, call_type = %outcome.call_type, %source, "unsolicited call logged");
                Ok(EntryResult::Logged(outcome))
            }
            Err(e) => Ok(EntryResult::Failed(outcome, e)),
        }
    }
}

struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome for a call the device logged without any session context
pub fn unsolicited_outcome(
    entry: &CallLogEntry,
    phone_number: &str,
    lead_id: LeadId,
    source: CallSource,
    now: DateTime<Utc>,
) -> CallOutcome {
    let talk = talk_time(entry.duration_secs);
    let start_time = entry
        .call_log_date
        .or_else(|| talk.and_then(|talk| now.checked_sub_signed(talk)))
        .unwrap_or(now);
    let end_time = talk
        .and_then(|talk| start_time.checked_add_signed(talk))
        .unwrap_or(start_time);

    CallOutcome {
        phone_number: phone_number.to_string(),
        lead_id: Some(lead_id),
        call_type: classify_call_type(entry.call_log_type, entry.duration_secs),
        start_time,
        end_time,
        duration_secs: entry.duration_secs,
        device_call_log_id: entry.device_id(),
        source,
        persisted_id: None,
    }
}
