//! Normalizes native `call-finished` payloads into [`CallEvent`]s and decides
//! which path handles them.
//!
//! Device call-log type codes (Android `CallLog.Calls.TYPE`):
//!
//! | code | meaning |
//! |------|---------|
//! | 1 | incoming, answered |
//! | 2 | outgoing |
//! | 3 | missed |
//! | 4 | voicemail |
//! | 5 | rejected |
//! | 6 | blocked |
//! | 7 | answered externally |

use chrono::{DateTime, TimeZone, Utc};
use tracing::trace;

use crate::error::{DialerError, Result};
use crate::events::{CallEvent, CallLogEntry, RawCallFinished};
use crate::types::CallType;

pub const TYPE_INCOMING: i64 = 1;
pub const TYPE_OUTGOING: i64 = 2;
pub const TYPE_MISSED: i64 = 3;
pub const TYPE_REJECTED: i64 = 5;
pub const TYPE_ANSWERED_EXTERNALLY: i64 = 7;

/// Longest call duration accepted from the bridge (24h)
pub const MAX_CALL_DURATION_SECS: u64 = 86_400;

/// Map a device call-log type code and duration to a semantic call type.
///
/// Pure and total: unknown or absent codes fall back on the duration.
pub fn classify_call_type(call_log_type: Option<i64>, duration_secs: u64) -> CallType {
    match call_log_type {
        Some(TYPE_INCOMING) => CallType::Incoming,
        Some(TYPE_OUTGOING) if duration_secs > 0 => CallType::Outgoing,
        Some(TYPE_OUTGOING) => CallType::Missed,
        Some(TYPE_MISSED) | Some(TYPE_REJECTED) | Some(TYPE_ANSWERED_EXTERNALLY) => CallType::Missed,
        _ if duration_secs > 0 => CallType::Incoming,
        _ => CallType::Missed,
    }
}

/// Where a classified event must be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Concerns the in-flight outgoing call
    Reconciler,
    /// Unrelated call, logged on its own
    Independent,
}

/// Stateless classifier for native bridge payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct EventClassifier;

impl EventClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Turn a bridge payload into a typed event.
    ///
    /// Payloads without a finite numeric duration, with a duration above
    /// [`MAX_CALL_DURATION_SECS`] or with an unknown source are rejected as
    /// [`DialerError::MalformedEvent`].
    pub fn classify(&self, raw: RawCallFinished) -> Result<CallEvent> {
        let duration = match raw.duration {
            Some(d) if d.is_finite() => d,
            other => {
                return Err(DialerError::malformed(format!(
                    "duration is not a finite number: {:?}",
                    other
                )))
            }
        };
        if duration > MAX_CALL_DURATION_SECS as f64 {
            return Err(DialerError::malformed(format!(
                "duration of {}s exceeds {}s",
                duration, MAX_CALL_DURATION_SECS
            )));
        }

        let entry = CallLogEntry {
            duration_secs: duration.max(0.0).floor() as u64,
            call_log_type: raw.call_log_type.filter(|t| *t >= 0),
            call_log_date: raw.call_log_date.and_then(epoch_millis),
            call_log_id: raw.call_log_id.filter(|id| *id > 0),
            phone_number: raw.phone_number.filter(|p| !p.trim().is_empty()),
        };

        let event = match raw.source.as_deref() {
            Some("calllog") => CallEvent::CallLog(entry),
            Some("incoming-sync") => CallEvent::IncomingSync(entry),
            Some("bulk-sync") => CallEvent::BulkSync(entry),
            other => {
                return Err(DialerError::malformed(format!("unknown event source: {:?}", other)))
            }
        };
        trace!(source = %event.source(), "classified native event");
        Ok(event)
    }

    /// Decide which path handles an event.
    ///
    /// Sync events never touch the outgoing session. A call-log entry that
    /// looks like an incoming call goes to the independent path when there
    /// is no outgoing call to attribute it to.
    pub fn route(&self, event: &CallEvent, has_pending: bool) -> Route {
        match event {
            CallEvent::IncomingSync(_) | CallEvent::BulkSync(_) => Route::Independent,
            CallEvent::Fallback => Route::Reconciler,
            CallEvent::CallLog(entry) => {
                if !has_pending && is_incoming_direction(entry) {
                    Route::Independent
                } else {
                    Route::Reconciler
                }
            }
        }
    }
}

/// Incoming, or missed/rejected via the incoming-side codes
fn is_incoming_direction(entry: &CallLogEntry) -> bool {
    match entry.call_log_type {
        Some(TYPE_INCOMING) | Some(TYPE_MISSED) | Some(TYPE_REJECTED) => true,
        code => classify_call_type(code, entry.duration_secs) == CallType::Incoming,
    }
}

fn epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
