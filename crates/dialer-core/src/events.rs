//! Event definitions: what the native bridge delivers, what the engine
//! consumes, and what the disposition UI receives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallOutcome, CallSource};

/// `call-finished` notification exactly as the native bridge sends it
///
/// Every field is optional on the wire; the classifier decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCallFinished {
    pub source: Option<String>,
    /// Seconds, possibly fractional or negative on broken devices
    pub duration: Option<f64>,
    pub call_log_type: Option<i64>,
    pub call_log_id: Option<i64>,
    /// Epoch milliseconds
    pub call_log_date: Option<i64>,
    pub phone_number: Option<String>,
}

impl RawCallFinished {
    pub fn new(source: impl Into<String>, duration: f64) -> Self {
        Self {
            source: Some(source.into()),
            duration: Some(duration),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, call_log_type: i64) -> Self {
        self.call_log_type = Some(call_log_type);
        self
    }

    pub fn with_log_id(mut self, call_log_id: i64) -> Self {
        self.call_log_id = Some(call_log_id);
        self
    }

    pub fn with_date(mut self, epoch_millis: i64) -> Self {
        self.call_log_date = Some(epoch_millis);
        self
    }

    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }
}

/// One device call-log row, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub duration_secs: u64,
    pub call_log_type: Option<i64>,
    pub call_log_date: Option<DateTime<Utc>>,
    pub call_log_id: Option<i64>,
    pub phone_number: Option<String>,
}

impl CallLogEntry {
    pub fn device_id(&self) -> Option<String> {
        self.call_log_id.map(|id| id.to_string())
    }
}

/// Typed call signal consumed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Call-log lookup for the call just placed
    CallLog(CallLogEntry),
    /// Recent incoming/missed call found by the native monitor
    IncomingSync(CallLogEntry),
    /// Historical entry from a bulk call-log sync
    BulkSync(CallLogEntry),
    /// Synthetic: nothing authoritative arrived in time
    Fallback,
}

impl CallEvent {
    pub fn source(&self) -> CallSource {
        match self {
            CallEvent::CallLog(_) => CallSource::CallLog,
            CallEvent::IncomingSync(_) => CallSource::IncomingSync,
            CallEvent::BulkSync(_) => CallSource::BulkSync,
            CallEvent::Fallback => CallSource::Fallback,
        }
    }

    pub fn entry(&self) -> Option<&CallLogEntry> {
        match self {
            CallEvent::CallLog(e) | CallEvent::IncomingSync(e) | CallEvent::BulkSync(e) => Some(e),
            CallEvent::Fallback => None,
        }
    }
}

/// Notifications for the disposition UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DialerEvent {
    /// A call reached its single final outcome (the `call-completed` notification)
    CallCompleted { outcome: CallOutcome },

    /// Call-log access is unavailable; every call will need manual entry
    PermissionDenied { reason: String },

    /// The dialer could not be launched; the fallback prompt still follows
    LaunchFailed { phone_number: String, reason: String },
}
