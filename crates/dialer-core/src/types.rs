//! Core data types shared by the reconciler, the incoming path and persistence

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// CRM lead identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a call-log record at the persistence endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedId(pub String);

impl PersistedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic direction/outcome of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Outgoing,
    Incoming,
    Missed,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Outgoing => "outgoing",
            CallType::Incoming => "incoming",
            CallType::Missed => "missed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "outgoing" => Some(CallType::Outgoing),
            "incoming" => Some(CallType::Incoming),
            "missed" => Some(CallType::Missed),
            _ => None,
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signal produced a call outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallSource {
    #[serde(rename = "calllog")]
    CallLog,
    #[serde(rename = "incoming-sync")]
    IncomingSync,
    #[serde(rename = "bulk-sync")]
    BulkSync,
    #[serde(rename = "fallback")]
    Fallback,
}

impl CallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSource::CallLog => "calllog",
            CallSource::IncomingSync => "incoming-sync",
            CallSource::BulkSync => "bulk-sync",
            CallSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for CallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context of the one outgoing call currently awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCallSession {
    pub phone_number: String,
    pub lead_id: Option<LeadId>,
    pub start_time: DateTime<Utc>,
}

impl PendingCallSession {
    pub fn new(phone_number: impl Into<String>, lead_id: Option<LeadId>) -> Self {
        Self {
            phone_number: phone_number.into(),
            lead_id,
            start_time: Utc::now(),
        }
    }

    /// Time elapsed since the call was initiated
    pub fn elapsed(&self) -> Duration {
        Utc::now() - self.start_time
    }
}

/// The single authoritative result of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub phone_number: String,
    pub lead_id: Option<LeadId>,
    pub call_type: CallType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: u64,
    pub device_call_log_id: Option<String>,
    pub source: CallSource,
    pub persisted_id: Option<PersistedId>,
}

impl CallOutcome {
    /// Friendly status label the CRM shows for a logged call
    pub fn status(&self, disposition: Option<&str>) -> CallStatus {
        if let Some(d) = disposition.filter(|d| !d.is_empty()) {
            return CallStatus::Disposition(d.to_string());
        }
        match (self.call_type, self.duration_secs) {
            (CallType::Missed, _) => CallStatus::Missed,
            (_, d) if d > 0 => CallStatus::Connected,
            _ => CallStatus::NotConnected,
        }
    }

    /// Build the persistence payload for this outcome
    pub fn to_record(&self, disposition: &DispositionUpdate) -> CallLogRecord {
        CallLogRecord {
            lead_id: self.lead_id.clone(),
            phone_number: self.phone_number.clone(),
            call_type: self.call_type,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_secs: self.duration_secs,
            device_call_log_id: self.device_call_log_id.clone(),
            disposition: disposition.disposition.clone(),
            notes: disposition.notes.clone(),
        }
    }
}

/// Display status of a call record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    Disposition(String),
    Missed,
    Connected,
    NotConnected,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Disposition(d) => f.write_str(d),
            CallStatus::Missed => f.write_str("Missed"),
            CallStatus::Connected => f.write_str("Connected"),
            CallStatus::NotConnected => f.write_str("Not Connected"),
        }
    }
}

/// User-entered outcome category and notes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionUpdate {
    pub disposition: Option<String>,
    pub notes: Option<String>,
}

impl DispositionUpdate {
    pub fn new(disposition: impl Into<String>) -> Self {
        Self {
            disposition: Some(disposition.into()),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.disposition.is_none() && self.notes.is_none()
    }
}

/// Payload accepted by the persistence endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogRecord {
    pub lead_id: Option<LeadId>,
    pub phone_number: String,
    pub call_type: CallType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: u64,
    pub device_call_log_id: Option<String>,
    pub disposition: Option<String>,
    pub notes: Option<String>,
}

/// Result of a write at the persistence endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub id: PersistedId,
    /// The endpoint already held a record with the same device call-log id
    pub duplicate: bool,
}

/// A call duration as a time delta, `None` when chrono cannot represent it
pub(crate) fn talk_time(duration_secs: u64) -> Option<Duration> {
    i64::try_from(duration_secs).ok().and_then(Duration::try_seconds)
}
