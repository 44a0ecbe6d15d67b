//! Call-lifecycle reconciliation for CRM calls placed through the phone's
//! native dialer.
//!
//! The CRM can only hand a number to the dialer; it never sees the call
//! itself. What it gets afterwards is a mix of signals: a `call-finished`
//! payload from the native bridge (sometimes late, sometimes twice, sometimes
//! never), app visibility changes while the dialer covers the screen, and
//! incoming or missed calls that have nothing to do with the CRM. This crate
//! turns those signals into exactly one [`CallOutcome`] per outgoing call and
//! one per unsolicited call.
//!
//! The pieces:
//! - Session store: the one outgoing call awaiting confirmation
//! - Classifier: native payloads into typed [`CallEvent`]s and routing
//! - Fallback timer: gives up on a call when nothing authoritative arrives
//! - Reconciler: the `Idle → AwaitingEvent → Finalized` state machine
//! - Visibility watcher: pauses the countdown while the app is hidden
//! - Incoming logger: calls no session accounts for, plus bulk sync
//! - Persistence adapter: best-effort single write to the call-log sink
//!
//! Everything is driven by one engine task; see [`DialerEngineBuilder`].

pub mod adapters;
pub mod classifier;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod events;
pub mod incoming;
pub mod persistence;
pub mod reconciler;
pub mod session_store;
pub mod timer;
pub mod types;
pub mod visibility;

pub use adapters::{AlwaysGranted, DialerLauncher, LeadDirectory, PermissionGate, StaticLeadDirectory};
pub use classifier::{classify_call_type, EventClassifier, Route};
pub use config::DialerConfig;
pub use engine::{DialerEngineBuilder, DialerHandle, EngineCommand, EngineSnapshot};
pub use error::{DialerError, Result};
pub use events::{CallEvent, CallLogEntry, DialerEvent, RawCallFinished};
pub use incoming::{IncomingCallLogger, SyncReport};
pub use persistence::{CallLogSink, InMemoryCallLogStore, PersistenceAdapter, SqliteCallLogStore};
pub use reconciler::{ReconcilerSession, ReconcilerState, Transition};
pub use session_store::{InMemorySessionStore, PendingSessionStore, SqliteSessionStore};
pub use types::{
    CallLogRecord, CallOutcome, CallSource, CallStatus, CallType, DispositionUpdate, LeadId,
    PendingCallSession, PersistedId, SubmitReceipt,
};
pub use visibility::AppVisibility;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
