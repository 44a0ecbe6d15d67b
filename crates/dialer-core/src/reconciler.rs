//! Finalization state machine for the one outgoing call in flight.
//!
//! ```text
//!            begin                CallLog / Fallback
//!   Idle ───────────▶ AwaitingEvent ──────────────────▶ Finalized
//!    ▲                    ▲  begin                          │
//!    └────────────────────┴─────────────── clear ───────────┘
//! ```
//!
//! [`ReconcilerSession::apply`] is the only way out of `AwaitingEvent`. It is
//! synchronous and moves the state before the caller performs any side
//! effect, so whichever of the native event or the fallback expiry is
//! dequeued first wins and the other is reported as [`Transition::Ignored`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::classifier::classify_call_type;
use crate::events::{CallEvent, CallLogEntry};
use crate::types::{talk_time, CallOutcome, CallSource, CallType, PendingCallSession};

/// Current phase of the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    AwaitingEvent { session: PendingCallSession },
    Finalized { outcome: CallOutcome },
}

impl ReconcilerState {
    pub fn name(&self) -> &'static str {
        match self {
            ReconcilerState::Idle => "idle",
            ReconcilerState::AwaitingEvent { .. } => "awaiting-event",
            ReconcilerState::Finalized { .. } => "finalized",
        }
    }
}

/// Why an event did not finalize anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No call was initiated
    NoSession,
    /// The call already has its outcome
    AlreadyFinalized,
    /// Sync events never finalize an outgoing call
    NotForReconciler,
}

/// Result of feeding one event to the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Finalized(CallOutcome),
    Ignored(IgnoreReason),
}

/// Owns the reconciler state for the engine loop
#[derive(Debug)]
pub struct ReconcilerSession {
    state: ReconcilerState,
    finalized_count: u64,
}

impl Default for ReconcilerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerSession {
    pub fn new() -> Self {
        Self {
            state: ReconcilerState::Idle,
            finalized_count: 0,
        }
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ReconcilerState::AwaitingEvent { .. })
    }

    /// Session awaiting its outcome, if any
    pub fn pending(&self) -> Option<&PendingCallSession> {
        match &self.state {
            ReconcilerState::AwaitingEvent { session } => Some(session),
            _ => None,
        }
    }

    /// Outcomes produced since creation
    pub fn finalized_count(&self) -> u64 {
        self.finalized_count
    }

    /// Start awaiting an outcome for `session`, from any state
    pub fn begin(&mut self, session: PendingCallSession) {
        if let ReconcilerState::AwaitingEvent { session: previous } = &self.state {
            debug!(previous = %previous.phone_number, next = %session.phone_number, "pending call superseded");
        }
        self.state = ReconcilerState::AwaitingEvent { session };
    }

    /// Drop any session or outcome and return to `Idle`
    pub fn clear(&mut self) {
        if self.state != ReconcilerState::Idle {
            debug!(from = self.state.name(), "reconciler cleared");
        }
        self.state = ReconcilerState::Idle;
    }

    /// Feed one event. `now` is the wall clock at dequeue time.
    pub fn apply(&mut self, event: &CallEvent, now: DateTime<Utc>) -> Transition {
        let session = match &self.state {
            ReconcilerState::Idle => return Transition::Ignored(IgnoreReason::NoSession),
            ReconcilerState::Finalized { .. } => {
                return Transition::Ignored(IgnoreReason::AlreadyFinalized)
            }
            ReconcilerState::AwaitingEvent { session } => session,
        };

        let outcome = match event {
            CallEvent::CallLog(entry) => outcome_from_call_log(session, entry, now),
            CallEvent::Fallback => fallback_outcome(session, now),
            CallEvent::IncomingSync(_) | CallEvent::BulkSync(_) => {
                return Transition::Ignored(IgnoreReason::NotForReconciler)
            }
        };

        info!(
            phone = %outcome.phone_number,
            call_type = %outcome.call_type,
            duration = outcome.duration_secs,
            source = %outcome.source,
            "call finalized"
        );
        self.finalized_count += 1;
        self.state = ReconcilerState::Finalized {
            outcome: outcome.clone(),
        };
        Transition::Finalized(outcome)
    }
}

fn outcome_from_call_log(
    session: &PendingCallSession,
    entry: &CallLogEntry,
    now: DateTime<Utc>,
) -> CallOutcome {
    let start_time = session.start_time;
    let end_time = entry
        .call_log_date
        .zip(talk_time(entry.duration_secs))
        .and_then(|(date, talk)| date.checked_add_signed(talk))
        .unwrap_or(now)
        .max(start_time);

    let phone_number = if session.phone_number.is_empty() {
        entry.phone_number.clone().unwrap_or_default()
    } else {
        session.phone_number.clone()
    };

    CallOutcome {
        phone_number,
        lead_id: session.lead_id.clone(),
        call_type: classify_call_type(entry.call_log_type, entry.duration_secs),
        start_time,
        end_time,
        duration_secs: entry.duration_secs,
        device_call_log_id: entry.device_id(),
        source: CallSource::CallLog,
        persisted_id: None,
    }
}

fn fallback_outcome(session: &PendingCallSession, now: DateTime<Utc>) -> CallOutcome {
    CallOutcome {
        phone_number: session.phone_number.clone(),
        lead_id: session.lead_id.clone(),
        call_type: CallType::Missed,
        start_time: session.start_time,
        end_time: now.max(session.start_time),
        duration_secs: 0,
        device_call_log_id: None,
        source: CallSource::Fallback,
        persisted_id: None,
    }
}
