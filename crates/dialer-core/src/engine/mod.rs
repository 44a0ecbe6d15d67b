//! The dialer engine: one task that owns the reconciler and drains a single
//! command queue in arrival order.
//!
//! Native bridge payloads, fallback expiries, visibility reports and user
//! actions all arrive as [`EngineCommand`]s, so the race between a late
//! call-log event and the fallback timer is decided by queue order alone.
//! Persistence and UI notification run on spawned tasks after the state has
//! already moved, which keeps the loop responsive while a write is slow.

mod builder;
mod handle;
mod runner;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::events::RawCallFinished;
use crate::timer::TimerExpired;
use crate::types::{CallOutcome, LeadId, PendingCallSession};
use crate::visibility::AppVisibility;

pub use builder::DialerEngineBuilder;
pub use handle::DialerHandle;

/// Messages processed by the engine loop
#[derive(Debug)]
pub enum EngineCommand {
    /// User tapped call
    Initiate {
        phone_number: String,
        lead_id: Option<LeadId>,
        reply: oneshot::Sender<Result<PendingCallSession>>,
    },
    /// `call-finished` payload from the native bridge
    Native(RawCallFinished),
    /// App visibility report
    Visibility(AppVisibility),
    /// A fallback countdown ran out
    FallbackExpired(TimerExpired),
    /// Drop the pending call and any outcome
    Clear { reply: oneshot::Sender<()> },
    /// Read-only view of the engine state
    Snapshot { reply: oneshot::Sender<EngineSnapshot> },
    /// Stop the loop
    Shutdown { reply: oneshot::Sender<()> },
}

impl From<TimerExpired> for EngineCommand {
    fn from(expired: TimerExpired) -> Self {
        EngineCommand::FallbackExpired(expired)
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub state: String,
    pub pending: Option<PendingCallSession>,
    pub last_outcome: Option<CallOutcome>,
    pub timer_armed: bool,
    /// Milliseconds left on the fallback countdown
    pub fallback_remaining_ms: Option<u64>,
    pub visibility: AppVisibility,
    pub call_log_access: bool,
    pub finalized_count: u64,
}
