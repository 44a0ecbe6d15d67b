//! Cloneable handle to the engine task

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::{DialerError, Result};
use crate::events::{CallLogEntry, RawCallFinished};
use crate::incoming::{IncomingCallLogger, SyncReport};
use crate::persistence::PersistenceAdapter;
use crate::types::{CallOutcome, DispositionUpdate, LeadId, PendingCallSession, PersistedId};
use crate::visibility::AppVisibility;

use super::{EngineCommand, EngineSnapshot};

/// Bridge payloads may arrive wrapped in a DOM-style `detail` envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum BridgePayload {
    Wrapped { detail: RawCallFinished },
    Bare(RawCallFinished),
}

/// Handle used by UI code and the native bridge to talk to the engine
#[derive(Clone)]
pub struct DialerHandle {
    tx: mpsc::Sender<EngineCommand>,
    persistence: PersistenceAdapter,
    logger: Arc<IncomingCallLogger>,
}

impl DialerHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<EngineCommand>,
        persistence: PersistenceAdapter,
        logger: Arc<IncomingCallLogger>,
    ) -> Self {
        Self { tx, persistence, logger }
    }

    /// Start an outgoing call: record the session, arm the fallback timer
    /// and launch the dialer. Launch failures arrive as
    /// [`DialerEvent::LaunchFailed`](crate::DialerEvent::LaunchFailed).
    pub async fn initiate(&self, phone_number: &str, lead_id: Option<LeadId>) -> Result<PendingCallSession> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Initiate {
                phone_number: phone_number.to_string(),
                lead_id,
                reply,
            })
            .await?;
        rx.await?
    }

    /// Hand a `call-finished` payload from the native bridge to the engine
    pub async fn deliver_native(&self, raw: RawCallFinished) -> Result<()> {
        self.tx.send(EngineCommand::Native(raw)).await?;
        Ok(())
    }

    /// Same as [`deliver_native`](Self::deliver_native) for a JSON payload,
    /// bare or wrapped in `{"detail": …}`
    pub async fn deliver_native_json(&self, json: &str) -> Result<()> {
        let raw = match serde_json::from_str::<BridgePayload>(json)
            .map_err(|e| DialerError::malformed(e.to_string()))?
        {
            BridgePayload::Wrapped { detail } => detail,
            BridgePayload::Bare(raw) => raw,
        };
        self.deliver_native(raw).await
    }

    pub async fn set_visibility(&self, visibility: AppVisibility) -> Result<()> {
        self.tx.send(EngineCommand::Visibility(visibility)).await?;
        Ok(())
    }

    /// Forget the pending call and any finalized outcome
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::Clear { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::Snapshot { reply }).await?;
        Ok(rx.await?)
    }

    /// Save the disposition the user picked for a completed call
    pub async fn save_disposition(
        &self,
        outcome: &mut CallOutcome,
        update: &DispositionUpdate,
    ) -> Result<PersistedId> {
        self.persistence.save_disposition(outcome, update).await
    }

    /// Push device call-log history to the sink. Runs on the caller's task,
    /// not the engine loop.
    pub async fn sync_call_logs(&self, entries: Vec<CallLogEntry>) -> SyncReport {
        self.logger.sync_batch(entries).await
    }

    /// Stop the engine task. Pending countdowns are cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::Shutdown { reply }).await?;
        Ok(rx.await?)
    }
}
