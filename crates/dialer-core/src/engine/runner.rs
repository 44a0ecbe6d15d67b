//! The engine loop

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::adapters::{launch_with_fallback, DialerLauncher, PermissionGate};
use crate::classifier::{EventClassifier, Route};
use crate::config::DialerConfig;
use crate::error::{DialerError, Result};
use crate::events::{CallEvent, DialerEvent, RawCallFinished};
use crate::incoming::IncomingCallLogger;
use crate::persistence::PersistenceAdapter;
use crate::reconciler::{ReconcilerSession, ReconcilerState, Transition};
use crate::session_store::PendingSessionStore;
use crate::timer::FallbackTimer;
use crate::types::{CallOutcome, CallSource, LeadId, PendingCallSession};
use crate::visibility::{AppVisibility, VisibilityAction, VisibilityWatcher};

use super::{EngineCommand, EngineSnapshot};

pub(crate) struct EngineRunner {
    config: DialerConfig,
    reconciler: ReconcilerSession,
    classifier: EventClassifier,
    visibility: VisibilityWatcher,
    timer: FallbackTimer<EngineCommand>,
    session_store: Arc<dyn PendingSessionStore>,
    persistence: PersistenceAdapter,
    logger: Arc<IncomingCallLogger>,
    native_launcher: Option<Arc<dyn DialerLauncher>>,
    generic_launcher: Arc<dyn DialerLauncher>,
    permission_gate: Arc<dyn PermissionGate>,
    events: mpsc::Sender<DialerEvent>,
    call_log_access: bool,
}

impl EngineRunner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: DialerConfig,
        command_tx: &mpsc::Sender<EngineCommand>,
        session_store: Arc<dyn PendingSessionStore>,
        persistence: PersistenceAdapter,
        logger: Arc<IncomingCallLogger>,
        native_launcher: Option<Arc<dyn DialerLauncher>>,
        generic_launcher: Arc<dyn DialerLauncher>,
        permission_gate: Arc<dyn PermissionGate>,
        events: mpsc::Sender<DialerEvent>,
    ) -> Self {
        Self {
            config,
            reconciler: ReconcilerSession::new(),
            classifier: EventClassifier::new(),
            visibility: VisibilityWatcher::default(),
            timer: FallbackTimer::new(command_tx),
            session_store,
            persistence,
            logger,
            native_launcher,
            generic_launcher,
            permission_gate,
            events,
            call_log_access: true,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        self.check_permission().await;
        self.restore_pending().await;

        while let Some(command) = commands.recv().await {
            trace!(?command, state = self.reconciler.state().name(), "engine command");
            match command {
                EngineCommand::Initiate {
                    phone_number,
                    lead_id,
                    reply,
                } => {
                    let result = self.initiate(&phone_number, lead_id).await;
                    let _ = reply.send(result);
                }
                EngineCommand::Native(raw) => self.on_native(raw).await,
                EngineCommand::Visibility(visibility) => self.on_visibility(visibility),
                EngineCommand::FallbackExpired(expired) => {
                    if self.timer.accept(expired) {
                        debug!(generation = expired.generation, "fallback timer fired");
                        self.finalize(CallEvent::Fallback).await;
                    }
                }
                EngineCommand::Clear { reply } => {
                    self.clear().await;
                    let _ = reply.send(());
                }
                EngineCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                EngineCommand::Shutdown { reply } => {
                    self.timer.cancel();
                    let _ = reply.send(());
                    break;
                }
            }
        }

        self.timer.cancel();
        info!("dialer engine stopped");
    }

    async fn check_permission(&mut self) {
        let granted = match self.permission_gate.check().await {
            Ok(true) => true,
            Ok(false) => match self.permission_gate.request().await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!("call log permission request failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("call log permission check failed: {}", e);
                false
            }
        };

        self.call_log_access = granted;
        if !granted {
            let err = DialerError::PermissionDenied("call log access refused".to_string());
            warn!("{}; calls will be finalized by the fallback timer", err);
            self.emit(DialerEvent::PermissionDenied {
                reason: err.to_string(),
            })
            .await;
        }
    }

    /// Resume a call that was pending when the previous engine stopped
    async fn restore_pending(&mut self) {
        match self.session_store.peek().await {
            Ok(Some(session)) => {
                info!(
                    phone = %session.phone_number,
                    elapsed_secs = session.elapsed().num_seconds(),
                    "restored pending call"
                );
                self.reconciler.begin(session);
                self.arm_if_foreground();
            }
            Ok(None) => {}
            Err(e) => warn!("failed to read pending call: {}", e),
        }
    }

    async fn initiate(&mut self, phone_number: &str, lead_id: Option<LeadId>) -> Result<PendingCallSession> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(DialerError::InvalidInput("phone number is empty".to_string()));
        }

        let session = match self.session_store.begin(phone_number, lead_id.clone()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(phone = %phone_number, "pending call not stored, tracking in memory only: {}", e);
                PendingCallSession::new(phone_number, lead_id)
            }
        };
        info!(phone = %session.phone_number, lead = ?session.lead_id, "outgoing call initiated");

        self.reconciler.begin(session.clone());
        self.arm_if_foreground();
        self.spawn_launch(session.phone_number.clone());
        Ok(session)
    }

    fn spawn_launch(&self, phone_number: String) {
        let native = self.native_launcher.clone();
        let generic = self.generic_launcher.clone();
        let retries = self.config.launch_retries;
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(e) = launch_with_fallback(native.as_ref(), &generic, retries, &phone_number).await {
                warn!(phone = %phone_number, "{}; waiting for fallback", e);
                let reason = match e {
                    DialerError::LaunchFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                let _ = events
                    .send(DialerEvent::LaunchFailed { phone_number, reason })
                    .await;
            }
        });
    }

    async fn on_native(&mut self, raw: RawCallFinished) {
        let event = match self.classifier.classify(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!("dropping native event: {}", e);
                return;
            }
        };

        match self.classifier.route(&event, self.reconciler.is_awaiting()) {
            Route::Reconciler => self.finalize(event).await,
            Route::Independent => self.spawn_independent(event),
        }
    }

    fn spawn_independent(&self, event: CallEvent) {
        let source = event.source();
        let entry = match event {
            CallEvent::CallLog(entry) | CallEvent::IncomingSync(entry) | CallEvent::BulkSync(entry) => entry,
            CallEvent::Fallback => return,
        };
        let logger = self.logger.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match logger.handle_unsolicited(&entry, source).await {
                Ok(Some(outcome)) => {
                    if events.send(DialerEvent::CallCompleted { outcome }).await.is_err() {
                        debug!("disposition UI receiver dropped");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(%source, "unsolicited call not handled: {}", e),
            }
        });
    }

    fn on_visibility(&mut self, visibility: AppVisibility) {
        match self.visibility.observe(visibility) {
            VisibilityAction::Rearm => {
                if self.reconciler.is_awaiting() {
                    self.timer.arm(self.config.fallback_delay);
                }
            }
            VisibilityAction::Suspend => self.timer.cancel(),
            VisibilityAction::None => {}
        }
    }

    fn arm_if_foreground(&mut self) {
        if self.visibility.current() == AppVisibility::Foreground {
            self.timer.arm(self.config.fallback_delay);
        } else {
            self.timer.cancel();
            debug!("app in background, fallback timer deferred until foreground");
        }
    }

    async fn finalize(&mut self, event: CallEvent) {
        match self.reconciler.apply(&event, Utc::now()) {
            Transition::Ignored(reason) => {
                debug!(?reason, source = %event.source(), "event ignored by reconciler");
            }
            Transition::Finalized(outcome) => {
                self.timer.cancel();
                if let Err(e) = self.session_store.clear().await {
                    warn!("failed to clear pending call: {}", e);
                }
                self.spawn_completion(outcome);
            }
        }
    }

    /// Persist (call-log outcomes only) then notify the UI. The UI is
    /// notified whatever the write result.
    fn spawn_completion(&self, mut outcome: CallOutcome) {
        let persistence = self.persistence.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            if outcome.source == CallSource::CallLog {
                // failure is logged by the adapter
                let _ = persistence.submit(&mut outcome).await;
            }
            if events.send(DialerEvent::CallCompleted { outcome }).await.is_err() {
                debug!("disposition UI receiver dropped");
            }
        });
    }

    async fn clear(&mut self) {
        self.reconciler.clear();
        self.timer.cancel();
        if let Err(e) = self.session_store.clear().await {
            warn!("failed to clear pending call: {}", e);
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let last_outcome = match self.reconciler.state() {
            ReconcilerState::Finalized { outcome } => Some(outcome.clone()),
            _ => None,
        };
        EngineSnapshot {
            state: self.reconciler.state().name().to_string(),
            pending: self.reconciler.pending().cloned(),
            last_outcome,
            timer_armed: self.timer.is_armed(),
            fallback_remaining_ms: self
                .timer
                .remaining()
                .map(|left| u64::try_from(left.as_millis()).unwrap_or(u64::MAX)),
            visibility: self.visibility.current(),
            call_log_access: self.call_log_access,
            finalized_count: self.reconciler.finalized_count(),
        }
    }

    async fn emit(&self, event: DialerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("disposition UI receiver dropped");
        }
    }
}
