//! Engine builder
//!
//! Wires collaborators, picks storage from the configuration when none is
//! given, and spawns the engine task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::adapters::{AlwaysGranted, DialerLauncher, LeadDirectory, PermissionGate, StaticLeadDirectory};
use crate::config::DialerConfig;
use crate::database::open_pool;
use crate::error::{DialerError, Result};
use crate::events::DialerEvent;
use crate::incoming::IncomingCallLogger;
use crate::persistence::{CallLogSink, InMemoryCallLogStore, PersistenceAdapter, SqliteCallLogStore};
use crate::session_store::{InMemorySessionStore, PendingSessionStore, SqliteSessionStore};

use super::handle::DialerHandle;
use super::runner::EngineRunner;

/// Builder for a running dialer engine
pub struct DialerEngineBuilder {
    config: DialerConfig,
    session_store: Option<Arc<dyn PendingSessionStore>>,
    call_log_sink: Option<Arc<dyn CallLogSink>>,
    leads: Option<Arc<dyn LeadDirectory>>,
    native_launcher: Option<Arc<dyn DialerLauncher>>,
    generic_launcher: Option<Arc<dyn DialerLauncher>>,
    permission_gate: Arc<dyn PermissionGate>,
}

impl DialerEngineBuilder {
    pub fn new(config: DialerConfig) -> Self {
        Self {
            config,
            session_store: None,
            call_log_sink: None,
            leads: None,
            native_launcher: None,
            generic_launcher: None,
            permission_gate: Arc::new(AlwaysGranted),
        }
    }

    pub fn with_session_store(mut self, store: Arc<dyn PendingSessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_call_log_sink(mut self, sink: Arc<dyn CallLogSink>) -> Self {
        self.call_log_sink = Some(sink);
        self
    }

    pub fn with_lead_directory(mut self, leads: Arc<dyn LeadDirectory>) -> Self {
        self.leads = Some(leads);
        self
    }

    /// Platform dialer plugin, tried before the generic launcher
    pub fn with_native_launcher(mut self, launcher: Arc<dyn DialerLauncher>) -> Self {
        self.native_launcher = Some(launcher);
        self
    }

    /// Launcher used when the native one is missing or fails. Required.
    pub fn with_launcher(mut self, launcher: Arc<dyn DialerLauncher>) -> Self {
        self.generic_launcher = Some(launcher);
        self
    }

    pub fn with_permission_gate(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permission_gate = gate;
        self
    }

    /// Spawn the engine task.
    ///
    /// Returns the command handle and the receiver the disposition UI reads
    /// [`DialerEvent`]s from.
    pub async fn start(self) -> Result<(DialerHandle, mpsc::Receiver<DialerEvent>)> {
        self.config.validate()?;
        let generic_launcher = self
            .generic_launcher
            .ok_or_else(|| DialerError::configuration("a dialer launcher is required"))?;

        let (session_store, call_log_sink) = match (self.session_store, self.call_log_sink) {
            (Some(store), Some(sink)) => (store, sink),
            (store, sink) => {
                let (default_store, default_sink) = default_storage(&self.config).await?;
                (store.unwrap_or(default_store), sink.unwrap_or(default_sink))
            }
        };

        let persistence = PersistenceAdapter::new(call_log_sink, self.config.persist_timeout);
        let leads = self
            .leads
            .unwrap_or_else(|| Arc::new(StaticLeadDirectory::new()));
        let logger = Arc::new(IncomingCallLogger::new(
            leads,
            persistence.clone(),
            self.config.bulk_sync_days,
        ));

        let (command_tx, command_rx) = mpsc::channel(self.config.command_queue_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_capacity);

        let runner = EngineRunner::new(
            self.config,
            &command_tx,
            session_store,
            persistence.clone(),
            logger.clone(),
            self.native_launcher,
            generic_launcher,
            self.permission_gate,
            event_tx,
        );
        tokio::spawn(runner.run(command_rx));
        info!("dialer engine started");

        Ok((DialerHandle::new(command_tx, persistence, logger), event_rx))
    }
}

async fn default_storage(
    config: &DialerConfig,
) -> Result<(Arc<dyn PendingSessionStore>, Arc<dyn CallLogSink>)> {
    match &config.database_url {
        Some(url) => {
            let pool = open_pool(url).await?;
            let store = SqliteSessionStore::new(pool.clone());
            store.initialize().await?;
            let sink = SqliteCallLogStore::new(pool);
            sink.initialize().await?;
            info!(database = %url, "using SQLite storage");
            Ok((Arc::new(store), Arc::new(sink)))
        }
        None => Ok((
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryCallLogStore::new()),
        )),
    }
}
