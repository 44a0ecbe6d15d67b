//! End-to-end behavior of the dialer engine
//!
//! Timer scenarios run on a paused tokio clock, so "8 seconds" elapse
//! instantly and deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crm_dialer_core::database::open_in_memory;
use crm_dialer_core::{
    AppVisibility, CallLogEntry, CallLogRecord, CallLogSink, CallSource, CallType, DialerConfig,
    DialerEngineBuilder, DialerError, DialerEvent, DialerHandle, DialerLauncher,
    DispositionUpdate, InMemoryCallLogStore, InMemorySessionStore, LeadId, PendingSessionStore,
    PermissionGate, PersistedId, RawCallFinished, Result, SqliteSessionStore, StaticLeadDirectory,
    SubmitReceipt,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

struct RecordingLauncher {
    accept: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DialerLauncher for RecordingLauncher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn launch(&self, phone_number: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(phone_number.to_string());
        Ok(self.accept)
    }
}

struct DeniedGate;

#[async_trait]
impl PermissionGate for DeniedGate {
    async fn check(&self) -> Result<bool> {
        Ok(false)
    }

    async fn request(&self) -> Result<bool> {
        Ok(false)
    }
}

struct OfflineSink;

#[async_trait]
impl CallLogSink for OfflineSink {
    async fn log_call(&self, _record: CallLogRecord) -> Result<SubmitReceipt> {
        Err(DialerError::persistence("backend offline"))
    }

    async fn update_disposition(&self, _id: &PersistedId, _update: &DispositionUpdate) -> Result<()> {
        Err(DialerError::persistence("backend offline"))
    }
}

struct Harness {
    handle: DialerHandle,
    events: mpsc::Receiver<DialerEvent>,
    sink: Arc<InMemoryCallLogStore>,
    launcher: Arc<RecordingLauncher>,
}

async fn start_engine() -> Harness {
    start_engine_with(DialerEngineBuilder::new(DialerConfig::default())).await
}

async fn start_engine_with(builder: DialerEngineBuilder) -> Harness {
    let sink = Arc::new(InMemoryCallLogStore::new());
    let launcher = RecordingLauncher::new(true);
    let leads = StaticLeadDirectory::new().with_lead("+15550100", "lead-100");

    let (handle, events) = builder
        .with_session_store(Arc::new(InMemorySessionStore::new()))
        .with_call_log_sink(sink.clone())
        .with_lead_directory(Arc::new(leads))
        .with_launcher(launcher.clone())
        .start()
        .await
        .unwrap();

    Harness {
        handle,
        events,
        sink,
        launcher,
    }
}

async fn next_event(events: &mut mpsc::Receiver<DialerEvent>, within: Duration) -> Option<DialerEvent> {
    timeout(within, events.recv()).await.ok().flatten()
}

fn outgoing_log(duration: f64) -> RawCallFinished {
    RawCallFinished::new("calllog", duration)
        .with_type(2)
        .with_log_id(981)
        .with_phone("+15550100")
}

#[tokio::test(start_paused = true)]
async fn test_connected_call_finalized_from_call_log() {
    let mut h = start_engine().await;
    h.handle
        .initiate("+15550100", Some(LeadId::new("lead-100")))
        .await
        .unwrap();

    sleep(Duration::from_secs(3)).await;
    h.handle.deliver_native(outgoing_log(45.0)).await.unwrap();

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(1)).await else {
        panic!("no completion");
    };
    assert_eq!(outcome.call_type, CallType::Outgoing);
    assert_eq!(outcome.duration_secs, 45);
    assert_eq!(outcome.source, CallSource::CallLog);
    assert_eq!(outcome.lead_id, Some(LeadId::new("lead-100")));
    assert!(outcome.end_time >= outcome.start_time);
    assert!(outcome.persisted_id.is_some());
    assert_eq!(h.sink.write_count(), 1);
    assert_eq!(h.launcher.calls(), vec!["+15550100".to_string()]);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, "finalized");
    assert!(!snapshot.timer_armed);

    // the cancelled fallback never fires
    assert!(next_event(&mut h.events, Duration::from_secs(30)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fallback_after_silence() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();

    assert!(next_event(&mut h.events, Duration::from_millis(7_900)).await.is_none());
    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_millis(200)).await else {
        panic!("fallback did not fire");
    };
    assert_eq!(outcome.duration_secs, 0);
    assert_eq!(outcome.source, CallSource::Fallback);
    assert_eq!(outcome.call_type, CallType::Missed);
    assert!(outcome.persisted_id.is_none());
    assert_eq!(h.sink.write_count(), 0);

    // a late call log does not produce a second outcome
    h.handle.deliver_native(outgoing_log(12.0)).await.unwrap();
    assert!(next_event(&mut h.events, Duration::from_secs(30)).await.is_none());
    assert_eq!(h.sink.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_outcome_persisted_on_disposition() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", Some(LeadId::new("lead-100"))).await.unwrap();

    let Some(DialerEvent::CallCompleted { mut outcome }) = next_event(&mut h.events, Duration::from_secs(9)).await else {
        panic!("fallback did not fire");
    };
    let id = h
        .handle
        .save_disposition(&mut outcome, &DispositionUpdate::new("Not Answered").with_notes("voicemail"))
        .await
        .unwrap();

    let record = h.sink.get(&id).unwrap();
    assert_eq!(record.disposition.as_deref(), Some("Not Answered"));
    assert_eq!(record.duration_secs, 0);
    assert_eq!(outcome.persisted_id, Some(id));
}

#[tokio::test(start_paused = true)]
async fn test_missed_incoming_without_session() {
    let mut h = start_engine().await;
    let missed = RawCallFinished::new("calllog", 0.0)
        .with_type(3)
        .with_log_id(55)
        .with_phone("+15550100");

    h.handle.deliver_native(missed.clone()).await.unwrap();
    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(1)).await else {
        panic!("no completion for missed call");
    };
    assert_eq!(outcome.call_type, CallType::Missed);
    assert_eq!(outcome.lead_id, Some(LeadId::new("lead-100")));
    assert!(outcome.persisted_id.is_some());
    assert_eq!(h.sink.len(), 1);

    // the same device entry again is deduped by the sink
    h.handle.deliver_native(missed).await.unwrap();
    assert!(next_event(&mut h.events, Duration::from_secs(1)).await.is_none());
    assert_eq!(h.sink.len(), 1);

    assert_eq!(h.handle.snapshot().await.unwrap().state, "idle");
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_call_log_is_noop() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();

    h.handle.deliver_native(outgoing_log(45.0)).await.unwrap();
    h.handle.deliver_native(outgoing_log(45.0)).await.unwrap();

    assert!(matches!(
        next_event(&mut h.events, Duration::from_secs(1)).await,
        Some(DialerEvent::CallCompleted { .. })
    ));
    assert!(next_event(&mut h.events, Duration::from_secs(30)).await.is_none());
    assert_eq!(h.sink.write_count(), 1);
    assert_eq!(h.handle.snapshot().await.unwrap().finalized_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_restarts_full_countdown() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();

    sleep(Duration::from_secs(2)).await;
    h.handle.set_visibility(AppVisibility::Background).await.unwrap();
    sleep(Duration::from_secs(23)).await;
    assert!(!h.handle.snapshot().await.unwrap().timer_armed);

    h.handle.set_visibility(AppVisibility::Foreground).await.unwrap();
    assert!(next_event(&mut h.events, Duration::from_millis(7_900)).await.is_none());

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_millis(200)).await else {
        panic!("fallback did not fire after returning to foreground");
    };
    assert_eq!(outcome.source, CallSource::Fallback);
    let elapsed = outcome.end_time - outcome.start_time;
    assert!(elapsed.num_seconds() >= 0);
}

#[tokio::test(start_paused = true)]
async fn test_incoming_sync_leaves_pending_call_alone() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550199", None).await.unwrap();

    let incoming = RawCallFinished::new("incoming-sync", 30.0)
        .with_type(1)
        .with_log_id(7)
        .with_phone("+15550100");
    h.handle.deliver_native(incoming).await.unwrap();

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(1)).await else {
        panic!("incoming call not reported");
    };
    assert_eq!(outcome.source, CallSource::IncomingSync);
    assert_eq!(outcome.call_type, CallType::Incoming);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, "awaiting-event");
    assert!(snapshot.timer_armed);
    assert_eq!(snapshot.pending.unwrap().phone_number, "+15550199");
}

#[tokio::test(start_paused = true)]
async fn test_oversized_duration_does_not_stop_engine() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();

    let huge = RawCallFinished::new("calllog", 1e17)
        .with_type(2)
        .with_date(1_700_000_000_000);
    h.handle.deliver_native(huge).await.unwrap();
    let unsolicited = RawCallFinished::new("incoming-sync", 1e17)
        .with_type(1)
        .with_phone("+15550100");
    h.handle.deliver_native(unsolicited).await.unwrap();

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, "awaiting-event");
    let left = snapshot.fallback_remaining_ms.unwrap();
    assert!(left > 0 && left <= 8_000, "{}ms left", left);

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(10)).await else {
        panic!("fallback did not fire");
    };
    assert_eq!(outcome.source, CallSource::Fallback);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, "finalized");
    assert!(snapshot.fallback_remaining_ms.is_none());
    assert!(h.sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_are_dropped() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();

    h.handle
        .deliver_native_json(r#"{"source":"calllog","duration":"long"}"#)
        .await
        .unwrap_err();
    h.handle
        .deliver_native_json(r#"{"detail":{"source":"calllog"}}"#)
        .await
        .unwrap();
    h.handle
        .deliver_native_json(r#"{"detail":{"source":"calllog","duration":20,"callLogType":2,"callLogId":3}}"#)
        .await
        .unwrap();

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(1)).await else {
        panic!("wrapped payload not processed");
    };
    assert_eq!(outcome.duration_secs, 20);
    assert_eq!(outcome.device_call_log_id.as_deref(), Some("3"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_discards_pending_call() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();
    h.handle.clear().await.unwrap();

    assert!(next_event(&mut h.events, Duration::from_secs(30)).await.is_none());
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, "idle");
    assert!(!snapshot.timer_armed);
}

#[tokio::test(start_paused = true)]
async fn test_new_call_supersedes_pending_one() {
    let mut h = start_engine().await;
    h.handle.initiate("+15550100", None).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    h.handle.initiate("+15550123", None).await.unwrap();

    // the first countdown is gone; the second runs its full delay
    assert!(next_event(&mut h.events, Duration::from_millis(7_900)).await.is_none());
    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_millis(200)).await else {
        panic!("fallback did not fire");
    };
    assert_eq!(outcome.phone_number, "+15550123");
    assert!(next_event(&mut h.events, Duration::from_secs(30)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_empty_phone_rejected() {
    let h = start_engine().await;
    let err = h.handle.initiate("  ", None).await.unwrap_err();
    assert!(matches!(err, DialerError::InvalidInput(_)));
    assert!(h.launcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_runs_fallback_only() {
    let mut h =
        start_engine_with(DialerEngineBuilder::new(DialerConfig::default()).with_permission_gate(Arc::new(DeniedGate)))
            .await;

    assert!(matches!(
        next_event(&mut h.events, Duration::from_millis(10)).await,
        Some(DialerEvent::PermissionDenied { .. })
    ));
    assert!(!h.handle.snapshot().await.unwrap().call_log_access);

    h.handle.initiate("+15550100", None).await.unwrap();
    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut h.events, Duration::from_secs(9)).await else {
        panic!("fallback did not fire");
    };
    assert_eq!(outcome.source, CallSource::Fallback);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_still_falls_back() {
    let launcher = RecordingLauncher::new(false);
    let (handle, mut events) = DialerEngineBuilder::new(DialerConfig::default())
        .with_session_store(Arc::new(InMemorySessionStore::new()))
        .with_call_log_sink(Arc::new(InMemoryCallLogStore::new()))
        .with_launcher(launcher.clone())
        .start()
        .await
        .unwrap();

    handle.initiate("+15550100", None).await.unwrap();
    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(DialerEvent::LaunchFailed { .. })
    ));
    assert_eq!(launcher.calls().len(), 2);

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(9)).await,
        Some(DialerEvent::CallCompleted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_still_notifies() {
    let (handle, mut events) = DialerEngineBuilder::new(DialerConfig::default())
        .with_session_store(Arc::new(InMemorySessionStore::new()))
        .with_call_log_sink(Arc::new(OfflineSink))
        .with_launcher(RecordingLauncher::new(true))
        .start()
        .await
        .unwrap();

    handle.initiate("+15550100", None).await.unwrap();
    handle.deliver_native(outgoing_log(45.0)).await.unwrap();

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut events, Duration::from_secs(1)).await else {
        panic!("no completion");
    };
    assert_eq!(outcome.duration_secs, 45);
    assert!(outcome.persisted_id.is_none());
}

#[tokio::test]
async fn test_missing_launcher_is_a_configuration_error() {
    let result = DialerEngineBuilder::new(DialerConfig::default()).start().await;
    assert!(matches!(result, Err(DialerError::Configuration(_))));
}

#[tokio::test(start_paused = true)]
async fn test_handle_after_shutdown() {
    let h = start_engine().await;
    h.handle.shutdown().await.unwrap();
    assert!(matches!(
        h.handle.initiate("+15550100", None).await,
        Err(DialerError::EngineClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_bulk_sync_through_handle() {
    let h = start_engine().await;
    let entries = vec![
        CallLogEntry {
            duration_secs: 45,
            call_log_type: Some(2),
            call_log_date: None,
            call_log_id: Some(1),
            phone_number: Some("+15550100".to_string()),
        },
        CallLogEntry {
            duration_secs: 0,
            call_log_type: Some(3),
            call_log_date: None,
            call_log_id: Some(2),
            phone_number: Some("+15550999".to_string()),
        },
    ];

    let report = h.handle.sync_call_logs(entries).await;
    assert_eq!(report.total, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.sink.find_by_device_id("1").unwrap().call_type, CallType::Outgoing);
}

#[tokio::test]
async fn test_pending_call_restored_from_sqlite() {
    let pool = open_in_memory().await.unwrap();
    let store = Arc::new(SqliteSessionStore::new(pool));
    store.initialize().await.unwrap();
    store
        .begin("+15550142", Some(LeadId::new("lead-142")))
        .await
        .unwrap();

    let config = DialerConfig::default().with_fallback_delay(Duration::from_millis(100));
    let (handle, mut events) = DialerEngineBuilder::new(config)
        .with_session_store(store.clone())
        .with_call_log_sink(Arc::new(InMemoryCallLogStore::new()))
        .with_launcher(RecordingLauncher::new(true))
        .start()
        .await
        .unwrap();

    let Some(DialerEvent::CallCompleted { outcome }) = next_event(&mut events, Duration::from_secs(5)).await else {
        panic!("restored call never finalized");
    };
    assert_eq!(outcome.phone_number, "+15550142");
    assert_eq!(outcome.lead_id, Some(LeadId::new("lead-142")));
    assert_eq!(outcome.source, CallSource::Fallback);
    assert!(store.peek().await.unwrap().is_none());

    handle.shutdown().await.unwrap();
}
