// Scan session controller — lifecycle for one passive OF scan
//
// Single consumer task over the BLE facility's advertisement stream:
// decode -> reconstruct -> store, one event at a time, with a fixed-duration
// session timer. The registry is read-only while scanning and the store has a
// single writer, so the only suspension points are the initial scan request
// and the timer.

use crate::adv::decoder::{self, DecodeError};
use crate::adv::reconstruct;
use crate::adv::registry::{KeyCandidate, Registry};
use crate::adv::OF_VENDOR_ID;
use crate::store::{DetectionRecord, DetectionStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Default fixed scan duration (5 minutes)
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(300);

/// Capacity of the session event channel toward the UI collaborator
const SESSION_EVENT_CAPACITY: usize = 64;

/// Session lifecycle states. `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No scan in progress
    Idle,
    /// Waiting on the host's capability/permission request
    Requesting,
    /// Subscribed to the advertisement stream
    Scanning,
    /// Tearing down (unsubscribe + summary)
    Stopping,
}

/// Filter handed to the BLE facility when requesting a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    /// Manufacturer-data vendor id to subscribe to
    pub vendor_id: u16,
}

/// One raw advertisement delivered by the BLE facility
#[derive(Debug, Clone)]
pub struct AdvertisementEvent {
    /// Ephemeral per-source identifier assigned by the host
    pub source_id: String,
    /// Manufacturer data keyed by vendor id
    pub vendor_data: HashMap<u16, Vec<u8>>,
    /// Signal strength in dBm, if reported
    pub rssi: Option<i32>,
    /// Event timestamp (unix millis)
    pub timestamp_ms: u64,
}

/// Errors the BLE facility can raise when a scan is requested
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FacilityError {
    /// The host cannot scan at all (no adapter, API unavailable)
    #[error("bluetooth scanning is not available on this host")]
    CapabilityUnavailable,
    /// The operator declined the scan request
    #[error("bluetooth scanning permission was denied")]
    PermissionDenied,
}

/// Host BLE capability. Implementations subscribe to the advertisement
/// stream and hand back a handle to cancel it plus the event receiver.
#[async_trait]
pub trait BleFacility: Send + Sync {
    async fn request_scan(
        &self,
        filter: ScanFilter,
    ) -> Result<(Box<dyn ScanHandle>, mpsc::Receiver<AdvertisementEvent>), FacilityError>;
}

/// Cancellation handle for a running scan subscription
pub trait ScanHandle: Send {
    /// Unsubscribe from the advertisement stream. Must be idempotent.
    fn stop(&mut self);
}

/// Candidate-key fetch failure, surfaced to the operator at start
#[derive(Error, Debug, Clone)]
#[error("candidate key fetch failed: {0}")]
pub struct SourceError(pub String);

/// Supplies the operator's key candidates, fetched once immediately before
/// each scan start.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<KeyCandidate>, SourceError>;
}

/// Final summary emitted when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Distinct OF broadcast sources observed
    pub total_sources: usize,
    /// Sources matched to a registered accessory
    pub matched_sources: usize,
    /// Why the session ended ("timed out", caller-supplied, ...)
    pub reason: String,
}

/// Events toward the UI collaborator
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The detection table changed; full snapshot, newest first
    DetectionsUpdated(Vec<DetectionRecord>),
    /// The session ended. Emitted exactly once per session.
    Stopped(ScanSummary),
}

/// Fatal session errors, surfaced to the operator. Per-advertisement noise
/// never appears here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("bluetooth scanning is not available on this host")]
    CapabilityUnavailable,
    #[error("bluetooth scanning permission was denied")]
    PermissionDenied,
    #[error("no device keys or potential MACs are configured; scan would never match")]
    EmptyRegistry,
    #[error("a scan session is already in progress")]
    NotIdle,
    #[error("candidate key fetch failed: {0}")]
    Source(String),
}

impl From<FacilityError> for SessionError {
    fn from(err: FacilityError) -> Self {
        match err {
            FacilityError::CapabilityUnavailable => SessionError::CapabilityUnavailable,
            FacilityError::PermissionDenied => SessionError::PermissionDenied,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Fixed session duration; timer expiry stops the scan
    pub scan_duration: Duration,
    /// Vendor id to filter advertisements on
    pub vendor_id: u16,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            vendor_id: OF_VENDOR_ID,
        }
    }
}

/// State shared between the controller and the session task
struct SessionShared {
    state: RwLock<SessionState>,
    store: RwLock<DetectionStore>,
    /// Stop command channel for the active session, if any
    stop_tx: RwLock<Option<mpsc::Sender<String>>>,
}

/// Orchestrates scan lifecycle: start, per-event processing, timeout, stop.
/// The only component with mutable cross-call state besides the store.
pub struct ScanSessionController {
    facility: Arc<dyn BleFacility>,
    source: Arc<dyn CandidateSource>,
    config: ScanConfig,
    shared: Arc<SessionShared>,
}

impl ScanSessionController {
    /// Create a controller over the given collaborators
    pub fn new(
        facility: Arc<dyn BleFacility>,
        source: Arc<dyn CandidateSource>,
        config: ScanConfig,
    ) -> Self {
        Self {
            facility,
            source,
            config,
            shared: Arc::new(SessionShared {
                state: RwLock::new(SessionState::Idle),
                store: RwLock::new(DetectionStore::new()),
                stop_tx: RwLock::new(None),
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Snapshot of the detection table, newest first
    pub fn detections(&self) -> Vec<DetectionRecord> {
        self.shared.store.read().all()
    }

    /// Toggle the UI-owned expanded flag for one source
    pub fn set_expanded(&self, source_id: &str, expanded: bool) {
        self.shared.store.write().set_expanded(source_id, expanded);
    }

    /// Start a scan session. Valid only from `Idle`.
    ///
    /// Fetches candidates, builds the registry, and fails fast (back to
    /// `Idle`, distinct errors) on an empty registry, missing capability, or
    /// denied permission. On success the store is cleared, the fixed-duration
    /// timer is armed, and the returned receiver carries `SessionEvent`s
    /// until the terminal `Stopped` summary.
    pub async fn start(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        {
            let mut state = self.shared.state.write();
            if *state != SessionState::Idle {
                return Err(SessionError::NotIdle);
            }
            *state = SessionState::Requesting;
        }

        // Stop channel exists for the whole Requesting..Scanning span so a
        // stop() racing the capability request is honored once the task runs.
        let (stop_tx, stop_rx) = mpsc::channel::<String>(4);
        *self.shared.stop_tx.write() = Some(stop_tx);

        match self.start_inner(stop_rx).await {
            Ok(events) => Ok(events),
            Err(err) => {
                *self.shared.stop_tx.write() = None;
                *self.shared.state.write() = SessionState::Idle;
                warn!(%err, "scan session failed to start");
                Err(err)
            }
        }
    }

    async fn start_inner(
        &self,
        stop_rx: mpsc::Receiver<String>,
    ) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        let candidates = self
            .source
            .fetch()
            .await
            .map_err(|e| SessionError::Source(e.0))?;
        let registry = Registry::build(candidates);
        if registry.is_empty() {
            return Err(SessionError::EmptyRegistry);
        }
        info!(
            keys = registry.key_count(),
            macs = registry.mac_count(),
            "starting scan session"
        );

        // New session starts from a fully cleared table
        self.shared.store.write().clear();

        let filter = ScanFilter {
            vendor_id: self.config.vendor_id,
        };
        let (handle, adv_rx) = self.facility.request_scan(filter).await?;

        *self.shared.state.write() = SessionState::Scanning;

        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        tokio::spawn(run_session(
            Arc::clone(&self.shared),
            registry,
            handle,
            adv_rx,
            stop_rx,
            event_tx,
            self.config,
        ));

        Ok(event_rx)
    }

    /// Stop the running session with a reason. Safe no-op when idle, when
    /// called twice, or when the timer already fired.
    pub async fn stop(&self, reason: &str) {
        let stop_tx = self.shared.stop_tx.read().clone();
        if let Some(tx) = stop_tx {
            // A closed channel means the session task already shut down
            let _ = tx.send(reason.to_string()).await;
        } else {
            trace!("stop requested with no active session");
        }
    }
}

/// The single consumer task for one session: processes each advertisement to
/// completion before the next, races the session timer and stop commands,
/// and funnels every exit path through one shutdown sequence.
async fn run_session(
    shared: Arc<SessionShared>,
    registry: Registry,
    mut handle: Box<dyn ScanHandle>,
    mut adv_rx: mpsc::Receiver<AdvertisementEvent>,
    mut stop_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<SessionEvent>,
    config: ScanConfig,
) {
    let timer = tokio::time::sleep(config.scan_duration);
    tokio::pin!(timer);

    let reason = loop {
        tokio::select! {
            event = adv_rx.recv() => match event {
                Some(event) => {
                    if process_event(&shared, &registry, config.vendor_id, event) {
                        let snapshot = shared.store.read().all();
                        if event_tx
                            .send(SessionEvent::DetectionsUpdated(snapshot))
                            .await
                            .is_err()
                        {
                            // UI went away; nothing left to report to
                            break "listener dropped".to_string();
                        }
                    }
                }
                None => break "advertisement stream closed".to_string(),
            },
            _ = &mut timer => break "timed out".to_string(),
            cmd = stop_rx.recv() => break cmd.unwrap_or_else(|| "stopped".to_string()),
        }
    };

    *shared.state.write() = SessionState::Stopping;
    handle.stop();
    *shared.stop_tx.write() = None;

    let summary = {
        let store = shared.store.read();
        ScanSummary {
            total_sources: store.len(),
            matched_sources: store.matched_count(),
            reason: reason.clone(),
        }
    };
    info!(
        total = summary.total_sources,
        matched = summary.matched_sources,
        reason = %reason,
        "scan session ended"
    );

    // Back to Idle before the summary goes out, so a listener reacting to
    // `Stopped` can immediately start a new session.
    *shared.state.write() = SessionState::Idle;
    let _ = event_tx.send(SessionEvent::Stopped(summary)).await;
}

/// Decode one advertisement and merge it into the store. Returns whether the
/// table changed. Non-OF traffic is dropped silently — it is the expected
/// majority case, not an error.
fn process_event(
    shared: &SessionShared,
    registry: &Registry,
    vendor_id: u16,
    event: AdvertisementEvent,
) -> bool {
    let Some(data) = event.vendor_data.get(&vendor_id) else {
        return false;
    };

    let payload = match decoder::decode(vendor_id, data) {
        Ok(payload) => payload,
        Err(DecodeError::NotApplicable) => {
            trace!(source = %event.source_id, "ignoring non-OF advertisement");
            return false;
        }
    };

    let matched = reconstruct::attempt_match(&payload, registry);
    debug!(
        source = %event.source_id,
        matched = matched.is_some(),
        "processed OF advertisement"
    );

    let record = DetectionRecord {
        source_id: event.source_id,
        last_seen_ms: event.timestamp_ms,
        rssi: event.rssi,
        raw_payload_hex: Some(hex::encode(data)),
        payload: Some(payload),
        reconstructed_key: matched.as_ref().map(|m| m.reconstructed_key.clone()),
        matched: matched.map(|m| m.candidate),
        expanded: false,
    };
    shared.store.write().upsert(record);
    true
}

/// Current unix time in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adv::registry::KeyKind;
    use crate::adv::{reconstruct_key, OfPayload, OF_PAYLOAD_LEN, OF_PAYLOAD_TYPE};
    use parking_lot::Mutex;

    /// Scripted facility: either fails with a fixed error or hands out a
    /// pre-loaded advertisement stream.
    struct FakeFacility {
        fail_with: Option<FacilityError>,
        events: Mutex<Option<mpsc::Receiver<AdvertisementEvent>>>,
        stopped: Arc<Mutex<u32>>,
    }

    impl FakeFacility {
        fn failing(err: FacilityError) -> Self {
            Self {
                fail_with: Some(err),
                events: Mutex::new(None),
                stopped: Arc::new(Mutex::new(0)),
            }
        }

        fn with_events(rx: mpsc::Receiver<AdvertisementEvent>) -> Self {
            Self {
                fail_with: None,
                events: Mutex::new(Some(rx)),
                stopped: Arc::new(Mutex::new(0)),
            }
        }
    }

    struct FakeHandle {
        stopped: Arc<Mutex<u32>>,
    }

    impl ScanHandle for FakeHandle {
        fn stop(&mut self) {
            *self.stopped.lock() += 1;
        }
    }

    #[async_trait]
    impl BleFacility for FakeFacility {
        async fn request_scan(
            &self,
            _filter: ScanFilter,
        ) -> Result<(Box<dyn ScanHandle>, mpsc::Receiver<AdvertisementEvent>), FacilityError>
        {
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            let rx = self
                .events
                .lock()
                .take()
                .unwrap_or_else(|| mpsc::channel(1).1);
            Ok((
                Box::new(FakeHandle {
                    stopped: Arc::clone(&self.stopped),
                }),
                rx,
            ))
        }
    }

    struct FixedSource {
        candidates: Vec<KeyCandidate>,
    }

    #[async_trait]
    impl CandidateSource for FixedSource {
        async fn fetch(&self) -> Result<Vec<KeyCandidate>, SourceError> {
            Ok(self.candidates.clone())
        }
    }

    fn test_payload() -> OfPayload {
        let mut middle = [0u8; 22];
        for (i, b) in middle.iter_mut().enumerate() {
            *b = (i + 1) as u8;
        }
        OfPayload {
            status: 0x40,
            middle,
            mac_prefix: 0x02,
        }
    }

    fn of_event(source: &str, payload: &OfPayload, ts: u64) -> AdvertisementEvent {
        let mut data = vec![OF_PAYLOAD_TYPE, OF_PAYLOAD_LEN, payload.status];
        data.extend_from_slice(&payload.middle);
        data.push(payload.mac_prefix);
        data.push(0x00);
        let mut vendor_data = HashMap::new();
        vendor_data.insert(OF_VENDOR_ID, data);
        AdvertisementEvent {
            source_id: source.to_string(),
            vendor_data,
            rssi: Some(-60),
            timestamp_ms: ts,
        }
    }

    fn matching_candidate(payload: &OfPayload, mac: &str) -> KeyCandidate {
        let octets = crate::adv::parse_mac(mac).expect("Valid test MAC");
        KeyCandidate {
            adv_key_b64: reconstruct_key(payload, &octets),
            device_id: "dev-1".to_string(),
            name: "Backpack Tag".to_string(),
            key_kind: KeyKind::Primary,
            potential_mac: Some(mac.to_string()),
        }
    }

    fn controller(
        facility: FakeFacility,
        candidates: Vec<KeyCandidate>,
    ) -> ScanSessionController {
        ScanSessionController::new(
            Arc::new(facility),
            Arc::new(FixedSource { candidates }),
            ScanConfig {
                scan_duration: Duration::from_secs(60),
                vendor_id: OF_VENDOR_ID,
            },
        )
    }

    #[tokio::test]
    async fn test_start_refuses_empty_registry() {
        let (_tx, rx) = mpsc::channel(8);
        let controller = controller(FakeFacility::with_events(rx), vec![]);

        let err = controller.start().await.expect_err("Must refuse to start");
        assert_eq!(err, SessionError::EmptyRegistry);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_surfaces_distinct_facility_errors() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let denied = controller(
            FakeFacility::failing(FacilityError::PermissionDenied),
            vec![candidate.clone()],
        );
        assert_eq!(
            denied.start().await.expect_err("Denied"),
            SessionError::PermissionDenied
        );
        assert_eq!(denied.state(), SessionState::Idle);

        let unavailable = controller(
            FakeFacility::failing(FacilityError::CapabilityUnavailable),
            vec![candidate],
        );
        assert_eq!(
            unavailable.start().await.expect_err("Unavailable"),
            SessionError::CapabilityUnavailable
        );
        assert_eq!(unavailable.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_full_scenario_match_lands_in_store() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");
        let expected_key = candidate.adv_key_b64.clone();

        let (adv_tx, adv_rx) = mpsc::channel(8);
        let controller = controller(FakeFacility::with_events(adv_rx), vec![candidate]);

        let mut events = controller.start().await.expect("Start");
        assert_eq!(controller.state(), SessionState::Scanning);

        adv_tx
            .send(of_event("src-1", &payload, now_ms()))
            .await
            .expect("Send event");

        let update = events.recv().await.expect("Detections update");
        let SessionEvent::DetectionsUpdated(records) = update else {
            panic!("Expected DetectionsUpdated, got {:?}", update);
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_id, "src-1");
        assert_eq!(records[0].reconstructed_key.as_deref(), Some(expected_key.as_str()));
        assert_eq!(
            records[0].matched.as_ref().map(|c| c.device_id.as_str()),
            Some("dev-1")
        );

        controller.stop("done").await;
        loop {
            match events.recv().await.expect("Stopped event") {
                SessionEvent::Stopped(summary) => {
                    assert_eq!(summary.total_sources, 1);
                    assert_eq!(summary.matched_sources, 1);
                    assert_eq!(summary.reason, "done");
                    break;
                }
                SessionEvent::DetectionsUpdated(_) => continue,
            }
        }
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_non_of_traffic_updates_nothing() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let (adv_tx, adv_rx) = mpsc::channel(8);
        let controller = controller(FakeFacility::with_events(adv_rx), vec![candidate]);
        let mut events = controller.start().await.expect("Start");

        // Wrong vendor id entirely
        let mut vendor_data = HashMap::new();
        vendor_data.insert(0x0059u16, vec![0x01, 0x02, 0x03]);
        adv_tx
            .send(AdvertisementEvent {
                source_id: "noise-1".to_string(),
                vendor_data,
                rssi: None,
                timestamp_ms: now_ms(),
            })
            .await
            .expect("Send noise");

        // Right vendor, wrong frame type
        let mut vendor_data = HashMap::new();
        vendor_data.insert(OF_VENDOR_ID, vec![0x10, 0x05, 0x01, 0x02, 0x03]);
        adv_tx
            .send(AdvertisementEvent {
                source_id: "noise-2".to_string(),
                vendor_data,
                rssi: None,
                timestamp_ms: now_ms(),
            })
            .await
            .expect("Send noise");

        controller.stop("done").await;
        loop {
            match events.recv().await.expect("Stopped event") {
                SessionEvent::Stopped(summary) => {
                    assert_eq!(summary.total_sources, 0);
                    assert_eq!(summary.matched_sources, 0);
                    break;
                }
                SessionEvent::DetectionsUpdated(records) => {
                    panic!("Noise must not update detections: {:?}", records)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let (_adv_tx, adv_rx) = mpsc::channel(8);
        let controller = controller(FakeFacility::with_events(adv_rx), vec![candidate]);
        let mut events = controller.start().await.expect("Start");

        controller.stop("first").await;
        let SessionEvent::Stopped(summary) = events.recv().await.expect("Stopped") else {
            panic!("Expected Stopped");
        };
        assert_eq!(summary.reason, "first");

        // Second stop after the session already ended: no-op, no second summary
        controller.stop("second").await;
        assert!(events.recv().await.is_none());
        assert_eq!(controller.state(), SessionState::Idle);

        // Stop from Idle with no session ever started is also a no-op
        controller.stop("third").await;
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_timer_expiry_stops_session() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let (_adv_tx, adv_rx) = mpsc::channel(8);
        let controller = ScanSessionController::new(
            Arc::new(FakeFacility::with_events(adv_rx)),
            Arc::new(FixedSource {
                candidates: vec![candidate],
            }),
            ScanConfig {
                scan_duration: Duration::from_millis(20),
                vendor_id: OF_VENDOR_ID,
            },
        );

        let mut events = controller.start().await.expect("Start");
        let SessionEvent::Stopped(summary) = events.recv().await.expect("Stopped") else {
            panic!("Expected Stopped");
        };
        assert_eq!(summary.reason, "timed out");
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_restart_begins_from_cleared_store() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let (adv_tx, adv_rx) = mpsc::channel(8);
        let facility = Arc::new(RestartableFacility {
            queue: Mutex::new(vec![adv_rx]),
        });
        let controller = ScanSessionController::new(
            Arc::clone(&facility) as Arc<dyn BleFacility>,
            Arc::new(FixedSource {
                candidates: vec![candidate],
            }),
            ScanConfig {
                scan_duration: Duration::from_secs(60),
                vendor_id: OF_VENDOR_ID,
            },
        );

        let mut events = controller.start().await.expect("Start");
        adv_tx
            .send(of_event("src-1", &payload, now_ms()))
            .await
            .expect("Send");
        // Wait until the record is visible, then stop
        while let Some(SessionEvent::DetectionsUpdated(_)) = events.recv().await {
            break;
        }
        controller.stop("done").await;
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Stopped(_)) {
                break;
            }
        }
        assert_eq!(controller.detections().len(), 1);

        // Second session: store must start empty
        let (_tx2, rx2) = mpsc::channel(8);
        facility.queue.lock().push(rx2);
        let _events = controller.start().await.expect("Restart");
        assert!(controller.detections().is_empty());
        controller.stop("cleanup").await;
    }

    struct RestartableFacility {
        queue: Mutex<Vec<mpsc::Receiver<AdvertisementEvent>>>,
    }

    #[async_trait]
    impl BleFacility for RestartableFacility {
        async fn request_scan(
            &self,
            _filter: ScanFilter,
        ) -> Result<(Box<dyn ScanHandle>, mpsc::Receiver<AdvertisementEvent>), FacilityError>
        {
            let rx = self
                .queue
                .lock()
                .pop()
                .unwrap_or_else(|| mpsc::channel(1).1);
            Ok((
                Box::new(FakeHandle {
                    stopped: Arc::new(Mutex::new(0)),
                }),
                rx,
            ))
        }
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let payload = test_payload();
        let candidate = matching_candidate(&payload, "11:22:33:44:55:66");

        let (_adv_tx, adv_rx) = mpsc::channel(8);
        let controller = controller(FakeFacility::with_events(adv_rx), vec![candidate]);
        let _events = controller.start().await.expect("Start");

        assert_eq!(
            controller.start().await.expect_err("Second start"),
            SessionError::NotIdle
        );
        controller.stop("cleanup").await;
    }
}
