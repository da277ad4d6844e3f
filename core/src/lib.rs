// ofscan-core — Offline-Finding scanner engine
//
// Passive BLE listener for Find-My-type accessory broadcasts: byte-exact
// payload decoding, deterministic key reconstruction against the operator's
// registered key material, and a live session-scoped detection table.
//
// The engine owns no radio and no UI. The host BLE facility and the
// candidate-key source are injected collaborators; detections flow out over
// a session event channel.

pub mod adv;
pub mod session;
pub mod store;

pub use adv::{
    attempt_match, decode, describe_status_byte, parse_mac, potential_mac_for_key,
    reconstruct_key, BatteryLevel, DecodeError, KeyCandidate, KeyKind, MacError, MatchResult,
    OfPayload, Registry, ADV_KEY_LEN, OF_VENDOR_ID,
};

pub use session::{
    now_ms, AdvertisementEvent, BleFacility, CandidateSource, FacilityError, ScanConfig,
    ScanFilter, ScanHandle, ScanSessionController, ScanSummary, SessionError, SessionEvent,
    SessionState, SourceError, DEFAULT_SCAN_DURATION,
};

pub use store::{DetectionRecord, DetectionStore};
