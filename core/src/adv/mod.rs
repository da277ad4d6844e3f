/// Offline-Finding (OF) advertisement protocol module
///
/// Protocol-level handling for Find-My-type BLE beacons:
///
/// - **decoder**: byte-exact parsing of the vendor-specific 25-byte OF payload
/// - **registry**: session-scoped index over the operator's key candidates
/// - **reconstruct**: rebuilds the 28-byte advertised identifier from a
///   payload plus a candidate link-layer address and tests it against the
///   registry
///
/// Everything here is pure and synchronous; the session controller owns the
/// lifecycle and feeds events through these functions one at a time.

pub mod decoder;
pub mod registry;
pub mod reconstruct;

// Re-export commonly used types
pub use decoder::{
    decode, describe_status_byte, BatteryLevel, DecodeError, OfPayload, OF_MIDDLE_LEN,
    OF_PAYLOAD_LEN, OF_PAYLOAD_TYPE, OF_VENDOR_ID,
};

pub use registry::{potential_mac_for_key, KeyCandidate, KeyKind, Registry, ADV_KEY_LEN};

pub use reconstruct::{attempt_match, parse_mac, reconstruct_key, MacError, MatchResult};
