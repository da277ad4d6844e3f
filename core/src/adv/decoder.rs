/// Offline-Finding advertisement decoder
///
/// Parses the vendor-specific manufacturer data broadcast by Find-My-type
/// accessories into a structured OF payload. The overwhelming majority of
/// BLE traffic is not an OF beacon; everything that does not match the
/// expected shape is rejected as `NotApplicable` without log noise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Company identifier used by Find-My-type beacons in manufacturer data
pub const OF_VENDOR_ID: u16 = 0x004C;

/// Advertisement type byte for a separated OF beacon
pub const OF_PAYLOAD_TYPE: u8 = 0x12;

/// Declared payload length byte (25 decimal)
pub const OF_PAYLOAD_LEN: u8 = 0x19;

/// Number of identifier octets carried in the payload
pub const OF_MIDDLE_LEN: usize = 22;

/// Errors for advertisement decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is not an OF beacon (wrong vendor, type, length, or too short).
    /// Expected and silent — most BLE traffic lands here.
    #[error("not an offline-finding advertisement")]
    NotApplicable,
}

/// Decoded OF payload from one advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfPayload {
    /// Status byte (battery bits 6-7, remainder vendor-reserved)
    pub status: u8,
    /// Octets 6..28 of the advertised 28-byte identifier
    pub middle: [u8; OF_MIDDLE_LEN],
    /// Carries the top 2 bits of identifier octet 0 in its low bits
    pub mac_prefix: u8,
}

impl OfPayload {
    /// Battery level encoded in the status byte
    pub fn battery(&self) -> BatteryLevel {
        BatteryLevel::from_status_byte(self.status)
    }
}

/// Battery level reported by an accessory, from status-byte bits 6-7.
/// Vendor-defined mapping, reproduced bit-for-bit. Display only — never
/// used for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryLevel {
    Full,
    Medium,
    Low,
    VeryLow,
}

impl BatteryLevel {
    /// Extract the battery level from a raw status byte
    pub fn from_status_byte(status: u8) -> Self {
        match (status >> 6) & 0b11 {
            0b00 => BatteryLevel::Full,
            0b01 => BatteryLevel::Medium,
            0b10 => BatteryLevel::Low,
            _ => BatteryLevel::VeryLow,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            BatteryLevel::Full => "Full",
            BatteryLevel::Medium => "Medium",
            BatteryLevel::Low => "Low",
            BatteryLevel::VeryLow => "Very Low",
        }
    }
}

impl std::fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Render a status byte the way the dashboard shows it, e.g. "Low (raw 0x83)"
pub fn describe_status_byte(status: u8) -> String {
    format!("{} (raw 0x{:02x})", BatteryLevel::from_status_byte(status), status)
}

/// Decode vendor-specific manufacturer data into an OF payload.
///
/// Accepts only buffers tagged with the OF vendor id whose first two bytes
/// read `(0x12, 0x19)` and which carry at least 25 bytes after that header.
/// Pure function; no side effects.
pub fn decode(vendor_id: u16, data: &[u8]) -> Result<OfPayload, DecodeError> {
    if vendor_id != OF_VENDOR_ID {
        return Err(DecodeError::NotApplicable);
    }
    if data.len() < 2 + OF_PAYLOAD_LEN as usize {
        return Err(DecodeError::NotApplicable);
    }
    if data[0] != OF_PAYLOAD_TYPE || data[1] != OF_PAYLOAD_LEN {
        return Err(DecodeError::NotApplicable);
    }

    let body = &data[2..2 + OF_PAYLOAD_LEN as usize];
    let mut middle = [0u8; OF_MIDDLE_LEN];
    middle.copy_from_slice(&body[1..1 + OF_MIDDLE_LEN]);

    Ok(OfPayload {
        status: body[0],
        middle,
        mac_prefix: body[23],
    })
}
