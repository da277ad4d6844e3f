/// Key reconstruction — rebuilds the full advertised identifier
///
/// An accessory never transmits its 28-octet identifier whole: 22 octets ride
/// in the OF payload, the next 6 are only recoverable from the link-layer
/// source address used for that advertisement, and the first reconstructed
/// octet folds 2 extra bits carried in the payload over the address's low 6
/// bits. A passive scanner cannot observe which address produced a broadcast,
/// so it tries every address it is permitted to guess (the registry's
/// potential MACs) and checks each rebuilt identifier against the keys it
/// already knows.

use crate::adv::decoder::OfPayload;
use crate::adv::registry::{KeyCandidate, Registry, ADV_KEY_LEN};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors for MAC string handling. Per-candidate and silent: a bad MAC skips
/// that candidate, it never fails the advertisement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    #[error("MAC address must have 6 colon-separated octets")]
    WrongOctetCount,
    #[error("invalid hex octet in MAC address: {0}")]
    InvalidOctet(String),
}

/// A successful reconstruction against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The registry candidate the rebuilt identifier matched
    pub candidate: KeyCandidate,
    /// Rebuilt identifier, unpadded URL-safe base64
    pub reconstructed_key: String,
    /// The potential MAC that produced the match
    pub used_mac: String,
}

/// Parse a colon-separated MAC string into its 6 octets
pub fn parse_mac(mac: &str) -> Result<[u8; 6], MacError> {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return Err(MacError::WrongOctetCount);
    }
    let mut octets = [0u8; 6];
    for (slot, part) in octets.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| MacError::InvalidOctet(part.to_string()))?;
    }
    Ok(octets)
}

/// Rebuild the 28-octet identifier from a decoded payload and one candidate
/// address, returning its unpadded URL-safe base64 encoding.
///
/// Octet 0 takes its top 2 bits from the payload's prefix byte and its low
/// 6 bits from the address's first octet; octets 1-5 are the remaining
/// address octets; octets 6-27 are the payload's middle bytes.
pub fn reconstruct_key(payload: &OfPayload, mac: &[u8; 6]) -> String {
    let mut key = [0u8; ADV_KEY_LEN];
    key[0] = (payload.mac_prefix << 6) | (mac[0] & 0x3F);
    key[1..6].copy_from_slice(&mac[1..6]);
    key[6..].copy_from_slice(&payload.middle);
    URL_SAFE_NO_PAD.encode(key)
}

/// Try every potential MAC in registry order against one decoded payload.
///
/// Short-circuits on the first rebuilt identifier the registry knows;
/// registry iteration order is the candidate-input order, so the first match
/// is deterministic for identical input. O(potential MACs) with constant
/// byte work per attempt. Returns `None` when nothing matches.
pub fn attempt_match(payload: &OfPayload, registry: &Registry) -> Option<MatchResult> {
    for (mac_str, _candidates) in registry.mac_candidates() {
        let mac = match parse_mac(mac_str) {
            Ok(mac) => mac,
            Err(err) => {
                trace!(mac = mac_str, %err, "skipping unparseable potential MAC");
                continue;
            }
        };

        let reconstructed = reconstruct_key(payload, &mac);
        if let Some(candidate) = registry.lookup_exact(&reconstructed) {
            debug!(
                device = %candidate.device_id,
                mac = mac_str,
                "reconstructed key matched a registered accessory"
            );
            return Some(MatchResult {
                candidate: candidate.clone(),
                reconstructed_key: reconstructed,
                used_mac: mac_str.to_string(),
            });
        }
    }
    None
}
