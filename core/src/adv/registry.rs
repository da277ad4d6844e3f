/// Key registry — indexes the operator's known accessory key material
///
/// Built once per scan session from an externally supplied candidate list and
/// read-only for the session's duration. Provides O(1) exact lookup by
/// advertised key id and insertion-ordered enumeration of potential MACs so
/// that reconstruction's first match is deterministic for identical input.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Length of a full advertised identifier in bytes
pub const ADV_KEY_LEN: usize = 28;

/// Kind of key material a candidate carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Primary rotating key
    #[serde(rename = "PRIMARY")]
    Primary,
    /// Secondary (backup) rotating key
    #[serde(rename = "SECONDARY", alias = "BACKUP")]
    Secondary,
    /// Key loaded from a static key file, not time-rotated
    #[serde(rename = "STATIC_KEYS_FILE", alias = "STATIC")]
    Static,
}

/// One known accessory's identifying material, supplied once per scan start.
/// Field names on the wire match the candidate-key endpoint's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCandidate {
    /// Advertised key id — unpadded URL-safe base64 of the 28-byte identifier
    #[serde(rename = "adv_key_b64")]
    pub adv_key_b64: String,
    /// Owning device identifier
    #[serde(rename = "device_id")]
    pub device_id: String,
    /// Display name of the owning device
    #[serde(rename = "name")]
    pub name: String,
    /// Key kind
    #[serde(rename = "key_type")]
    pub key_kind: KeyKind,
    /// Link-layer address this key may advertise from, "AA:BB:.." form
    #[serde(rename = "potential_mac")]
    pub potential_mac: Option<String>,
}

/// Derive the locally-administered MAC address associated with a 28-byte
/// advertisement key: first key octet with the top two bits forced on,
/// followed by key octets 1..6. Returns `None` if the key is not a valid
/// unpadded URL-safe base64 encoding of exactly 28 bytes.
pub fn potential_mac_for_key(adv_key_b64: &str) -> Option<String> {
    let key = URL_SAFE_NO_PAD.decode(adv_key_b64).ok()?;
    if key.len() != ADV_KEY_LEN {
        return None;
    }
    let mut mac = [0u8; 6];
    mac[0] = key[0] | 0b1100_0000;
    mac[1..6].copy_from_slice(&key[1..6]);
    Some(
        mac.iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// Session-scoped index over the operator's key candidates
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Exact lookup: advertised key id -> candidate
    by_key: HashMap<String, KeyCandidate>,
    /// Multimap: potential MAC -> candidates sharing that MAC
    by_mac: HashMap<String, Vec<KeyCandidate>>,
    /// Potential MACs in first-insertion order (deterministic iteration)
    mac_order: Vec<String>,
}

impl Registry {
    /// Build the registry from a candidate list. Later duplicates of the
    /// same advertised key id win for exact lookup; MAC grouping preserves
    /// the order candidates were supplied in.
    pub fn build(candidates: Vec<KeyCandidate>) -> Self {
        let mut registry = Registry::default();
        for candidate in candidates {
            if let Some(mac) = candidate.potential_mac.clone() {
                if !registry.by_mac.contains_key(&mac) {
                    registry.mac_order.push(mac.clone());
                }
                registry
                    .by_mac
                    .entry(mac)
                    .or_default()
                    .push(candidate.clone());
            }
            registry
                .by_key
                .insert(candidate.adv_key_b64.clone(), candidate);
        }
        debug!(
            keys = registry.by_key.len(),
            macs = registry.mac_order.len(),
            "built key registry"
        );
        registry
    }

    /// Exact lookup by advertised key id
    pub fn lookup_exact(&self, adv_key_b64: &str) -> Option<&KeyCandidate> {
        self.by_key.get(adv_key_b64)
    }

    /// Iterate `(mac, candidates)` pairs in first-insertion order
    pub fn mac_candidates(&self) -> impl Iterator<Item = (&str, &[KeyCandidate])> + '_ {
        self.mac_order.iter().filter_map(move |mac| {
            self.by_mac
                .get(mac)
                .map(|list| (mac.as_str(), list.as_slice()))
        })
    }

    /// Number of distinct advertised key ids
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Number of distinct potential MACs
    pub fn mac_count(&self) -> usize {
        self.mac_order.len()
    }

    /// True when the registry can never produce a match — no keys and no
    /// MACs. A scan against such a registry wastes the radio budget and is
    /// refused up front by the session controller.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty() && self.by_mac.is_empty()
    }
}
