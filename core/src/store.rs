// Detection store — session-scoped table of observed broadcast sources
//
// One record per distinct source id, replaced wholesale on every later event
// for the same source except the UI-owned expanded flag, which is merged
// forward. Cleared entirely at scan start; never persisted.

use crate::adv::decoder::OfPayload;
use crate::adv::registry::KeyCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One entry per distinct broadcast source observed during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Ephemeral per-source identifier from the BLE facility
    pub source_id: String,
    /// When the source was last seen (unix millis)
    pub last_seen_ms: u64,
    /// Signal strength in dBm, if reported
    pub rssi: Option<i32>,
    /// Raw manufacturer data as hex
    pub raw_payload_hex: Option<String>,
    /// Decoded OF payload
    pub payload: Option<OfPayload>,
    /// Rebuilt identifier when reconstruction matched
    pub reconstructed_key: Option<String>,
    /// Matched candidate when reconstruction matched
    pub matched: Option<KeyCandidate>,
    /// UI-owned details-expanded flag; survives record replacement
    pub expanded: bool,
}

impl DetectionRecord {
    /// True when this source matched one of the operator's accessories
    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }
}

/// In-memory detection table keyed by source id
#[derive(Debug, Default)]
pub struct DetectionStore {
    records: HashMap<String, DetectionRecord>,
}

impl DetectionStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Insert or replace the record for a source. The previous record's
    /// expanded flag is carried into the replacement; everything else is
    /// overwritten.
    pub fn upsert(&mut self, mut record: DetectionRecord) {
        if let Some(prior) = self.records.get(&record.source_id) {
            record.expanded = prior.expanded;
        }
        debug!(source = %record.source_id, matched = record.is_matched(), "detection upsert");
        self.records.insert(record.source_id.clone(), record);
    }

    /// Toggle only the UI-owned expanded flag. A later upsert for the same
    /// source must not clobber it.
    pub fn set_expanded(&mut self, source_id: &str, expanded: bool) {
        if let Some(record) = self.records.get_mut(source_id) {
            record.expanded = expanded;
        }
    }

    /// Snapshot of all records, most recently seen first
    pub fn all(&self) -> Vec<DetectionRecord> {
        let mut records: Vec<DetectionRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.last_seen_ms.cmp(&a.last_seen_ms));
        records
    }

    /// Number of distinct sources observed
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no sources have been observed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of sources that matched a registered accessory
    pub fn matched_count(&self) -> usize {
        self.records.values().filter(|r| r.is_matched()).count()
    }

    /// Drop everything; called at scan start
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
