// Replay collaborators — file-backed stand-ins for the live host interfaces
//
// The engine consumes a BLE facility and a candidate-key source as injected
// traits. For offline analysis the CLI replays a recorded advertisement
// capture through a facility implementation and loads candidates from the
// JSON the dashboard backend serves.
//
// Capture format, one advertisement per line:
//     <source-id> <rssi|-> <manufacturer-data-hex>
// Blank lines and lines starting with '#' are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ofscan_core::{
    now_ms, AdvertisementEvent, BleFacility, CandidateSource, FacilityError, KeyCandidate,
    ScanFilter, ScanHandle, SourceError,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// One parsed capture line
#[derive(Debug, Clone)]
pub struct CaptureLine {
    pub source_id: String,
    pub rssi: Option<i32>,
    pub data: Vec<u8>,
}

/// Parse a capture file into advertisement lines
pub fn parse_capture(path: &Path) -> Result<Vec<CaptureLine>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading capture file {}", path.display()))?;

    let mut lines = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(source_id), Some(rssi), Some(data_hex)) =
            (fields.next(), fields.next(), fields.next())
        else {
            bail!("capture line {}: expected '<source> <rssi> <hex>'", lineno + 1);
        };
        let rssi = match rssi {
            "-" => None,
            value => Some(
                value
                    .parse::<i32>()
                    .with_context(|| format!("capture line {}: bad rssi '{}'", lineno + 1, value))?,
            ),
        };
        let data = hex::decode(data_hex)
            .with_context(|| format!("capture line {}: bad hex payload", lineno + 1))?;
        lines.push(CaptureLine {
            source_id: source_id.to_string(),
            rssi,
            data,
        });
    }
    Ok(lines)
}

/// BLE facility that replays a capture over the advertisement channel at a
/// fixed cadence, closing the stream at end of file.
pub struct ReplayFacility {
    lines: Vec<CaptureLine>,
    interval: Duration,
}

impl ReplayFacility {
    pub fn new(lines: Vec<CaptureLine>, interval: Duration) -> Self {
        Self { lines, interval }
    }
}

struct ReplayHandle;

impl ScanHandle for ReplayHandle {
    fn stop(&mut self) {
        // Nothing to unsubscribe; the replay task ends with the channel
    }
}

#[async_trait]
impl BleFacility for ReplayFacility {
    async fn request_scan(
        &self,
        filter: ScanFilter,
    ) -> Result<(Box<dyn ScanHandle>, mpsc::Receiver<AdvertisementEvent>), FacilityError> {
        let (tx, rx) = mpsc::channel(32);
        let lines = self.lines.clone();
        let interval = self.interval;
        let vendor_id = filter.vendor_id;

        tokio::spawn(async move {
            for line in lines {
                let event = AdvertisementEvent {
                    source_id: line.source_id,
                    vendor_data: HashMap::from([(vendor_id, line.data)]),
                    rssi: line.rssi,
                    timestamp_ms: now_ms(),
                };
                if tx.send(event).await.is_err() {
                    // Session ended before the capture ran out
                    return;
                }
                tokio::time::sleep(interval).await;
            }
            debug!("capture replay finished");
        });

        Ok((Box::new(ReplayHandle), rx))
    }
}

/// Candidate-key file in the backend's response shape:
/// `{ "keys_and_macs": [ ... ] }`. A bare JSON array is also accepted.
#[derive(Deserialize)]
struct KeyFile {
    keys_and_macs: Vec<KeyCandidate>,
}

/// Load candidates from a key file
pub fn load_candidates(path: &Path) -> Result<Vec<KeyCandidate>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading key file {}", path.display()))?;
    if let Ok(file) = serde_json::from_str::<KeyFile>(&text) {
        return Ok(file.keys_and_macs);
    }
    serde_json::from_str::<Vec<KeyCandidate>>(&text)
        .with_context(|| format!("parsing key file {}", path.display()))
}

/// Candidate source backed by a key file, re-read on every fetch so a
/// refreshed file is picked up by the next scan.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CandidateSource for FileSource {
    async fn fetch(&self) -> Result<Vec<KeyCandidate>, SourceError> {
        load_candidates(&self.path).map_err(|e| SourceError(e.to_string()))
    }
}
