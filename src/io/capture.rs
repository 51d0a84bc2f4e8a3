//! Raw datagram capture - JSONL diagnostic log of everything the sensor sends
//!
//! Writes `<dir>/udp/frames-YYYYMMDD.jsonl`, rotated at midnight UTC.
//! Each record: ts_recv, src, site, peer, payload_raw (hex), fields (decoded
//! frame, or null plus an error for malformed datagrams).

use crate::domain::types::SensorFrame;
use crate::io::frame::FrameError;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SUBDIR: &str = "udp";
const NAME_BASE: &str = "frames";

#[derive(Debug, Serialize)]
pub struct CaptureRecord<'a> {
    pub ts_recv: &'a str,
    pub src: &'a str,
    pub site: &'a str,
    pub peer: String,
    pub payload_raw: String,
    pub fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CaptureLogger {
    log_dir: PathBuf,
    site_id: String,
    writer: Option<BufWriter<File>>,
    /// YYYYMMDD of the open file
    current_date: String,
}

impl CaptureLogger {
    pub fn new(log_dir: impl AsRef<Path>, site_id: impl Into<String>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        let site_id = site_id.into();
        info!(log_dir = %log_dir.display(), site_id = %site_id, "capture_logger_initialized");
        Self { log_dir, site_id, writer: None, current_date: Utc::now().format("%Y%m%d").to_string() }
    }

    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        let now_date = Utc::now().format("%Y%m%d").to_string();
        if now_date != self.current_date {
            info!(old_date = %self.current_date, new_date = %now_date, "date_rotation_detected");
            self.writer = None;
            self.current_date = now_date;
        }

        if self.writer.is_none() {
            let dir_path = self.log_dir.join(SUBDIR);
            fs::create_dir_all(&dir_path)?;
            let file_path = dir_path.join(format!("{}-{}.jsonl", NAME_BASE, self.current_date));
            let file = OpenOptions::new().create(true).append(true).open(&file_path)?;
            info!(path = %file_path.display(), "opened_log_file");
            self.writer = Some(BufWriter::new(file));
        }

        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "capture writer missing"))
    }

    /// Log one datagram with its decode outcome
    ///
    /// IO failures are logged and swallowed; capture never interrupts ingestion.
    pub fn log_datagram(
        &mut self,
        peer: SocketAddr,
        payload: &[u8],
        decoded: Result<&SensorFrame, &FrameError>,
    ) {
        let ts_recv = Utc::now().to_rfc3339();
        let (fields, error) = match decoded {
            Ok(frame) => (
                Some(json!({
                    "area": frame.area,
                    "right_align": frame.right_align,
                    "left_align": frame.left_align,
                    "profile_count": frame.profile_count,
                    "pulse_count": frame.pulse_count,
                    "distance": frame.distance,
                })),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };

        let record = CaptureRecord {
            ts_recv: &ts_recv,
            src: "udp",
            site: &self.site_id,
            peer: peer.to_string(),
            payload_raw: hex::encode(payload),
            fields,
            error,
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "capture_serialize_failed");
                return;
            }
        };

        let result = self.writer().and_then(|w| {
            writeln!(w, "{}", line)?;
            w.flush()
        });
        match result {
            Ok(()) => debug!(peer = %peer, bytes = payload.len(), "datagram_captured"),
            Err(e) => warn!(error = %e, "capture_write_failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::frame::{decode_frame, encode_frame};
    use tempfile::tempdir;

    fn peer() -> SocketAddr {
        "192.168.0.10:50000".parse().unwrap()
    }

    fn read_single_file(dir: &Path) -> Vec<serde_json::Value> {
        let udp_dir = dir.join("udp");
        let entries: Vec<_> = fs::read_dir(&udp_dir).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(entries.len(), 1, "should have one capture file");
        let name = entries[0].file_name().to_string_lossy().to_string();
        assert!(name.starts_with("frames-") && name.ends_with(".jsonl"));
        fs::read_to_string(entries[0].path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_capture_decoded_frame() {
        let dir = tempdir().unwrap();
        let mut logger = CaptureLogger::new(dir.path(), "belt-1");

        let frame = SensorFrame {
            area: 120.0,
            right_align: 10.0,
            left_align: 8.0,
            profile_count: 3,
            pulse_count: 1000,
            distance: 50.0,
        };
        let bytes = encode_frame(&frame);
        let decoded = decode_frame(&bytes);
        logger.log_datagram(peer(), &bytes, decoded.as_ref());

        let records = read_single_file(dir.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["src"], "udp");
        assert_eq!(records[0]["site"], "belt-1");
        assert_eq!(records[0]["peer"], "192.168.0.10:50000");
        assert_eq!(records[0]["payload_raw"], hex::encode(&bytes[..]));
        assert_eq!(records[0]["fields"]["pulse_count"], 1000);
        assert!(records[0].get("error").is_none());
    }

    #[test]
    fn test_capture_malformed_datagram() {
        let dir = tempdir().unwrap();
        let mut logger = CaptureLogger::new(dir.path(), "belt-1");

        let payload = [0xde, 0xad];
        let decoded = decode_frame(&payload);
        logger.log_datagram(peer(), &payload, decoded.as_ref());
        logger.log_datagram(peer(), &payload, decoded.as_ref());

        let records = read_single_file(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["payload_raw"], "dead");
        assert!(records[0]["fields"].is_null());
        assert!(records[0]["error"].as_str().unwrap().contains("2 bytes"));
    }
}
