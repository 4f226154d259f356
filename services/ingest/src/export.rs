//! CSV export over aggregate and on-disk state.
//!
//! Two pure-read modes, no network side effects:
//!
//! - **Merged**: one row per tag's current aggregate record, plus a computed
//!   packet-loss percentage against the configured expected rate.
//! - **Raw**: replay every line of the gateway's on-disk cache log, re-decode
//!   each as a tag record, and emit one unmerged row per raw packet. Full
//!   packet-level history, at the cost of re-parsing the log.
//!
//! Rows are appended as they are produced; a failed export leaves the rows
//! already written. Callers wanting atomicity write to a temp path and rename.

use crate::cache::CacheDir;
use chrono::{Local, TimeZone};
use codec::TagRecord;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use types::{loss_percentage, GatewayRecord, Mac, TagReading, TimestampMs};

/// Export failures, surfaced directly to the export caller.
#[derive(Debug, Error)]
pub enum ExportError {
    /// No aggregate record exists for the requested gateway mac
    #[error("unknown gateway mac: {mac}")]
    UnknownGateway { mac: Mac },

    /// Raw mode needs the gateway's cache log, which does not exist
    #[error("missing cache file: {path}")]
    MissingCache { path: PathBuf },

    /// Filesystem failure while writing rows
    #[error("export i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Which of the two export modes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Merged,
    Raw,
}

/// Parameters for one export call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub gateway_mac: Mac,
    pub mode: ExportMode,
    /// Substring filter over tag mac text form; empty matches everything.
    pub mac_filter: String,
    /// Directory the `<gateway-mac>.csv` file is written into.
    pub destination: PathBuf,
    /// Configured per-tag send rate, events/sec, for the loss column.
    pub expected_rate: u32,
}

const MERGED_HEADER: &str = "Mac,Voltage,Tamper,Button,Shock,HeartRate,BloodPressureLow,\
BloodPressureHigh,BloodOxygen,BodyTemperature,StepCount,SleepState,DeepSleepMinutes,\
LightSleepMinutes,Rssi,FirstTime,LastTime,Loss\n";

const RAW_HEADER: &str = "Mac,Voltage,Tamper,Button,Shock,HeartRate,BloodPressureLow,\
BloodPressureHigh,BloodOxygen,BodyTemperature,StepCount,SleepState,DeepSleepMinutes,\
LightSleepMinutes,Rssi,UpdateTime,RawData\n";

/// Merged mode: current aggregate records with loss percentage.
pub fn export_merged(
    gateway: &GatewayRecord,
    options: &ExportOptions,
    elapsed_ms: u64,
) -> Result<PathBuf, ExportError> {
    let path = csv_path(&options.destination, &gateway.mac);
    let mut file = open_csv(&path)?;
    file.write_all(MERGED_HEADER.as_bytes())?;
    let mut rows = 0usize;
    for tag in gateway.tags() {
        if !tag.mac.to_string().contains(&options.mac_filter) {
            continue;
        }
        let mut row = sensor_columns(tag);
        let loss = loss_percentage(tag.packet_count, options.expected_rate, elapsed_ms);
        let _ = write!(
            row,
            "{},{},{:.2}%\n",
            fmt_time(tag.first_time),
            fmt_time(Some(tag.last_time)),
            loss
        );
        file.write_all(row.as_bytes())?;
        rows += 1;
    }
    info!(gateway = %gateway.mac, rows, path = %path.display(), "merged export written");
    Ok(path)
}

/// Raw mode: replay the gateway's cache log, one unmerged row per packet.
pub fn export_raw(
    gateway_mac: Mac,
    cache: &CacheDir,
    options: &ExportOptions,
    now: TimestampMs,
) -> Result<PathBuf, ExportError> {
    let log_path = cache.log_path(&gateway_mac);
    if !log_path.exists() {
        return Err(ExportError::MissingCache { path: log_path });
    }
    let content = std::fs::read_to_string(&log_path)?;

    let path = csv_path(&options.destination, &gateway_mac);
    let mut file = open_csv(&path)?;
    file.write_all(RAW_HEADER.as_bytes())?;
    let mut rows = 0usize;
    for line in content.lines().filter(|l| !l.is_empty()) {
        let Some(reading) = replay_line(line, gateway_mac, now) else {
            debug!(line, "skipping unreplayable cache line");
            continue;
        };
        if !reading.mac.to_string().contains(&options.mac_filter) {
            continue;
        }
        let mut row = sensor_columns(&reading);
        let _ = write!(
            row,
            "{},{}\n",
            fmt_time(Some(reading.last_time)),
            reading.raw_data
        );
        file.write_all(row.as_bytes())?;
        rows += 1;
    }
    info!(gateway = %gateway_mac, rows, path = %path.display(), "raw export written");
    Ok(path)
}

/// Re-derive a per-packet reading from one hex log line.
fn replay_line(line: &str, gateway_mac: Mac, now: TimestampMs) -> Option<TagReading> {
    let bytes = hex::decode(line.trim()).ok()?;
    let record = TagRecord::decode(&bytes).ok()?;
    Some(record.to_reading(gateway_mac, now))
}

fn csv_path(destination: &Path, gateway_mac: &Mac) -> PathBuf {
    destination.join(gateway_mac.file_stem()).with_extension("csv")
}

fn open_csv(path: &Path) -> Result<std::fs::File, ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// The sensor column prefix shared by both modes, trailing comma included.
fn sensor_columns(tag: &TagReading) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},",
        tag.mac,
        opt(tag.voltage),
        opt(tag.tamper),
        opt(tag.button),
        opt(tag.shock),
        opt(tag.heart_rate),
        opt(tag.blood_pressure_low),
        opt(tag.blood_pressure_high),
        opt(tag.blood_oxygen),
        opt(tag.body_temperature),
        opt(tag.step_count),
        opt(tag.sleep_state),
        opt(tag.deep_sleep_minutes),
        opt(tag.light_sleep_minutes),
        opt(tag.rssi),
    )
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_time(ts: Option<TimestampMs>) -> String {
    let Some(ts) = ts else {
        return String::new();
    };
    match Local.timestamp_millis_opt(ts as i64) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{IotBoxPayload, TagPayload, ADV_TYPE_MARKER, MANUFACTURER_IOTBOX};

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0x01, 0, 0, 0, last])
    }

    fn options(dest: &Path, mode: ExportMode) -> ExportOptions {
        ExportOptions {
            gateway_mac: mac(0),
            mode,
            mac_filter: String::new(),
            destination: dest.to_path_buf(),
            expected_rate: 10,
        }
    }

    fn record(last: u8) -> TagRecord {
        TagRecord {
            mac: mac(last),
            declared_length: 0x1E,
            adv_type: ADV_TYPE_MARKER,
            manufacturer_id: MANUFACTURER_IOTBOX,
            payload: TagPayload::IotBox(IotBoxPayload {
                package_id: 0x04,
                command: 0x0A,
                user_data: [70 + last, 120, 80],
                crc: 0,
                reserved: [0; 20],
            }),
            rssi: -60,
        }
    }

    #[test]
    fn test_merged_export_rows_and_loss() {
        let tmp = tempfile::tempdir().unwrap();
        let mut gateway = GatewayRecord::new(mac(0), 0);
        for _ in 0..90 {
            gateway.merge_reading(record(1).to_reading(mac(0), 5), 5);
        }
        let options = options(tmp.path(), ExportMode::Merged);

        // rate 10 over 10s -> expected 100, 90 seen -> 10.00% loss
        let path = export_merged(&gateway, &options, 10_000).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("Mac,Voltage"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("02:01:00:00:00:01,"));
        assert!(row.contains(",71,")); // heart rate from user_data[0]
        assert!(row.ends_with("10.00%"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_merged_export_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let mut gateway = GatewayRecord::new(mac(0), 0);
        gateway.merge_reading(record(1).to_reading(mac(0), 5), 5);
        gateway.merge_reading(record(2).to_reading(mac(0), 5), 5);
        let mut options = options(tmp.path(), ExportMode::Merged);
        options.mac_filter = "00:02".to_string();

        let path = export_merged(&gateway, &options, 1000).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2); // header + one matching row
        assert!(content.contains("02:01:00:00:00:02"));
    }

    #[test]
    fn test_raw_export_replays_each_line() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(tmp.path().join("cache"));
        let lines: Vec<String> = (0..3).map(|_| hex::encode(record(1).encode())).collect();
        cache.append(&mac(0), &lines).unwrap();
        let options = options(tmp.path(), ExportMode::Raw);

        let path = export_raw(mac(0), &cache, &options, 1000).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        // header + one row per raw packet, not merged
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains(&lines[0]));
    }

    #[test]
    fn test_raw_export_missing_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(tmp.path().join("cache"));
        let options = options(tmp.path(), ExportMode::Raw);
        assert!(matches!(
            export_raw(mac(0), &cache, &options, 0),
            Err(ExportError::MissingCache { .. })
        ));
    }

    #[test]
    fn test_raw_export_skips_garbage_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(tmp.path().join("cache"));
        let good = hex::encode(record(1).encode());
        cache
            .append(&mac(0), &["zz-not-hex".to_string(), good.clone(), "aabb".to_string()])
            .unwrap();
        let options = options(tmp.path(), ExportMode::Raw);

        let path = export_raw(mac(0), &cache, &options, 0).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2); // header + the one good line
    }
}
