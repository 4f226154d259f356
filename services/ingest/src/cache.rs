//! Per-gateway append-only raw packet logs.
//!
//! One file per gateway mac (`:` replaced with `-`, `.cache` extension) under
//! the configured cache directory, newline-delimited hex-encoded tag records.
//! Raw history stays durable without per-packet disk I/O: the aggregator
//! flushes interval buckets here once per tick. Cache files are purged at run
//! start and stop - they are a replay buffer, not long-term storage.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use types::Mac;

pub(crate) const CACHE_EXTENSION: &str = "cache";

/// Handle on the cache directory for one ingestion run.
#[derive(Debug, Clone)]
pub struct CacheDir {
    dir: PathBuf,
}

impl CacheDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the append log for one gateway.
    pub fn log_path(&self, mac: &Mac) -> PathBuf {
        self.dir
            .join(mac.file_stem())
            .with_extension(CACHE_EXTENSION)
    }

    /// Append raw-hex lines to a gateway's log, creating it if needed.
    pub fn append(&self, mac: &Mac, lines: &[String]) -> std::io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(mac))?;
        let mut data = String::with_capacity(lines.len() * 78);
        for line in lines {
            data.push_str(line);
            data.push('\n');
        }
        file.write_all(data.as_bytes())?;
        debug!(gateway = %mac, lines = lines.len(), "flushed raw cache bucket");
        Ok(())
    }

    /// Delete every `.cache` file in the directory. Called at run start and
    /// stop so stale history never leaks across runs.
    pub fn purge(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return; // nothing cached yet
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CACHE_EXTENSION) {
                if let Err(err) = std::fs::remove_file(&path) {
                    warn!(error = %err, path = %path.display(), "failed to purge cache file");
                }
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
