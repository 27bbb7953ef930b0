use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::warn;

/// Append-only sink for timestamped session records: phase changes,
/// start/end markers, end-of-run statistics.
pub trait EventSink {
    fn record(&mut self, msg: &str);
}

/// File-backed [`EventSink`]. Each record is prefixed with a wall-clock
/// timestamp; writes are flushed immediately so a crash mid-run loses at
/// most the record being written.
pub struct SessionLog {
    out: BufWriter<File>,
}

impl SessionLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating session log {}", path.display()))?;
        let mut log = Self {
            out: BufWriter::new(file),
        };
        log.record(&format!(
            "------------- {} -------------",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        Ok(log)
    }
}

impl EventSink for SessionLog {
    fn record(&mut self, msg: &str) {
        let stamp = Local::now().format("%H:%M:%S%.3f");
        if writeln!(self.out, "{stamp}  {msg}").and_then(|_| self.out.flush()).is_err() {
            warn!("session log write failed; record dropped: {msg}");
        }
    }
}

/// Sink that discards everything; for runs without a log file.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _msg: &str) {}
}

/// Create the run's output folder. If `base` already exists, `_1`, `_2`,
/// … are appended until a free name is found, so reruns never clobber
/// earlier data.
pub fn create_out_folder(base: &Path) -> Result<PathBuf> {
    let mut target = base.to_path_buf();
    let mut n = 0u32;
    while target.exists() {
        n += 1;
        target = PathBuf::from(format!("{}_{n}", base.display()));
    }
    std::fs::create_dir_all(&target)
        .with_context(|| format!("creating output folder {}", target.display()))?;
    Ok(target)
}

/// Persist the per-frame durations (seconds) as a JSON array.
pub fn write_frame_durations(path: &Path, durations: &[f64]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating frame-duration file {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), durations)
        .with_context(|| format!("writing frame durations to {}", path.display()))?;
    Ok(())
}
