//! Append-only pending-signal store.
//!
//! The only place near-instant producer hooks touch the system: one
//! marker per line, no parsing, no network. Consumption swaps the file
//! away with an atomic rename before reading, so an append racing a
//! consumption either lands in the swapped file (and is returned now)
//! or starts a fresh file (and is returned next time). A marker is
//! never read twice and never dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use errors::SignalError;
use tracing::{debug, warn};

const CONSUMING_SUFFIX: &str = ".consuming";

pub struct PendingSignalStore {
    path: PathBuf,
    /// Serializes consumers within this process so one cannot recover
    /// a swap file another is still draining.
    consume_lock: std::sync::Mutex<()>,
}

impl PendingSignalStore {
    /// `path` is the signal file for one producer scope; the parent
    /// directory is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consume_lock: std::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// O(1) fire-and-forget append. Safe to call while a consumption is
    /// in flight.
    pub fn append(&self, marker: &str) -> Result<(), SignalError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SignalError::Append {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SignalError::Append {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        writeln!(file, "{}", marker.trim()).map_err(|e| SignalError::Append {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Atomically take every pending marker.
    ///
    /// Implemented as rename-to-temp then read-and-discard, never a
    /// read-then-truncate pair (which loses appends that land between
    /// the read and the truncate). Swap files orphaned by a crashed
    /// consumer are recovered first.
    pub fn consume_all(&self) -> Result<Vec<String>, SignalError> {
        let _guard = self
            .consume_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut markers = self.recover_orphaned()?;

        let swap = self.path.with_file_name(format!(
            "{}{}.{}",
            self.file_name(),
            CONSUMING_SUFFIX,
            uuid::Uuid::new_v4()
        ));

        match fs::rename(&self.path, &swap) {
            Ok(()) => {
                markers.extend(Self::drain_file(&swap)?);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SignalError::Consume {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        debug!(path = %self.path.display(), count = markers.len(), "Consumed pending signals");
        Ok(markers)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "signals".to_string())
    }

    /// Read one swap file, delete it, and return its markers.
    fn drain_file(path: &Path) -> Result<Vec<String>, SignalError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            // Another consumer got here first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SignalError::Consume {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove consumed signal file");
        }

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// A crash between rename and read leaves a swap file behind; fold
    /// its markers into the next consumption so nothing is lost.
    fn recover_orphaned(&self) -> Result<Vec<String>, SignalError> {
        let Some(parent) = self.path.parent() else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}{}", self.file_name(), CONSUMING_SUFFIX);

        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SignalError::Consume {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut markers = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                warn!(file = %name, "Recovering orphaned signal swap file");
                markers.extend(Self::drain_file(&entry.path())?);
            }
        }
        Ok(markers)
    }
}
