//! Durable storage for the sync cursor

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Persists the server timestamp of the last successful round.
pub trait CursorStore: Send + Sync {
    /// Last saved cursor, 0 when nothing has been synced yet
    fn load(&self) -> Result<i64>;

    /// Durably record a new cursor
    fn save(&self, cursor: i64) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorFile {
    last_sync_timestamp: i64,
}

/// Cursor kept in a small JSON file next to the local store.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<i64> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        // Starting over from 0 only costs a full re-download
        match serde_json::from_str::<CursorFile>(&raw) {
            Ok(file) if file.last_sync_timestamp >= 0 => Ok(file.last_sync_timestamp),
            Ok(_) | Err(_) => {
                tracing::warn!(
                    "Ignoring unreadable sync cursor at {}",
                    self.path.display()
                );
                Ok(0)
            }
        }
    }

    fn save(&self, cursor: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec_pretty(&CursorFile {
            last_sync_timestamp: cursor,
        })?;
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, payload)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-process cursor, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: AtomicI64,
}

impl MemoryCursorStore {
    pub const fn new(cursor: i64) -> Self {
        Self {
            cursor: AtomicI64::new(cursor),
        }
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<i64> {
        Ok(self.cursor.load(Ordering::SeqCst))
    }

    fn save(&self, cursor: i64) -> Result<()> {
        self.cursor.store(cursor, Ordering::SeqCst);
        Ok(())
    }
}
