//! # Device Persistence Media
//!
//! Key → bytes stores used by the local entity store and the offline queue.
//!
//! - `FileMedium`: one JSON file per key under a directory, replaced
//!   atomically on every write. Default location is the platform data dir.
//! - `MemoryMedium`: in-process map. Writes can be switched to fail and keys
//!   can be overwritten with garbage, for exercising degraded mode.

use crate::shared::error::MediumError;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Device-local key/value byte store
pub trait StorageMedium: Send + Sync + std::fmt::Debug {
    /// Bytes stored under `key`, if any
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError>;

    /// Replace the bytes stored under `key`
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError>;
}

/// Directory-backed medium
#[derive(Debug, Clone)]
pub struct FileMedium {
    root: PathBuf,
}

impl FileMedium {
    /// Open (creating if needed) a medium rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open the medium in the platform data directory
    pub fn open_default() -> Result<Self, MediumError> {
        Self::open(Self::default_root())
    }

    /// Platform-specific storage directory
    ///
    /// Uses the system's data directory when available, the temp dir otherwise.
    pub fn default_root() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("estate-sync");
        path
    }

    /// Directory holding the files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", file))
    }
}

impl StorageMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError> {
        // Write to a sibling temp file and rename over the target so a crash
        // never leaves a half-written collection behind.
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(self.path_for(key)).map_err(|e| MediumError::Io(e.error))?;
        Ok(())
    }
}

/// In-process medium
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write and remove fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store raw bytes, bypassing failure injection
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.into());
    }

    /// Raw bytes under `key`, bypassing failure injection
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl StorageMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MediumError::unavailable("reads disabled"));
        }
        Ok(self.get_raw(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MediumError::unavailable("writes disabled"));
        }
        self.insert_raw(key, bytes);
        Ok(())
    }
}
