//! Repository trait for the durable record store.
//!
//! The trait is the seam between the domain and the filesystem-backed
//! implementation; services receive it injected rather than reaching into
//! process-global state, so the cross-process sharing model stays visible
//! and testable.

use crate::error::Result;
use crate::record::SessionRecord;
use std::fs::File;
use std::path::PathBuf;

/// A record as returned by [`RecordRepository::load`].
///
/// `migrated` is set when the on-disk shape was older than the current
/// schema; the caller is expected to persist the upgraded record once so
/// the migration does not repeat on every read.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub record: SessionRecord,
    pub migrated: bool,
}

/// Guard for a per-session advisory lock, held for the duration of a
/// read-modify-write cycle. Dropping the guard releases the lock.
pub struct RecordLock {
    _file: Option<File>,
    lock_path: Option<PathBuf>,
}

impl RecordLock {
    /// A held filesystem lock. The file handle keeps the OS lock alive;
    /// the lock file itself is removed best-effort on drop.
    pub fn held(file: File, lock_path: PathBuf) -> Self {
        Self {
            _file: Some(file),
            lock_path: Some(lock_path),
        }
    }

    /// A no-op guard, for repositories without cross-process visibility
    /// (in-memory test doubles).
    pub fn noop() -> Self {
        Self {
            _file: None,
            lock_path: None,
        }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        // Unlock is automatic when the file handle is dropped
        if let Some(path) = self.lock_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Durable store of one serialized record per opaque session key.
///
/// Implementations must treat corrupt or unreadable records as absent
/// (logged, never raised) and must not return from `save` before the
/// write has been forced through to physical storage.
pub trait RecordRepository: Send + Sync {
    /// Loads the record for `key`, or `None` when absent or unreadable.
    fn load(&self, key: &str) -> Result<Option<LoadedRecord>>;

    /// Serializes and durably persists the full record (flush + fsync).
    fn save(&self, key: &str, record: &SessionRecord) -> Result<()>;

    /// Removes the durable record. Absent records are not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// All session keys currently present in the store's namespace.
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Takes the per-session advisory lock for a read-modify-write cycle.
    fn lock(&self, key: &str) -> Result<RecordLock>;
}
