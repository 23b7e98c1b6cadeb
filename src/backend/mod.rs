//! Module implement the persistent backend collaborator.
//!
//! The core database is in-memory; durability comes from archiving the
//! entire database into a [Backend] and loading it back at startup,
//! refer [Mdb::snapshot][crate::Mdb::snapshot] and
//! [Mdb::load][crate::Mdb::load]. The backend stores, per snapshot
//! revision, the set of `(key, encoded-blocks)` entries; its internal
//! layout is its own business. [Disk] is the bundled file-based
//! implementation.

use std::ffi;

mod disk;

pub use disk::Disk;

use crate::Result;

/// Default limit on entries buffered by a backend batch before flushing.
pub const BATCH_ENTRIES_LIMIT: usize = 1024;
/// Default limit on bytes buffered by a backend batch before flushing.
pub const BATCH_BYTES_LIMIT: usize = 1024 * 1024;

/// Backend represents a persistent key/value store archiving whole
/// database snapshots. Writes go through a [BackendBatch] obtained from
/// [batch][Backend::batch]; concurrent batches are serialized by the
/// backend.
pub trait Backend {
    type Batch: BackendBatch;

    /// Return the highest revision previously snapshotted, ZERO when
    /// the backend is empty.
    fn last_revision(&self) -> Result<u64>;

    /// Iterate over the records stored for the snapshot marked with
    /// `rev`, in key order. Iteration aborts on visitor error.
    fn range<F>(&self, rev: u64, visitor: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;

    /// Start a new write batch for the snapshot marked with `rev`.
    fn batch(&self, rev: u64) -> Result<Self::Batch>;
}

/// A write handle into one backend snapshot.
pub trait BackendBatch {
    /// Buffer one entry; the handle flushes at its configured
    /// granularity.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Flush buffered entries and persist the snapshot atomically.
    fn close(self) -> Result<()>;

    /// Discard the batch; nothing of it shall be visible afterwards.
    fn rollback(self) -> Result<()>;
}

/// Configuration for the [Disk] backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Uniquely name backend instances, part of the archive file names.
    pub name: String,
    /// Directory in which archive files are stored.
    pub dir: ffi::OsString,
    /// Number of entries a batch buffers before flushing to the file.
    pub max_batch_entries: usize,
    /// Number of bytes a batch buffers before flushing to the file.
    pub max_batch_bytes: usize,
    /// Enable fsync while closing a batch.
    pub fsync: bool,
}

impl Config {
    pub fn new(dir: &ffi::OsStr, name: &str) -> Config {
        Config {
            name: name.to_string(),
            dir: dir.to_os_string(),
            max_batch_entries: BATCH_ENTRIES_LIMIT,
            max_batch_bytes: BATCH_BYTES_LIMIT,
            fsync: true,
        }
    }

    pub fn set_max_batch_entries(&mut self, max_batch_entries: usize) -> &mut Self {
        self.max_batch_entries = max_batch_entries;
        self
    }

    pub fn set_max_batch_bytes(&mut self, max_batch_bytes: usize) -> &mut Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }
}
