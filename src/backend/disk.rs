//! Module implement [Disk], the bundled file-based backend.

use cbordata::Cborize;
use fs2::FileExt;
use log::info;

use std::{
    convert::TryFrom,
    ffi, fs,
    io::{Read, Write},
    path, thread, time,
};

use crate::{
    backend::{Backend, BackendBatch, Config},
    binary,
    util::{from_cbor_bytes, into_cbor_bytes},
    Error, Result,
};

const SNAP_META_VER: u32 = 0x000B0001;

// Interval while polling for the directory lock.
const LOCK_POLL_INTERVAL: time::Duration = time::Duration::from_millis(10);

// Meta block at the head of every archive file.
#[derive(Clone, Debug, Eq, PartialEq, Cborize)]
struct SnapMeta {
    // 8-byte big-endian rendering of the snapshot's current revision,
    // the bucket key of this snapshot.
    marker: Vec<u8>,
}

impl SnapMeta {
    const ID: u32 = SNAP_META_VER;

    fn new(rev: u64) -> SnapMeta {
        SnapMeta {
            marker: rev.to_be_bytes().to_vec(),
        }
    }

    fn to_rev(&self) -> Result<u64> {
        let bytes = <[u8; 8]>::try_from(self.marker.as_slice());
        Ok(u64::from_be_bytes(err_at!(DecodeFail, bytes)?))
    }
}

// dir/{name}-snap-{rev:016x}.dat
fn make_filename(name: &str, rev: u64) -> ffi::OsString {
    let file = format!("{}-snap-{:016x}.dat", name, rev);
    let file: &ffi::OsStr = file.as_ref();
    file.to_os_string()
}

fn unwrap_filename(name: &str, file: &ffi::OsStr) -> Option<u64> {
    let stem = path::Path::new(file).file_name()?.to_str()?;
    let stem = stem.strip_suffix(".dat")?;
    let prefix = format!("{}-snap-", name);
    let hex = stem.strip_prefix(prefix.as_str())?;
    if hex.len() != 16 {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// Disk type, a file-based [Backend].
///
/// Every snapshot lives in its own archive file under the configured
/// directory, named `{name}-snap-{rev:016x}.dat`, a cbor meta block
/// followed by length-prefixed `(key, value)` entries in key order.
/// Opening a Disk takes an exclusive advisory lock on the directory;
/// the lock is released when the value is dropped.
pub struct Disk {
    config: Config,
    _lock_file: fs::File, // exclusive lock held for the Disk's lifetime
}

impl Disk {
    /// Open, creating it if required, a backend under `config.dir`.
    /// `timeout` is the amount of time to wait to obtain the directory
    /// lock; none waits indefinitely.
    pub fn open(config: Config, timeout: Option<time::Duration>) -> Result<Disk> {
        err_at!(IOError, fs::create_dir_all(&config.dir))?;

        let lock_path: path::PathBuf = {
            let file = format!("{}.lock", config.name);
            [config.dir.clone(), ffi::OsString::from(file)].iter().collect()
        };
        let lock_file = {
            let mut opts = fs::OpenOptions::new();
            err_at!(IOError, opts.create(true).write(true).open(&lock_path))?
        };

        let start = time::Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(_) => break,
                Err(_) => match timeout {
                    Some(timeout) if start.elapsed() >= timeout => {
                        return err_at!(
                            IOError, msg: "lock timeout on {:?}", lock_path
                        );
                    }
                    Some(_) | None => thread::sleep(LOCK_POLL_INTERVAL),
                },
            }
        }

        info!(
            target: "mvdb",
            "{:?} backend opened under {:?}", config.name, config.dir
        );

        Ok(Disk {
            config,
            _lock_file: lock_file,
        })
    }

    fn to_file_path(&self, rev: u64) -> path::PathBuf {
        let file = make_filename(&self.config.name, rev);
        [self.config.dir.clone(), file].iter().collect()
    }
}

impl Backend for Disk {
    type Batch = DiskBatch;

    fn last_revision(&self) -> Result<u64> {
        let mut last = 0;
        for item in err_at!(IOError, fs::read_dir(&self.config.dir))? {
            let file_name = err_at!(IOError, item)?.file_name();
            if let Some(rev) = unwrap_filename(&self.config.name, &file_name) {
                last = last.max(rev);
            }
        }
        Ok(last)
    }

    fn range<F>(&self, rev: u64, mut visitor: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let file_path = self.to_file_path(rev);
        if rev == 0 && !file_path.exists() {
            return Ok(()); // empty backend
        }

        let data = {
            let mut file = {
                let mut opts = fs::OpenOptions::new();
                err_at!(IOError, opts.read(true).open(&file_path))?
            };
            let mut data = vec![];
            err_at!(IOError, file.read_to_end(&mut data))?;
            data
        };

        let (meta, n) = from_cbor_bytes::<SnapMeta>(&data)?;
        if meta.to_rev()? != rev {
            return err_at!(
                InvalidFile, msg: "revision marker mismatch in {:?}", file_path
            );
        }

        let mut buf = &data[n..];
        while !buf.is_empty() {
            let klen = usize::try_from(binary::take_uvarint(&mut buf)?);
            let klen = err_at!(FailConvert, klen)?;
            if buf.len() < klen {
                return err_at!(DecodeFail, msg: "truncated key in {:?}", file_path);
            }
            let key = &buf[..klen];
            buf = &buf[klen..];

            let vlen = usize::try_from(binary::take_uvarint(&mut buf)?);
            let vlen = err_at!(FailConvert, vlen)?;
            if buf.len() < vlen {
                return err_at!(DecodeFail, msg: "truncated value in {:?}", file_path);
            }
            let value = &buf[..vlen];
            buf = &buf[vlen..];

            visitor(key, value)?;
        }

        Ok(())
    }

    fn batch(&self, rev: u64) -> Result<DiskBatch> {
        let file_path = self.to_file_path(rev);
        let tmp_path = {
            let mut tmp = file_path.clone().into_os_string();
            tmp.push(".tmp");
            path::PathBuf::from(tmp)
        };

        // a leftover working file means a concurrent batch for this
        // revision, or an earlier crash; either way start clean.
        fs::remove_file(&tmp_path).ok();

        let mut file = {
            let mut opts = fs::OpenOptions::new();
            err_at!(IOError, opts.write(true).create_new(true).open(&tmp_path))?
        };

        let meta = into_cbor_bytes(SnapMeta::new(rev))?;
        err_at!(IOError, file.write_all(&meta))?;

        Ok(DiskBatch {
            file: Some(file),
            tmp_path,
            file_path,
            buf: Vec::with_capacity(self.config.max_batch_bytes),
            n_buffered: 0,
            max_batch_entries: self.config.max_batch_entries,
            max_batch_bytes: self.config.max_batch_bytes,
            fsync: self.config.fsync,
        })
    }
}

/// A write handle into one on-disk snapshot, refer
/// [Disk::batch][crate::backend::Backend::batch].
///
/// Entries are buffered and flushed at the configured granularity.
/// Closing renames the working file into place, making the snapshot
/// visible atomically; dropping an unclosed batch removes the working
/// file.
pub struct DiskBatch {
    file: Option<fs::File>,
    tmp_path: path::PathBuf,
    file_path: path::PathBuf,
    buf: Vec<u8>,
    n_buffered: usize,
    max_batch_entries: usize,
    max_batch_bytes: usize,
    fsync: bool,
}

impl DiskBatch {
    fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        match self.file.as_mut() {
            Some(file) => err_at!(IOError, file.write_all(&self.buf))?,
            None => return err_at!(Fatal, msg: "flush on closed batch"),
        }
        self.buf.clear();
        self.n_buffered = 0;
        Ok(())
    }
}

impl BackendBatch for DiskBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        binary::put_uvarint(&mut self.buf, err_at!(FailConvert, u64::try_from(key.len()))?);
        self.buf.extend_from_slice(key);
        binary::put_uvarint(&mut self.buf, err_at!(FailConvert, u64::try_from(value.len()))?);
        self.buf.extend_from_slice(value);
        self.n_buffered += 1;

        if self.n_buffered >= self.max_batch_entries || self.buf.len() >= self.max_batch_bytes {
            self.flush()?;
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.flush()?;
        let file = match self.file.take() {
            Some(file) => file,
            None => return err_at!(Fatal, msg: "close on closed batch"),
        };
        if self.fsync {
            err_at!(IOError, file.sync_all())?;
        }
        err_at!(IOError, fs::rename(&self.tmp_path, &self.file_path))?;
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.file.take();
        err_at!(IOError, fs::remove_file(&self.tmp_path))
    }
}

impl Drop for DiskBatch {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            fs::remove_file(&self.tmp_path).ok();
        }
    }
}

#[cfg(test)]
#[path = "disk_test.rs"]
mod disk_test;
