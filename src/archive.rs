//! Module implement archiving [Mdb] into a persistent backend, and
//! loading it back.

use log::info;

use crate::{
    backend::{Backend, BackendBatch},
    binary,
    mdb::Mdb,
    omap::Omap,
    record::Record,
    Result,
};

impl Mdb {
    /// Write the entire database, as of the current revision, into
    /// `backend` as one snapshot. Snapshot is a read-side operation, it
    /// does not advance revisions and does not block the writer;
    /// overlapping snapshots are serialized by a dedicated archive
    /// lock. On any backend error the backend batch is rolled back and
    /// the error returned. Return the archived revision.
    pub fn snapshot<B>(&self, backend: &B) -> Result<u64>
    where
        B: Backend,
    {
        let _a = match self.archive_mu.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        let inner = self.load_inner();

        let mut batch = backend.batch(inner.rev)?;
        let mut buf = Vec::with_capacity(32 * 1024);
        for record in inner.root.iter() {
            buf.clear();
            if let Err(err) = binary::encode_record(&record, &mut buf) {
                batch.rollback().ok();
                return Err(err);
            }
            if let Err(err) = batch.put(record.as_key(), &buf) {
                batch.rollback().ok();
                return Err(err);
            }
        }
        batch.close()?;

        info!(
            target: "mvdb",
            "{:?} archived {} keys at rev:{}",
            self.name, inner.root.len(), inner.rev
        );
        Ok(inner.rev)
    }

    /// Load a database from `backend`, at the highest revision the
    /// backend holds. Decode failures abort the load, no partial
    /// database is ever published.
    pub fn load<B>(name: &str, spin: bool, backend: &B) -> Result<Mdb>
    where
        B: Backend,
    {
        let rev = backend.last_revision()?;

        let mut txn = Omap::new().transaction();
        backend.range(rev, |key, value| {
            let blocks = binary::decode_blocks(value)?;
            let record = Record::from_blocks(key, blocks)?;
            txn.set(record);
            Ok(())
        })?;
        let root = txn.commit();

        info!(
            target: "mvdb",
            "{:?} loaded {} keys at rev:{}", name, root.len(), rev
        );
        Ok(Mdb::from_parts(name, spin, root, rev))
    }
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
