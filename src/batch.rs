//! Module implement [Batch], the write-transaction for [Mdb].

use log::debug;

use std::sync::{Arc, MutexGuard};

use crate::{
    mdb::{Inner, Mdb},
    notify::Event,
    omap::Txn,
    record::{Block, Record, Value},
    Error, Result,
};

/// Result type for all write operations on a [Batch].
#[derive(Debug)]
pub struct Wr {
    /// Revision assigned to this operation.
    pub rev: u64,
    /// The immediately-prior record for the key, populated only when
    /// the operation was invoked with the `prior` flag.
    pub prior: Option<Arc<Record>>,
}

// One staged notification, delivered on commit in operation order.
enum Staged {
    Update { key: Vec<u8>, block: Block },
    Delete { key: Vec<u8> },
}

/// Batch type, a write transaction on the database.
///
/// Only one batch can be active at a time, starting a second batch
/// blocks until the current one commits or rolls back. Each successful
/// mutating operation is assigned the next revision; revisions within a
/// batch are consecutive, across batches strictly increasing. None of
/// the staged updates are visible to readers until
/// [commit][Batch::commit]; a failed operation leaves the batch open
/// and consistent. Dropping the batch without committing is a rollback.
pub struct Batch<'a> {
    db: &'a Mdb,
    txn: Txn,
    rev: u64,
    staged: Vec<Staged>,
    _guard: MutexGuard<'a, u32>,
}

impl Mdb {
    /// Start a new batch transaction. Blocks while another batch is
    /// active.
    pub fn transaction(&self) -> Batch {
        let guard = match self.mu.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        let inner = self.load_inner();
        Batch {
            db: self,
            txn: inner.root.transaction(),
            rev: inner.rev,
            staged: Vec::default(),
            _guard: guard,
        }
    }
}

impl<'a> Batch<'a> {
    /// Return the revision of the latest staged operation. Until the
    /// first operation this is the database revision the batch forked
    /// from.
    #[inline]
    pub fn rev(&self) -> u64 {
        self.rev
    }

    /// Insert a new version of the value for `key`, retaining prior
    /// versions; creates the key when missing. Applicable to blob keys
    /// only, numeric keys fail with
    /// [IncompatibleValue][Error::IncompatibleValue].
    pub fn insert(&mut self, key: &[u8], value: &[u8], prior: bool) -> Result<Wr> {
        let rev = self.rev + 1;
        let (record, old) = match self.txn.get(key) {
            Some(old) => {
                let record = old.append(Value::from(value), rev)?;
                (record, Some(old))
            }
            None => (Record::new(key, Value::from(value), rev), None),
        };
        Ok(self.stage(key, record, old, rev, prior))
    }

    /// Set the value for `key`, overwriting its previous versions;
    /// creates the key when missing. Applicable to blob keys only.
    pub fn put(&mut self, key: &[u8], value: &[u8], prior: bool) -> Result<Wr> {
        let rev = self.rev + 1;
        let (record, old) = match self.txn.get(key) {
            Some(old) => {
                let record = old.tombstone(Value::from(value), rev)?;
                (record, Some(old))
            }
            None => (Record::new(key, Value::from(value), rev), None),
        };
        Ok(self.stage(key, record, old, rev, prior))
    }

    /// Add `delta` to the value for `key`; creates the key with value
    /// `delta` when missing. Applicable to numeric keys only, overflow
    /// wraps modulo 2^64.
    pub fn increment(&mut self, key: &[u8], delta: i64, prior: bool) -> Result<Wr> {
        let rev = self.rev + 1;
        let (record, old) = match self.txn.get(key) {
            Some(old) => {
                let record = old.increment(delta, rev)?;
                (record, Some(old))
            }
            None => (Record::new(key, Value::from(delta), rev), None),
        };
        Ok(self.stage(key, record, old, rev, prior))
    }

    /// Subtract `delta` from the value for `key`; creates the key with
    /// value `-delta` when missing. Applicable to numeric keys only.
    pub fn decrement(&mut self, key: &[u8], delta: i64, prior: bool) -> Result<Wr> {
        self.increment(key, delta.wrapping_neg(), prior)
    }

    /// Apply `updater` to the current value of `key`; when the key is
    /// missing the updater is called with none and its result creates
    /// the key. For blob keys `tombstone` selects overwrite semantics
    /// over append semantics. An updater changing the value's kind
    /// fails with [IncompatibleValue][Error::IncompatibleValue].
    pub fn update<F>(
        &mut self,
        key: &[u8],
        updater: F,
        tombstone: bool,
        prior: bool,
    ) -> Result<Wr>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let rev = self.rev + 1;
        let (record, old) = match self.txn.get(key) {
            Some(old) => {
                let last = &old.last().value;
                let value = updater(Some(last));
                if !value.same_kind(last) {
                    return err_at!(
                        IncompatibleValue, msg: "updater changes kind of {:?}", key
                    );
                }
                let record = if old.is_numeric() {
                    // numeric history is a single block
                    Record::new(key, value, rev)
                } else if tombstone {
                    old.tombstone(value, rev)?
                } else {
                    old.append(value, rev)?
                };
                (record, Some(old))
            }
            None => (Record::new(key, updater(None), rev), None),
        };
        Ok(self.stage(key, record, old, rev, prior))
    }

    /// Remove `key` and its history from the database. If the key does
    /// not exist return [KeyNotFound][Error::KeyNotFound]. On commit the
    /// key's subscribers receive the
    /// [PairDeleted][Error::PairDeleted] sentinel and their streams
    /// close.
    pub fn delete(&mut self, key: &[u8], prior: bool) -> Result<Wr> {
        match self.txn.delete(key) {
            Some(old) => {
                self.rev += 1;
                self.staged.push(Staged::Delete { key: key.to_vec() });
                let prior = if prior { Some(old) } else { None };
                Ok(Wr {
                    rev: self.rev,
                    prior,
                })
            }
            None => err_at!(KeyNotFound, msg: "delete missing key {:?}", key),
        }
    }

    fn stage(
        &mut self,
        key: &[u8],
        record: Record,
        old: Option<Arc<Record>>,
        rev: u64,
        prior: bool,
    ) -> Wr {
        let block = record.last().clone();
        self.txn.set(record);
        self.rev = rev;
        self.staged.push(Staged::Update {
            key: key.to_vec(),
            block,
        });
        let prior = if prior { old } else { None };
        Wr { rev, prior }
    }

    /// Commit the batch, publishing the new root. Readers loading the
    /// root after this call observe every staged update; notifications
    /// for touched keys are handed off, in operation order, before
    /// commit returns. Return the new current revision.
    pub fn commit(self) -> Result<u64> {
        let Batch {
            db,
            txn,
            rev,
            staged,
            _guard,
        } = self;

        let root = txn.commit();
        let n_count = root.len();
        db.store_inner(Inner { root, rev });

        for staged in staged.into_iter() {
            match staged {
                Staged::Update { key, block } => db.registry.publish(Event {
                    key,
                    value: block.value,
                    created: block.rev,
                    current: rev,
                }),
                Staged::Delete { key } => db.registry.close_key(&key),
            }
        }

        debug!(
            target: "mvdb",
            "{:?} commit rev:{} len:{}", db.name, rev, n_count
        );
        Ok(rev)
        // writer lock released here
    }

    /// Close the batch and discard all staged updates. No revisions are
    /// consumed and no notifications are emitted.
    pub fn rollback(self) {
        debug!(target: "mvdb", "{:?} rollback at rev:{}", self.db.name, self.rev);
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
