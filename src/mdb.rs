//! Module implement [Mdb], the database engine.

use log::debug;

use std::{ops::Bound, sync::{Arc, Mutex}, thread};

use crate::{
    notify::{self, Event, Notifier, Registry},
    omap::Omap,
    record::Value,
    util::Spinlock,
    Error, Result, CHAN_SIZE,
};

/// Mdb type, an immutable, consistent, in-memory key/value database.
///
/// All reads, [get][Mdb::get], [range][Mdb::range], [watch][Mdb::watch],
/// [rev][Mdb::rev], [len][Mdb::len], atomically load the current root and
/// operate on that snapshot; they never block, and are never blocked by,
/// the single writer. Writes go through a [Batch][crate::Batch] obtained
/// from [transaction][Mdb::transaction]; batches are serialized by an
/// exclusive writer lock and publish a new root atomically on commit.
///
/// Mdb values are cheap to clone, clones share the same underlying
/// database.
#[derive(Clone, Debug)]
pub struct Mdb {
    pub(crate) name: String,
    pub(crate) spin: bool,
    pub(crate) chan_size: usize,

    pub(crate) mu: Arc<Mutex<u32>>,         // exclusive writer transaction
    pub(crate) archive_mu: Arc<Mutex<u32>>, // exclusive archive transaction
    pub(crate) inner: Arc<Spinlock<Arc<Inner>>>,
    pub(crate) registry: Arc<Registry>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) root: Omap,
    pub(crate) rev: u64,
}

impl Mdb {
    /// Create an empty database. `spin` configures whether threads
    /// waiting on the root latch spin or yield to the OS scheduler.
    pub fn new(name: &str, spin: bool) -> Mdb {
        Mdb::from_parts(name, spin, Omap::new(), 0)
    }

    pub(crate) fn from_parts(name: &str, spin: bool, root: Omap, rev: u64) -> Mdb {
        let inner = Inner { root, rev };
        Mdb {
            name: name.to_string(),
            spin,
            chan_size: CHAN_SIZE,

            mu: Arc::new(Mutex::new(0)),
            archive_mu: Arc::new(Mutex::new(0)),
            inner: Arc::new(Spinlock::new(Arc::new(inner), spin)),
            registry: Arc::new(Registry::new()),
        }
    }

    /// Configure the front-channel capacity for notifiers subsequently
    /// handed out by [watch][Mdb::watch] and [range][Mdb::range].
    pub fn set_chan_size(&mut self, chan_size: usize) -> &mut Self {
        self.chan_size = chan_size;
        self
    }

    pub(crate) fn load_inner(&self) -> Arc<Inner> {
        Arc::clone(&self.inner.read())
    }

    pub(crate) fn store_inner(&self, inner: Inner) {
        *self.inner.write() = Arc::new(inner);
    }
}

impl Mdb {
    /// Return name of this database instance.
    #[inline]
    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    /// Return whether spin-concurrency is enabled.
    #[inline]
    pub fn is_spin(&self) -> bool {
        self.spin
    }

    /// Return the current revision of the database.
    #[inline]
    pub fn rev(&self) -> u64 {
        self.load_inner().rev
    }

    /// Return the number of keys in the database.
    #[inline]
    pub fn len(&self) -> usize {
        self.load_inner().root.len()
    }

    /// Return whether the database holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate the underlying index, used by tests.
    pub fn validate(&self) -> Result<()> {
        self.load_inner().root.validate()
    }
}

impl Mdb {
    /// Retrieve the value for `key` at revision `rev`. If `rev` is ZERO
    /// return the current value for the key. With `equal`, the value's
    /// creating revision must match `rev` exactly; without, the oldest
    /// version created at-or-after `rev` is returned.
    ///
    /// Return `(value, created-rev, current-rev)`, where `created-rev`
    /// is the revision that created the returned version and
    /// `current-rev` is the database revision of the snapshot answering
    /// the call.
    pub fn get(&self, key: &[u8], rev: u64, equal: bool) -> Result<(Value, u64, u64)> {
        let inner = self.load_inner();
        let record = match inner.root.get(key) {
            Some(record) => record,
            None => return err_at!(KeyNotFound, msg: "missing key {:?}", key),
        };

        let block = if rev > 0 {
            record.find(rev, equal).and_then(|i| record.at(i))
        } else {
            Some(record.last())
        };
        match block {
            Some(block) => Ok((block.value.clone(), block.rev, inner.rev)),
            None => err_at!(
                RevisionNotFound, msg: "key {:?} has no rev {}", key, rev
            ),
        }
    }

    /// Iterate over values stored in the database at revision `rev`,
    /// over the interval `[from, to)`, from left to right. If `rev` is
    /// ZERO iterate over current values. `limit` bounds the number of
    /// events emitted, ZERO or negative means unbounded.
    ///
    /// From/to combination:
    ///
    /// * `from == None && to == None`, stream every key in the database.
    /// * `from != None && to == None`, stream the single key, like
    ///   [get][Mdb::get] with `equal` false.
    /// * `from != None && to != None`, stream the keys in the interval.
    ///
    /// Keys with no version at `rev` are skipped silently. Return the
    /// streaming [Notifier] and the current revision of the database.
    /// The stream is terminated with the
    /// [NotifierCanceled][Error::NotifierCanceled] sentinel; canceling
    /// the notifier stops the iteration promptly.
    pub fn range(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        rev: u64,
        limit: i64,
    ) -> Result<(Notifier, u64)> {
        let inner = self.load_inner();
        let current = inner.rev;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return err_at!(
                    InvertedRange, msg: "from {:?} greater than to {:?}", from, to
                );
            }
        }

        let (notifier, tx) = Notifier::unregistered(self.chan_size);

        match (from, to) {
            (Some(from), None) => {
                let key = from.to_vec();
                thread::spawn(move || {
                    let record = match inner.root.get(&key) {
                        Some(record) => record,
                        None => {
                            let msg = format!("missing key {:?}", key);
                            tx.close(Error::KeyNotFound("mdb.range".to_string(), msg));
                            return;
                        }
                    };
                    let block = if rev > 0 {
                        record.find(rev, false).and_then(|i| record.at(i))
                    } else {
                        Some(record.last())
                    };
                    match block {
                        Some(block) => {
                            tx.send(Event {
                                key,
                                value: block.value.clone(),
                                created: block.rev,
                                current,
                            });
                            tx.close(notify::canceled());
                        }
                        None => {
                            let msg = format!("key {:?} has no rev {}", key, rev);
                            tx.close(Error::RevisionNotFound(
                                "mdb.range".to_string(),
                                msg,
                            ));
                        }
                    }
                });
            }
            (from, to) => {
                let lo = match from {
                    Some(from) => Bound::Included(from.to_vec()),
                    None => Bound::Unbounded,
                };
                let hi = match to {
                    Some(to) => Bound::Excluded(to.to_vec()),
                    None => Bound::Unbounded,
                };
                thread::spawn(move || {
                    let mut n = 0_i64;
                    for record in inner.root.range((lo, hi)) {
                        let block = if rev > 0 {
                            match record.find(rev, false).and_then(|i| record.at(i)) {
                                Some(block) => block,
                                None => continue, // no version at rev, skip
                            }
                        } else {
                            record.last()
                        };
                        let event = Event {
                            key: record.to_key(),
                            value: block.value.clone(),
                            created: block.rev,
                            current,
                        };
                        if !tx.send(event) {
                            break;
                        }
                        n += 1;
                        if limit > 0 && n >= limit {
                            break;
                        }
                    }
                    tx.close(notify::canceled());
                });
            }
        }

        Ok((notifier, current))
    }

    /// Subscribe to future changes of `key`. If the key does not exist
    /// return [KeyNotFound][Error::KeyNotFound].
    ///
    /// The returned [Notifier] observes every change committed after
    /// this call, in commit order, until it is canceled or the key is
    /// deleted.
    pub fn watch(&self, key: &[u8]) -> Result<Notifier> {
        let inner = self.load_inner();
        match inner.root.get(key) {
            Some(_) => {
                debug!(target: "mvdb", "{:?} new watcher for {:?}", self.name, key);
                Ok(self.registry.register(key.to_vec(), self.chan_size))
            }
            None => err_at!(KeyNotFound, msg: "watch missing key {:?}", key),
        }
    }
}

#[cfg(test)]
#[path = "mdb_test.rs"]
mod mdb_test;
