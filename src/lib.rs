//! Package implement an immutable, consistent, in-memory key/value
//! database. Mvdb uses an immutable Left-Leaning Red-Black tree (LLRB)
//! internally, refer [Omap]. The database provides Atomicity, Consistency
//! and Isolation from ACID. Being that it is in-memory, it does not
//! provide durability, instead the entire database can be archived into,
//! and reloaded from, a persistent [Backend][backend::Backend].
//!
//! Mvdb provides the following:
//!
//! * _Multi-Version-Concurrency-Control_ - by leveraging immutable LLRB
//!   trees the database supports any number of concurrent readers without
//!   locking, while a single writer makes progress.
//! * _Batch transactions_ - multiple keys can be inserted, updated,
//!   incremented or deleted in a single [Batch]; until commit none of the
//!   updates are visible, after commit all of them are.
//! * _Versioned keys_ - every key holds an ordered history of
//!   `(value, revision)` blocks, refer [Record]; point lookups and range
//!   scans can address any retained revision.
//! * _Change streams_ - every key can be watched, refer [Mdb::watch];
//!   subscribers observe committed changes in commit order through a
//!   [Notifier].
//!
//! Keys are opaque byte-strings ordered lexicographically. Values are
//! either opaque byte blobs or signed 64-bit numbers, refer [Value]; a
//! key's kind is fixed by its first write.

#![allow(clippy::len_without_is_empty)]

#[macro_use]
mod error;

mod archive;
pub mod backend;
mod batch;
mod binary;
mod mdb;
mod notify;
mod omap;
mod record;
mod util;

pub use crate::batch::{Batch, Wr};
pub use crate::error::{Error, Result};
pub use crate::mdb::Mdb;
pub use crate::notify::{Event, Notifier, CHAN_SIZE};
pub use crate::omap::{Iter, Omap, Range, Txn};
pub use crate::record::{Block, Record, Value};
