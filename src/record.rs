//! Module implement the versioned record, the value-part of each entry
//! in the database.

use std::fmt;

use crate::{Error, Result};

/// Value type, the payload of a single version of a key.
///
/// A key's kind, blob or numeric, is fixed by the first write creating it.
/// Mixing kinds on the same key shall return
/// [IncompatibleValue][Error::IncompatibleValue].
#[derive(Clone, Eq, PartialEq)]
pub enum Value {
    /// Opaque byte-string payload.
    Blob(Vec<u8>),
    /// Signed 64-bit numeric payload. Arithmetic on numeric values is
    /// defined modulo 2^64, overflow wraps and is not flagged.
    Numeric(i64),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Blob(data) => write!(f, "Blob({:?})", data),
            Value::Numeric(val) => write!(f, "Numeric({})", val),
        }
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Value {
        Value::Blob(data.to_vec())
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Value {
        Value::Numeric(val)
    }
}

impl Value {
    /// Return whether this is a numeric payload.
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Blob(_) => false,
            Value::Numeric(_) => true,
        }
    }

    /// Return whether `self` and `other` are of the same kind.
    pub fn same_kind(&self, other: &Value) -> bool {
        self.is_numeric() == other.is_numeric()
    }

    /// Return the blob payload, none for numeric values.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(data) => Some(data),
            Value::Numeric(_) => None,
        }
    }

    /// Return the numeric payload, none for blob values.
    pub fn to_numeric(&self) -> Option<i64> {
        match self {
            Value::Blob(_) => None,
            Value::Numeric(val) => Some(*val),
        }
    }
}

/// A single version of a key, value paired with the revision that
/// created it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub value: Value,
    pub rev: u64,
}

impl Block {
    pub fn new(value: Value, rev: u64) -> Block {
        Block { value, rev }
    }
}

/// Record type, a key paired with its ordered history of version blocks.
///
/// Records are values. Mutating operations, [append][Record::append],
/// [tombstone][Record::tombstone], [increment][Record::increment],
/// return a new record sharing the same key and kind, the receiver is
/// never changed. Within a record blocks are ordered by strictly
/// increasing revision and all blocks are of the record's kind; a live
/// record always holds at least one block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    key: Vec<u8>,
    blocks: Vec<Block>,
}

impl Record {
    /// Create a new record for `key`, with a single version block. The
    /// record's kind is inferred from `value` and fixed for the record's
    /// lifetime. Key is copied.
    pub fn new(key: &[u8], value: Value, rev: u64) -> Record {
        Record {
            key: key.to_vec(),
            blocks: vec![Block::new(value, rev)],
        }
    }

    /// Rebuild a record from a decoded block sequence, validating the
    /// record invariants. Used while loading from a backend.
    pub fn from_blocks(key: &[u8], blocks: Vec<Block>) -> Result<Record> {
        if blocks.is_empty() {
            return err_at!(DecodeFail, msg: "record {:?} with zero blocks", key);
        }
        let kind = blocks[0].value.is_numeric();
        let mut prev = 0;
        for block in blocks.iter() {
            if block.value.is_numeric() != kind {
                return err_at!(DecodeFail, msg: "record {:?} mixes kinds", key);
            }
            if block.rev <= prev {
                return err_at!(
                    DecodeFail, msg: "record {:?} revs not increasing {} {}",
                    key, prev, block.rev
                );
            }
            prev = block.rev;
        }
        Ok(Record {
            key: key.to_vec(),
            blocks,
        })
    }
}

impl Record {
    /// Return the key, as a borrowed byte-slice.
    #[inline]
    pub fn as_key(&self) -> &[u8] {
        &self.key
    }

    /// Return an owned copy of the key.
    #[inline]
    pub fn to_key(&self) -> Vec<u8> {
        self.key.clone()
    }

    /// Return whether this record holds numeric values.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.blocks[0].value.is_numeric()
    }

    /// Return the number of version blocks retained by this record.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Return the latest revision of this record.
    #[inline]
    pub fn to_rev(&self) -> u64 {
        self.last().rev
    }

    /// Return the list of retained revisions, oldest first.
    pub fn to_revs(&self) -> Vec<u64> {
        self.blocks.iter().map(|b| b.rev).collect()
    }

    /// Return the version block at index `i`.
    pub fn at(&self, i: usize) -> Option<&Block> {
        self.blocks.get(i)
    }

    /// Return the latest version block.
    pub fn last(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Return the tail of the history starting at index `i`.
    pub fn from(&self, i: usize) -> &[Block] {
        &self.blocks[i..]
    }

    /// Return the full block sequence, oldest first.
    pub fn as_blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Locate a version block by revision.
    ///
    /// With `equal`, return the index of the block created exactly at
    /// `rev`. Without `equal`, return the smallest index whose revision
    /// is greater-than-or-equal to `rev`. Return none when no block
    /// qualifies.
    pub fn find(&self, rev: u64, equal: bool) -> Option<usize> {
        match self.blocks.binary_search_by(|b| b.rev.cmp(&rev)) {
            Ok(i) => Some(i),
            Err(_) if equal => None,
            Err(i) if i >= self.blocks.len() => None,
            Err(i) => Some(i),
        }
    }
}

impl Record {
    /// Append a new version. Applicable only to blob records, the prior
    /// history is retained. `rev` must be newer than the latest retained
    /// revision.
    pub fn append(&self, value: Value, rev: u64) -> Result<Record> {
        self.check_block(&value, rev)?;

        let mut blocks = Vec::with_capacity(self.blocks.len() + 1);
        blocks.extend_from_slice(&self.blocks);
        blocks.push(Block::new(value, rev));
        Ok(Record {
            key: self.key.clone(),
            blocks,
        })
    }

    /// Replace the entire history with a single new version. Applicable
    /// only to blob records.
    pub fn tombstone(&self, value: Value, rev: u64) -> Result<Record> {
        self.check_block(&value, rev)?;

        Ok(Record {
            key: self.key.clone(),
            blocks: vec![Block::new(value, rev)],
        })
    }

    /// Add `delta` to the latest value, replacing the history with the
    /// single new version. Applicable only to numeric records. Overflow
    /// wraps modulo 2^64 and is not flagged.
    pub fn increment(&self, delta: i64, rev: u64) -> Result<Record> {
        let val = match &self.last().value {
            Value::Numeric(val) => *val,
            Value::Blob(_) => {
                return err_at!(
                    IncompatibleValue, msg: "increment on blob key {:?}", self.key
                )
            }
        };
        if rev <= self.to_rev() {
            return err_at!(
                InvalidInput, msg: "rev {} not newer than {}", rev, self.to_rev()
            );
        }

        Ok(Record {
            key: self.key.clone(),
            blocks: vec![Block::new(Value::Numeric(val.wrapping_add(delta)), rev)],
        })
    }

    fn check_block(&self, value: &Value, rev: u64) -> Result<()> {
        if self.is_numeric() {
            return err_at!(
                IncompatibleValue, msg: "blob op on numeric key {:?}", self.key
            );
        }
        if value.is_numeric() {
            return err_at!(
                IncompatibleValue, msg: "numeric value for blob key {:?}", self.key
            );
        }
        if rev <= self.to_rev() {
            return err_at!(
                InvalidInput, msg: "rev {} not newer than {}", rev, self.to_rev()
            );
        }
        Ok(())
    }
}

impl<'a> arbitrary::Arbitrary<'a> for Value {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        let value = match u.arbitrary::<u8>()? % 2 {
            0 => {
                let size = u.arbitrary::<usize>()? % 128;
                let val = u.arbitrary::<u64>()?;
                Value::Blob(format!("{:0width$}", val, width = size).into_bytes())
            }
            _ => Value::Numeric(u.arbitrary::<i64>()?),
        };
        Ok(value)
    }
}

impl rand::distributions::Distribution<Value> for rand::distributions::Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Value {
        if rng.gen::<bool>() {
            let (val, size) = (rng.gen::<u64>(), rng.gen::<usize>() % 128);
            Value::Blob(format!("{:0width$}", val, width = size).into_bytes())
        } else {
            Value::Numeric(rng.gen::<i64>())
        }
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
