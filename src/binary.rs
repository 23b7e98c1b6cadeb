//! Module implement the wire encoding of versioned records, used while
//! archiving into, and loading from, a persistent backend.
//!
//! Layout of one encoded record:
//!
//! ```text
//! +------+-------------+---------+---------+---------+
//! | kind | block-count | block-1 | block-2 | ...     |
//! +------+-------------+---------+---------+---------+
//! ```
//!
//! Kind is a single tag byte, 0x01 for numeric and 0x02 for blob.
//! Block-count and all integers that follow are unsigned varints, 7-bit
//! groups with little-endian continuation bits, at most 10 bytes for a
//! 64-bit value. Each blob block is `varint(len), payload-bytes,
//! varint(rev)`; each numeric block is `varint(bit-pattern),
//! varint(rev)`, the bit-pattern being the two's complement of the
//! signed value. Revisions are positive, a ZERO revision marks
//! corruption.

use std::convert::TryFrom;

use crate::{
    record::{Block, Record, Value},
    Error, Result,
};

/// Kind tag for numeric records.
pub const KIND_NUMERIC: u8 = 0x01;
/// Kind tag for blob records.
pub const KIND_BLOB: u8 = 0x02;

// Maximum encoded length of a 64-bit unsigned varint.
const MAX_VARINT_LEN: usize = 10;

/// Append `v` to `buf` as an unsigned varint.
pub fn put_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Decode an unsigned varint from the head of `buf`, advancing it past
/// the consumed bytes. Reject encodings longer than 10 bytes and
/// 10-byte encodings overflowing 64 bits.
pub fn take_uvarint(buf: &mut &[u8]) -> Result<u64> {
    let mut v = 0_u64;
    let mut shift = 0_u32;
    for n in 0..MAX_VARINT_LEN {
        let b = match buf.get(n) {
            Some(b) => *b,
            None => return err_at!(DecodeFail, msg: "truncated uvarint"),
        };
        if b < 0x80 {
            if n == MAX_VARINT_LEN - 1 && b > 1 {
                return err_at!(DecodeFail, msg: "uvarint overflows 64 bits");
            }
            *buf = &buf[n + 1..];
            return Ok(v | (u64::from(b) << shift));
        }
        v |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }
    err_at!(DecodeFail, msg: "uvarint continues past 10 bytes")
}

/// Encode `record`'s kind and block sequence into `buf`. The key is not
/// part of the encoding, backends store it alongside.
pub fn encode_record(record: &Record, buf: &mut Vec<u8>) -> Result<()> {
    let kind = if record.is_numeric() {
        KIND_NUMERIC
    } else {
        KIND_BLOB
    };
    buf.push(kind);
    put_uvarint(buf, err_at!(FailConvert, u64::try_from(record.len()))?);

    for block in record.as_blocks() {
        match &block.value {
            Value::Blob(data) => {
                put_uvarint(buf, err_at!(FailConvert, u64::try_from(data.len()))?);
                buf.extend_from_slice(data);
            }
            Value::Numeric(val) => put_uvarint(buf, *val as u64),
        }
        if block.rev == 0 {
            return err_at!(Fatal, msg: "record with ZERO revision");
        }
        put_uvarint(buf, block.rev);
    }
    Ok(())
}

/// Decode a block sequence produced by [encode_record]. Unknown kind
/// tags, truncated varints, trailing bytes and ZERO revisions are
/// rejected with [DecodeFail][Error::DecodeFail].
pub fn decode_blocks(data: &[u8]) -> Result<Vec<Block>> {
    let mut buf = data;

    let kind = match buf.first() {
        Some(kind) if *kind == KIND_NUMERIC || *kind == KIND_BLOB => *kind,
        Some(kind) => return err_at!(DecodeFail, msg: "unknown kind tag {:#x}", kind),
        None => return err_at!(DecodeFail, msg: "empty block sequence"),
    };
    buf = &buf[1..];

    let count = err_at!(FailConvert, usize::try_from(take_uvarint(&mut buf)?))?;

    let mut blocks = Vec::with_capacity(count.min(1024));
    for _i in 0..count {
        let value = match kind {
            KIND_BLOB => {
                let n = err_at!(FailConvert, usize::try_from(take_uvarint(&mut buf)?))?;
                if buf.len() < n {
                    return err_at!(
                        DecodeFail, msg: "blob payload {}/{} truncated", buf.len(), n
                    );
                }
                let data = buf[..n].to_vec();
                buf = &buf[n..];
                Value::Blob(data)
            }
            _ => Value::Numeric(take_uvarint(&mut buf)? as i64),
        };
        let rev = take_uvarint(&mut buf)?;
        if rev == 0 {
            return err_at!(DecodeFail, msg: "block with ZERO revision");
        }
        blocks.push(Block::new(value, rev));
    }

    if !buf.is_empty() {
        return err_at!(DecodeFail, msg: "{} trailing bytes", buf.len());
    }

    Ok(blocks)
}

#[cfg(test)]
#[path = "binary_test.rs"]
mod binary_test;
