// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A fixed-capacity ISAM page: sorted keys, their heap byte offsets and an
/// optional pointer to the next overflow page.
///
/// Pages are immutable on disk; every logical rewrite appends a fresh copy
/// to the page log.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// Sorted keys
    pub keys: Vec<Value>,

    /// Heap byte offset per key
    pub offsets: Vec<u64>,

    /// Byte offset of the next overflow page in the page log, if any
    pub overflow_ptr: Option<u64>,

    /// Maximum number of entries
    pub capacity: usize,
}

impl Page {
    /// Creates an empty page.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: Vec::new(),
            offsets: Vec::new(),
            overflow_ptr: None,
            capacity,
        }
    }

    /// Whether the page has reached its capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.keys.len() >= self.capacity
    }

    /// Inserts an entry at its sorted position.
    pub fn insert(&mut self, key: Value, offset: u64) {
        let idx = self.keys.partition_point(|k| k <= &key);
        self.keys.insert(idx, key);
        self.offsets.insert(idx, offset);
    }

    /// Removes the exact `(key, offset)` entry; returns whether it was found.
    pub fn delete(&mut self, key: &Value, offset: u64) -> bool {
        let Some(idx) = self
            .keys
            .iter()
            .zip(&self.offsets)
            .position(|(k, o)| k == key && *o == offset)
        else {
            return false;
        };
        self.keys.remove(idx);
        self.offsets.remove(idx);
        true
    }

    /// The offset stored under `key`, if present in this page.
    #[must_use]
    pub fn lookup(&self, key: &Value) -> Option<u64> {
        self.keys
            .iter()
            .zip(&self.offsets)
            .find(|(k, _)| *k == key)
            .map(|(_, o)| *o)
    }
}

impl Encode for Page {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: page capacity is small, u32 is plenty
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.keys.len() as u32)?;
        for key in &self.keys {
            key.encode_into(writer)?;
        }
        for offset in &self.offsets {
            writer.write_u64::<LittleEndian>(*offset)?;
        }
        match self.overflow_ptr {
            Some(ptr) => {
                writer.write_u8(1)?;
                writer.write_u64::<LittleEndian>(ptr)?;
            }
            None => writer.write_u8(0)?,
        }
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.capacity as u32)?;
        Ok(())
    }
}

impl Decode for Page {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<LittleEndian>()? as usize;

        let mut keys = Vec::with_capacity(len);
        for _ in 0..len {
            keys.push(Value::decode_from(reader)?);
        }

        let mut offsets = Vec::with_capacity(len);
        for _ in 0..len {
            offsets.push(reader.read_u64::<LittleEndian>()?);
        }

        let overflow_ptr = if reader.read_u8()? != 0 {
            Some(reader.read_u64::<LittleEndian>()?)
        } else {
            None
        };

        let capacity = reader.read_u32::<LittleEndian>()? as usize;

        Ok(Self {
            keys,
            offsets,
            overflow_ptr,
            capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn page_roundtrip() -> crate::Result<()> {
        let mut page = Page::new(4);
        page.insert(Value::Str("b".into()), 10);
        page.insert(Value::Str("a".into()), 20);
        page.overflow_ptr = Some(99);

        let bytes = page.encode_into_vec()?;
        let decoded = Page::decode_from(&mut &bytes[..])?;
        assert_eq!(page, decoded);

        Ok(())
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut page = Page::new(8);
        for (k, o) in [("d", 0), ("a", 1), ("c", 2), ("b", 3)] {
            page.insert(Value::Str(k.into()), o);
        }
        let keys: Vec<_> = page.keys.iter().map(ToString::to_string).collect();
        assert_eq!(vec!["a", "b", "c", "d"], keys);
    }

    #[test]
    fn delete_matches_exact_pair() {
        let mut page = Page::new(8);
        page.insert(Value::Str("a".into()), 1);
        page.insert(Value::Str("a".into()), 2);

        assert!(!page.delete(&Value::Str("a".into()), 3));
        assert!(page.delete(&Value::Str("a".into()), 2));
        assert_eq!(Some(1), page.lookup(&Value::Str("a".into())));
    }
}
