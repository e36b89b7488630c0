// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// One extendible-hashing bucket, persisted as its own file.
///
/// A skewed split can leave a bucket holding more than `size` records;
/// the next insert into it will split again.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    /// `(key, value)` records
    pub records: Vec<(Value, Value)>,

    /// Number of low hash bits that discriminate membership in this bucket
    pub local_depth: usize,

    /// Nominal capacity
    pub size: usize,
}

impl Bucket {
    /// Creates an empty bucket of the given capacity.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            records: Vec::new(),
            local_depth: 1,
            size,
        }
    }

    /// Whether the bucket is at (or beyond) its nominal capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.size
    }

    /// Appends a record.
    pub fn add(&mut self, key: Value, value: Value) {
        self.records.push((key, value));
    }

    /// Removes all records with the given key; returns whether any matched.
    pub fn remove(&mut self, key: &Value) -> bool {
        let before = self.records.len();
        self.records.retain(|(k, _)| k != key);
        self.records.len() < before
    }

    /// Removes the exact `(key, value)` record; returns whether any matched.
    pub fn remove_entry(&mut self, key: &Value, value: &Value) -> bool {
        let before = self.records.len();
        self.records.retain(|(k, v)| !(k == key && v == value));
        self.records.len() < before
    }

    /// All values stored under `key`.
    #[must_use]
    pub fn search(&self, key: &Value) -> Vec<Value> {
        self.records
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// All values whose key is in `[lo, hi]`.
    #[must_use]
    pub fn search_range(&self, lo: &Value, hi: &Value) -> Vec<Value> {
        self.records
            .iter()
            .filter(|(k, _)| lo <= k && k <= hi)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl Encode for Bucket {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: buckets are tiny, u32 is plenty
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.records.len() as u32)?;
        for (key, value) in &self.records {
            key.encode_into(writer)?;
            value.encode_into(writer)?;
        }
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(self.local_depth as u8)?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.size as u32)?;
        Ok(())
    }
}

impl Decode for Bucket {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<LittleEndian>()? as usize;

        let mut records = Vec::with_capacity(len);
        for _ in 0..len {
            let key = Value::decode_from(reader)?;
            let value = Value::decode_from(reader)?;
            records.push((key, value));
        }

        let local_depth = reader.read_u8()? as usize;
        let size = reader.read_u32::<LittleEndian>()? as usize;

        Ok(Self {
            records,
            local_depth,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bucket_roundtrip() -> crate::Result<()> {
        let mut bucket = Bucket::new(4);
        bucket.add(Value::Str("a".into()), Value::Int(1));
        bucket.add(Value::Str("b".into()), Value::Int(2));
        bucket.local_depth = 3;

        let bytes = bucket.encode_into_vec()?;
        let decoded = Bucket::decode_from(&mut &bytes[..])?;
        assert_eq!(bucket, decoded);

        Ok(())
    }

    #[test]
    fn remove_entry_spares_twins() {
        let mut bucket = Bucket::new(4);
        bucket.add(Value::Float(9.99), Value::Str("p1".into()));
        bucket.add(Value::Float(9.99), Value::Str("p2".into()));

        assert!(bucket.remove_entry(&Value::Float(9.99), &Value::Str("p1".into())));
        assert_eq!(
            vec![Value::Str("p2".into())],
            bucket.search(&Value::Float(9.99)),
        );
    }
}
