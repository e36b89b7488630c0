// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::any_index::{AnyIndex, BPlusIndex, HashIndex, IsamIndex, SequentialIndex};
use crate::record::Row;
use crate::spatial::SpatialIndex;
use crate::value::Value;
use crate::Result;
use enum_dispatch::enum_dispatch;

/// What an index lookup hands back; the table layer resolves either form
/// into rows.
#[derive(Debug)]
pub enum IndexHits {
    /// Primary key values, resolved through the heap's key search
    PrimaryKeys(Vec<Value>),

    /// Byte offsets into the heap's data file
    Offsets(Vec<u64>),
}

/// Write and lookup surface shared by all secondary index flavors.
///
/// Lookups return `Ok(None)` when this index cannot serve the predicate
/// (wrong column, or no secondary structure at all), which tells the
/// dispatcher to fall back to the heap.
#[enum_dispatch]
pub trait SecondaryIndex {
    /// The indexed column, if the index is keyed by a single column.
    fn column(&self) -> Option<&str>;

    /// Registers a freshly appended heap row.
    fn insert(&mut self, row: &Row, pk: &Value, offset: u64) -> Result<()>;

    /// Unregisters a row that was tombstoned in the heap.
    fn remove(&mut self, row: &Row, pk: &Value, offset: u64) -> Result<()>;

    /// Equality lookup.
    fn get(&self, key: &Value) -> Result<Option<IndexHits>>;

    /// Inclusive range lookup.
    fn get_range(&self, lo: &Value, hi: &Value) -> Result<Option<IndexHits>>;
}
