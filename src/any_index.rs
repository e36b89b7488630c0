// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::bplus::{BPlusTree, DEFAULT_ORDER};
use crate::catalog::IndexDescriptor;
use crate::coding::{Decode, Encode};
use crate::file;
use crate::hash::{ExtendibleHash, DEFAULT_BUCKET_SIZE, DIRECTORY_FILE};
use crate::index::{IndexHits, SecondaryIndex};
use crate::isam::{Isam, DEFAULT_LEAF_CAPACITY};
use crate::record::Row;
use crate::schema::Schema;
use crate::sequential::SequentialStore;
use crate::spatial::SpatialIndex;
use crate::value::Value;
use crate::Result;
use enum_dispatch::enum_dispatch;
use std::path::{Path, PathBuf};

/// The no-op index of purely sequential tables; every lookup falls back
/// to the heap.
pub struct SequentialIndex;

impl SecondaryIndex for SequentialIndex {
    fn column(&self) -> Option<&str> {
        None
    }

    fn insert(&mut self, _row: &Row, _pk: &Value, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _row: &Row, _pk: &Value, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &Value) -> Result<Option<IndexHits>> {
        Ok(None)
    }

    fn get_range(&self, _lo: &Value, _hi: &Value) -> Result<Option<IndexHits>> {
        Ok(None)
    }
}

/// A [`BPlusTree`] bound to one column, snapshotted to disk after every
/// mutation.
pub struct BPlusIndex {
    column: String,
    col_idx: usize,
    path: PathBuf,
    tree: BPlusTree,
}

impl BPlusIndex {
    /// Loads the snapshot if one exists, else bulk-builds from the heap
    /// and writes the first snapshot.
    pub fn open(path: PathBuf, column: &str, schema: &Schema, heap: &SequentialStore) -> Result<Self> {
        let col_idx = schema.column_index(column)?;

        let tree = if path.try_exists()? {
            let bytes = std::fs::read(&path)?;
            BPlusTree::decode_from(&mut &bytes[..])?
        } else {
            let mut tree = BPlusTree::new(DEFAULT_ORDER);
            for row in heap.scan()? {
                let key = key_of(&row, col_idx)?;
                let pk = row.primary_key(schema)?.clone();
                tree.add(key, pk);
            }
            tree
        };

        let index = Self {
            column: column.to_owned(),
            col_idx,
            path,
            tree,
        };
        index.save()?;
        Ok(index)
    }

    fn save(&self) -> Result<()> {
        std::fs::write(&self.path, self.tree.encode_into_vec()?)?;
        Ok(())
    }
}

impl SecondaryIndex for BPlusIndex {
    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn insert(&mut self, row: &Row, pk: &Value, _offset: u64) -> Result<()> {
        self.tree.add(key_of(row, self.col_idx)?, pk.clone());
        self.save()
    }

    fn remove(&mut self, row: &Row, pk: &Value, _offset: u64) -> Result<()> {
        let key = key_of(row, self.col_idx)?;
        if !self.tree.remove_entry(&key, pk) {
            log::debug!("bplustree {:?}: no entry ({key}, {pk}) to remove", self.path);
        }
        self.save()
    }

    fn get(&self, key: &Value) -> Result<Option<IndexHits>> {
        Ok(Some(IndexHits::PrimaryKeys(self.tree.search(key))))
    }

    fn get_range(&self, lo: &Value, hi: &Value) -> Result<Option<IndexHits>> {
        Ok(Some(IndexHits::PrimaryKeys(self.tree.range(lo, hi))))
    }
}

/// An [`Isam`] index bound to one column, mapping keys to heap byte
/// offsets.
pub struct IsamIndex {
    column: String,
    col_idx: usize,
    inner: Isam,
}

impl IsamIndex {
    /// Loads existing metadata, or bulk-builds the two levels from the
    /// heap's data file.
    pub fn open(
        meta_path: PathBuf,
        data_path: PathBuf,
        column: &str,
        schema: &Schema,
        heap: &SequentialStore,
    ) -> Result<Self> {
        let col_idx = schema.column_index(column)?;
        let existed = meta_path.try_exists()?;
        let mut inner = Isam::open(meta_path, data_path, DEFAULT_LEAF_CAPACITY)?;

        if !existed {
            let mut pairs = heap
                .scan_data_with_offsets()?
                .into_iter()
                .map(|(offset, row)| Ok((key_of(&row, col_idx)?, offset)))
                .collect::<Result<Vec<_>>>()?;
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            inner.build(&pairs)?;
        }

        Ok(Self {
            column: column.to_owned(),
            col_idx,
            inner,
        })
    }
}

impl SecondaryIndex for IsamIndex {
    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn insert(&mut self, row: &Row, _pk: &Value, offset: u64) -> Result<()> {
        self.inner.add(key_of(row, self.col_idx)?, offset)
    }

    fn remove(&mut self, row: &Row, _pk: &Value, offset: u64) -> Result<()> {
        let key = key_of(row, self.col_idx)?;
        if !self.inner.remove(&key, offset)? {
            log::debug!("isam: no entry ({key}, {offset}) to remove");
        }
        Ok(())
    }

    fn get(&self, key: &Value) -> Result<Option<IndexHits>> {
        let hits = self.inner.search(key)?.into_iter().collect();
        Ok(Some(IndexHits::Offsets(hits)))
    }

    fn get_range(&self, lo: &Value, hi: &Value) -> Result<Option<IndexHits>> {
        let hits = self
            .inner
            .range(lo, hi)?
            .into_iter()
            .map(|(_, offset)| offset)
            .collect();
        Ok(Some(IndexHits::Offsets(hits)))
    }
}

/// An [`ExtendibleHash`] bound to one column, mapping keys to primary
/// keys.
pub struct HashIndex {
    column: String,
    col_idx: usize,
    inner: ExtendibleHash,
}

impl HashIndex {
    /// Loads the existing directory, or initializes one and bulk-loads the
    /// heap's live rows.
    pub fn open(folder: PathBuf, column: &str, schema: &Schema, heap: &SequentialStore) -> Result<Self> {
        let col_idx = schema.column_index(column)?;
        let existed = folder.join(DIRECTORY_FILE).try_exists()?;
        let mut inner = ExtendibleHash::open(folder, DEFAULT_BUCKET_SIZE)?;

        if !existed {
            for row in heap.scan()? {
                let key = key_of(&row, col_idx)?;
                let pk = row.primary_key(schema)?.clone();
                inner.add(key, pk)?;
            }
        }

        Ok(Self {
            column: column.to_owned(),
            col_idx,
            inner,
        })
    }
}

impl SecondaryIndex for HashIndex {
    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn insert(&mut self, row: &Row, pk: &Value, _offset: u64) -> Result<()> {
        self.inner.add(key_of(row, self.col_idx)?, pk.clone())
    }

    fn remove(&mut self, row: &Row, pk: &Value, _offset: u64) -> Result<()> {
        let key = key_of(row, self.col_idx)?;
        if !self.inner.remove_entry(&key, pk)? {
            log::debug!("hash: no entry ({key}, {pk}) to remove");
        }
        Ok(())
    }

    fn get(&self, key: &Value) -> Result<Option<IndexHits>> {
        Ok(Some(IndexHits::PrimaryKeys(self.inner.search(key)?)))
    }

    fn get_range(&self, lo: &Value, hi: &Value) -> Result<Option<IndexHits>> {
        Ok(Some(IndexHits::PrimaryKeys(self.inner.range(lo, hi)?)))
    }
}

impl SecondaryIndex for SpatialIndex {
    fn column(&self) -> Option<&str> {
        None
    }

    fn insert(&mut self, row: &Row, _pk: &Value, _offset: u64) -> Result<()> {
        self.add(row.clone()).map(|_| ())
    }

    fn remove(&mut self, row: &Row, _pk: &Value, _offset: u64) -> Result<()> {
        if !SpatialIndex::remove(self, row) {
            log::debug!("rtree: no spatial entry for removed row");
        }
        Ok(())
    }

    fn get(&self, _key: &Value) -> Result<Option<IndexHits>> {
        Ok(None)
    }

    fn get_range(&self, _lo: &Value, _hi: &Value) -> Result<Option<IndexHits>> {
        Ok(None)
    }
}

/// One of the five access methods a table can be bound to
#[enum_dispatch(SecondaryIndex)]
pub enum AnyIndex {
    /// Heap only, see [`SequentialIndex`]
    Sequential(SequentialIndex),

    /// Ordered in-memory index, see [`BPlusIndex`]
    BPlusTree(BPlusIndex),

    /// Two-level static index, see [`IsamIndex`]
    Isam(IsamIndex),

    /// Extendible hashing, see [`HashIndex`]
    Hash(HashIndex),

    /// Spatial index, see [`SpatialIndex`]
    Rtree(SpatialIndex),
}

impl AnyIndex {
    /// Opens (or bulk-builds) the index described by `descriptor` for a
    /// table whose heap already exists.
    pub fn open(
        dir: &Path,
        table: &str,
        descriptor: &IndexDescriptor,
        schema: &Schema,
        heap: &SequentialStore,
    ) -> Result<Self> {
        match descriptor {
            IndexDescriptor::Sequential => Ok(SequentialIndex.into()),
            IndexDescriptor::Bplustree { column } => Ok(BPlusIndex::open(
                file::bplus_file(dir, table, column),
                column,
                schema,
                heap,
            )?
            .into()),
            IndexDescriptor::Isam { column } => Ok(IsamIndex::open(
                file::isam_meta_file(dir, table, column),
                file::isam_data_file(dir, table, column),
                column,
                schema,
                heap,
            )?
            .into()),
            IndexDescriptor::Hash { column } => Ok(HashIndex::open(
                file::hash_folder(dir, table, column),
                column,
                schema,
                heap,
            )?
            .into()),
            IndexDescriptor::Rtree {
                x_column,
                y_column,
                key_columns,
            } => {
                let mut index = SpatialIndex::new(schema, x_column, y_column, key_columns)?;
                index.add_batch(heap.scan()?)?;
                Ok(index.into())
            }
        }
    }

    /// The spatial index, if this table is R-tree backed.
    #[must_use]
    pub fn as_spatial(&self) -> Option<&SpatialIndex> {
        match self {
            Self::Rtree(index) => Some(index),
            _ => None,
        }
    }
}

fn key_of(row: &Row, col_idx: usize) -> Result<Value> {
    row.values
        .get(col_idx)
        .cloned()
        .ok_or(crate::Error::InvalidRecord(row.values.len(), col_idx + 1))
}
