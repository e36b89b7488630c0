// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Primary row storage: a sorted data file plus an unsorted auxiliary
//! insertion buffer.
//!
//! Buffered inserts land in the aux file; once it holds
//! [`REORG_THRESHOLD`] records the store is reorganized: all live rows
//! from both files are merged, sorted by primary key and rewritten into
//! the data file, and the aux file is truncated. Tables bound to a
//! secondary index bypass the buffer ([`SequentialStore::append`]) so
//! byte offsets into the data file stay stable.

use crate::file;
use crate::record::Row;
use crate::schema::Schema;
use crate::value::Value;
use crate::{Error, Result};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Number of aux-file records that triggers a merge into the data file.
pub const REORG_THRESHOLD: usize = 5;

/// Which of the two store files a row lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Slot {
    /// Byte offset into the data file
    Data(u64),

    /// Byte offset into the aux file
    Aux(u64),
}

/// Sequential heap over two fixed-width record files.
pub struct SequentialStore {
    schema: Schema,
    data_path: PathBuf,
    aux_path: PathBuf,
}

impl SequentialStore {
    /// Opens (creating files if needed) the store of `table` inside `dir`.
    pub fn open(dir: &Path, table: &str, schema: Schema) -> Result<Self> {
        let data_path = file::data_file(dir, table);
        let aux_path = file::aux_file(dir, table);
        file::touch(&data_path)?;
        file::touch(&aux_path)?;

        Ok(Self {
            schema,
            data_path,
            aux_path,
        })
    }

    /// The store's column schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Path of the primary data file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Buffered insert: rejects duplicate primary keys, appends to the aux
    /// file and reorganizes once the buffer holds [`REORG_THRESHOLD`] records.
    pub fn insert(&self, row: &Row) -> Result<()> {
        let pk = row.primary_key(&self.schema)?;
        if self.get(pk)?.is_some() {
            return Err(Error::DuplicateKey(pk.to_string()));
        }

        let image = row.encode(&self.schema)?;
        let mut aux = std::fs::OpenOptions::new().append(true).open(&self.aux_path)?;
        aux.write_all(&image)?;
        aux.sync_all()?;

        let aux_len = std::fs::metadata(&self.aux_path)?.len() as usize;
        if aux_len / self.schema.record_size() >= REORG_THRESHOLD {
            self.reorganize()?;
        }

        Ok(())
    }

    /// Unbuffered insert used by tables with a secondary index; returns the
    /// byte offset of the new record in the data file.
    pub fn append(&self, row: &Row) -> Result<u64> {
        let image = row.encode(&self.schema)?;
        let mut data = std::fs::OpenOptions::new().append(true).open(&self.data_path)?;
        let offset = data.seek(SeekFrom::End(0))?;
        data.write_all(&image)?;
        data.sync_all()?;
        Ok(offset)
    }

    /// Merges live rows from both files, sorts them by primary key,
    /// rewrites the data file and truncates the aux file.
    ///
    /// Idempotent on a quiescent store.
    pub fn reorganize(&self) -> Result<()> {
        let mut rows: Vec<Row> = self
            .read_rows(&self.data_path)?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| !row.deleted)
            .collect();
        rows.extend(
            self.read_rows(&self.aux_path)?
                .into_iter()
                .map(|(_, row)| row)
                .filter(|row| !row.deleted),
        );

        rows.sort_by(|a, b| {
            let (Ok(a), Ok(b)) = (a.primary_key(&self.schema), b.primary_key(&self.schema))
            else {
                return std::cmp::Ordering::Equal;
            };
            a.cmp(b)
        });

        log::debug!(
            "reorganizing {:?}: {} live rows",
            self.data_path,
            rows.len(),
        );

        let mut buf = Vec::with_capacity(rows.len() * self.schema.record_size());
        for row in &rows {
            buf.extend_from_slice(&row.encode(&self.schema)?);
        }
        std::fs::write(&self.data_path, buf)?;
        std::fs::write(&self.aux_path, b"")?;

        Ok(())
    }

    /// Returns the first live row with the given primary key, scanning the
    /// data file and then the (unsorted) aux file.
    pub fn get(&self, pk: &Value) -> Result<Option<Row>> {
        Ok(self.locate(pk)?.map(|(_, row)| row))
    }

    /// Like [`SequentialStore::get`], but also reports where the row lives.
    pub fn locate(&self, pk: &Value) -> Result<Option<(Slot, Row)>> {
        for (path, is_data) in [(&self.data_path, true), (&self.aux_path, false)] {
            for (offset, row) in self.read_rows(path)? {
                if !row.deleted && row.primary_key(&self.schema)? == pk {
                    let slot = if is_data {
                        Slot::Data(offset)
                    } else {
                        Slot::Aux(offset)
                    };
                    return Ok(Some((slot, row)));
                }
            }
        }
        Ok(None)
    }

    /// Returns all live rows with primary key in `[lo, hi]`, sorted by key.
    pub fn range(&self, lo: &Value, hi: &Value) -> Result<Vec<Row>> {
        let mut result = vec![];
        for path in [&self.data_path, &self.aux_path] {
            for (_, row) in self.read_rows(path)? {
                if row.deleted {
                    continue;
                }
                let pk = row.primary_key(&self.schema)?;
                if lo <= pk && pk <= hi {
                    result.push(row);
                }
            }
        }
        result.sort_by(|a, b| {
            let (Ok(a), Ok(b)) = (a.primary_key(&self.schema), b.primary_key(&self.schema))
            else {
                return std::cmp::Ordering::Equal;
            };
            a.cmp(b)
        });
        Ok(result)
    }

    /// Flips the tombstone of the first live row with the given primary key.
    ///
    /// Returns `false` if no live row matched.
    pub fn delete(&self, pk: &Value) -> Result<bool> {
        match self.locate(pk)? {
            Some((slot, _)) => {
                self.delete_slot(slot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flips the tombstone byte of the record at the given slot in place.
    pub fn delete_slot(&self, slot: Slot) -> Result<()> {
        let (path, offset) = match slot {
            Slot::Data(offset) => (&self.data_path, offset),
            Slot::Aux(offset) => (&self.aux_path, offset),
        };

        let mut f = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        f.seek(SeekFrom::Start(
            offset + self.schema.record_size() as u64 - 1,
        ))?;
        f.write_all(&[1])?;
        f.sync_all()?;

        Ok(())
    }

    /// All live rows in file order: data file first, then the aux buffer.
    pub fn scan(&self) -> Result<Vec<Row>> {
        let mut rows = vec![];
        for path in [&self.data_path, &self.aux_path] {
            rows.extend(
                self.read_rows(path)?
                    .into_iter()
                    .map(|(_, row)| row)
                    .filter(|row| !row.deleted),
            );
        }
        Ok(rows)
    }

    /// Live rows of the data file with their byte offsets (for index builds).
    pub fn scan_data_with_offsets(&self) -> Result<Vec<(u64, Row)>> {
        Ok(self
            .read_rows(&self.data_path)?
            .into_iter()
            .filter(|(_, row)| !row.deleted)
            .collect())
    }

    /// Reads the row at a byte offset of the data file.
    pub fn read_at(&self, offset: u64) -> Result<Row> {
        let bytes = std::fs::read(&self.data_path)?;
        let start = offset as usize;
        let end = start + self.schema.record_size();
        let chunk = bytes
            .get(start..end)
            .ok_or(Error::InvalidRecord(bytes.len().saturating_sub(start), self.schema.record_size()))?;
        Row::decode(&self.schema, chunk)
    }

    fn read_rows(&self, path: &Path) -> Result<Vec<(u64, Row)>> {
        let bytes = std::fs::read(path)?;
        let record_size = self.schema.record_size();

        let mut rows = Vec::with_capacity(bytes.len() / record_size);
        for (i, chunk) in bytes.chunks_exact(record_size).enumerate() {
            let offset = (i * record_size) as u64;
            match Row::decode(&self.schema, chunk) {
                Ok(row) => rows.push((offset, row)),
                Err(e) => {
                    log::warn!("skipping undecodable record in {path:?} at offset {offset}: {e}");
                }
            }
        }

        let tail = bytes.len() % record_size;
        if tail != 0 {
            log::warn!("{path:?} has {tail} trailing bytes (partial record), ignoring");
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};
    use test_log::test;

    fn store(dir: &Path) -> SequentialStore {
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Varchar(8)),
            Column::new("price", ColumnType::Float),
        ])
        .expect("valid schema");
        SequentialStore::open(dir, "products", schema).expect("store opens")
    }

    fn row(id: &str, price: f32) -> Row {
        Row::new(vec![Value::Str(id.into()), Value::Float(price)])
    }

    #[test]
    fn buffered_inserts_land_in_aux_until_threshold() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let record_size = store.schema().record_size() as u64;

        for i in 0..REORG_THRESHOLD - 1 {
            store.insert(&row(&format!("id_{i}"), 1.0))?;
        }

        assert_eq!(0, std::fs::metadata(store.data_path())?.len());
        assert_eq!(
            (REORG_THRESHOLD - 1) as u64 * record_size,
            std::fs::metadata(dir.path().join("products_aux.bin"))?.len(),
        );

        store.insert(&row("id_x", 1.0))?;

        assert_eq!(
            REORG_THRESHOLD as u64 * record_size,
            std::fs::metadata(store.data_path())?.len(),
        );
        assert_eq!(
            0,
            std::fs::metadata(dir.path().join("products_aux.bin"))?.len(),
        );

        Ok(())
    }

    #[test]
    fn search_covers_both_files() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        for i in 0..7u8 {
            store.insert(&row(&format!("id_{i}"), f32::from(i)))?;
        }

        // after 7 inserts: 5 in data (reorganized), 2 in aux
        assert!(store.get(&Value::Str("id_0".into()))?.is_some());
        assert!(store.get(&Value::Str("id_6".into()))?.is_some());
        assert!(store.get(&Value::Str("missing".into()))?.is_none());

        Ok(())
    }

    #[test]
    fn duplicate_keys_are_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        store.insert(&row("a", 1.0))?;
        let result = store.insert(&row("a", 2.0));
        assert!(matches!(result, Err(Error::DuplicateKey(_))));

        Ok(())
    }

    #[test]
    fn range_is_sorted_across_files() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        for id in ["d", "b", "f", "a", "e", "c"] {
            store.insert(&row(id, 1.0))?;
        }

        let hits = store.range(&Value::Str("b".into()), &Value::Str("e".into()))?;
        let ids: Vec<_> = hits
            .iter()
            .map(|r| r.values[0].as_str().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(vec!["b", "c", "d", "e"], ids);

        Ok(())
    }

    #[test]
    fn delete_tombstones_in_place() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        store.insert(&row("a", 1.0))?;
        store.insert(&row("b", 2.0))?;

        assert!(store.delete(&Value::Str("a".into()))?);
        assert!(store.get(&Value::Str("a".into()))?.is_none());
        assert!(store.get(&Value::Str("b".into()))?.is_some());
        assert!(!store.delete(&Value::Str("a".into()))?);

        // slot is retained until reorganization
        let aux_len = std::fs::metadata(dir.path().join("products_aux.bin"))?.len();
        assert_eq!(2 * store.schema().record_size() as u64, aux_len);

        store.reorganize()?;
        assert_eq!(
            store.schema().record_size() as u64,
            std::fs::metadata(store.data_path())?.len(),
        );

        Ok(())
    }

    #[test]
    fn reorganize_is_idempotent() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        for id in ["c", "a", "b"] {
            store.insert(&row(id, 1.0))?;
        }

        store.reorganize()?;
        let first = std::fs::read(store.data_path())?;
        store.reorganize()?;
        let second = std::fs::read(store.data_path())?;
        assert_eq!(first, second);

        Ok(())
    }
}
