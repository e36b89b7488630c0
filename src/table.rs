// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::any_index::AnyIndex;
use crate::catalog::{IndexDescriptor, TableMeta};
use crate::index::{IndexHits, SecondaryIndex};
use crate::record::Row;
use crate::schema::Schema;
use crate::sequential::{SequentialStore, Slot};
use crate::value::Value;
use crate::{Error, Result};
use std::path::Path;

/// An open table: codec, heap and the one bound secondary index.
///
/// All writes go to the heap first and then synchronously update the
/// index. The catalog wraps every table in a mutex; that mutex is the
/// per-index lock, shared by readers and writers alike.
pub struct Table {
    name: String,
    schema: Schema,
    descriptor: IndexDescriptor,
    heap: SequentialStore,
    index: AnyIndex,
}

impl Table {
    /// Opens a table from its sidecar metadata, re-opening the heap and
    /// loading (or bulk-building) the index.
    pub fn open(dir: &Path, meta: TableMeta) -> Result<Self> {
        let schema = Schema::new(meta.columns)?;

        if meta.record_size != schema.record_size() {
            return Err(Error::MalformedSidecar(format!(
                "{}: sidecar says record_size {}, schema derives {}",
                meta.table,
                meta.record_size,
                schema.record_size(),
            )));
        }

        let heap = SequentialStore::open(dir, &meta.table, schema.clone())?;
        let index = AnyIndex::open(dir, &meta.table, &meta.index, &schema, &heap)?;

        Ok(Self {
            name: meta.table,
            schema,
            descriptor: meta.index,
            heap,
            index,
        })
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The access method this table was created with.
    #[must_use]
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// The heap backing this table.
    #[must_use]
    pub fn heap(&self) -> &SequentialStore {
        &self.heap
    }

    /// Inserts a row given in schema column order.
    ///
    /// Values are coerced to the column types; a live row with the same
    /// primary key rejects the insert. Sequential tables go through the
    /// buffered aux path, indexed tables append to the data file and then
    /// update the index.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.schema.columns().len() {
            return Err(Error::InvalidValue(format!(
                "INSERT has {} values, table {} has {} columns",
                values.len(),
                self.name,
                self.schema.columns().len(),
            )));
        }

        let coerced = self
            .schema
            .columns()
            .iter()
            .zip(values)
            .map(|(column, value)| value.coerce(&column.ty))
            .collect::<Result<Vec<_>>>()?;
        let row = Row::new(coerced);
        let pk = row.primary_key(&self.schema)?.clone();

        if self.heap.get(&pk)?.is_some() {
            return Err(Error::DuplicateKey(pk.to_string()));
        }

        // coordinates are checked before the heap write, so a rejected
        // spatial insert leaves no orphan row behind
        if let Some(spatial) = self.index.as_spatial() {
            spatial.validate_row(&row)?;
        }

        if matches!(self.descriptor, IndexDescriptor::Sequential) {
            self.heap.insert(&row)
        } else {
            let offset = self.heap.append(&row)?;
            self.index.insert(&row, &pk, offset)
        }
    }

    /// Tombstones the row whose primary key equals `value`, then removes it
    /// from the index.
    ///
    /// Deleting by any other column is rejected.
    pub fn delete(&mut self, column: &str, value: &Value) -> Result<()> {
        let pk_column = self.schema.primary_key().name.clone();
        if column != pk_column {
            return Err(Error::DeleteRequiresPrimaryKey(column.to_owned()));
        }

        let pk = value.coerce(&self.schema.primary_key().ty)?;
        let Some((slot, row)) = self.heap.locate(&pk)? else {
            return Err(Error::KeyNotFound);
        };

        self.heap.delete_slot(slot)?;

        let offset = match slot {
            Slot::Data(offset) | Slot::Aux(offset) => offset,
        };
        self.index.remove(&row, &pk, offset)
    }

    /// All live rows in file order.
    pub fn select_all(&self) -> Result<Vec<Row>> {
        self.heap.scan()
    }

    /// Equality select, dispatched per the predicate column:
    /// indexed column -> index, primary key -> heap search, else full scan.
    pub fn select_eq(&self, column: &str, value: &Value) -> Result<Vec<Row>> {
        let ty = self.schema.column_type(column)?;
        let value = value.coerce(ty)?;

        if self.index.column() == Some(column) {
            if let Some(hits) = self.index.get(&value)? {
                return self.resolve(hits);
            }
        }

        if column == self.schema.primary_key().name {
            return Ok(self.heap.get(&value)?.into_iter().collect());
        }

        let idx = self.schema.column_index(column)?;
        Ok(self
            .heap
            .scan()?
            .into_iter()
            .filter(|row| row.values.get(idx) == Some(&value))
            .collect())
    }

    /// Inclusive range select, dispatched like [`Table::select_eq`].
    pub fn select_between(&self, column: &str, lo: &Value, hi: &Value) -> Result<Vec<Row>> {
        let ty = self.schema.column_type(column)?;
        let lo = lo.coerce(ty)?;
        let hi = hi.coerce(ty)?;

        if self.index.column() == Some(column) {
            if let Some(hits) = self.index.get_range(&lo, &hi)? {
                return self.resolve(hits);
            }
        }

        if column == self.schema.primary_key().name {
            return self.heap.range(&lo, &hi);
        }

        let idx = self.schema.column_index(column)?;
        Ok(self
            .heap
            .scan()?
            .into_iter()
            .filter(|row| {
                row.values
                    .get(idx)
                    .is_some_and(|v| &lo <= v && v <= &hi)
            })
            .collect())
    }

    /// The `k` nearest rows to `(x, y)`, with distances in km.
    pub fn knn(&self, x: f64, y: f64, k: usize) -> Result<Vec<(Row, f64)>> {
        self.index
            .as_spatial()
            .ok_or_else(|| Error::NotSpatial(self.name.clone()))?
            .knn(x, y, k)
    }

    /// All rows within `radius_km` of `(x, y)`, with distances in km.
    pub fn within(&self, x: f64, y: f64, radius_km: f64) -> Result<Vec<(Row, f64)>> {
        self.index
            .as_spatial()
            .ok_or_else(|| Error::NotSpatial(self.name.clone()))?
            .range(x, y, radius_km)
    }

    /// Turns index hits into live rows, dropping hits whose heap row is
    /// gone or tombstoned (a stale index entry is harmless, not fatal).
    fn resolve(&self, hits: IndexHits) -> Result<Vec<Row>> {
        match hits {
            IndexHits::PrimaryKeys(pks) => {
                let mut rows = Vec::with_capacity(pks.len());
                for pk in pks {
                    if let Some(row) = self.heap.get(&pk)? {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
            IndexHits::Offsets(offsets) => {
                let mut rows = Vec::with_capacity(offsets.len());
                for offset in offsets {
                    let row = self.heap.read_at(offset)?;
                    if !row.deleted {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
        }
    }
}
