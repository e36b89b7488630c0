// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file;
use crate::record::Row;
use crate::schema::{ColumnType, Schema};
use crate::table::Table;
use crate::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// The access method a table is bound to at creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexDescriptor {
    /// Heap only: sorted data file plus aux insertion buffer
    Sequential,

    /// B+ tree over one column
    Bplustree {
        /// Indexed column
        column: String,
    },

    /// Two-level ISAM over one column
    Isam {
        /// Indexed column
        column: String,
    },

    /// Extendible hash over one column
    Hash {
        /// Indexed column
        column: String,
    },

    /// R-tree over a two-dimensional point
    Rtree {
        /// Longitude column
        x_column: String,

        /// Latitude column
        y_column: String,

        /// Columns projected into the composite key (tab-joined)
        #[serde(default)]
        key_columns: Vec<String>,
    },
}

/// The `<table>.meta.json` sidecar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    /// Table name
    pub table: String,

    /// Ordered column list
    pub columns: Vec<crate::schema::Column>,

    /// Bound access method
    pub index: IndexDescriptor,

    /// Compact record layout descriptor, e.g. `32sf10s?`
    pub record_format: String,

    /// Fixed record size in bytes
    pub record_size: usize,
}

/// Process-wide registry of open tables, backed by one directory of
/// sidecars, heap files and index files.
pub struct Catalog {
    dir: PathBuf,
    tables: RwLock<FxHashMap<String, Arc<Mutex<Table>>>>,
}

impl Catalog {
    /// Opens a catalog directory, loading every `*.meta.json` sidecar in it.
    ///
    /// Tables whose sidecar or files fail to load are skipped with an error
    /// log instead of poisoning the whole catalog.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let catalog = Self {
            dir,
            tables: RwLock::new(FxHashMap::default()),
        };
        catalog.load_all()?;

        Ok(catalog)
    }

    /// The directory all table files live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_all(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(table_name) = name.strip_suffix(file::META_SIDECAR_SUFFIX) else {
                continue;
            };

            match self.load_table(table_name) {
                Ok(table) => {
                    log::info!("loaded table {table_name}");
                    self.register(table_name, table);
                }
                Err(e) => {
                    log::error!("skipping table {table_name}: {e}");
                }
            }
        }
        Ok(())
    }

    fn load_table(&self, name: &str) -> Result<Table> {
        let bytes = std::fs::read(file::meta_file(&self.dir, name))?;
        let meta: TableMeta = serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedSidecar(format!("{name}: {e}")))?;
        Table::open(&self.dir, meta)
    }

    fn register(&self, name: &str, table: Table) -> Arc<Mutex<Table>> {
        let table = Arc::new(Mutex::new(table));
        self.tables
            .write()
            .expect("lock is poisoned")
            .insert(name.to_owned(), table.clone());
        table
    }

    /// Returns the handle of an open table.
    pub fn get(&self, name: &str) -> Result<Arc<Mutex<Table>>> {
        self.tables
            .read()
            .expect("lock is poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))
    }

    /// Whether a table of that name is open.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables
            .read()
            .expect("lock is poisoned")
            .contains_key(name)
    }

    /// Names of all open tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .expect("lock is poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Creates a table: writes the sidecar atomically, creates the heap
    /// files, bulk-writes `rows` and bulk-builds the index.
    ///
    /// Rows with duplicate primary keys are skipped with a warning.
    /// Sequential tables are written in primary key order (their
    /// reorganized form); all others keep insertion order so record ids
    /// and byte offsets are stable.
    pub fn create(
        &self,
        name: &str,
        schema: &Schema,
        descriptor: IndexDescriptor,
        rows: Vec<Row>,
    ) -> Result<Arc<Mutex<Table>>> {
        if self.contains(name) || file::meta_file(&self.dir, name).try_exists()? {
            return Err(Error::TableExists(name.to_owned()));
        }

        let descriptor = validate_descriptor(descriptor, schema)?;

        let meta = TableMeta {
            table: name.to_owned(),
            columns: schema.columns().to_vec(),
            index: descriptor,
            record_format: schema.record_format(),
            record_size: schema.record_size(),
        };
        file::rewrite_atomic(
            &file::meta_file(&self.dir, name),
            &serde_json::to_vec_pretty(&meta)?,
        )?;

        self.bulk_write(name, schema, &meta.index, rows)?;

        let table = Table::open(&self.dir, meta)?;
        Ok(self.register(name, table))
    }

    fn bulk_write(
        &self,
        name: &str,
        schema: &Schema,
        descriptor: &IndexDescriptor,
        rows: Vec<Row>,
    ) -> Result<()> {
        let mut seen = FxHashSet::default();
        let mut unique = Vec::with_capacity(rows.len());
        for row in rows {
            let pk = row.primary_key(schema)?.to_string();
            if seen.insert(pk.clone()) {
                unique.push(row);
            } else {
                log::warn!("table {name}: skipping duplicate primary key {pk}");
            }
        }

        if matches!(descriptor, IndexDescriptor::Sequential) {
            unique.sort_by(|a, b| {
                let (Ok(a), Ok(b)) = (a.primary_key(schema), b.primary_key(schema)) else {
                    return std::cmp::Ordering::Equal;
                };
                a.cmp(b)
            });
        }

        let mut buf = Vec::with_capacity(unique.len() * schema.record_size());
        for row in &unique {
            buf.extend_from_slice(&row.encode(schema)?);
        }

        std::fs::write(file::data_file(&self.dir, name), buf)?;
        file::touch(&file::aux_file(&self.dir, name))?;

        Ok(())
    }
}

fn validate_descriptor(descriptor: IndexDescriptor, schema: &Schema) -> Result<IndexDescriptor> {
    match descriptor {
        IndexDescriptor::Sequential => Ok(IndexDescriptor::Sequential),
        IndexDescriptor::Bplustree { column } => {
            schema.column_index(&column)?;
            Ok(IndexDescriptor::Bplustree { column })
        }
        IndexDescriptor::Isam { column } => {
            schema.column_index(&column)?;
            Ok(IndexDescriptor::Isam { column })
        }
        IndexDescriptor::Hash { column } => {
            schema.column_index(&column)?;
            Ok(IndexDescriptor::Hash { column })
        }
        IndexDescriptor::Rtree {
            x_column,
            y_column,
            mut key_columns,
        } => {
            schema.column_index(&x_column)?;
            schema.column_index(&y_column)?;

            if key_columns.is_empty() {
                // default composite key: the textual columns that are not
                // coordinates, falling back to the primary key
                key_columns = schema
                    .columns()
                    .iter()
                    .filter(|c| matches!(c.ty, ColumnType::Varchar(_) | ColumnType::Date))
                    .filter(|c| c.name != x_column && c.name != y_column)
                    .map(|c| c.name.clone())
                    .collect();
                if key_columns.is_empty() {
                    key_columns = vec![schema.primary_key().name.clone()];
                }
            } else {
                for column in &key_columns {
                    schema.column_index(column)?;
                }
            }

            Ok(IndexDescriptor::Rtree {
                x_column,
                y_column,
                key_columns,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::value::Value;
    use test_log::test;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Varchar(8)),
            Column::new("price", ColumnType::Float),
        ])
        .expect("valid schema")
    }

    #[test]
    fn create_then_reopen() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        {
            let catalog = Catalog::open(dir.path())?;
            catalog.create(
                "products",
                &schema(),
                IndexDescriptor::Bplustree {
                    column: "price".into(),
                },
                vec![
                    Row::new(vec![Value::Str("a".into()), Value::Float(10.0)]),
                    Row::new(vec![Value::Str("b".into()), Value::Float(20.0)]),
                ],
            )?;
            assert!(catalog.contains("products"));
        }

        let catalog = Catalog::open(dir.path())?;
        assert_eq!(vec!["products".to_owned()], catalog.table_names());

        let table = catalog.get("products")?;
        let table = table.lock().expect("lock is poisoned");
        assert_eq!(2, table.select_all()?.len());

        Ok(())
    }

    #[test]
    fn duplicate_table_is_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::open(dir.path())?;

        catalog.create("t", &schema(), IndexDescriptor::Sequential, vec![])?;
        let result = catalog.create("t", &schema(), IndexDescriptor::Sequential, vec![]);
        assert!(matches!(result, Err(Error::TableExists(_))));

        Ok(())
    }

    #[test]
    fn unknown_table_is_not_found() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::open(dir.path())?;

        assert!(matches!(
            catalog.get("nope"),
            Err(Error::TableNotFound(_)),
        ));

        Ok(())
    }

    #[test]
    fn descriptor_validation_catches_bad_columns() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::open(dir.path())?;

        let result = catalog.create(
            "t",
            &schema(),
            IndexDescriptor::Isam {
                column: "nope".into(),
            },
            vec![],
        );
        assert!(matches!(result, Err(Error::ColumnNotFound(_))));

        Ok(())
    }

    #[test]
    fn sidecar_shape() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::open(dir.path())?;
        catalog.create(
            "t",
            &schema(),
            IndexDescriptor::Hash {
                column: "id".into(),
            },
            vec![],
        )?;

        let bytes = std::fs::read(dir.path().join("t.meta.json"))?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)?;

        assert_eq!("t", json["table"]);
        assert_eq!("hash", json["index"]["type"]);
        assert_eq!("id", json["index"]["column"]);
        assert_eq!("8sf?", json["record_format"]);
        assert_eq!(13, json["record_size"]);

        Ok(())
    }
}
