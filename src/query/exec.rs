// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::catalog::Catalog;
use crate::ingest;
use crate::query::parser::{parse, Predicate, Statement};
use crate::record::Row;
use crate::schema::Schema;
use crate::table::Table;
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The result envelope of one SQL statement.
#[derive(Debug, Serialize)]
pub struct Response {
    /// HTTP-style status: 200, 400, 404 or 500
    pub status: u16,

    /// Human-readable message (creates, writes and errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Result rows (selects)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Wall-clock execution time, rounded to microseconds
    pub execution_time_seconds: f64,
}

enum Outcome {
    Message(String),
    Rows(Vec<serde_json::Value>),
}

/// The SQL entry point: a catalog plus statement execution.
pub struct Engine {
    catalog: Catalog,
}

impl Engine {
    /// Opens an engine over a catalog directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            catalog: Catalog::open(dir)?,
        })
    }

    /// The underlying catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parses and executes one SQL statement, mapping errors onto the
    /// status codes of the response envelope.
    pub fn execute(&self, sql: &str) -> Response {
        let start = Instant::now();
        let outcome = self.run(sql);
        let elapsed = round_seconds(start.elapsed().as_secs_f64());

        match outcome {
            Ok(Outcome::Message(message)) => Response {
                status: 200,
                message: Some(message),
                result: None,
                execution_time_seconds: elapsed,
            },
            Ok(Outcome::Rows(rows)) => Response {
                status: 200,
                message: None,
                result: Some(serde_json::Value::Array(rows)),
                execution_time_seconds: elapsed,
            },
            Err(e) => {
                log::debug!("query failed: {e}");
                Response {
                    status: e.status(),
                    message: Some(e.to_string()),
                    result: None,
                    execution_time_seconds: elapsed,
                }
            }
        }
    }

    fn run(&self, sql: &str) -> Result<Outcome> {
        match parse(sql)? {
            Statement::CreateTable { table, columns } => {
                let schema = Schema::new(columns)?;
                self.catalog.create(
                    &table,
                    &schema,
                    crate::catalog::IndexDescriptor::Sequential,
                    vec![],
                )?;
                Ok(Outcome::Message(format!("Table '{table}' created")))
            }

            Statement::CreateTableFromFile { table, path, index } => {
                let csv = ingest::read_csv(Path::new(&path))?;
                let row_count = csv.rows.len();
                self.catalog.create(&table, &csv.schema, index, csv.rows)?;
                Ok(Outcome::Message(format!(
                    "Table '{table}' created from {path} ({row_count} rows)",
                )))
            }

            Statement::Select { table, predicate } => {
                let handle = self.catalog.get(&table)?;
                let table = handle.lock().expect("lock is poisoned");
                self.select(&table, predicate)
            }

            Statement::Insert { table, values } => {
                let handle = self.catalog.get(&table)?;
                let mut locked = handle.lock().expect("lock is poisoned");
                locked.insert(values)?;
                Ok(Outcome::Message(format!("Row inserted into '{table}'")))
            }

            Statement::Delete {
                table,
                column,
                value,
            } => {
                let handle = self.catalog.get(&table)?;
                let mut locked = handle.lock().expect("lock is poisoned");
                locked.delete(&column, &value)?;
                Ok(Outcome::Message(format!("Row deleted from '{table}'")))
            }
        }
    }

    fn select(&self, table: &Table, predicate: Option<Predicate>) -> Result<Outcome> {
        let schema = table.schema();

        let rows = match predicate {
            None => plain_rows(schema, table.select_all()?),
            Some(Predicate::Eq { column, value }) => {
                plain_rows(schema, table.select_eq(&column, &value)?)
            }
            Some(Predicate::Between { column, lo, hi }) => {
                plain_rows(schema, table.select_between(&column, &lo, &hi)?)
            }
            Some(Predicate::Knn { x, y, k }) => spatial_rows(schema, table.knn(x, y, k)?),
            Some(Predicate::Within { x, y, radius_km }) => {
                spatial_rows(schema, table.within(x, y, radius_km)?)
            }
        };

        Ok(Outcome::Rows(rows))
    }
}

fn row_object(schema: &Schema, row: &Row) -> serde_json::Map<String, serde_json::Value> {
    schema
        .columns()
        .iter()
        .zip(&row.values)
        .map(|(column, value)| {
            (
                column.name.clone(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect()
}

fn plain_rows(schema: &Schema, rows: Vec<Row>) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|row| serde_json::Value::Object(row_object(schema, row)))
        .collect()
}

fn spatial_rows(schema: &Schema, hits: Vec<(Row, f64)>) -> Vec<serde_json::Value> {
    hits.iter()
        .map(|(row, distance)| {
            let mut object = row_object(schema, row);
            object.insert(
                "distance_km".into(),
                serde_json::to_value(distance).unwrap_or(serde_json::Value::Null),
            );
            serde_json::Value::Object(object)
        })
        .collect()
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn unknown_table_is_400() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path())?;

        let response = engine.execute("SELECT * FROM nope");
        assert_eq!(400, response.status);
        assert!(response.message.is_some());

        Ok(())
    }

    #[test]
    fn bad_sql_is_400() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path())?;

        assert_eq!(400, engine.execute("EXPLAIN things").status);

        Ok(())
    }

    #[test]
    fn create_insert_select_roundtrip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path())?;

        assert_eq!(
            200,
            engine
                .execute("CREATE TABLE p (id VARCHAR[8], price FLOAT)")
                .status,
        );
        assert_eq!(
            200,
            engine.execute("INSERT INTO p VALUES ('a', 9.5)").status,
        );

        let response = engine.execute("SELECT * FROM p WHERE id = 'a'");
        assert_eq!(200, response.status);
        let rows = response.result.expect("select returns rows");
        assert_eq!(serde_json::json!([{"id": "a", "price": 9.5}]), rows);

        Ok(())
    }

    #[test]
    fn duplicate_insert_is_400_and_missing_delete_is_404() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path())?;

        engine.execute("CREATE TABLE p (id VARCHAR[8], price FLOAT)");
        engine.execute("INSERT INTO p VALUES ('a', 9.5)");

        assert_eq!(
            400,
            engine.execute("INSERT INTO p VALUES ('a', 1.0)").status,
        );
        assert_eq!(
            404,
            engine.execute("DELETE FROM p WHERE id = 'zzz'").status,
        );
        assert_eq!(
            400,
            engine.execute("DELETE FROM p WHERE price = 9.5").status,
        );

        Ok(())
    }

    #[test]
    fn spatial_predicate_without_rtree_is_400() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path())?;

        engine.execute("CREATE TABLE p (id VARCHAR[8], x FLOAT, y FLOAT)");
        let response = engine.execute("SELECT * FROM p WHERE KNN((1.0, 2.0), 3)");
        assert_eq!(400, response.status);

        Ok(())
    }
}
