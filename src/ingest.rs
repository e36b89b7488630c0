// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CSV ingestion: reads a whole file, infers a column schema from the
//! cells and coerces every row to it.

use crate::record::Row;
use crate::schema::{Column, ColumnType, Schema};
use crate::value::{parse_float, Value};
use crate::{Error, Result};
use std::path::Path;

/// A parsed CSV file: inferred schema plus coerced rows in file order.
pub struct CsvTable {
    /// Inferred column schema
    pub schema: Schema,

    /// Rows, coerced to the schema
    pub rows: Vec<Row>,
}

/// Reads a CSV file with a header row and infers the table schema.
///
/// Well-known column names decide first: `id` is `VARCHAR[32]`, `price` is
/// FLOAT, `date` (or anything containing `fecha`) is DATE. Every other
/// column is sniffed from its cells: INT if every non-empty cell parses as
/// one, else FLOAT (after currency cleaning), else DATE if every non-empty
/// cell looks like `YYYY-MM-DD`, else VARCHAR sized by the longest cell
/// (tiers 30/50/100/200).
pub fn read_csv(path: &Path) -> Result<CsvTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(std::borrow::ToOwned::to_owned)
        .collect();

    let mut cells: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        cells.push(record.iter().map(std::borrow::ToOwned::to_owned).collect());
    }

    if cells.is_empty() {
        return Err(Error::InvalidValue(format!("{} has no data rows", path.display())));
    }

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let column_cells = cells.iter().filter_map(|row| row.get(idx));
            Column::new(name.clone(), infer_type(name, column_cells))
        })
        .collect();
    let schema = Schema::new(columns)?;

    let mut rows = Vec::with_capacity(cells.len());
    for raw in cells {
        let values = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let cell = raw.get(idx).map(String::as_str).unwrap_or_default();
                coerce_cell(cell, &column.ty)
            })
            .collect();
        rows.push(Row::new(values));
    }

    log::info!(
        "ingested {} rows x {} columns from {}",
        rows.len(),
        schema.columns().len(),
        path.display(),
    );

    Ok(CsvTable { schema, rows })
}

fn infer_type<'a>(name: &str, cells: impl Iterator<Item = &'a String> + Clone) -> ColumnType {
    // well-known names win over whatever the cells contain
    if name.eq_ignore_ascii_case("id") {
        return ColumnType::Varchar(32);
    }
    if name.eq_ignore_ascii_case("price") {
        return ColumnType::Float;
    }
    if name.eq_ignore_ascii_case("date") || name.to_lowercase().contains("fecha") {
        return ColumnType::Date;
    }

    let non_empty = || cells.clone().filter(|c| !c.trim().is_empty());
    let mut probe = non_empty().peekable();
    if probe.peek().is_some() {
        if non_empty().all(|c| c.trim().parse::<i32>().is_ok()) {
            return ColumnType::Int;
        }
        if non_empty().all(|c| parse_float(c).is_some()) {
            return ColumnType::Float;
        }
        if non_empty().all(|c| is_date_like(c.trim())) {
            return ColumnType::Date;
        }
    }

    let longest = cells.map(|c| c.len()).max().unwrap_or(0);
    ColumnType::Varchar(match longest {
        0..=30 => 30,
        31..=50 => 50,
        51..=100 => 100,
        _ => 200,
    })
}

fn is_date_like(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                _ => b.is_ascii_digit(),
            })
}

fn coerce_cell(cell: &str, ty: &ColumnType) -> Value {
    match ty {
        ColumnType::Int => Value::Int(cell.trim().parse().unwrap_or_else(|_| {
            if !cell.trim().is_empty() {
                log::warn!("cell {cell:?} is not an INT, storing 0");
            }
            0
        })),
        ColumnType::Float => Value::Float(parse_float(cell).unwrap_or_else(|| {
            if !cell.trim().is_empty() {
                log::warn!("cell {cell:?} is not a FLOAT, storing 0.0");
            }
            0.0
        })),
        ColumnType::Date => Value::Date(cell.trim().to_owned()),
        ColumnType::Varchar(_) => Value::Str(cell.to_owned()),
    }
}
