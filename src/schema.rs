// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Width of a DATE column on disk.
pub const DATE_WIDTH: usize = 10;

/// Column type of the restricted SQL dialect.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// 32-bit signed integer, 4 bytes
    Int,

    /// 32-bit float, 4 bytes
    Float,

    /// Textual date, 10 bytes
    Date,

    /// Fixed-capacity string, `n` bytes, space-padded
    Varchar(usize),
}

impl ColumnType {
    /// On-disk width of this type in bytes.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::Int | Self::Float => 4,
            Self::Date => DATE_WIDTH,
            Self::Varchar(n) => *n,
        }
    }

    /// Single-column code in the sidecar's `record_format` string.
    #[must_use]
    pub fn format_code(&self) -> String {
        match self {
            Self::Int => "i".into(),
            Self::Float => "f".into(),
            Self::Date => format!("{DATE_WIDTH}s"),
            Self::Varchar(n) => format!("{n}s"),
        }
    }

    /// Parses a type name like `INT` or `VARCHAR[32]`.
    pub fn parse(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "INT" => return Ok(Self::Int),
            "FLOAT" => return Ok(Self::Float),
            "DATE" => return Ok(Self::Date),
            _ => {}
        }
        if let Some(rest) = upper.strip_prefix("VARCHAR[") {
            if let Some(n) = rest.strip_suffix(']') {
                let n: usize = n
                    .trim()
                    .parse()
                    .map_err(|_| Error::UnknownType(s.to_owned()))?;
                if n > 0 {
                    return Ok(Self::Varchar(n));
                }
            }
        }
        Err(Error::UnknownType(s.to_owned()))
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Date => write!(f, "DATE"),
            Self::Varchar(n) => write!(f, "VARCHAR[{n}]"),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

/// A named, typed column.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl Column {
    /// Creates a new column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered column list of a table, driving the fixed-width record layout.
///
/// The primary key is the column named `id` if one exists, the first
/// column otherwise.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    pk: usize,
}

impl Schema {
    /// Creates a schema from a column list.
    ///
    /// # Errors
    ///
    /// Fails if the column list is empty or contains duplicate names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidValue("table needs at least one column".into()));
        }

        for (i, col) in columns.iter().enumerate() {
            if columns
                .iter()
                .skip(i + 1)
                .any(|other| other.name == col.name)
            {
                return Err(Error::InvalidValue(format!(
                    "duplicate column name: {}",
                    col.name,
                )));
            }
        }

        let pk = columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case("id"))
            .unwrap_or(0);

        Ok(Self { columns, pk })
    }

    /// The ordered column list.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Index of the primary key column.
    #[must_use]
    pub fn primary_key_index(&self) -> usize {
        self.pk
    }

    /// The primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &Column {
        self.columns
            .get(self.pk)
            .expect("pk index is validated in the constructor")
    }

    /// Looks up a column position by name.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_owned()))
    }

    /// Looks up a column type by name.
    pub fn column_type(&self, name: &str) -> Result<&ColumnType> {
        let idx = self.column_index(name)?;
        Ok(&self
            .columns
            .get(idx)
            .expect("index comes from column_index")
            .ty)
    }

    /// Byte size of one record: the column widths plus the tombstone byte.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.columns.iter().map(|c| c.ty.width()).sum::<usize>() + 1
    }

    /// Compact layout descriptor stored in the sidecar, e.g. `32sf10s?`.
    #[must_use]
    pub fn record_format(&self) -> String {
        let mut s: String = self.columns.iter().map(|c| c.ty.format_code()).collect();
        s.push('?');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn type_parse_roundtrip() -> crate::Result<()> {
        for s in ["INT", "FLOAT", "DATE", "VARCHAR[32]"] {
            assert_eq!(s, ColumnType::parse(s)?.to_string());
        }
        assert!(ColumnType::parse("BLOB").is_err());
        assert!(ColumnType::parse("VARCHAR[0]").is_err());
        Ok(())
    }

    #[test]
    fn record_size_and_format() -> crate::Result<()> {
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Varchar(32)),
            Column::new("price", ColumnType::Float),
            Column::new("added", ColumnType::Date),
        ])?;

        assert_eq!(32 + 4 + 10 + 1, schema.record_size());
        assert_eq!("32sf10s?", schema.record_format());
        assert_eq!("id", schema.primary_key().name);

        Ok(())
    }

    #[test]
    fn primary_key_defaults_to_first_column() -> crate::Result<()> {
        let schema = Schema::new(vec![
            Column::new("name", ColumnType::Varchar(30)),
            Column::new("population", ColumnType::Int),
        ])?;
        assert_eq!(0, schema.primary_key_index());
        Ok(())
    }

    #[test]
    fn rejects_duplicate_columns() {
        let result = Schema::new(vec![
            Column::new("a", ColumnType::Int),
            Column::new("a", ColumnType::Float),
        ]);
        assert!(result.is_err());
    }
}
