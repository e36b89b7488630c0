// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur in the engine
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// JSON (de)serialization of a sidecar file failed
    Json(serde_json::Error),

    /// CSV ingestion failed
    Csv(csv::Error),

    /// A record buffer did not have the exact record size (got, expected)
    InvalidRecord(usize, usize),

    /// Unknown column type name in a schema or sidecar
    UnknownType(String),

    /// A table sidecar could not be interpreted
    MalformedSidecar(String),

    /// Insert would create a second live row with the same primary key
    DuplicateKey(String),

    /// Coordinates outside of [-180, 180] x [-90, 90], or not finite (x, y)
    InvalidCoordinates(f64, f64),

    /// No such table in the catalog
    TableNotFound(String),

    /// A table with that name already exists
    TableExists(String),

    /// No such column in the table schema
    ColumnNotFound(String),

    /// Spatial predicate on a table without an R-tree index
    NotSpatial(String),

    /// DELETE predicate names a column other than the primary key
    DeleteRequiresPrimaryKey(String),

    /// SQL statement could not be parsed
    Sql(String),

    /// A value could not be coerced or interpreted
    InvalidValue(String),

    /// No live row matched the key
    KeyNotFound,
}

impl Error {
    /// HTTP-style status code this error maps to in a [`crate::Response`].
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::UnknownType(_)
            | Self::DuplicateKey(_)
            | Self::InvalidCoordinates(..)
            | Self::TableNotFound(_)
            | Self::TableExists(_)
            | Self::ColumnNotFound(_)
            | Self::NotSpatial(_)
            | Self::DeleteRequiresPrimaryKey(_)
            | Self::Sql(_)
            | Self::InvalidValue(_) => 400,
            Self::KeyNotFound => 404,
            _ => 500,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Engine result
pub type Result<T> = std::result::Result<T, Error>;
