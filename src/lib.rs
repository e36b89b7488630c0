// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A K.I.S.S. miniature relational engine with pluggable secondary indexes.
//!
//! ##### About
//!
//! This crate executes a restricted SQL dialect over tables persisted as
//! fixed-width binary records. Each table is bound at creation time to
//! exactly one access method:
//!
//! - a sequential heap with an auxiliary insertion buffer and periodic
//!   merge-reorganization,
//! - an in-memory B+ tree with linked leaves, persisted as a whole-image
//!   snapshot,
//! - an on-disk two-level ISAM with overflow chains,
//! - an extendible hash index over per-bucket files, or
//! - an R-tree for two-dimensional point data (radius and kNN queries,
//!   refined by haversine distance).
//!
//! Tables are created from CSV files (with column type inference) or from
//! explicit column lists; metadata lives in JSON sidecars next to the heap
//! files, so a catalog directory survives process restarts.
//!
//! # Example usage
//!
//! ```
//! use table_engine::Engine;
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! // An engine is a catalog directory plus a SQL entry point
//! let engine = Engine::open(folder.path())?;
//!
//! let response = engine.execute("CREATE TABLE products (id VARCHAR[32], price FLOAT)");
//! assert_eq!(200, response.status);
//!
//! engine.execute("INSERT INTO products VALUES ('widget', 19.99)");
//!
//! let response = engine.execute("SELECT * FROM products WHERE id = 'widget'");
//! assert_eq!(200, response.status);
//! assert!(response.result.is_some());
//! #
//! # Ok::<(), table_engine::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]

mod any_index;

pub mod bplus;

mod catalog;

#[doc(hidden)]
pub mod coding;

mod error;

#[doc(hidden)]
pub mod file;

pub mod hash;

mod index;

mod ingest;

pub mod isam;

mod query;

mod record;

mod schema;

pub mod sequential;

pub mod spatial;

mod table;

mod value;

pub use {
    any_index::{AnyIndex, BPlusIndex, HashIndex, IsamIndex, SequentialIndex},
    catalog::{Catalog, IndexDescriptor, TableMeta},
    error::{Error, Result},
    index::{IndexHits, SecondaryIndex},
    query::{parse, Engine, Predicate, Response, Statement},
    record::Row,
    schema::{Column, ColumnType, Schema},
    table::Table,
    value::Value,
};
