// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! R-tree backed spatial index over two-dimensional point rows.
//!
//! Keeps three in-memory structures per table: the R-tree itself (point
//! entries keyed by record id), a record id to row store, and a composite
//! key multimap (tab-joined key-column projection to record ids). The heap
//! is the persistent form; the index is rebuilt from it on open.
//!
//! Radius queries prune with a degree bounding box and refine candidates
//! by haversine distance; kNN is defined by the brute-force scan over all
//! live rows, ties broken by insertion order.

pub mod geo;

use crate::record::Row;
use crate::schema::Schema;
use crate::value::Value;
use crate::{Error, Result};
use geo::{haversine_km, valid_coordinates, KM_PER_DEGREE};
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;

/// One R-tree entry: a heap record id at a point.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialEntry {
    /// Record id, assigned in insertion order
    pub id: u64,

    /// `(x, y)` a.k.a. `(lon, lat)`
    pub point: [f64; 2],
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Spatial index over the rows of one table.
pub struct SpatialIndex {
    x_idx: usize,
    y_idx: usize,
    key_idxs: Vec<usize>,
    tree: RTree<SpatialEntry>,
    rows: FxHashMap<u64, Row>,
    keys: FxHashMap<String, Vec<u64>>,
    next_id: u64,
}

impl SpatialIndex {
    /// Creates an empty index for the given coordinate and key columns.
    pub fn new(schema: &Schema, x_column: &str, y_column: &str, key_columns: &[String]) -> Result<Self> {
        let x_idx = schema.column_index(x_column)?;
        let y_idx = schema.column_index(y_column)?;
        let key_idxs = key_columns
            .iter()
            .map(|name| schema.column_index(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            x_idx,
            y_idx,
            key_idxs,
            tree: RTree::new(),
            rows: FxHashMap::default(),
            keys: FxHashMap::default(),
            next_id: 0,
        })
    }

    /// Number of live rows in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the index holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn point_of(&self, row: &Row) -> Result<[f64; 2]> {
        let coord = |idx: usize| -> f64 {
            match row.values.get(idx) {
                Some(Value::Float(f)) => f64::from(*f),
                Some(Value::Int(i)) => f64::from(*i),
                _ => f64::NAN,
            }
        };
        let (x, y) = (coord(self.x_idx), coord(self.y_idx));
        if valid_coordinates(x, y) {
            Ok([x, y])
        } else {
            Err(Error::InvalidCoordinates(x, y))
        }
    }

    /// The tab-joined key-column projection of a row.
    #[must_use]
    pub fn composite_key(&self, row: &Row) -> String {
        self.key_idxs
            .iter()
            .filter_map(|idx| row.values.get(*idx))
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// Checks that a row's coordinates would be accepted, without
    /// inserting it.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        self.point_of(row).map(|_| ())
    }

    /// Inserts one row; rejects invalid coordinates.
    pub fn add(&mut self, row: Row) -> Result<u64> {
        let point = self.point_of(&row)?;

        let id = self.next_id;
        self.next_id += 1;

        self.tree.insert(SpatialEntry { id, point });
        self.keys.entry(self.composite_key(&row)).or_default().push(id);
        self.rows.insert(id, row);

        Ok(id)
    }

    /// Bulk-inserts rows, skipping (and logging) rows with invalid
    /// coordinates instead of failing the whole batch.
    pub fn add_batch(&mut self, rows: Vec<Row>) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            match self.add(row) {
                Ok(id) => ids.push(id),
                Err(Error::InvalidCoordinates(x, y)) => {
                    log::warn!("skipping row with invalid coordinates ({x}, {y})");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    /// Record ids stored under a composite key.
    #[must_use]
    pub fn search_key(&self, key: &str) -> &[u64] {
        self.keys.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Removes the indexed copy of `row` (matched by composite key and
    /// stored row equality). Returns whether anything was removed.
    pub fn remove(&mut self, row: &Row) -> bool {
        let key = self.composite_key(row);
        let Some(ids) = self.keys.get(&key) else {
            return false;
        };

        let Some(&id) = ids.iter().find(|&&id| {
            self.rows
                .get(&id)
                .is_some_and(|stored| stored.values == row.values)
        }) else {
            return false;
        };

        let Some(stored) = self.rows.remove(&id) else {
            return false;
        };

        if let Ok(point) = self.point_of(&stored) {
            self.tree.remove(&SpatialEntry { id, point });
        }

        if let Some(ids) = self.keys.get_mut(&key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.keys.remove(&key);
            }
        }

        true
    }

    /// All rows within `radius_km` of `(x, y)`, ascending by distance
    /// (ties by insertion order), each with its distance.
    ///
    /// Candidates come from an R-tree bounding-box query
    /// (`radius_km / 111` degrees) and are refined by haversine distance.
    pub fn range(&self, x: f64, y: f64, radius_km: f64) -> Result<Vec<(Row, f64)>> {
        if !valid_coordinates(x, y) {
            return Err(Error::InvalidCoordinates(x, y));
        }

        let radius_deg = radius_km / KM_PER_DEGREE;
        let envelope = AABB::from_corners(
            [x - radius_deg, y - radius_deg],
            [x + radius_deg, y + radius_deg],
        );

        let mut hits: Vec<(u64, f64)> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| {
                let distance = haversine_km([x, y], entry.point);
                (distance <= radius_km).then_some((entry.id, distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(self.resolve(hits))
    }

    /// The `k` nearest rows to `(x, y)` by haversine distance, ties broken
    /// by insertion order, each with its distance.
    pub fn knn(&self, x: f64, y: f64, k: usize) -> Result<Vec<(Row, f64)>> {
        if !valid_coordinates(x, y) {
            return Err(Error::InvalidCoordinates(x, y));
        }

        let mut hits: Vec<(u64, f64)> = self
            .rows
            .iter()
            .filter_map(|(id, row)| {
                let point = self.point_of(row).ok()?;
                Some((*id, haversine_km([x, y], point)))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);

        Ok(self.resolve(hits))
    }

    fn resolve(&self, hits: Vec<(u64, f64)>) -> Vec<(Row, f64)> {
        hits.into_iter()
            .filter_map(|(id, distance)| self.rows.get(&id).map(|row| (row.clone(), distance)))
            .collect()
    }
}
