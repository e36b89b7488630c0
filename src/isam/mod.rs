// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Two-level static ISAM index with overflow chaining.
//!
//! The index metadata (`split_keys`, `leaf_offsets`) lives in a tiny JSON
//! file that is rewritten atomically; the pages live in an append-only
//! binary log. A page is never modified on disk: every change appends a
//! fresh copy and the metadata (or the chain pointing at it) is switched
//! over, so a torn write leaves only unreachable bytes behind.

mod page;

pub use page::Page;

use crate::coding::{Decode, Encode};
use crate::file::rewrite_atomic;
use crate::value::Value;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Default number of entries per leaf page.
pub const DEFAULT_LEAF_CAPACITY: usize = 128;

#[derive(Serialize, Deserialize)]
struct IsamMeta {
    split_keys: Vec<Value>,
    leaf_offsets: Vec<u64>,
}

/// Two-level ISAM index mapping keys to heap byte offsets.
///
/// A key `k` lives in the leaf at `partition_point(split_keys, <= k)` or
/// somewhere on that leaf's overflow chain.
pub struct Isam {
    meta_path: PathBuf,
    data_path: PathBuf,
    leaf_capacity: usize,
    split_keys: Vec<Value>,
    leaf_offsets: Vec<u64>,
}

impl Isam {
    /// Opens the index, loading existing metadata or creating empty files.
    pub fn open(meta_path: PathBuf, data_path: PathBuf, leaf_capacity: usize) -> Result<Self> {
        let mut isam = Self {
            meta_path,
            data_path,
            leaf_capacity,
            split_keys: Vec::new(),
            leaf_offsets: Vec::new(),
        };

        if isam.meta_path.try_exists()? {
            let bytes = std::fs::read(&isam.meta_path)?;
            let meta: IsamMeta = serde_json::from_slice(&bytes)?;
            isam.split_keys = meta.split_keys;
            isam.leaf_offsets = meta.leaf_offsets;
        } else {
            isam.write_meta()?;
        }
        crate::file::touch(&isam.data_path)?;

        Ok(isam)
    }

    /// Whether any leaf pages have been built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_offsets.is_empty()
    }

    /// The split keys demarcating leaf ranges.
    #[must_use]
    pub fn split_keys(&self) -> &[Value] {
        &self.split_keys
    }

    /// The live leaf page offsets, in key order.
    #[must_use]
    pub fn leaf_offsets(&self) -> &[u64] {
        &self.leaf_offsets
    }

    fn write_meta(&self) -> Result<()> {
        let meta = IsamMeta {
            split_keys: self.split_keys.clone(),
            leaf_offsets: self.leaf_offsets.clone(),
        };
        let bytes = serde_json::to_vec(&meta)?;
        rewrite_atomic(&self.meta_path, &bytes)?;
        Ok(())
    }

    fn read_page(&self, ptr: u64) -> Result<Page> {
        let mut file = std::fs::File::open(&self.data_path)?;
        file.seek(SeekFrom::Start(ptr))?;
        let mut reader = std::io::BufReader::new(file);
        Ok(Page::decode_from(&mut reader)?)
    }

    fn write_page(&self, page: &Page) -> Result<u64> {
        let bytes = page.encode_into_vec()?;
        let mut file = std::fs::OpenOptions::new().append(true).open(&self.data_path)?;
        let ptr = file.seek(SeekFrom::End(0))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(ptr)
    }

    /// Bulk-builds the two levels from `(key, offset)` pairs sorted by key.
    ///
    /// `split_keys[i]` becomes the first key of leaf `i + 1`.
    pub fn build(&mut self, pairs: &[(Value, u64)]) -> Result<()> {
        self.split_keys.clear();
        self.leaf_offsets.clear();

        for chunk in pairs.chunks(self.leaf_capacity) {
            let mut page = Page::new(self.leaf_capacity);
            for (key, offset) in chunk {
                page.keys.push(key.clone());
                page.offsets.push(*offset);
            }
            let ptr = self.write_page(&page)?;
            self.leaf_offsets.push(ptr);
            if let Some(first) = page.keys.first() {
                self.split_keys.push(first.clone());
            }
        }

        if !self.split_keys.is_empty() {
            self.split_keys.remove(0);
        }

        self.write_meta()
    }

    fn find_leaf_index(&self, key: &Value) -> usize {
        self.split_keys.partition_point(|k| k <= key)
    }

    /// Reads the primary page of the leaf covering `key` plus its chain.
    fn read_chain(&self, leaf_idx: usize) -> Result<Vec<(u64, Page)>> {
        let mut chain = vec![];
        let Some(mut ptr) = self.leaf_offsets.get(leaf_idx).copied() else {
            return Ok(chain);
        };

        loop {
            let page = self.read_page(ptr)?;
            let next = page.overflow_ptr;
            chain.push((ptr, page));
            match next {
                Some(next) => ptr = next,
                None => break,
            }
        }

        Ok(chain)
    }

    /// Looks up the first offset stored under `key`, scanning the primary
    /// page and then its overflow chain.
    pub fn search(&self, key: &Value) -> Result<Option<u64>> {
        if self.leaf_offsets.is_empty() {
            log::debug!("isam {:?}: no leaf pages built yet", self.meta_path);
            return Ok(None);
        }

        for (_, page) in self.read_chain(self.find_leaf_index(key))? {
            if let Some(offset) = page.lookup(key) {
                return Ok(Some(offset));
            }
        }

        Ok(None)
    }

    /// Returns all `(key, offset)` pairs with key in `[lo, hi]`, walking
    /// leaves (and their chains) from the leaf covering `lo` until a primary
    /// page's maximum key exceeds `hi`.
    pub fn range(&self, lo: &Value, hi: &Value) -> Result<Vec<(Value, u64)>> {
        let mut result = vec![];
        if self.leaf_offsets.is_empty() {
            return Ok(result);
        }

        let start = self.split_keys.partition_point(|k| k <= lo);

        for leaf_idx in start..self.leaf_offsets.len() {
            let chain = self.read_chain(leaf_idx)?;
            let primary_max = chain
                .first()
                .and_then(|(_, page)| page.keys.last())
                .cloned();

            for (_, page) in &chain {
                for (k, o) in page.keys.iter().zip(&page.offsets) {
                    if lo <= k && k <= hi {
                        result.push((k.clone(), *o));
                    }
                }
            }

            if primary_max.is_some_and(|max| max > *hi) {
                break;
            }
        }

        Ok(result)
    }

    /// Inserts a `(key, offset)` pair.
    ///
    /// A non-full primary page is rewritten (appended) in place; a full one
    /// grows an overflow page at the head of its chain. The metadata switch
    /// at the end publishes the change atomically.
    pub fn add(&mut self, key: Value, offset: u64) -> Result<()> {
        if self.leaf_offsets.is_empty() {
            let mut page = Page::new(self.leaf_capacity);
            page.insert(key, offset);
            let ptr = self.write_page(&page)?;
            self.leaf_offsets.push(ptr);
            return self.write_meta();
        }

        let leaf_idx = self.find_leaf_index(&key);
        let ptr = *self.leaf_offsets.get(leaf_idx).expect("leaf index in range");
        let mut primary = self.read_page(ptr)?;

        if primary.is_full() {
            // insert into the head overflow page, or start a fresh one
            // chained in front of the existing chain
            let mut target = match primary.overflow_ptr {
                Some(head_ptr) => {
                    let head = self.read_page(head_ptr)?;
                    if head.is_full() {
                        let mut fresh = Page::new(primary.capacity);
                        fresh.overflow_ptr = Some(head_ptr);
                        fresh
                    } else {
                        head
                    }
                }
                None => Page::new(primary.capacity),
            };
            target.insert(key, offset);
            primary.overflow_ptr = Some(self.write_page(&target)?);
        } else {
            primary.insert(key, offset);
        }

        let new_ptr = self.write_page(&primary)?;
        if let Some(slot) = self.leaf_offsets.get_mut(leaf_idx) {
            *slot = new_ptr;
        }
        self.write_meta()
    }

    /// Removes the exact `(key, offset)` pair; rewrites the surviving page
    /// and relinks the chain in front of it. Returns whether a pair was
    /// removed.
    pub fn remove(&mut self, key: &Value, offset: u64) -> Result<bool> {
        if self.leaf_offsets.is_empty() {
            return Ok(false);
        }

        let leaf_idx = self.find_leaf_index(key);
        let mut chain = self.read_chain(leaf_idx)?;

        let Some(hit) = chain
            .iter_mut()
            .position(|(_, page)| page.delete(key, offset))
        else {
            return Ok(false);
        };

        // rewrite the surviving page, then cascade the new pointer through
        // every page in front of it
        let mut new_ptr = {
            let (_, page) = chain.get(hit).expect("hit index in range");
            self.write_page(page)?
        };

        for (_, page) in chain.iter_mut().take(hit).rev() {
            page.overflow_ptr = Some(new_ptr);
            new_ptr = self.write_page(page)?;
        }

        if let Some(slot) = self.leaf_offsets.get_mut(leaf_idx) {
            *slot = new_ptr;
        }
        self.write_meta()?;

        Ok(true)
    }
}
