// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Extendible hashing over per-bucket files.
//!
//! The directory file maps a bit-string of length `global_depth` to a
//! bucket file. The bit-string of a key is the low `global_depth` bits of
//! the first 8 bytes of `MD5(key)` rendered most-significant-first, so
//! deepening the directory prepends a bit: doubling prefixes every entry
//! with both `0` and `1`, and all entries sharing a bucket agree on their
//! low `local_depth` bits.

mod bucket;

pub use bucket::Bucket;

use crate::value::Value;
use crate::coding::{Decode, Encode};
use crate::{Error, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Default nominal bucket capacity.
pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Name of the directory file inside the index folder.
pub const DIRECTORY_FILE: &str = "directory.dat";

#[derive(Serialize, Deserialize)]
struct DirectoryFile {
    global_depth: usize,
    bucket_size: usize,
    buckets: BTreeMap<String, String>,
}

/// Extendible hash index mapping keys to values over per-bucket files.
pub struct ExtendibleHash {
    folder: PathBuf,
    bucket_size: usize,
    global_depth: usize,
    directory: BTreeMap<String, String>,
}

impl ExtendibleHash {
    /// Opens the index inside `folder`, creating the initial directory
    /// (`global_depth` 1, buckets `0` and `1`) if none exists.
    pub fn open(folder: PathBuf, bucket_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&folder)?;
        let directory_path = folder.join(DIRECTORY_FILE);

        if directory_path.try_exists()? {
            let bytes = std::fs::read(&directory_path)?;
            let dir: DirectoryFile = serde_json::from_slice(&bytes)?;
            return Ok(Self {
                folder,
                bucket_size: dir.bucket_size,
                global_depth: dir.global_depth,
                directory: dir.buckets,
            });
        }

        let hash = Self {
            folder,
            bucket_size,
            global_depth: 1,
            directory: BTreeMap::from([
                ("0".to_owned(), bucket_file_name("0")),
                ("1".to_owned(), bucket_file_name("1")),
            ]),
        };
        for file in hash.directory.values() {
            hash.save_bucket(file, &Bucket::new(bucket_size))?;
        }
        hash.save_directory()?;

        Ok(hash)
    }

    /// Current directory depth.
    #[must_use]
    pub fn global_depth(&self) -> usize {
        self.global_depth
    }

    /// The directory: bit-string to bucket file name.
    #[must_use]
    pub fn directory(&self) -> &BTreeMap<String, String> {
        &self.directory
    }

    /// The bit-string of `key` at the current directory depth.
    #[must_use]
    pub fn bit_string(&self, key: &Value) -> String {
        bit_string(key, self.global_depth)
    }

    /// Loads the bucket a bit-string maps to.
    pub fn load_bucket(&self, bits: &str) -> Result<Bucket> {
        let file = self
            .directory
            .get(bits)
            .ok_or_else(|| Error::MalformedSidecar(format!("no bucket for bit-string {bits}")))?;
        self.read_bucket_file(file)
    }

    fn read_bucket_file(&self, file: &str) -> Result<Bucket> {
        let bytes = std::fs::read(self.folder.join(file))?;
        Ok(Bucket::decode_from(&mut &bytes[..])?)
    }

    fn save_bucket(&self, file: &str, bucket: &Bucket) -> Result<()> {
        std::fs::write(self.folder.join(file), bucket.encode_into_vec()?)?;
        Ok(())
    }

    fn save_directory(&self) -> Result<()> {
        let dir = DirectoryFile {
            global_depth: self.global_depth,
            bucket_size: self.bucket_size,
            buckets: self.directory.clone(),
        };
        std::fs::write(
            self.folder.join(DIRECTORY_FILE),
            serde_json::to_vec_pretty(&dir)?,
        )?;
        Ok(())
    }

    /// Inserts a `(key, value)` record, splitting the target bucket (and
    /// doubling the directory when the split exceeds the global depth) if
    /// the bucket is full.
    pub fn add(&mut self, key: Value, value: Value) -> Result<()> {
        let bits = self.bit_string(&key);
        let file = self
            .directory
            .get(&bits)
            .ok_or_else(|| Error::MalformedSidecar(format!("no bucket for bit-string {bits}")))?
            .clone();

        let mut bucket = self.read_bucket_file(&file)?;

        if !bucket.is_full() {
            bucket.add(key, value);
            return self.save_bucket(&file, &bucket);
        }

        // split: one more bit discriminates membership
        let mut records = std::mem::take(&mut bucket.records);
        records.push((key, value));
        let new_local = bucket.local_depth + 1;

        if new_local > self.global_depth {
            self.global_depth += 1;
            let mut doubled = BTreeMap::new();
            for (bits, file) in &self.directory {
                doubled.insert(format!("0{bits}"), file.clone());
                doubled.insert(format!("1{bits}"), file.clone());
            }
            self.directory = doubled;
        }

        // the bucket's entries agree on their low (new_local - 1) bits;
        // grab that shared suffix off any entry still pointing at it
        let old_suffix = self
            .directory
            .iter()
            .find(|(_, f)| **f == file)
            .map(|(bits, _)| suffix(bits, new_local - 1).to_owned())
            .ok_or_else(|| Error::MalformedSidecar(format!("dangling bucket file {file}")))?;

        let tag0 = format!("0{old_suffix}");
        let tag1 = format!("1{old_suffix}");
        let file0 = bucket_file_name(&tag0);
        let file1 = bucket_file_name(&tag1);

        let mut b0 = Bucket::new(self.bucket_size);
        let mut b1 = Bucket::new(self.bucket_size);
        b0.local_depth = new_local;
        b1.local_depth = new_local;

        for (k, v) in records {
            let bits = bit_string(&k, self.global_depth);
            if suffix(&bits, new_local) == tag0 {
                b0.add(k, v);
            } else {
                b1.add(k, v);
            }
        }

        for (bits, f) in &mut self.directory {
            if *f == file {
                *f = if suffix(bits, new_local) == tag0 {
                    file0.clone()
                } else {
                    file1.clone()
                };
            }
        }

        std::fs::remove_file(self.folder.join(&file))?;
        self.save_bucket(&file0, &b0)?;
        self.save_bucket(&file1, &b1)?;
        self.save_directory()?;

        log::debug!(
            "split bucket {file} into {file0}/{file1} (local depth {new_local}, global depth {})",
            self.global_depth,
        );

        Ok(())
    }

    /// All values stored under `key`.
    pub fn search(&self, key: &Value) -> Result<Vec<Value>> {
        let bucket = self.load_bucket(&self.bit_string(key))?;
        Ok(bucket.search(key))
    }

    /// All values whose key is in `[lo, hi]`.
    ///
    /// Hashing destroys key order, so this visits every unique bucket file
    /// once.
    pub fn range(&self, lo: &Value, hi: &Value) -> Result<Vec<Value>> {
        let mut result = vec![];
        let unique: BTreeSet<&String> = self.directory.values().collect();
        for file in unique {
            let bucket = self.read_bucket_file(file)?;
            result.extend(bucket.search_range(lo, hi));
        }
        Ok(result)
    }

    /// Removes all records with the given key; returns whether any matched.
    pub fn remove(&mut self, key: &Value) -> Result<bool> {
        let bits = self.bit_string(key);
        let file = self
            .directory
            .get(&bits)
            .ok_or_else(|| Error::MalformedSidecar(format!("no bucket for bit-string {bits}")))?
            .clone();

        let mut bucket = self.read_bucket_file(&file)?;
        let removed = bucket.remove(key);
        self.save_bucket(&file, &bucket)?;
        Ok(removed)
    }

    /// Removes the exact `(key, value)` record; returns whether any matched.
    pub fn remove_entry(&mut self, key: &Value, value: &Value) -> Result<bool> {
        let bits = self.bit_string(key);
        let file = self
            .directory
            .get(&bits)
            .ok_or_else(|| Error::MalformedSidecar(format!("no bucket for bit-string {bits}")))?
            .clone();

        let mut bucket = self.read_bucket_file(&file)?;
        let removed = bucket.remove_entry(key, value);
        self.save_bucket(&file, &bucket)?;
        Ok(removed)
    }
}

fn bucket_file_name(tag: &str) -> String {
    format!("bucket_{tag}.dat")
}

/// The low `depth` bits of the key's hash, rendered MSB-first.
#[must_use]
pub fn bit_string(key: &Value, depth: usize) -> String {
    let mut hasher = Md5::new();
    hasher.update(key.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(digest.get(..8).unwrap_or(&[0; 8]));
    let h = u64::from_be_bytes(head);

    let depth = depth.min(64);
    let mask = if depth == 64 { u64::MAX } else { (1 << depth) - 1 };
    format!("{:0depth$b}", h & mask)
}

fn suffix(bits: &str, len: usize) -> &str {
    let start = bits.len().saturating_sub(len);
    bits.get(start..).unwrap_or(bits)
}
