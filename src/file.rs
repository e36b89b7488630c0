// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! File naming conventions and atomic rewrite helpers.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of table metadata sidecars.
pub const META_SIDECAR_SUFFIX: &str = ".meta.json";

/// Suffix of auxiliary insertion buffers.
pub const AUX_SUFFIX: &str = "_aux.bin";

/// Path of the primary heap file of a table.
pub fn data_file(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.bin"))
}

/// Path of the auxiliary insertion buffer of a table.
pub fn aux_file(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}{AUX_SUFFIX}"))
}

/// Path of the JSON metadata sidecar of a table.
pub fn meta_file(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}{META_SIDECAR_SUFFIX}"))
}

/// Path of the whole-image B+ tree snapshot of a table/column.
pub fn bplus_file(dir: &Path, table: &str, column: &str) -> PathBuf {
    dir.join(format!("index_bplustree_{table}_{column}.dat"))
}

/// Path of the ISAM index metadata file of a table/column.
pub fn isam_meta_file(dir: &Path, table: &str, column: &str) -> PathBuf {
    dir.join(format!("index_isam_{table}_{column}.meta"))
}

/// Path of the ISAM page log of a table/column.
pub fn isam_data_file(dir: &Path, table: &str, column: &str) -> PathBuf {
    dir.join(format!("index_isam_{table}_{column}.data"))
}

/// Folder holding the extendible-hash directory and bucket files of a table/column.
pub fn hash_folder(dir: &Path, table: &str, column: &str) -> PathBuf {
    dir.join(format!("index_hash_{table}_{column}"))
}

/// Creates an empty file if none exists at `path`.
pub fn touch(path: &Path) -> std::io::Result<()> {
    if !path.try_exists()? {
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
    }
    Ok(())
}

/// Atomically rewrites a file.
pub fn rewrite_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let folder = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent folder")
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = std::fs::File::open(path)?;
        file.sync_all()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("test.txt");
        std::fs::write(&path, "asdasdasdasdasd")?;

        rewrite_atomic(&path, b"newcontent")?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }

    #[test]
    fn touch_is_idempotent() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.bin");

        touch(&path)?;
        std::fs::write(&path, [1, 2, 3])?;
        touch(&path)?;

        assert_eq!(3, std::fs::metadata(&path)?.len());

        Ok(())
    }
}
