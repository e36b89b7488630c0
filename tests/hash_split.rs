// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use table_engine::hash::{bit_string, ExtendibleHash};
use table_engine::{Engine, Value};
use test_log::test;

// five keys whose md5 bit-string at depth 1 is "0" (see bit_string):
// k001/k002/k003/k005 share the depth-2 suffix "10", k006 has "00"
const COLLIDING: [&str; 5] = ["k001", "k002", "k003", "k005", "k006"];

#[test]
fn overflowing_a_max_depth_bucket_doubles_the_directory() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut hash = ExtendibleHash::open(folder.path().join("idx"), 4)?;

    for key in COLLIDING {
        assert_eq!("0", bit_string(&Value::Str(key.into()), 1), "fixture {key}");
    }

    // four fit into bucket "0"
    for key in &COLLIDING[..4] {
        hash.add(Value::Str((*key).into()), Value::Int(1))?;
    }
    assert_eq!(1, hash.global_depth());

    // the fifth overflows it: local depth == global depth, so the
    // directory doubles
    hash.add(Value::Str(COLLIDING[4].into()), Value::Int(1))?;

    assert_eq!(2, hash.global_depth());
    assert_eq!(4, hash.directory().len());

    // the split spread the records over two buckets, both within capacity
    for bits in ["00", "10"] {
        let bucket = hash.load_bucket(bits)?;
        assert!(
            bucket.records.len() <= 4,
            "bucket {bits} holds {}",
            bucket.records.len(),
        );
        assert_eq!(2, bucket.local_depth);
    }

    // everything is still reachable
    for key in COLLIDING {
        assert_eq!(
            vec![Value::Int(1)],
            hash.search(&Value::Str(key.into()))?,
            "{key}",
        );
    }

    Ok(())
}

#[test]
fn directory_suffixes_agree_per_bucket() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut hash = ExtendibleHash::open(folder.path().join("idx"), 4)?;

    for i in 0..100 {
        hash.add(Value::Int(i), Value::Int(i))?;
    }

    let mut entries_by_file: std::collections::BTreeMap<&String, Vec<&String>> =
        std::collections::BTreeMap::new();
    for (bits, file) in hash.directory() {
        entries_by_file.entry(file).or_default().push(bits);
    }

    for (file, entries) in entries_by_file {
        let first = entries.first().expect("file has an entry");
        let bucket = hash.load_bucket(first)?;
        assert!(bucket.local_depth <= hash.global_depth(), "{file}");

        for bits in &entries {
            assert_eq!(
                first[first.len() - bucket.local_depth..],
                bits[bits.len() - bucket.local_depth..],
                "entries of {file} disagree on their low bits",
            );
        }
    }

    Ok(())
}

#[test]
fn hash_indexed_equality_through_sql() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let csv_path = folder.path().join("p.csv");
    std::fs::write(
        &csv_path,
        "id,category,price\n\
         a,fruit,1.0\nb,fruit,2.0\nc,tools,3.0\nd,fruit,4.0\ne,tools,5.0\nf,games,6.0\n",
    )?;

    let engine = Engine::open(folder.path().join("tables"))?;
    let response = engine.execute(&format!(
        "CREATE TABLE p FROM FILE \"{}\" USING INDEX hash(category)",
        csv_path.display(),
    ));
    assert_eq!(200, response.status, "{:?}", response.message);

    let response = engine.execute("SELECT * FROM p WHERE category = 'fruit'");
    let rows = response.result.expect("rows");
    let mut ids: Vec<&str> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id"))
        .collect();
    ids.sort_unstable();
    assert_eq!(vec!["a", "b", "d"], ids);

    // deleting one row leaves its category twins indexed
    engine.execute("DELETE FROM p WHERE id = 'b'");
    let response = engine.execute("SELECT * FROM p WHERE category = 'fruit'");
    assert_eq!(
        2,
        response.result.expect("rows").as_array().expect("array").len(),
    );

    // range over a hashed column still works (full bucket scan)
    let response = engine.execute("SELECT * FROM p WHERE category BETWEEN 'fruit' AND 'games'");
    assert_eq!(
        3,
        response.result.expect("rows").as_array().expect("array").len(),
    );

    Ok(())
}
