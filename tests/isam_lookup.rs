// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use table_engine::isam::Isam;
use table_engine::{Engine, Value};
use test_log::test;

#[test]
fn point_lookup_over_a_thousand_sorted_ids() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let mut isam = Isam::open(
        folder.path().join("ids.meta"),
        folder.path().join("ids.data"),
        128,
    )?;

    let pairs: Vec<(Value, u64)> = (0u32..1000)
        .map(|i| (Value::Str(format!("id_{i:06}")), u64::from(i) * 64))
        .collect();
    isam.build(&pairs)?;

    // 1000 entries at capacity 128 -> 8 leaves
    assert_eq!(8, isam.leaf_offsets().len());
    assert_eq!(7, isam.split_keys().len());

    assert_eq!(
        Some(500 * 64),
        isam.search(&Value::Str("id_000500".into()))?,
    );
    assert_eq!(None, isam.search(&Value::Str("missing".into()))?);

    Ok(())
}

#[test]
fn table_lookup_through_the_isam_index() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let mut csv = String::from("id,price\n");
    for i in 0..300 {
        csv.push_str(&format!("id_{i:06},{i}.0\n"));
    }
    let csv_path = folder.path().join("products.csv");
    std::fs::write(&csv_path, csv)?;

    let engine = Engine::open(folder.path().join("tables"))?;
    let response = engine.execute(&format!(
        "CREATE TABLE Products FROM FILE \"{}\" USING INDEX isam(id)",
        csv_path.display(),
    ));
    assert_eq!(200, response.status, "{:?}", response.message);

    let hit = engine.execute("SELECT * FROM Products WHERE id = 'id_000123'");
    let rows = hit.result.expect("rows");
    let rows = rows.as_array().expect("array");
    assert_eq!(1, rows.len());
    assert_eq!(123.0, rows[0]["price"].as_f64().expect("price"));

    let miss = engine.execute("SELECT * FROM Products WHERE id = 'missing'");
    assert_eq!(
        0,
        miss.result.expect("rows").as_array().expect("array").len(),
    );

    Ok(())
}

#[test]
fn isam_range_and_writes_through_sql() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let csv_path = folder.path().join("p.csv");
    std::fs::write(
        &csv_path,
        "id,price\na,1.0\nb,2.0\nc,3.0\nd,4.0\ne,5.0\n",
    )?;

    let engine = Engine::open(folder.path().join("tables"))?;
    engine.execute(&format!(
        "CREATE TABLE p FROM FILE \"{}\" USING INDEX isam(id)",
        csv_path.display(),
    ));

    // inserts go to the heap and then into the index
    assert_eq!(200, engine.execute("INSERT INTO p VALUES ('bb', 2.5)").status);

    let response = engine.execute("SELECT * FROM p WHERE id BETWEEN 'b' AND 'd'");
    let rows = response.result.expect("rows");
    let ids: Vec<&str> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id"))
        .collect();
    assert_eq!(vec!["b", "bb", "c", "d"], ids);

    // delete removes the pair from the index
    assert_eq!(200, engine.execute("DELETE FROM p WHERE id = 'c'").status);
    let response = engine.execute("SELECT * FROM p WHERE id = 'c'");
    assert_eq!(
        0,
        response.result.expect("rows").as_array().expect("array").len(),
    );

    Ok(())
}
