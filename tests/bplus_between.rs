// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use table_engine::Engine;
use test_log::test;

fn setup(folder: &std::path::Path) -> table_engine::Result<Engine> {
    let csv_path = folder.join("products.csv");
    std::fs::write(
        &csv_path,
        "id,price\np1,10.0\np2,20.0\np3,30.0\n",
    )?;

    let engine = Engine::open(folder.join("tables"))?;
    let response = engine.execute(&format!(
        "CREATE TABLE Products FROM FILE \"{}\" USING INDEX bplustree(price)",
        csv_path.display(),
    ));
    assert_eq!(200, response.status, "{:?}", response.message);

    Ok(engine)
}

#[test]
fn between_uses_the_price_index() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let engine = setup(folder.path())?;

    let response = engine.execute("SELECT * FROM Products WHERE price BETWEEN 15 AND 25");
    assert_eq!(200, response.status);

    let rows = response.result.expect("rows");
    let rows = rows.as_array().expect("array");
    assert_eq!(1, rows.len());
    assert_eq!("p2", rows[0]["id"].as_str().expect("id"));
    assert_eq!(20.0, rows[0]["price"].as_f64().expect("price"));

    Ok(())
}

#[test]
fn equality_on_indexed_column_finds_duplicates() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let engine = setup(folder.path())?;

    // a second row priced 20.0
    assert_eq!(
        200,
        engine.execute("INSERT INTO Products VALUES ('p4', 20.0)").status,
    );

    let response = engine.execute("SELECT * FROM Products WHERE price = 20");
    let rows = response.result.expect("rows");
    let mut ids: Vec<&str> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id"))
        .collect();
    ids.sort_unstable();
    assert_eq!(vec!["p2", "p4"], ids);

    Ok(())
}

#[test]
fn deleted_rows_leave_the_range() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let engine = setup(folder.path())?;

    assert_eq!(
        200,
        engine.execute("DELETE FROM Products WHERE id = 'p2'").status,
    );

    let response = engine.execute("SELECT * FROM Products WHERE price BETWEEN 15 AND 25");
    assert_eq!(
        0,
        response.result.expect("rows").as_array().expect("array").len(),
    );

    // twins with the same price survive a delete of one row
    engine.execute("INSERT INTO Products VALUES ('p5', 30.0)");
    engine.execute("DELETE FROM Products WHERE id = 'p3'");

    let response = engine.execute("SELECT * FROM Products WHERE price = 30");
    let rows = response.result.expect("rows");
    let ids: Vec<&str> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id"))
        .collect();
    assert_eq!(vec!["p5"], ids);

    Ok(())
}

#[test]
fn snapshot_survives_restart() -> table_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    {
        let engine = setup(folder.path())?;
        engine.execute("INSERT INTO Products VALUES ('p4', 22.5)");
    }

    // the snapshot file exists and a fresh engine serves the same queries
    assert!(folder
        .path()
        .join("tables")
        .join("index_bplustree_Products_price.dat")
        .try_exists()?);

    let engine = Engine::open(folder.path().join("tables"))?;
    let response = engine.execute("SELECT * FROM Products WHERE price BETWEEN 15 AND 25");
    let rows = response.result.expect("rows");
    let ids: Vec<&str> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id"))
        .collect();
    assert_eq!(vec!["p2", "p4"], ids);

    Ok(())
}
