//! Loader integration tests over a real embedded engine.

use std::fs;
use std::sync::Arc;

use dataql::detect::{detect, Format};
use dataql::loaders::{loader_for, LoadOptions};
use dataql::storage::{DuckDbStorage, Storage};
use tempfile::TempDir;

fn storage() -> Arc<dyn Storage> {
    Arc::new(DuckDbStorage::open(None).unwrap())
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn load(files: Vec<String>, storage: &Arc<dyn Storage>, opts: LoadOptions) -> u64 {
    let format = detect(&files[0]).unwrap();
    let mut loader = loader_for(format, files, Arc::clone(storage), opts).unwrap();
    loader.import().unwrap();
    let lines = loader.lines();
    loader.close().unwrap();
    lines
}

// =============================================================================
// CSV
// =============================================================================

#[test]
fn test_csv_basic_with_type_inference() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "users.csv", "id,name,age\n1,Alice,28\n2,Bob,35\n");
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 2);

    // age inferred BIGINT: numeric comparison works without casts.
    let result = storage
        .query("SELECT name FROM users WHERE age > 30")
        .unwrap();
    assert_eq!(result.rows, vec![vec![Some("Bob".to_string())]]);
}

#[test]
fn test_csv_alias_overrides_stem() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.csv", "id\n1\n2\n3\n");
    let storage = storage();

    let mut opts = LoadOptions::default();
    opts.aliases.insert(path.clone(), "people".to_string());
    load(vec![path], &storage, opts);

    let result = storage.query("SELECT COUNT(*) FROM people").unwrap();
    assert_eq!(result.rows[0][0], Some("3".to_string()));
    assert!(storage.query("SELECT * FROM data").is_err());
}

#[test]
fn test_csv_line_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "big.csv", "n\n1\n2\n3\n4\n5\n");
    let storage = storage();

    let opts = LoadOptions {
        line_limit: 2,
        ..Default::default()
    };
    let lines = load(vec![path], &storage, opts);
    assert_eq!(lines, 2);

    let result = storage.query("SELECT COUNT(*) FROM big").unwrap();
    assert_eq!(result.rows[0][0], Some("2".to_string()));
}

#[test]
fn test_csv_empty_file_gets_placeholder() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty.csv", "");
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 0);

    // SELECT * still succeeds against the placeholder column.
    let result = storage.query("SELECT * FROM empty").unwrap();
    assert_eq!(result.columns, vec!["_empty".to_string()]);
    assert!(result.rows.is_empty());
}

#[test]
fn test_csv_custom_delimiter() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "semi.csv", "a;b\n1;x\n");
    let storage = storage();

    let opts = LoadOptions {
        delimiter: b';',
        ..Default::default()
    };
    load(vec![path], &storage, opts);

    let result = storage.query("SELECT b FROM semi").unwrap();
    assert_eq!(result.rows[0][0], Some("x".to_string()));
}

#[test]
fn test_csv_multiple_files_parallel() {
    let dir = TempDir::new().unwrap();
    let orders = write_file(&dir, "orders.csv", "id,total\n1,10\n2,20\n");
    let customers = write_file(&dir, "customers.csv", "id,name\n1,Alice\n2,Bob\n");
    let storage = storage();

    let lines = load(vec![orders, customers], &storage, LoadOptions::default());
    assert_eq!(lines, 4);

    let result = storage
        .query(
            "SELECT o.id, c.name FROM orders o JOIN customers c ON o.id = c.id ORDER BY o.id",
        )
        .unwrap();
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[1][1], Some("Bob".to_string()));
}

#[test]
fn test_csv_coercion_failure_is_null() {
    let dir = TempDir::new().unwrap();
    // 120 integer rows fix the type before the stray text appears.
    let mut content = String::from("n\n");
    for i in 0..120 {
        content.push_str(&format!("{i}\n"));
    }
    content.push_str("not_a_number\n");
    let path = write_file(&dir, "nums.csv", &content);
    let storage = storage();

    load(vec![path], &storage, LoadOptions::default());
    let result = storage
        .query("SELECT COUNT(*) FROM nums WHERE n IS NULL")
        .unwrap();
    assert_eq!(result.rows[0][0], Some("1".to_string()));
}

// =============================================================================
// JSON / JSONL
// =============================================================================

#[test]
fn test_json_array_with_sparse_keys() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "f.json", r#"[{"a":1},{"a":2,"b":"x"}]"#);
    let storage = storage();

    load(vec![path], &storage, LoadOptions::default());

    // Columns are the sorted union of keys; missing cells are NULL.
    let result = storage.query("SELECT a, b FROM f ORDER BY a").unwrap();
    assert_eq!(result.rows[0], vec![Some("1".to_string()), None]);
    assert_eq!(
        result.rows[1],
        vec![Some("2".to_string()), Some("x".to_string())]
    );
}

#[test]
fn test_json_single_object() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "cfg.json", r#"{"host":"db1","port":5432}"#);
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 1);

    let result = storage.query("SELECT host, port FROM cfg").unwrap();
    assert_eq!(
        result.rows[0],
        vec![Some("db1".to_string()), Some("5432".to_string())]
    );
}

#[test]
fn test_json_nested_flattening() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "n.json",
        r#"[{"user":{"name":"Alice","tags":["a","b"]}}]"#,
    );
    let storage = storage();

    load(vec![path], &storage, LoadOptions::default());
    let result = storage
        .query("SELECT user_name, user_tags FROM n")
        .unwrap();
    assert_eq!(result.rows[0][0], Some("Alice".to_string()));
    assert_eq!(result.rows[0][1], Some("[\"a\",\"b\"]".to_string()));
}

#[test]
fn test_jsonl_streaming_import() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "events.jsonl",
        "{\"id\":1,\"kind\":\"click\"}\n{\"id\":2,\"kind\":\"view\"}\n{\"id\":3,\"kind\":\"click\"}\n",
    );
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 3);

    let result = storage
        .query("SELECT COUNT(*) FROM events WHERE kind = 'click'")
        .unwrap();
    assert_eq!(result.rows[0][0], Some("2".to_string()));
}

#[test]
fn test_jsonl_invalid_line_cites_line_number() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "bad.jsonl",
        "{\"id\":1}\nnot json at all{{\n{\"id\":3}\n",
    );
    let storage = storage();

    let format = detect(&path).unwrap();
    assert_eq!(format, Format::Jsonl);
    let mut loader = loader_for(
        format,
        vec![path],
        Arc::clone(&storage),
        LoadOptions::default(),
    )
    .unwrap();
    let err = loader.import().unwrap_err();
    assert!(err.to_string().contains(":2"), "{err}");
}

// =============================================================================
// XML / YAML
// =============================================================================

#[test]
fn test_xml_items_with_attributes() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "users.xml",
        "<users><user id=\"1\"><name>Alice</name></user><user id=\"2\"><name>Bob</name></user></users>",
    );
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 2);

    let result = storage
        .query("SELECT name FROM users WHERE id = 2")
        .unwrap();
    assert_eq!(result.rows[0][0], Some("Bob".to_string()));
}

#[test]
fn test_yaml_wrapped_array() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "inventory.yaml",
        "items:\n  - sku: a1\n    qty: 3\n  - sku: b2\n    qty: 5\n",
    );
    let storage = storage();

    let lines = load(vec![path], &storage, LoadOptions::default());
    assert_eq!(lines, 2);

    let result = storage
        .query("SELECT sku FROM inventory WHERE qty > 4")
        .unwrap();
    assert_eq!(result.rows[0][0], Some("b2".to_string()));
}

// =============================================================================
// Excel (fixture written with the export engine's writer)
// =============================================================================

#[test]
fn test_excel_first_sheet() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "city").unwrap();
    sheet.write_string(0, 1, "pop").unwrap();
    sheet.write_string(1, 0, "Oslo").unwrap();
    sheet.write_string(1, 1, "700000").unwrap();
    workbook.save(&path).unwrap();

    let storage = storage();
    let lines = load(
        vec![path.to_string_lossy().into_owned()],
        &storage,
        LoadOptions::default(),
    );
    assert_eq!(lines, 1);

    let result = storage.query("SELECT city FROM report WHERE pop > 1000").unwrap();
    assert_eq!(result.rows[0][0], Some("Oslo".to_string()));
}

// =============================================================================
// SQLite
// =============================================================================

#[test]
fn test_sqlite_imports_every_user_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.sqlite");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER, name TEXT);
             INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');
             CREATE TABLE prices (sku TEXT, amount REAL);
             INSERT INTO prices VALUES ('a', 9.5);",
        )
        .unwrap();
    }

    let storage = storage();
    let lines = load(
        vec![path.to_string_lossy().into_owned()],
        &storage,
        LoadOptions::default(),
    );
    assert_eq!(lines, 3);

    let result = storage.query("SELECT name FROM users WHERE id = 2").unwrap();
    assert_eq!(result.rows[0][0], Some("Bob".to_string()));
    let result = storage.query("SELECT amount FROM prices").unwrap();
    assert_eq!(result.rows[0][0], Some("9.5".to_string()));
}

// =============================================================================
// Mixed-format batches
// =============================================================================

#[test]
fn test_composite_loader_mixed_batch() {
    let dir = TempDir::new().unwrap();
    let csv = write_file(&dir, "a.csv", "x\n1\n");
    let json = write_file(&dir, "b.json", r#"[{"y":2}]"#);
    let storage = storage();

    let files = vec![csv, json];
    let format = dataql::detect::detect_batch(&files).unwrap();
    assert_eq!(format, Format::Mixed);

    let mut loader =
        loader_for(format, files, Arc::clone(&storage), LoadOptions::default()).unwrap();
    loader.import().unwrap();
    assert_eq!(loader.lines(), 2);

    assert!(storage.query("SELECT x FROM a").is_ok());
    assert!(storage.query("SELECT y FROM b").is_ok());
}
