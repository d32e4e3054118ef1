// End-to-end migrations over in-memory sources and sinks

use doc_pg_migrate::{
    Column, Config, JsonDirSource, Level, MemorySink, MemorySource, MigrateError,
    MigrationOrchestrator, RecordingProgress, RowContext, RowOutcome, SqlValue, Table,
    materialize_row, materialize_table,
};
use serde_json::{Value, json};

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn records(values: Vec<Value>) -> Vec<doc_pg_migrate::Record> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

/// `T(id text unique required, name text default "unknown")`
fn t_table() -> Table {
    Table::builder("t", "t")
        .column(Column::text("id", "id").unique().required().build())
        .column(Column::text("name", "name").default_value("unknown").build())
        .build()
        .unwrap()
}

fn t_records() -> Vec<Value> {
    vec![
        json!({"id": "a", "name": "x"}),
        json!({"id": "b"}),
        json!({"id": null}),
    ]
}

#[test]
fn t_scenario_materializes_two_rows_then_aborts() {
    let table = t_table();
    let recs = records(t_records());
    let source = MemorySource::new();

    let mut rows = Vec::new();
    for (i, record) in recs.iter().enumerate().take(2) {
        let ctx = RowContext::new(record, &recs, i);
        match materialize_row(&table, &ctx, &source, i + 1).unwrap() {
            RowOutcome::Insert(insert) => rows.push(insert.args),
            RowOutcome::Skipped { .. } => panic!("row {} skipped", i + 1),
        }
    }
    assert_eq!(
        rows,
        vec![vec![text("a"), text("x")], vec![text("b"), text("unknown")]]
    );

    let ctx = RowContext::new(&recs[2], &recs, 2);
    let err = materialize_row(&table, &ctx, &source, 3).unwrap_err();
    assert!(matches!(
        err,
        MigrateError::MissingValue { row: 3, ref column, .. } if column == "id"
    ));
}

#[test]
fn t_scenario_run_aborts_before_inserting() {
    let source = MemorySource::new().with_json("t", t_records());
    let mut sink = MemorySink::new();
    let err = MigrationOrchestrator::new(vec![t_table()], source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap_err();
    assert!(matches!(err, MigrateError::MissingValue { row: 3, .. }));
    assert!(sink.has_table("t"));
    assert!(sink.rows("t").is_empty());
}

#[test]
fn required_column_never_becomes_null() {
    let table = Table::builder("users", "users")
        .column(Column::text("name", "name").required().build())
        .build()
        .unwrap();
    let source = MemorySource::new().with_json("users", vec![json!({"name": "a"}), json!({})]);
    let mut sink = MemorySink::new();
    let result = MigrationOrchestrator::new(vec![table], source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run();
    assert!(matches!(result, Err(MigrateError::MissingValue { row: 2, .. })));
    assert!(sink.rows("users").is_empty());
}

#[test]
fn skipped_rows_are_not_inserted() {
    let table = Table::builder("bots", "bots")
        .column(Column::text("botID", "bot_id").skip_if_missing().build())
        .column(Column::text("name", "name").nullable(true).build())
        .build()
        .unwrap();
    let source = MemorySource::new().with_json(
        "bots",
        vec![
            json!({"botID": "1", "name": "a"}),
            json!({"name": "orphan"}),
            json!({"botID": "none"}),
            json!({"botID": "4"}),
        ],
    );
    let progress = RecordingProgress::new();
    let mut sink = MemorySink::new();
    let report = MigrationOrchestrator::new(vec![table], source, &mut sink)
        .with_progress(progress.clone())
        .run()
        .unwrap();

    let bots = report.table("bots").unwrap();
    assert_eq!(bots.source_rows, 4);
    assert_eq!(bots.skipped_rows, 2);
    assert_eq!(bots.inserted, 2);
    assert_eq!(sink.rows("bots").len(), 2);
    let warnings = progress.messages_at(Level::Warning);
    assert!(warnings.iter().any(|w| w.contains("row 2")));
    assert!(warnings.iter().any(|w| w.contains("row 3")));
}

#[test]
fn sql_default_columns_are_omitted() {
    let table = Table::builder("sessions", "sessions")
        .column(Column::uuid("", "id").sql_default("uuid_generate_v4()").build())
        .column(Column::text("token", "token").build())
        .build()
        .unwrap();
    let recs = records(vec![json!({"token": "abc"}), json!({"token": "def"})]);
    let out = materialize_table(&table, &recs, &MemorySource::new(), &RecordingProgress::new())
        .unwrap();
    for insert in &out.inserts {
        assert_eq!(insert.columns, vec!["token"]);
        assert_eq!(insert.args.len(), 1);
        assert_eq!(insert.sql(), "INSERT INTO sessions (token) VALUES ($1)");
    }
}

#[test]
fn pass_through_table_inserts_every_record() {
    let table = Table::builder("tags", "tags")
        .column(Column::text("name", "name").build())
        .column(Column::int("uses", "uses").build())
        .column(Column::bool("hidden", "hidden").build())
        .build()
        .unwrap();
    let docs: Vec<Value> = (0..5)
        .map(|i| json!({"name": format!("tag{}", i), "uses": i, "hidden": i % 2 == 0}))
        .collect();
    let mut sink = MemorySink::new();
    let report = MigrationOrchestrator::new(
        vec![table],
        MemorySource::new().with_json("tags", docs),
        &mut sink,
    )
    .with_progress(RecordingProgress::new())
    .run()
    .unwrap();

    assert_eq!(report.inserted(), 5);
    let rows = sink.rows("tags");
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        let mut keys: Vec<&str> = row.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["hidden", "itag", "name", "uses"]);
        assert_eq!(row["uses"], SqlValue::Int32(i as i32));
    }
}

#[test]
fn running_twice_recreates_the_same_schema() {
    let table = Table::builder("tags", "tags")
        .column(Column::text("name", "name").unique().build())
        .index_columns(["name"])
        .build()
        .unwrap();
    let source = MemorySource::new().with_json("tags", vec![json!({"name": "a"})]);
    let mut sink = MemorySink::new();
    for _ in 0..2 {
        MigrationOrchestrator::new(vec![table.clone()], source.clone(), &mut sink)
            .with_progress(RecordingProgress::new())
            .run()
            .unwrap();
    }
    let (first, second) = sink.ddl().split_at(sink.ddl().len() / 2);
    assert_eq!(first, second);
    assert_eq!(sink.columns("tags"), vec!["itag", "name"]);
    assert_eq!(sink.rows("tags").len(), 1);
}

#[test]
fn rerun_replaces_tables_linked_by_foreign_keys() {
    let tables = vec![
        Table::builder("bots", "bots")
            .column(Column::text("botID", "bot_id").unique().build())
            .build()
            .unwrap(),
        Table::builder("reviews", "reviews")
            .column(Column::text("botID", "bot_id").references("bots", "bot_id").build())
            .build()
            .unwrap(),
    ];
    let source = MemorySource::new()
        .with_json("bots", vec![json!({"botID": "1"})])
        .with_json("reviews", vec![json!({"botID": "1"}), json!({"botID": "1"})]);
    let mut sink = MemorySink::new();
    for _ in 0..2 {
        let report = MigrationOrchestrator::new(tables.clone(), source.clone(), &mut sink)
            .with_progress(RecordingProgress::new())
            .run()
            .unwrap();
        assert_eq!(report.inserted(), 3);
    }
    assert_eq!(sink.rows("bots").len(), 1);
    assert_eq!(sink.rows("reviews").len(), 2);
    assert_eq!(sink.constraint_names("reviews"), vec!["reviews_bot_id_fk"]);
}

fn users_with_duplicates(tolerate: bool) -> (Table, MemorySource) {
    let table = Table::builder("users", "users")
        .column(Column::text("userID", "user_id").unique().build())
        .tolerate_unique_violation(tolerate)
        .build()
        .unwrap();
    let source = MemorySource::new().with_json(
        "users",
        vec![json!({"userID": "1"}), json!({"userID": "1"})],
    );
    (table, source)
}

#[test]
fn tolerated_unique_violation_keeps_one_row() {
    let (table, source) = users_with_duplicates(true);
    let mut sink = MemorySink::new();
    let report = MigrationOrchestrator::new(vec![table], source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap();
    assert_eq!(sink.rows("users").len(), 1);
    assert_eq!(report.tables[0].unique_skipped, 1);
}

#[test]
fn untolerated_unique_violation_aborts_at_second_insert() {
    let (table, source) = users_with_duplicates(false);
    let mut sink = MemorySink::new();
    let err = MigrationOrchestrator::new(vec![table], source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap_err();
    match err {
        MigrateError::Insert { row, sql, source, .. } => {
            assert_eq!(row, 2);
            assert_eq!(sql, "INSERT INTO users (user_id) VALUES ($1)");
            assert!(source.is_unique_violation());
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(sink.rows("users").len(), 1);
}

#[test]
fn links_are_normalized_through_declarations() {
    let yaml = r#"
tables:
  - source: bots
    columns:
      - source: support
        dest: support
        type: text
        transforms:
          - normalize_link: { label: Support }
      - source: website
        dest: website
        type: text
        transforms:
          - normalize_link: { label: Website }
"#;
    let tables = Config::from_yaml(yaml).unwrap().tables().unwrap();
    let source = MemorySource::new().with_json(
        "bots",
        vec![json!({"support": "discord.gg/abc", "website": "my site.com"})],
    );
    let mut sink = MemorySink::new();
    MigrationOrchestrator::new(tables, source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap();
    let row = &sink.rows("bots")[0];
    assert_eq!(row["support"], text("https://discord.gg/abc"));
    assert_eq!(row["website"], text(""));
}

#[test]
fn foreign_keys_order_tables_and_tolerate_orphans() {
    let yaml = r#"
tables:
  - source: reviews
    tolerate_foreign_key_violation: true
    columns:
      - { source: botID, dest: bot_id, type: text, references: bots.bot_id }
      - { source: content, dest: content, type: text, default: { value: "" } }
  - source: bots
    index: [bot_id]
    columns:
      - { source: botID, dest: bot_id, type: text, unique: true, default: required }
"#;
    let tables = Config::from_yaml(yaml).unwrap().tables().unwrap();
    let source = MemorySource::new()
        .with_json("bots", vec![json!({"botID": "1"})])
        .with_json(
            "reviews",
            vec![json!({"botID": "1", "content": "great"}), json!({"botID": "9"})],
        );
    let mut sink = MemorySink::new();
    let report = MigrationOrchestrator::new(tables, source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap();
    assert_eq!(report.tables[0].table, "bots");
    assert_eq!(report.tables[1].fk_skipped, 1);
    assert_eq!(sink.rows("reviews").len(), 1);
    assert_eq!(sink.index("bots"), Some(&["bot_id".to_string()][..]));
}

#[test]
fn cyclic_declarations_are_rejected() {
    let yaml = r#"
tables:
  - source: a
    columns: [{ source: b, dest: b_id, type: text, references: b.id }]
  - source: b
    columns: [{ source: a, dest: a_id, type: text, references: a.id }]
"#;
    let tables = Config::from_yaml(yaml).unwrap().tables().unwrap();
    let mut sink = MemorySink::new();
    let err = MigrationOrchestrator::new(tables, MemorySource::new(), &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap_err();
    assert!(matches!(err, MigrateError::CyclicDependency(ref names) if names.len() == 2));
    assert!(sink.ddl().is_empty());
}

#[test]
fn extended_json_exports_migrate() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("users.json"),
        r#"[
            {"_id": {"$oid": "5f1b2c"}, "votes": {"$numberLong": "12"},
             "createdAt": {"$date": {"$numberLong": "1600000000000"}}},
            {"_id": {"$oid": "5f1b2d"}, "votes": 3, "createdAt": {"$date": "2021-01-01T00:00:00Z"}}
        ]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("sessions.jsonl"), "{\"a\":1}\n").unwrap();

    let yaml = r#"
tables:
  - source: users
    columns:
      - { source: _id, dest: mongo_id, type: text }
      - { source: votes, dest: votes, type: bigint }
      - { source: createdAt, dest: created_at, type: timestamp }
"#;
    let tables = Config::from_yaml(yaml).unwrap().tables().unwrap();
    let source = JsonDirSource::new(dir.path()).with_ignore(["sessions"]);
    let mut sink = MemorySink::new();
    MigrationOrchestrator::new(tables, source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap();

    let rows = sink.rows("users");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["mongo_id"], text("5f1b2c"));
    assert_eq!(rows[0]["votes"], SqlValue::Int64(12));
    match &rows[0]["created_at"] {
        SqlValue::Timestamp(at) => assert_eq!(at.timestamp_millis(), 1_600_000_000_000),
        other => panic!("unexpected value {:?}", other),
    }
    assert_eq!(rows[1]["votes"], SqlValue::Int64(3));
}

#[test]
fn sample_declarations_plan_and_run() {
    let tables = Config::load("demos/tables.yaml").unwrap().tables().unwrap();
    let plan = doc_pg_migrate::plan(&tables).unwrap();
    assert_eq!(plan[0].to_string(), "DROP TABLE IF EXISTS users CASCADE");
    assert!(
        plan.iter()
            .any(|s| s.to_string() == "CREATE INDEX bots_migindex ON bots(bot_id,lower(vanity))")
    );

    let source = MemorySource::new()
        .with_json("users", vec![json!({"userID": " 283492837492837 "})])
        .with_json(
            "bots",
            vec![json!({
                "botID": "b1",
                "ownerID": "1",
                "vanity": "Cool",
                "support": "discord.gg/x",
                "website": "example.com",
                "certified": true,
                "apiTokens": ["t"],
            })],
        );
    let mut sink = MemorySink::new();
    let report = MigrationOrchestrator::new(tables, source, &mut sink)
        .with_progress(RecordingProgress::new())
        .run()
        .unwrap();
    assert_eq!(report.inserted(), 2);
    assert_eq!(report.table("reviews").unwrap().source_rows, 0);

    let bot = &sink.rows("bots")[0];
    assert_eq!(bot["owner"], text("283492837492837"));
    assert_eq!(bot["vanity"], text("cool"));
    assert_eq!(bot["support"], text("https://discord.gg/x"));
    assert_eq!(bot["state"], text("certified"));
    assert_eq!(bot["votes"], SqlValue::Int64(0));
    assert_eq!(sink.rows("users")[0]["user_id"], text("283492837492837"));
}
