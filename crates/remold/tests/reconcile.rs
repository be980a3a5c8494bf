//! Engine scenarios against an in-memory backend.
//!
//! The backend applies operations structurally, so these tests cover the
//! full introspect -> diff -> plan -> persist -> apply pipeline without a
//! live Postgres.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use remold::{
    Applied, AttributeSpec, ColumnInfo, ColumnType, Database, DbError, Error, MigrationStore,
    ModelDef, ModelOutcome, ModelRegistry, Operation, Reconciled, Reconciler,
};
use std::collections::BTreeSet;

/// In-memory database: tables are ordered column lists, the ledger is a
/// set, and every executed operation is journaled for exactly-once
/// assertions. The `fail_*` fields inject faults at the matching seam.
#[derive(Default)]
struct MemDb {
    tables: IndexMap<String, Vec<ColumnInfo>>,
    ledger: BTreeSet<String>,
    executed: Vec<String>,
    fail_tables: bool,
    fail_describe: Option<String>,
    fail_execute: Option<String>,
    fail_record: bool,
}

impl MemDb {
    fn with_table(mut self, name: &str, columns: Vec<ColumnInfo>) -> Self {
        self.tables.insert(name.to_string(), columns);
        self
    }

    fn columns(&self, table: &str) -> &[ColumnInfo] {
        &self.tables[table]
    }
}

impl Database for MemDb {
    async fn table_names(&mut self) -> Result<Vec<String>, DbError> {
        if self.fail_tables {
            return Err(DbError::new("connection refused"));
        }
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        if self.fail_describe.as_deref() == Some(table) {
            return Err(DbError::new(format!("cannot describe {table}")));
        }
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::new(format!("no such table {table}")))
    }

    async fn execute(&mut self, op: &Operation) -> Result<(), DbError> {
        let what = op.describe();
        if let Some(needle) = &self.fail_execute
            && what.contains(needle.as_str())
        {
            return Err(DbError::new(format!("injected failure at {what}")));
        }
        self.executed.push(what);

        match op {
            Operation::CreateTable { table, columns } => {
                self.tables
                    .entry(table.clone())
                    .or_insert_with(|| columns.iter().map(ColumnInfo::from).collect());
            }
            Operation::DropTable { table } => {
                self.tables.shift_remove(table);
            }
            Operation::AddColumn { table, column } => {
                let cols = self
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| DbError::new(format!("no such table {table}")))?;
                if !cols.iter().any(|c| c.name == column.name) {
                    cols.push(ColumnInfo::from(column));
                }
            }
            Operation::ChangeColumn {
                table, column, to, ..
            } => {
                let cols = self
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| DbError::new(format!("no such table {table}")))?;
                let col = cols
                    .iter_mut()
                    .find(|c| &c.name == column)
                    .ok_or_else(|| DbError::new(format!("no such column {column}")))?;
                col.column_type = to.column_type.clone();
                col.allow_null = to.allow_null;
                col.unique = to.unique;
                col.default_value = to.default_value.clone();
            }
            Operation::DropColumn { table, column } => {
                let cols = self
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| DbError::new(format!("no such table {table}")))?;
                cols.retain(|c| &c.name != column);
            }
        }
        Ok(())
    }

    async fn ensure_ledger(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    async fn ledger_contains(&mut self, name: &str) -> Result<bool, DbError> {
        Ok(self.ledger.contains(name))
    }

    async fn record_applied(&mut self, name: &str) -> Result<(), DbError> {
        if self.fail_record {
            return Err(DbError::new("ledger is read-only"));
        }
        self.ledger.insert(name.to_string());
        Ok(())
    }
}

fn col(name: &str, ty: ColumnType) -> ColumnInfo {
    ColumnInfo {
        name: name.into(),
        column_type: ty,
        allow_null: true,
        primary_key: false,
        auto_increment: false,
        unique: false,
        default_value: None,
    }
}

fn temp_store(tag: &str) -> MigrationStore {
    let dir = std::env::temp_dir().join(format!("remold-test-{tag}-{}", std::process::id()));
    MigrationStore::new(Utf8PathBuf::from_path_buf(dir).unwrap())
}

fn widget_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDef::new(
        "Widget",
        "widgets",
        vec![
            AttributeSpec::new("id", ColumnType::Integer)
                .primary_key()
                .auto_increment(),
            AttributeSpec::new("name", ColumnType::VarChar(255))
                .not_null()
                .unique(),
        ],
    ));
    registry
}

fn user_registry(attrs: Vec<AttributeSpec>) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDef::new("User", "users", attrs));
    registry
}

#[tokio::test]
async fn create_scenario_generates_table_with_audit_columns() {
    let mut rec = Reconciler::new(MemDb::default(), temp_store("create"), widget_registry());

    let Reconciled::Migration(record) = rec.reconcile("Widget").await.unwrap() else {
        panic!("expected a migration");
    };
    assert!(record.name.ends_with("-create-widget"));

    let Operation::CreateTable { table, columns } = &record.forward[0] else {
        panic!("expected CreateTable");
    };
    assert_eq!(table, "widgets");
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "created_at", "updated_at"]);
    assert_eq!(
        record.reverse,
        vec![Operation::DropTable {
            table: "widgets".into()
        }]
    );

    assert_eq!(rec.apply(&record).await.unwrap(), Applied::Applied);
    let db = rec.into_db();
    assert_eq!(db.columns("widgets").len(), 4);
    assert!(db.ledger.contains(&record.name));
}

#[tokio::test]
async fn reconcile_is_idempotent_after_apply() {
    let mut rec = Reconciler::new(MemDb::default(), temp_store("idem"), widget_registry());

    let Reconciled::Migration(record) = rec.reconcile("Widget").await.unwrap() else {
        panic!("expected a migration");
    };
    rec.apply(&record).await.unwrap();

    // Unchanged table: NoChange, twice.
    assert_eq!(rec.reconcile("Widget").await.unwrap(), Reconciled::NoChange);
    assert_eq!(rec.reconcile("Widget").await.unwrap(), Reconciled::NoChange);
}

#[tokio::test]
async fn apply_twice_executes_forward_exactly_once() {
    let mut rec = Reconciler::new(MemDb::default(), temp_store("once"), widget_registry());

    let Reconciled::Migration(record) = rec.reconcile("Widget").await.unwrap() else {
        panic!("expected a migration");
    };

    assert_eq!(rec.apply(&record).await.unwrap(), Applied::Applied);
    assert_eq!(rec.apply(&record).await.unwrap(), Applied::AlreadyApplied);

    let db = rec.into_db();
    assert_eq!(db.executed, vec!["create table widgets"]);
}

#[tokio::test]
async fn widen_nullability_round_trips() {
    let mut bio = col("bio", ColumnType::Text);
    bio.allow_null = false;
    let before = vec![col("id", ColumnType::Integer), bio];

    let db = MemDb::default().with_table("users", before.clone());
    let registry = user_registry(vec![
        AttributeSpec::new("id", ColumnType::Integer),
        AttributeSpec::new("bio", ColumnType::Text),
    ]);
    let mut rec = Reconciler::new(db, temp_store("widen"), registry);

    let Reconciled::Migration(record) = rec.reconcile("User").await.unwrap() else {
        panic!("expected a migration");
    };
    assert!(record.name.ends_with("-alter-user"));
    let Operation::ChangeColumn { from, to, .. } = &record.forward[0] else {
        panic!("expected ChangeColumn");
    };
    assert!(!from.allow_null);
    assert!(to.allow_null);

    rec.apply(&record).await.unwrap();
    let mut db = rec.into_db();
    assert!(db.columns("users")[1].allow_null);

    // Applying the reverse restores the pre-forward column set exactly.
    for op in &record.reverse {
        db.execute(op).await.unwrap();
    }
    assert_eq!(db.columns("users"), &before[..]);
}

#[tokio::test]
async fn add_and_remove_round_trips() {
    let mut legacy = col("legacy_flag", ColumnType::Boolean);
    legacy.allow_null = false;
    let before = vec![col("id", ColumnType::Integer), legacy];

    let db = MemDb::default().with_table("users", before.clone());
    let registry = user_registry(vec![
        AttributeSpec::new("id", ColumnType::Integer),
        AttributeSpec::new("avatar_url", ColumnType::Text),
    ]);
    let mut rec = Reconciler::new(db, temp_store("addrem"), registry);

    let Reconciled::Migration(record) = rec.reconcile("User").await.unwrap() else {
        panic!("expected a migration");
    };
    assert_eq!(record.forward.len(), 2);
    assert!(matches!(
        &record.forward[0],
        Operation::AddColumn { column, .. } if column.name == "avatar_url"
    ));
    assert!(matches!(
        &record.forward[1],
        Operation::DropColumn { column, .. } if column == "legacy_flag"
    ));

    rec.apply(&record).await.unwrap();
    let mut db = rec.into_db();
    let names: Vec<&str> = db.columns("users").iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "avatar_url"]);

    for op in &record.reverse {
        db.execute(op).await.unwrap();
    }
    // legacy_flag is re-added with its captured prior shape.
    let restored = db.columns("users");
    assert_eq!(restored.len(), 2);
    let legacy = restored.iter().find(|c| c.name == "legacy_flag").unwrap();
    assert_eq!(legacy.column_type, ColumnType::Boolean);
    assert!(!legacy.allow_null);
}

#[tokio::test]
async fn failed_apply_leaves_no_ledger_entry_and_retries_from_scratch() {
    let mut bio = col("bio", ColumnType::Text);
    bio.allow_null = false;
    let db = MemDb {
        fail_execute: Some("change column".into()),
        ..MemDb::default()
    }
    .with_table("users", vec![col("id", ColumnType::Integer), bio]);

    let registry = user_registry(vec![
        AttributeSpec::new("id", ColumnType::Integer),
        AttributeSpec::new("bio", ColumnType::Text),
    ]);
    let mut rec = Reconciler::new(db, temp_store("fail"), registry);

    let Reconciled::Migration(record) = rec.reconcile("User").await.unwrap() else {
        panic!("expected a migration");
    };

    let err = rec.apply(&record).await.unwrap_err();
    assert_eq!(err.kind(), "apply");
    assert!(err.to_string().contains("change column users.bio"));

    // No ledger entry, so the retry is a real retry, not AlreadyApplied.
    let mut db = rec.into_db();
    assert!(db.ledger.is_empty());
    db.fail_execute = None;
    let mut rec = Reconciler::new(db, temp_store("fail"), user_registry(vec![]));
    assert_eq!(rec.apply(&record).await.unwrap(), Applied::Applied);
}

#[tokio::test]
async fn ledger_write_failure_is_reported_distinctly() {
    let db = MemDb {
        fail_record: true,
        ..MemDb::default()
    };
    let mut rec = Reconciler::new(db, temp_store("ledger"), widget_registry());

    let Reconciled::Migration(record) = rec.reconcile("Widget").await.unwrap() else {
        panic!("expected a migration");
    };
    let err = rec.apply(&record).await.unwrap_err();
    assert_eq!(err.kind(), "ledger-write");
    assert!(err.to_string().contains("could not be recorded"));

    // This backend has no transactions, so the forward effects survive the
    // rollback and sit unrecorded: the documented hazard.
    let db = rec.into_db();
    assert!(db.tables.contains_key("widgets"));
    assert!(db.ledger.is_empty());
}

#[tokio::test]
async fn run_persists_artifact_and_applies() {
    let store = temp_store("run");
    let dir = store.dir().to_owned();
    let mut rec = Reconciler::new(MemDb::default(), store, widget_registry());

    let ModelOutcome::Applied { migration, path } = rec.run("Widget").await.unwrap() else {
        panic!("expected an applied outcome");
    };
    assert!(path.as_str().starts_with(dir.as_str()));
    let artifact = std::fs::read_to_string(&path).unwrap();
    assert!(artifact.contains(&format!("-- migration: {migration}")));
    assert!(artifact.contains("-- up"));
    assert!(artifact.contains("-- down"));
    assert!(artifact.contains(r#"DROP TABLE IF EXISTS "widgets";"#));

    assert_eq!(rec.run("Widget").await.unwrap(), ModelOutcome::Unchanged);

    std::fs::remove_dir_all(dir.as_std_path()).unwrap();
}

#[tokio::test]
async fn batch_driver_isolates_per_model_failures() {
    let db = MemDb {
        fail_describe: Some("posts".into()),
        ..MemDb::default()
    }
    .with_table(
        "users",
        vec![
            col("id", ColumnType::Integer),
            col("created_at", ColumnType::Timestamptz),
            col("updated_at", ColumnType::Timestamptz),
        ],
    )
    .with_table("posts", vec![col("id", ColumnType::Integer)]);

    let mut registry = ModelRegistry::new();
    registry.register(ModelDef::new(
        "User",
        "users",
        vec![AttributeSpec::new("id", ColumnType::Integer)],
    ));
    registry.register(ModelDef::new(
        "Post",
        "posts",
        vec![AttributeSpec::new("id", ColumnType::Integer)],
    ));
    registry.register(ModelDef::new(
        "Tag",
        "tags",
        vec![AttributeSpec::new("id", ColumnType::Integer)],
    ));

    let store = temp_store("batch");
    let dir = store.dir().to_owned();
    let mut rec = Reconciler::new(db, store, registry);
    let summary = rec.reconcile_all().await;

    // User matched, Post failed introspection, Tag was still created.
    assert_eq!(summary.unchanged, vec!["User".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "Post");
    assert_eq!(summary.failed[0].1.kind(), "introspection");
    assert_eq!(summary.applied.len(), 1);
    assert_eq!(summary.applied[0].0, "Tag");
    assert!(!summary.is_success());

    let _ = std::fs::remove_dir_all(dir.as_std_path());
}

#[tokio::test]
async fn table_listing_failure_aborts_the_batch() {
    let db = MemDb {
        fail_tables: true,
        ..MemDb::default()
    };

    let mut registry = ModelRegistry::new();
    for (name, table) in [("User", "users"), ("Post", "posts"), ("Tag", "tags")] {
        registry.register(ModelDef::new(
            name,
            table,
            vec![AttributeSpec::new("id", ColumnType::Integer)],
        ));
    }

    let mut rec = Reconciler::new(db, temp_store("abort"), registry);
    let summary = rec.reconcile_all().await;

    // The first model hits the connection failure and the batch stops
    // there; the later models are never attempted.
    assert!(summary.applied.is_empty());
    assert!(summary.unchanged.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "User");
    assert_eq!(summary.failed[0].1.kind(), "connection");
    assert!(summary.failed[0].1.is_fatal());
    assert!(!summary.is_success());
}

#[tokio::test]
async fn unknown_model_and_empty_table_name_are_rejected() {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDef::new("Ghost", "", vec![]));
    let mut rec = Reconciler::new(MemDb::default(), temp_store("reject"), registry);

    let err = rec.reconcile("Missing").await.unwrap_err();
    assert!(matches!(err, Error::ModelNotFound(_)));

    let err = rec.reconcile("Ghost").await.unwrap_err();
    assert!(matches!(err, Error::EmptyTableName(_)));
}
