//! The reconciler engine.
//!
//! One linear, blocking pipeline per model: introspect the live table,
//! diff it against the declared attributes, plan a reversible migration,
//! persist the rendered artifact, execute the forward operations, record
//! the name in the applied ledger. The batch driver runs every registered
//! model independently and collects per-model failures.
//!
//! Concurrent reconciliations of the same table must be serialized by the
//! caller: the existence check, introspection and ledger insert are not
//! atomic as a whole, and names have whole-second resolution, so two runs
//! against one model within a second collide.

use crate::db::Database;
use crate::diff::diff_table;
use crate::error::Error;
use crate::model::ModelRegistry;
use crate::plan::{self, MigrationKind, MigrationRecord};
use crate::store::MigrationStore;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, info, warn};

/// Outcome of [`Reconciler::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// The table diverges from the model; a migration was generated.
    Migration(MigrationRecord),
    /// The table already matches the model. Nothing is written or applied.
    NoChange,
}

/// Outcome of [`Reconciler::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The forward operations ran and the ledger was updated.
    Applied,
    /// The ledger already held this name; nothing was executed.
    AlreadyApplied,
}

/// Outcome of [`Reconciler::run`] for one model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    Unchanged,
    Applied {
        migration: String,
        path: Utf8PathBuf,
    },
}

/// Aggregate outcome of [`Reconciler::reconcile_all`].
#[derive(Debug, Default)]
pub struct Summary {
    /// Models whose migration was generated and applied, with the name.
    pub applied: Vec<(String, String)>,
    /// Models whose table already matched.
    pub unchanged: Vec<String>,
    /// Models that failed, with the error. One model's failure does not
    /// abort the others (a connection-level failure does).
    pub failed: Vec<(String, Error)>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} applied, {} unchanged, {} failed",
            self.applied.len(),
            self.unchanged.len(),
            self.failed.len()
        )?;
        for (model, name) in &self.applied {
            writeln!(f, "  {model}: applied {name}")?;
        }
        for model in &self.unchanged {
            writeln!(f, "  {model}: no changes")?;
        }
        for (model, err) in &self.failed {
            writeln!(f, "  {model}: {} error: {err}", err.kind())?;
        }
        Ok(())
    }
}

/// Generate a migration name: sortable whole-second timestamp, the
/// modification kind, and the lowercased model name.
pub fn migration_name(kind: MigrationKind, model: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        at.format("%Y%m%d%H%M%S"),
        kind.as_str(),
        model.to_lowercase()
    )
}

/// The schema reconciler.
///
/// Owns its collaborators for the duration of a run: one database
/// connection, one migrations store, one model registry. Construction is
/// the only configuration point; nothing is read from the environment.
pub struct Reconciler<D> {
    db: D,
    store: MigrationStore,
    registry: ModelRegistry,
}

impl<D: Database> Reconciler<D> {
    pub fn new(db: D, store: MigrationStore, registry: ModelRegistry) -> Self {
        Self {
            db,
            store,
            registry,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Compute the migration for one model, without persisting or applying.
    ///
    /// If the target table does not exist the result is a *create* record
    /// covering every declared attribute plus the audit columns; otherwise
    /// the live columns are diffed against the declaration and an *alter*
    /// record is produced, or [`Reconciled::NoChange`] when the delta is
    /// empty.
    pub async fn reconcile(&mut self, model_name: &str) -> Result<Reconciled, Error> {
        let model = self
            .registry
            .get(model_name)
            .ok_or_else(|| Error::ModelNotFound(model_name.to_string()))?
            .clone();
        if model.table.is_empty() {
            return Err(Error::EmptyTableName(model.name));
        }

        let tables = self.db.table_names().await.map_err(Error::Connection)?;

        if !tables.iter().any(|t| t == &model.table) {
            debug!(model = %model.name, table = %model.table, "table absent, planning create");
            let name = migration_name(MigrationKind::Create, &model.name, Utc::now());
            return Ok(Reconciled::Migration(plan::plan_create(
                name,
                &model.table,
                &model.attributes,
            )));
        }

        let columns = self
            .db
            .describe_table(&model.table)
            .await
            .map_err(|source| Error::Introspection {
                table: model.table.clone(),
                source,
            })?;

        let delta = diff_table(&model.attributes, &columns);
        if delta.is_empty() {
            info!(model = %model.name, "no changes detected");
            return Ok(Reconciled::NoChange);
        }

        debug!(
            model = %model.name,
            added = delta.added.len(),
            changed = delta.changed.len(),
            removed = delta.removed.len(),
            "schema drift detected"
        );
        let name = migration_name(MigrationKind::Alter, &model.name, Utc::now());
        Ok(Reconciled::Migration(plan::plan_alter(
            name,
            &model.table,
            &delta,
        )?))
    }

    /// Write the rendered artifact for `record` into the migrations store.
    pub fn persist(&self, record: &MigrationRecord) -> Result<Utf8PathBuf, Error> {
        self.store.persist(record)
    }

    /// Execute `record.forward` and add its name to the ledger, exactly once.
    ///
    /// A name already present in the ledger is a no-op, not an error. On a
    /// forward failure nothing is recorded, so a later apply retries from
    /// scratch; partially applied effects are tolerated because forward
    /// statements are rendered idempotently. A ledger insert that fails
    /// after the forward operations succeeded is rolled back and reported
    /// as [`Error::LedgerWrite`]: a transactional backend ends up with
    /// nothing applied, one without transactional DDL keeps unrecorded
    /// changes that a rerun reapplies.
    pub async fn apply(&mut self, record: &MigrationRecord) -> Result<Applied, Error> {
        self.db.ensure_ledger().await.map_err(Error::Connection)?;

        if self
            .db
            .ledger_contains(&record.name)
            .await
            .map_err(Error::Connection)?
        {
            info!(migration = %record.name, "already applied");
            return Ok(Applied::AlreadyApplied);
        }

        self.db.begin().await.map_err(|source| Error::Apply {
            name: record.name.clone(),
            operation: "begin".into(),
            source,
        })?;

        for op in &record.forward {
            if let Err(source) = self.db.execute(op).await {
                let _ = self.db.rollback().await;
                return Err(Error::Apply {
                    name: record.name.clone(),
                    operation: op.describe(),
                    source,
                });
            }
        }

        if let Err(source) = self.db.record_applied(&record.name).await {
            let _ = self.db.rollback().await;
            warn!(migration = %record.name, "ledger insert failed after forward execution");
            return Err(Error::LedgerWrite {
                name: record.name.clone(),
                source,
            });
        }

        self.db.commit().await.map_err(|source| Error::Apply {
            name: record.name.clone(),
            operation: "commit".into(),
            source,
        })?;

        info!(migration = %record.name, operations = record.forward.len(), "applied");
        Ok(Applied::Applied)
    }

    /// Reconcile, persist and apply one model.
    pub async fn run(&mut self, model_name: &str) -> Result<ModelOutcome, Error> {
        match self.reconcile(model_name).await? {
            Reconciled::NoChange => Ok(ModelOutcome::Unchanged),
            Reconciled::Migration(record) => {
                let path = self.persist(&record)?;
                self.apply(&record).await?;
                Ok(ModelOutcome::Applied {
                    migration: record.name,
                    path,
                })
            }
        }
    }

    /// Reconcile every registered model, independently.
    ///
    /// Per-model errors are collected rather than propagated; only a
    /// connection-level failure aborts the remaining models.
    pub async fn reconcile_all(&mut self) -> Summary {
        let names: Vec<String> = self.registry.iter().map(|m| m.name.clone()).collect();
        let mut summary = Summary::default();

        for name in names {
            match self.run(&name).await {
                Ok(ModelOutcome::Unchanged) => summary.unchanged.push(name),
                Ok(ModelOutcome::Applied { migration, .. }) => {
                    summary.applied.push((name, migration));
                }
                Err(err) => {
                    let fatal = err.is_fatal();
                    summary.failed.push((name, err));
                    if fatal {
                        break;
                    }
                }
            }
        }

        summary
    }

    /// Release the backend, e.g. to run manual statements after a
    /// [`Error::LedgerWrite`].
    pub fn into_db(self) -> D {
        self.db
    }
}
