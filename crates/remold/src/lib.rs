//! Schema reconciler for Postgres.
//!
//! remold compares a model's statically declared attribute specs against
//! the live columns of its table, classifies each column as added, changed
//! or removed, and emits a named, reversible migration that is applied
//! exactly once (tracked by a persisted ledger of applied names).
//!
//! # Declaring models
//!
//! Models are plain data handed to the reconciler at construction - no
//! reflection, no global registry:
//!
//! ```
//! use remold::{AttributeSpec, ColumnType, ModelDef, ModelRegistry};
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(ModelDef::new(
//!     "User",
//!     "users",
//!     vec![
//!         AttributeSpec::new("id", ColumnType::Integer)
//!             .primary_key()
//!             .auto_increment(),
//!         AttributeSpec::new("email", ColumnType::VarChar(255))
//!             .not_null()
//!             .unique(),
//!     ],
//! ));
//! ```
//!
//! # Reconciling
//!
//! ```ignore
//! let db = PgDatabase::connect(&database_url).await?;
//! let store = MigrationStore::new("migrations");
//! let mut reconciler = Reconciler::new(db, store, registry);
//!
//! let summary = reconciler.reconcile_all().await;
//! if !summary.is_success() {
//!     eprintln!("{summary}");
//! }
//! ```
//!
//! The generated artifact (an `-- up` / `-- down` SQL file) is persisted
//! for audit and replay; the database executes the structured operation
//! list directly, never the rendered text.

mod db;
mod diff;
mod error;
pub mod meta;
mod model;
mod pg;
mod plan;
mod reconcile;
pub mod render;
mod store;

pub use db::Database;
pub use diff::{ChangedColumn, SchemaDelta, diff_table};
pub use error::{DbError, Error};
pub use model::{
    AUDIT_COLUMNS, AttributeSpec, ColumnInfo, ColumnType, ModelDef, ModelRegistry,
    is_audit_column,
};
pub use pg::PgDatabase;
pub use plan::{
    ColumnState, MigrationKind, MigrationRecord, Operation, plan_alter, plan_create,
};
pub use reconcile::{
    Applied, ModelOutcome, Reconciled, Reconciler, Summary, migration_name,
};
pub use store::MigrationStore;

/// Result type for remold operations.
pub type Result<T> = std::result::Result<T, Error>;
