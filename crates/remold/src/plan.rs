//! Structured migration operations.
//!
//! A [`SchemaDelta`] is turned into a [`MigrationRecord`]: a named pair of
//! forward and reverse [`Operation`] lists. Operations are plain data; the
//! diff stays free of formatting concerns and the SQL renderer in
//! [`crate::render`] serializes them independently. The record itself is
//! executed directly against the database - the rendered artifact is
//! persisted for audit and replay, never re-parsed.

use crate::diff::SchemaDelta;
use crate::error::Error;
use crate::model::{AUDIT_COLUMNS, AttributeSpec, ColumnInfo, ColumnType};
use std::fmt;

/// The shape of a column on one side of an alteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnState {
    pub column_type: ColumnType,
    pub allow_null: bool,
    pub unique: bool,
    pub default_value: Option<String>,
}

impl From<&AttributeSpec> for ColumnState {
    fn from(spec: &AttributeSpec) -> Self {
        Self {
            column_type: spec.column_type.clone(),
            allow_null: spec.allow_null,
            unique: spec.unique,
            default_value: spec.default_value.clone(),
        }
    }
}

impl From<&ColumnInfo> for ColumnState {
    fn from(col: &ColumnInfo) -> Self {
        Self {
            column_type: col.column_type.clone(),
            allow_null: col.allow_null,
            unique: col.unique,
            default_value: col.default_value.clone(),
        }
    }
}

/// A single schema mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create `table` with the given columns (audit columns included).
    CreateTable {
        table: String,
        columns: Vec<AttributeSpec>,
    },
    /// Drop `table` entirely.
    DropTable { table: String },
    /// Add one column to an existing table.
    AddColumn {
        table: String,
        column: AttributeSpec,
    },
    /// Alter one column from one shape to another. `from` is carried so the
    /// reverse operation can be built without re-introspecting.
    ChangeColumn {
        table: String,
        column: String,
        from: ColumnState,
        to: ColumnState,
    },
    /// Drop one column.
    DropColumn { table: String, column: String },
}

impl Operation {
    /// Short description used in error reports and logs.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateTable { table, .. } => format!("create table {table}"),
            Operation::DropTable { table } => format!("drop table {table}"),
            Operation::AddColumn { table, column } => {
                format!("add column {table}.{}", column.name)
            }
            Operation::ChangeColumn { table, column, .. } => {
                format!("change column {table}.{column}")
            }
            Operation::DropColumn { table, column } => {
                format!("drop column {table}.{column}")
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTable { table, columns } => {
                write!(f, "+ table {table} ({} columns)", columns.len())
            }
            Operation::DropTable { table } => write!(f, "- table {table}"),
            Operation::AddColumn { column, .. } => write!(f, "+ {column}"),
            Operation::ChangeColumn {
                column, from, to, ..
            } => write!(f, "~ {column}: {} -> {}", from.column_type, to.column_type),
            Operation::DropColumn { column, .. } => write!(f, "- {column}"),
        }
    }
}

/// Whether a migration creates a table or alters an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    Create,
    Alter,
}

impl MigrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationKind::Create => "create",
            MigrationKind::Alter => "alter",
        }
    }
}

/// A named, two-directional migration script.
///
/// Created once by the reconciler, persisted to the migrations store, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    /// Lexicographically sortable, unique: `<timestamp>-<kind>-<model>`.
    pub name: String,
    pub kind: MigrationKind,
    /// Target table.
    pub table: String,
    /// Operations reaching the new state.
    pub forward: Vec<Operation>,
    /// Operations restoring the prior state.
    pub reverse: Vec<Operation>,
}

/// Build a *create* record: forward creates the table with every declared
/// attribute plus the implicit audit timestamp columns; reverse drops it.
pub fn plan_create(name: String, table: &str, specs: &[AttributeSpec]) -> MigrationRecord {
    let mut columns: Vec<AttributeSpec> = specs.to_vec();
    for audit in AUDIT_COLUMNS {
        if !columns.iter().any(|c| c.name == audit) {
            columns.push(AttributeSpec::new(audit, ColumnType::Timestamptz).not_null());
        }
    }

    let forward = vec![Operation::CreateTable {
        table: table.to_string(),
        columns,
    }];
    let reverse = vec![Operation::DropTable {
        table: table.to_string(),
    }];

    MigrationRecord {
        name,
        kind: MigrationKind::Create,
        table: table.to_string(),
        forward,
        reverse,
    }
}

/// Build an *alter* record from a non-empty delta.
///
/// Forward order: added, changed, removed - each category in its delta
/// order. Reverse mirrors the same iteration order with roles swapped:
/// added columns are dropped, changed columns are altered back to the
/// captured original, removed columns are re-added with their prior shape.
/// Ordering is only guaranteed reversal-safe within a category, not across
/// categories.
///
/// Rejects deltas where an added and a removed column collide after
/// Postgres identifier folding: their derived constraint names would
/// overlap and the reverse script would be unsafe.
pub fn plan_alter(
    name: String,
    table: &str,
    delta: &SchemaDelta,
) -> Result<MigrationRecord, Error> {
    check_overlap(table, delta)?;

    let mut forward = Vec::with_capacity(delta.change_count());
    let mut reverse = Vec::with_capacity(delta.change_count());

    // Each reverse operation is built explicitly next to its forward
    // counterpart. Dropped columns cannot be inverted from the forward
    // payload alone; they are re-added from the captured [`ColumnInfo`].
    for spec in &delta.added {
        forward.push(Operation::AddColumn {
            table: table.to_string(),
            column: spec.clone(),
        });
        reverse.push(Operation::DropColumn {
            table: table.to_string(),
            column: spec.name.clone(),
        });
    }

    for change in &delta.changed {
        let from = ColumnState::from(&change.original);
        let to = ColumnState::from(&change.spec);
        forward.push(Operation::ChangeColumn {
            table: table.to_string(),
            column: change.spec.name.clone(),
            from: from.clone(),
            to: to.clone(),
        });
        reverse.push(Operation::ChangeColumn {
            table: table.to_string(),
            column: change.spec.name.clone(),
            from: to,
            to: from,
        });
    }

    for col in &delta.removed {
        forward.push(Operation::DropColumn {
            table: table.to_string(),
            column: col.name.clone(),
        });
        // Re-add with the captured prior shape.
        reverse.push(Operation::AddColumn {
            table: table.to_string(),
            column: col.to_spec(),
        });
    }

    Ok(MigrationRecord {
        name,
        kind: MigrationKind::Alter,
        table: table.to_string(),
        forward,
        reverse,
    })
}

/// The diff matches names case-sensitively but Postgres folds unquoted
/// identifiers, so a rename that only changes case shows up as an
/// add + remove pair whose derived constraint names collide.
fn check_overlap(table: &str, delta: &SchemaDelta) -> Result<(), Error> {
    for spec in &delta.added {
        for col in &delta.removed {
            if spec.name.eq_ignore_ascii_case(&col.name) {
                return Err(Error::OverlappingDelta {
                    table: table.to_string(),
                    added: spec.name.clone(),
                    removed: col.name.clone(),
                });
            }
        }
    }
    Ok(())
}
