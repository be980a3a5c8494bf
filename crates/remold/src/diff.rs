//! Schema diffing - compare a model's declared attributes against the
//! observed columns of its live table.
//!
//! The result is a [`SchemaDelta`] partitioning column names into three
//! disjoint categories: `added` (declared, not observed), `changed`
//! (declared and observed, but type, nullability or uniqueness differ) and
//! `removed` (observed, not declared). An empty delta means the table
//! already matches the model and no migration is generated.

use crate::model::{AttributeSpec, ColumnInfo, is_audit_column};
use std::collections::HashSet;
use std::fmt;

/// A column present on both sides whose shape differs.
///
/// Carries the observed [`ColumnInfo`] snapshot so the reverse script can
/// restore the prior shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedColumn {
    /// The declared shape the column should take.
    pub spec: AttributeSpec,
    /// The observed shape before the migration.
    pub original: ColumnInfo,
}

/// Categorized difference between declared and observed schema for one table.
#[derive(Debug, Clone, Default)]
pub struct SchemaDelta {
    /// Declared in the model, absent from the table. Model declaration order.
    pub added: Vec<AttributeSpec>,
    /// Present in both, shape differs. Model declaration order.
    pub changed: Vec<ChangedColumn>,
    /// Present in the table, no longer declared. Introspection order.
    pub removed: Vec<ColumnInfo>,
}

impl SchemaDelta {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Total number of columns across all three categories.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Compare a model's attribute specs against a table's observed columns.
///
/// Type comparison is a case-insensitive token match (both sides are held
/// as canonical [`ColumnType`](crate::ColumnType) values, so equality is
/// already case-blind). Nullability and single-column uniqueness also
/// participate; defaults and key flags do not, matching what an `alter`
/// migration can safely touch.
///
/// The audit timestamp columns are never reported as `removed`: models elide
/// them unless they carry non-default constraints.
pub fn diff_table(specs: &[AttributeSpec], columns: &[ColumnInfo]) -> SchemaDelta {
    let mut delta = SchemaDelta::default();

    let observed_names: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let declared_names: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();

    for spec in specs {
        match columns.iter().find(|c| c.name == spec.name) {
            None => delta.added.push(spec.clone()),
            Some(col) => {
                let differs = spec.column_type != col.column_type
                    || spec.allow_null != col.allow_null
                    || spec.unique != col.unique;
                if differs {
                    delta.changed.push(ChangedColumn {
                        spec: spec.clone(),
                        original: col.clone(),
                    });
                }
            }
        }
    }

    for col in columns {
        if is_audit_column(&col.name) {
            continue;
        }
        if !declared_names.contains(col.name.as_str()) {
            delta.removed.push(col.clone());
        }
    }

    // Declared-but-absent and observed-but-undeclared are disjoint by
    // construction; this guards the partition against future edits.
    debug_assert!(
        delta
            .added
            .iter()
            .all(|s| !observed_names.contains(s.name.as_str()))
    );

    delta
}

impl fmt::Display for SchemaDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        for spec in &self.added {
            writeln!(f, "  + {spec}")?;
        }
        for change in &self.changed {
            writeln!(
                f,
                "  ~ {}: {}{} -> {}{}",
                change.spec.name,
                change.original.column_type,
                if change.original.allow_null { "" } else { " not null" },
                change.spec.column_type,
                if change.spec.allow_null { "" } else { " not null" },
            )?;
        }
        for col in &self.removed {
            writeln!(f, "  - {}", col.name)?;
        }
        Ok(())
    }
}
