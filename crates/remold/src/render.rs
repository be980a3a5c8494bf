//! SQL rendering for migration operations.
//!
//! Serialization lives here so the diff and the planner stay free of
//! formatting concerns. Forward statements are rendered idempotently
//! (`IF [NOT] EXISTS` where Postgres supports it) because a failed run may
//! leave some forward effects applied without a ledger entry.

use crate::model::AttributeSpec;
use crate::plan::{ColumnState, MigrationRecord, Operation};

/// Quote an identifier for Postgres, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Name of the single-column unique constraint for `table.column`,
/// matching the name Postgres itself derives.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_key")
}

fn column_def(spec: &AttributeSpec) -> String {
    let mut def = format!("{} {}", quote_ident(&spec.name), spec.column_type);

    if spec.auto_increment {
        def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    }
    if spec.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    // PK columns are implicitly NOT NULL
    if !spec.allow_null && !spec.primary_key {
        def.push_str(" NOT NULL");
    }
    if spec.unique && !spec.primary_key {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &spec.default_value {
        def.push_str(&format!(" DEFAULT {default}"));
    }

    def
}

/// Render one operation as a sequence of SQL statements.
///
/// Most operations are a single statement; `ChangeColumn` emits one
/// statement per differing aspect (type, nullability, uniqueness, default).
pub fn operation_sql(op: &Operation) -> Vec<String> {
    match op {
        Operation::CreateTable { table, columns } => {
            let defs: Vec<String> = columns
                .iter()
                .map(|c| format!("    {}", column_def(c)))
                .collect();
            vec![format!(
                "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
                quote_ident(table),
                defs.join(",\n")
            )]
        }
        Operation::DropTable { table } => {
            vec![format!("DROP TABLE IF EXISTS {};", quote_ident(table))]
        }
        Operation::AddColumn { table, column } => {
            vec![format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
                quote_ident(table),
                column_def(column)
            )]
        }
        Operation::DropColumn { table, column } => {
            vec![format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                quote_ident(table),
                quote_ident(column)
            )]
        }
        Operation::ChangeColumn {
            table,
            column,
            from,
            to,
        } => change_column_sql(table, column, from, to),
    }
}

fn change_column_sql(
    table: &str,
    column: &str,
    from: &ColumnState,
    to: &ColumnState,
) -> Vec<String> {
    let mut stmts = Vec::new();
    let t = quote_ident(table);
    let c = quote_ident(column);

    if from.column_type != to.column_type {
        stmts.push(format!(
            "ALTER TABLE {t} ALTER COLUMN {c} TYPE {ty} USING {c}::{ty};",
            ty = to.column_type
        ));
    }

    if from.allow_null != to.allow_null {
        if to.allow_null {
            stmts.push(format!("ALTER TABLE {t} ALTER COLUMN {c} DROP NOT NULL;"));
        } else {
            stmts.push(format!("ALTER TABLE {t} ALTER COLUMN {c} SET NOT NULL;"));
        }
    }

    if from.unique != to.unique {
        let constraint = quote_ident(&unique_constraint_name(table, column));
        if to.unique {
            stmts.push(format!(
                "ALTER TABLE {t} ADD CONSTRAINT {constraint} UNIQUE ({c});"
            ));
        } else {
            stmts.push(format!(
                "ALTER TABLE {t} DROP CONSTRAINT IF EXISTS {constraint};"
            ));
        }
    }

    if from.default_value != to.default_value {
        match &to.default_value {
            Some(default) => stmts.push(format!(
                "ALTER TABLE {t} ALTER COLUMN {c} SET DEFAULT {default};"
            )),
            None => stmts.push(format!("ALTER TABLE {t} ALTER COLUMN {c} DROP DEFAULT;")),
        }
    }

    stmts
}

/// Render the persisted artifact for a record: a header plus `-- up` and
/// `-- down` sections of plain SQL statements.
pub fn render_record(record: &MigrationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("-- migration: {}\n", record.name));
    out.push_str(&format!("-- table: {}\n", record.table));
    out.push('\n');

    out.push_str("-- up\n");
    for op in &record.forward {
        for stmt in operation_sql(op) {
            out.push_str(&stmt);
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str("-- down\n");
    for op in &record.reverse {
        for stmt in operation_sql(op) {
            out.push_str(&stmt);
            out.push('\n');
        }
    }

    out
}
