//! Applied-ledger SQL.
//!
//! One table, one unique string column holding applied migration names.
//! Rows are appended on successful apply and never updated or removed by
//! the reconciler; down-migrations are a separate manual action.

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "_remold_ledger";

/// Creates the ledger on first use.
pub const CREATE_LEDGER_SQL: &str =
    "CREATE TABLE IF NOT EXISTS _remold_ledger (name TEXT PRIMARY KEY);";

/// Exact-match lookup of one migration name.
pub const LEDGER_LOOKUP_SQL: &str = "SELECT name FROM _remold_ledger WHERE name = $1";

/// Appends one migration name.
pub const RECORD_APPLIED_SQL: &str = "INSERT INTO _remold_ledger (name) VALUES ($1)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_target_the_ledger_table() {
        for sql in [CREATE_LEDGER_SQL, LEDGER_LOOKUP_SQL, RECORD_APPLIED_SQL] {
            assert!(sql.contains(LEDGER_TABLE));
        }
    }
}
