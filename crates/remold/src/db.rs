//! The database collaborator contract.
//!
//! The reconciler only needs four capabilities from a database: list
//! tables, describe one table, execute a structured [`Operation`], and
//! maintain the applied ledger. Backends reduce driver errors to
//! [`DbError`]; the engine attaches the phase context.

use crate::error::DbError;
use crate::model::ColumnInfo;
use crate::plan::Operation;

/// One live database, scoped to a single reconciliation run.
///
/// `begin`/`commit`/`rollback` default to no-ops so the engine can wrap
/// forward execution and the ledger insert in the widest transaction the
/// backend supports; Postgres overrides them, a backend without
/// transactional DDL simply accepts the at-least-once-effects risk (forward
/// statements are rendered idempotently for that reason).
#[allow(async_fn_in_trait)]
pub trait Database {
    /// Names of all user tables.
    async fn table_names(&mut self) -> Result<Vec<String>, DbError>;

    /// Observed columns of `table`, in table order.
    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DbError>;

    /// Execute one schema mutation.
    async fn execute(&mut self, op: &Operation) -> Result<(), DbError>;

    /// Create the applied ledger if it does not exist yet.
    async fn ensure_ledger(&mut self) -> Result<(), DbError>;

    /// Exact-match lookup of a migration name in the ledger.
    async fn ledger_contains(&mut self, name: &str) -> Result<bool, DbError>;

    /// Append a migration name to the ledger. Never updates in place.
    async fn record_applied(&mut self, name: &str) -> Result<(), DbError>;

    async fn begin(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}
