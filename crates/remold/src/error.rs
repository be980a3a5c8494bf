use thiserror::Error;

/// A failure reported by a [`Database`](crate::Database) backend.
///
/// Backends reduce their driver errors to a message so the engine stays
/// generic over the backend type.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DbError {
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self {
            message: format!("postgres error: {err}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The requested model is not present in the registry.
    #[error("model `{0}` is not registered")]
    ModelNotFound(String),

    /// A model declares an empty target table name.
    #[error("model `{0}` declares an empty table name")]
    EmptyTableName(String),

    /// The database is unreachable. Aborts the whole run.
    #[error("database connection failed: {0}")]
    Connection(DbError),

    /// Listing or describing a table failed.
    #[error("failed to introspect table `{table}`: {source}")]
    Introspection { table: String, source: DbError },

    /// The migration artifact could not be written. No ledger entry is
    /// attempted for this record.
    #[error("failed to persist migration `{name}`: {source}")]
    Persist {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A forward operation failed. The ledger holds no entry for the record,
    /// so a later apply retries from scratch.
    #[error("migration `{name}` failed at {operation}: {source}")]
    Apply {
        name: String,
        operation: String,
        source: DbError,
    },

    /// Forward operations succeeded but the ledger insert did not. The
    /// engine rolls back, so a transactional backend ends up with nothing
    /// applied; a backend without transactional DDL keeps the schema
    /// changes unrecorded, and rerunning applies the record again (safe,
    /// the forward DDL is idempotent).
    #[error(
        "migration `{name}` ran but could not be recorded in the ledger \
         (rolled back where the backend supports it): {source}"
    )]
    LedgerWrite { name: String, source: DbError },

    /// The delta pairs an added and a removed column whose names collide once
    /// Postgres folds identifier case, so derived constraint names would
    /// overlap and the reverse script would be unsafe.
    #[error(
        "unsafe delta for table `{table}`: added `{added}` and removed `{removed}` \
         collide after identifier folding"
    )]
    OverlappingDelta {
        table: String,
        added: String,
        removed: String,
    },
}

impl Error {
    /// Short machine-readable kind, used by the batch summary report.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ModelNotFound(_) => "model-not-found",
            Error::EmptyTableName(_) => "empty-table-name",
            Error::Connection(_) => "connection",
            Error::Introspection { .. } => "introspection",
            Error::Persist { .. } => "persist",
            Error::Apply { .. } => "apply",
            Error::LedgerWrite { .. } => "ledger-write",
            Error::OverlappingDelta { .. } => "overlapping-delta",
        }
    }

    /// True for errors that abort the whole batch rather than one model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}
