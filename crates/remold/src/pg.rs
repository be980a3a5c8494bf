//! Postgres backend.
//!
//! Implements [`Database`] over one `tokio_postgres::Client`. Introspection
//! reads `information_schema`; operations are rendered by
//! [`crate::render`] and executed inside the transaction opened by the
//! engine (Postgres DDL is transactional). Every statement is traced.

use crate::db::Database;
use crate::error::DbError;
use crate::meta;
use crate::model::{ColumnInfo, ColumnType};
use crate::plan::Operation;
use crate::render;
use std::collections::HashMap;
use tokio_postgres::{Client, NoTls};
use tracing::Instrument;

const LIST_TABLES_SQL: &str = "\
SELECT table_name FROM information_schema.tables \
WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
ORDER BY table_name";

const DESCRIBE_COLUMNS_SQL: &str = "\
SELECT column_name, data_type, character_maximum_length, is_nullable, is_identity, column_default \
FROM information_schema.columns \
WHERE table_schema = 'public' AND table_name = $1 \
ORDER BY ordinal_position";

const DESCRIBE_CONSTRAINTS_SQL: &str = "\
SELECT tc.constraint_name, tc.constraint_type, kcu.column_name \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
  ON kcu.constraint_name = tc.constraint_name \
 AND kcu.table_schema = tc.table_schema \
WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
  AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')";

/// A [`Database`] over one Postgres connection.
pub struct PgDatabase {
    client: Client,
}

impl PgDatabase {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with `NoTls` and drive the connection on a background task.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("postgres connection error: {err}");
            }
        });
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        let span = tracing::debug_span!("db.execute", sql = %sql);
        self.client.batch_execute(sql).instrument(span).await?;
        Ok(())
    }
}

impl Database for PgDatabase {
    async fn table_names(&mut self) -> Result<Vec<String>, DbError> {
        let rows = self.client.query(LIST_TABLES_SQL, &[]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        let col_rows = self.client.query(DESCRIBE_COLUMNS_SQL, &[&table]).await?;
        let con_rows = self
            .client
            .query(DESCRIBE_CONSTRAINTS_SQL, &[&table])
            .await?;

        // Group constraint members so a multi-column UNIQUE does not mark
        // its members as single-column unique.
        let mut members: HashMap<String, (String, Vec<String>)> = HashMap::new();
        for row in &con_rows {
            let constraint: String = row.get(0);
            let kind: String = row.get(1);
            let column: String = row.get(2);
            members
                .entry(constraint)
                .or_insert_with(|| (kind, Vec::new()))
                .1
                .push(column);
        }

        let mut primary: Vec<&str> = Vec::new();
        let mut unique: Vec<&str> = Vec::new();
        for (kind, columns) in members.values() {
            match kind.as_str() {
                "PRIMARY KEY" => primary.extend(columns.iter().map(String::as_str)),
                "UNIQUE" if columns.len() == 1 => unique.push(&columns[0]),
                _ => {}
            }
        }

        let mut out = Vec::with_capacity(col_rows.len());
        for row in &col_rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let max_length: Option<i32> = row.get(2);
            let is_nullable: String = row.get(3);
            let is_identity: String = row.get(4);
            let default: Option<String> = row.get(5);

            let auto_increment = is_identity == "YES"
                || default
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().starts_with("nextval("));

            out.push(ColumnInfo {
                column_type: ColumnType::parse(&data_type, max_length.map(|n| n as u32)),
                allow_null: is_nullable == "YES",
                primary_key: primary.contains(&name.as_str()),
                unique: unique.contains(&name.as_str()),
                auto_increment,
                default_value: default,
                name,
            });
        }
        Ok(out)
    }

    async fn execute(&mut self, op: &Operation) -> Result<(), DbError> {
        for stmt in render::operation_sql(op) {
            self.batch(&stmt).await?;
        }
        Ok(())
    }

    async fn ensure_ledger(&mut self) -> Result<(), DbError> {
        self.batch(meta::CREATE_LEDGER_SQL).await
    }

    async fn ledger_contains(&mut self, name: &str) -> Result<bool, DbError> {
        let row = self
            .client
            .query_opt(meta::LEDGER_LOOKUP_SQL, &[&name])
            .await?;
        Ok(row.is_some())
    }

    async fn record_applied(&mut self, name: &str) -> Result<(), DbError> {
        self.client
            .execute(meta::RECORD_APPLIED_SQL, &[&name])
            .await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.batch("ROLLBACK").await
    }
}
