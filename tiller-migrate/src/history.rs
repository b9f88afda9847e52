//! Migration history tracking.
//!
//! History lives in a table inside the target database. Every read and write
//! goes through the active [`SqlGenerator`] and runs on the caller's
//! connection, so a history change commits or rolls back with the step that
//! produced it.

use serde::{Deserialize, Serialize};

use crate::database::Connection;
use crate::error::{MigrateResult, MigrationError};
use crate::sql::SqlGenerator;

/// Default name of the history table.
pub const DEFAULT_HISTORY_TABLE: &str = "__tiller_migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Migration id.
    pub migration_id: String,
    /// Product version that applied it.
    pub product_version: String,
    /// Monotonic application order.
    pub applied_ordinal: i64,
}

impl HistoryRecord {
    fn from_row(row: &serde_json::Value) -> MigrateResult<Self> {
        let text = |name: &str| {
            row.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    MigrationError::database(format!("History row is missing column '{}'", name))
                })
        };

        let applied_ordinal = row
            .get("applied_ordinal")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| MigrationError::database("History row is missing 'applied_ordinal'"))?;

        Ok(Self {
            migration_id: text("migration_id")?,
            product_version: text("product_version")?,
            applied_ordinal,
        })
    }
}

/// History store bound to a table name and a generator.
pub struct HistoryStore<'a> {
    table: &'a str,
    generator: &'a dyn SqlGenerator,
}

impl<'a> HistoryStore<'a> {
    /// Create a store.
    pub fn new(table: &'a str, generator: &'a dyn SqlGenerator) -> Self {
        Self { table, generator }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        self.table
    }

    /// Create the history table if missing. Idempotent.
    pub async fn ensure_schema(&self, conn: &mut dyn Connection) -> MigrateResult<()> {
        conn.execute(&self.generator.create_history_table(self.table))
            .await
    }

    /// Whether the history table exists. Never creates it.
    pub async fn exists(&self, conn: &mut dyn Connection) -> MigrateResult<bool> {
        let rows = conn
            .query(&self.generator.history_table_exists(self.table))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Applied migrations of a context in application order.
    pub async fn list_applied(
        &self,
        conn: &mut dyn Connection,
        context: &str,
    ) -> MigrateResult<Vec<HistoryRecord>> {
        let rows = conn
            .query(&self.generator.select_history(self.table, context))
            .await?;

        let mut records = rows
            .iter()
            .map(HistoryRecord::from_row)
            .collect::<MigrateResult<Vec<_>>>()?;
        records.sort_by_key(|r| r.applied_ordinal);
        Ok(records)
    }

    /// Append a record.
    pub async fn append(
        &self,
        conn: &mut dyn Connection,
        context: &str,
        migration_id: &str,
        product_version: &str,
    ) -> MigrateResult<()> {
        conn.execute(&self.generator.insert_history(
            self.table,
            context,
            migration_id,
            product_version,
        ))
        .await
    }

    /// Remove a record.
    pub async fn remove(
        &self,
        conn: &mut dyn Connection,
        context: &str,
        migration_id: &str,
    ) -> MigrateResult<()> {
        conn.execute(&self.generator.delete_history(self.table, context, migration_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::sql::SqliteGenerator;

    #[derive(Default)]
    struct RecordingConnection {
        executed: Vec<String>,
        rows: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
            self.executed.push(sql.to_string());
            Ok(())
        }

        async fn query(&mut self, sql: &str) -> MigrateResult<Vec<serde_json::Value>> {
            self.executed.push(sql.to_string());
            Ok(self.rows.clone())
        }

        async fn begin(&mut self) -> MigrateResult<()> {
            Ok(())
        }

        async fn commit(&mut self) -> MigrateResult<()> {
            Ok(())
        }

        async fn rollback(&mut self) -> MigrateResult<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> MigrateResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_applied_orders_by_ordinal() {
        let mut conn = RecordingConnection {
            rows: vec![
                json!({"migration_id": "2_B", "product_version": "0.1.0", "applied_ordinal": 7}),
                json!({"migration_id": "1_A", "product_version": "0.1.0", "applied_ordinal": 3}),
            ],
            ..Default::default()
        };

        let store = HistoryStore::new(DEFAULT_HISTORY_TABLE, &SqliteGenerator);
        let records = store.list_applied(&mut conn, "App.Ctx").await.unwrap();

        assert_eq!(records[0].migration_id, "1_A");
        assert_eq!(records[1].migration_id, "2_B");
        assert!(conn.executed[0].contains("'App.Ctx'"));
    }

    #[tokio::test]
    async fn test_malformed_row_is_database_error() {
        let mut conn = RecordingConnection {
            rows: vec![json!({"migration_id": "1_A"})],
            ..Default::default()
        };

        let store = HistoryStore::new(DEFAULT_HISTORY_TABLE, &SqliteGenerator);
        let err = store.list_applied(&mut conn, "App.Ctx").await.unwrap_err();
        assert!(matches!(err, MigrationError::Database(_)));
    }

    #[tokio::test]
    async fn test_append_and_remove_statements() {
        let mut conn = RecordingConnection::default();
        let store = HistoryStore::new("history", &SqliteGenerator);

        store.ensure_schema(&mut conn).await.unwrap();
        store.append(&mut conn, "App.Ctx", "1_A", "0.1.0").await.unwrap();
        store.remove(&mut conn, "App.Ctx", "1_A").await.unwrap();

        assert!(conn.executed[0].starts_with("CREATE TABLE IF NOT EXISTS \"history\""));
        assert!(conn.executed[1].starts_with("INSERT INTO \"history\""));
        assert!(conn.executed[2].starts_with("DELETE FROM \"history\""));
    }

    #[tokio::test]
    async fn test_exists_only_queries() {
        let store = HistoryStore::new("history", &SqliteGenerator);

        let mut missing = RecordingConnection::default();
        assert!(!store.exists(&mut missing).await.unwrap());
        assert_eq!(missing.executed.len(), 1);
        assert!(missing.executed[0].starts_with("SELECT name FROM sqlite_master"));

        let mut present = RecordingConnection {
            rows: vec![json!({"name": "history"})],
            ..Default::default()
        };
        assert!(store.exists(&mut present).await.unwrap());
        assert!(!present.executed.iter().any(|sql| sql.contains("CREATE TABLE")));
    }
}
