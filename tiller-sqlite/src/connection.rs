//! SQLite connection wrapper.

use async_trait::async_trait;
use tiller_migrate::{Connection, MigrateResult};
use tracing::{debug, trace};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::types::row_to_json;

/// A SQLite connection driven on the `tokio-rusqlite` background thread.
pub struct SqliteConnection {
    conn: tokio_rusqlite::Connection,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Open a connection and apply the configured pragmas.
    ///
    /// A file database is created when it does not exist.
    pub async fn open(config: &SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => tokio_rusqlite::Connection::open_in_memory().await,
            DatabasePath::File(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        SqliteError::connection(format!(
                            "cannot create directory {}: {}",
                            dir.display(),
                            e
                        ))
                    })?;
                }
                tokio_rusqlite::Connection::open(path).await
            }
        }
        .map_err(|e| SqliteError::connection(e.to_string()))?;

        let init = config.init_sql();
        if !init.is_empty() {
            conn.call(move |conn| Ok(conn.execute_batch(&init)?)).await?;
        }

        debug!(path = ?config.path, "Opened SQLite connection");
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    /// Check whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Execute multiple statements in a batch.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }

    /// Execute a query and return all rows as JSON values.
    pub async fn query_json(&self, sql: &str) -> SqliteResult<Vec<serde_json::Value>> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();

                let rows = stmt.query_map([], |row| row_to_json(row, &columns))?;
                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn transaction_statement(&mut self, sql: &'static str, open: bool) -> SqliteResult<()> {
        if self.in_transaction == open {
            return Err(SqliteError::transaction(if open {
                "a transaction is already open"
            } else {
                "no transaction is open"
            }));
        }

        trace!(sql, "Transaction statement");
        self.conn
            .call(move |conn| Ok(conn.execute_batch(sql)?))
            .await?;
        self.in_transaction = open;
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        Ok(self.execute_batch(sql).await?)
    }

    async fn query(&mut self, sql: &str) -> MigrateResult<Vec<serde_json::Value>> {
        Ok(self.query_json(sql).await?)
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        Ok(self.transaction_statement("BEGIN IMMEDIATE", true).await?)
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        Ok(self.transaction_statement("COMMIT", false).await?)
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        Ok(self.transaction_statement("ROLLBACK", false).await?)
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        let this = *self;
        if this.in_transaction {
            // Dropping the handle discards the open transaction.
            debug!("Closing connection with an open transaction");
        }
        this.conn
            .close()
            .await
            .map_err(|e| SqliteError::connection(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn memory() -> SqliteConnection {
        SqliteConnection::open(&SqliteConfig::memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let mut conn = memory().await;
        conn.execute("CREATE TABLE blogs (id INTEGER PRIMARY KEY, name TEXT); INSERT INTO blogs (name) VALUES ('a');")
            .await
            .unwrap();

        let rows = conn.query("SELECT id, name FROM blogs").await.unwrap();
        assert_eq!(rows, vec![serde_json::json!({ "id": 1, "name": "a" })]);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let mut conn = memory().await;
        conn.execute("CREATE TABLE t (x INTEGER)").await.unwrap();

        conn.begin().await.unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO t VALUES (1)").await.unwrap();
        conn.rollback().await.unwrap();
        assert!(!conn.in_transaction());

        let rows = conn.query("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(rows[0]["n"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_ddl_is_transactional() {
        let mut conn = memory().await;
        conn.begin().await.unwrap();
        conn.execute("CREATE TABLE t (x INTEGER)").await.unwrap();
        conn.rollback().await.unwrap();

        assert!(conn.query("SELECT * FROM t").await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_misuse() {
        let mut conn = memory().await;
        assert!(conn.commit().await.is_err());
        conn.begin().await.unwrap();
        assert!(conn.begin().await.is_err());
        conn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let conn = SqliteConnection::open(&SqliteConfig::file(&path)).await.unwrap();
        Box::new(conn).close().await.unwrap();
        assert!(path.exists());
    }
}
