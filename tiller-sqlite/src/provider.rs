//! The SQLite [`DatabaseProvider`].

use std::time::Duration;

use async_trait::async_trait;
use tiller_migrate::{Connection, DatabaseProvider, Dialect, MigrateResult};

use crate::config::SqliteConfig;
use crate::connection::SqliteConnection;

/// Opens SQLite databases for `sqlite:` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    /// Create a provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseProvider for SqliteProvider {
    fn scheme(&self) -> &str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn exists(&self, url: &str) -> MigrateResult<bool> {
        Ok(SqliteConfig::from_url(url)?.exists())
    }

    async fn connect(&self, url: &str, timeout: Duration) -> MigrateResult<Box<dyn Connection>> {
        let config = SqliteConfig::from_url(url)?.with_default_timeout(timeout);
        let conn = SqliteConnection::open(&config).await?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_and_connect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("blog.db").display());
        let provider = SqliteProvider::new();

        assert!(!provider.exists(&url).await.unwrap());

        let mut conn = provider.connect(&url, Duration::from_secs(5)).await.unwrap();
        conn.execute("CREATE TABLE blogs (id INTEGER)").await.unwrap();
        conn.close().await.unwrap();

        assert!(provider.exists(&url).await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_url_is_a_connection_failure() {
        let err = SqliteProvider::new()
            .connect("sqlite://", Duration::from_secs(1))
            .await
            .err().unwrap();
        assert!(matches!(err, tiller_migrate::MigrationError::ConnectionFailure(_)));
    }
}
