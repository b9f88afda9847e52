//! SQLite connection settings parsed from a database URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SqliteError, SqliteResult};

/// SQLite database configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database path (or in-memory).
    pub path: DatabasePath,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// Journal mode; `None` keeps the database default.
    pub journal_mode: Option<JournalMode>,
}

/// Database path configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    /// File path, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File(path) => Some(path),
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Delete the journal after each transaction.
    Delete,
    /// Truncate the journal instead of deleting it.
    Truncate,
    /// Keep the journal in memory.
    Memory,
    /// Write-ahead logging.
    Wal,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "delete" => Some(Self::Delete),
            "truncate" => Some(Self::Truncate),
            "memory" => Some(Self::Memory),
            "wal" => Some(Self::Wal),
            _ => None,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: None,
            journal_mode: None,
        }
    }
}

impl SqliteConfig {
    /// Configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` - In-memory database
    /// - `sqlite://path/to/db.sqlite` - File-based database
    /// - `sqlite:///absolute/path/db.sqlite` - Absolute path
    /// - `sqlite:path/to/db.sqlite` - Without slashes
    ///
    /// Query parameters `foreign_keys`, `busy_timeout` and `journal_mode`
    /// are honored.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref();
        let (location, query) = match url.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url, None),
        };

        let rest = strip_scheme(location)
            .ok_or_else(|| SqliteError::config(format!("not a sqlite URL: {}", url)))?;
        let path = rest.strip_prefix("//").unwrap_or(rest);

        let mut config = match path {
            "" => return Err(SqliteError::config("database path is required")),
            ":memory:" => Self::memory(),
            path => Self::file(path),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = value == "true" || value == "1",
                "busy_timeout" => {
                    if let Ok(ms) = value.parse() {
                        config.busy_timeout_ms = Some(ms);
                    }
                }
                "journal_mode" => config.journal_mode = JournalMode::parse(value),
                _ => tracing::debug!(key, "Ignoring unknown sqlite URL parameter"),
            }
        }

        Ok(config)
    }

    /// Use `timeout` as the busy timeout unless the URL set one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        if self.busy_timeout_ms.is_none() {
            self.busy_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        }
        self
    }

    /// Check whether the database file exists. In-memory databases always do.
    pub fn exists(&self) -> bool {
        self.path.file().is_none_or(Path::exists)
    }

    /// Statements run on every new connection.
    pub fn init_sql(&self) -> String {
        let mut sql = String::new();

        if self.foreign_keys {
            sql.push_str("PRAGMA foreign_keys = ON;\n");
        }

        if let Some(mode) = self.journal_mode {
            sql.push_str(&format!("PRAGMA journal_mode = {};\n", mode.as_pragma()));
        }

        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {};\n", timeout));
        }

        sql
    }
}

fn strip_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once(':')?;
    scheme.eq_ignore_ascii_case("sqlite").then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_memory() {
        assert!(SqliteConfig::from_url("sqlite::memory:").unwrap().path.is_memory());
        assert!(SqliteConfig::from_url("sqlite://:memory:").unwrap().path.is_memory());
        assert!(
            SqliteConfig::from_url("sqlite://app.db?mode=memory")
                .unwrap()
                .path
                .is_memory()
        );
    }

    #[test]
    fn test_from_url_file() {
        let config = SqliteConfig::from_url("sqlite://./test.db").unwrap();
        assert_eq!(config.path.file(), Some(Path::new("./test.db")));

        let config = SqliteConfig::from_url("sqlite:///tmp/abs.db").unwrap();
        assert_eq!(config.path.file(), Some(Path::new("/tmp/abs.db")));

        let config = SqliteConfig::from_url("SQLite:relative.db").unwrap();
        assert_eq!(config.path.file(), Some(Path::new("relative.db")));
    }

    #[test]
    fn test_from_url_rejects_other_schemes() {
        assert!(SqliteConfig::from_url("postgres://localhost/db").is_err());
        assert!(SqliteConfig::from_url("sqlite://").is_err());
    }

    #[test]
    fn test_from_url_with_options() {
        let config =
            SqliteConfig::from_url("sqlite://./test.db?foreign_keys=0&busy_timeout=10000&journal_mode=wal")
                .unwrap();

        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(10000));
        assert_eq!(config.journal_mode, Some(JournalMode::Wal));
    }

    #[test]
    fn test_default_timeout_does_not_override_url() {
        let config = SqliteConfig::from_url("sqlite://a.db?busy_timeout=5")
            .unwrap()
            .with_default_timeout(Duration::from_secs(30));
        assert_eq!(config.busy_timeout_ms, Some(5));

        let config = SqliteConfig::file("a.db").with_default_timeout(Duration::from_secs(30));
        assert_eq!(config.busy_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_init_sql() {
        let sql = SqliteConfig::memory()
            .with_default_timeout(Duration::from_millis(250))
            .init_sql();

        assert!(sql.contains("foreign_keys = ON"));
        assert!(sql.contains("busy_timeout = 250"));
        assert!(!sql.contains("journal_mode"));
    }

    #[test]
    fn test_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        assert!(!SqliteConfig::file(&path).exists());
        std::fs::write(&path, b"").unwrap();
        assert!(SqliteConfig::file(&path).exists());
        assert!(SqliteConfig::memory().exists());
    }
}
