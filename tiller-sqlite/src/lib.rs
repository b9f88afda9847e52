//! SQLite database provider for tiller.
//!
//! This crate lets the tiller migration executor apply migrations to SQLite
//! databases, using `tokio-rusqlite` for asynchronous database operations.
//!
//! # Features
//!
//! - Async/await support via `tokio-rusqlite`
//! - One transaction per migration step (`BEGIN IMMEDIATE`)
//! - In-memory and file-based databases
//! - Busy timeout derived from the executor's command timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiller_migrate::{BoundaryOptions, ExecutorConfig, IsolationBoundary};
//! use tiller_sqlite::SqliteProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = BoundaryOptions::new("bin/Blog.assembly.toml")
//!         .executor(ExecutorConfig::new().database_url("sqlite://./blog.db"))
//!         .provider(Arc::new(SqliteProvider::new()));
//!
//!     let mut boundary = IsolationBoundary::open(options).await?;
//!     boundary.apply_migration(None, None).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod provider;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
pub use provider::SqliteProvider;
