//! # Tiller
//!
//! A migration executor for persistence contexts.
//!
//! Tiller provides:
//! - Discovery of context and migration types in a target assembly and its references
//! - An isolation boundary that runs target code on its own worker and survives panics
//! - Applying and reverting migrations with a history table, one transaction per step
//! - SQL scripts between any two migrations, optionally idempotent
//! - Scaffolding of new migrations from model differences
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiller::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiller::MigrationError> {
//!     let options = BoundaryOptions::new("bin/Blog.assembly.toml")
//!         .executor(ExecutorConfig::new().database_url("sqlite://blog.db"))
//!         .provider(Arc::new(tiller::sqlite::SqliteProvider::new()));
//!
//!     let mut boundary = IsolationBoundary::open(options).await?;
//!     let report = boundary.apply_migration(None, None).await?;
//!     println!("{}", report.summary());
//!
//!     boundary.close().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Migration engine: assemblies, catalogs, the executor and the isolation boundary.
pub mod migrate {
    pub use tiller_migrate::*;
}

/// SQLite database provider.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use tiller_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ApplyReport, BoundaryOptions, ContextType, ExecutorConfig, IsolationBoundary,
        MigrationBuilder, MigrationType, Model, StaticAssembly, StaticLoader, StatusReport,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationError};
