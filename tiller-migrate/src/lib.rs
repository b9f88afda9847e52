//! # tiller-migrate
//!
//! Migration executor for tiller.
//!
//! This crate provides functionality for:
//! - Discovering context types and migrations in a target assembly and its references
//! - Resolving contexts by name, with or without the `Context` suffix
//! - Scaffolding new migrations from the declared model
//! - Applying and reverting migrations, one transaction per step
//! - Migration history tracking in the database
//! - Rendering SQL scripts, optionally idempotent
//! - **Isolation boundary** that keeps target code on its own worker
//!
//! ## Architecture
//!
//! The host never touches target code directly. It opens an
//! [`IsolationBoundary`], which loads the target assembly on a worker thread
//! and answers requests encoded as JSON text.
//!
//! ```text
//! ┌──────────────┐  Request   ┌──────────────────────────────────────────┐
//! │ Host / CLI   │───────────▶│ Worker                                   │
//! └──────────────┘            │  ┌──────────────┐    ┌────────────────┐  │
//!        ▲                    │  │ AssemblyScope│───▶│ Context/Catalog│  │
//!        │        Response    │  └──────────────┘    └────────────────┘  │
//!        └────────────────────│                              │           │
//!                             │                              ▼           │
//!                             │  ┌──────────────┐    ┌────────────────┐  │
//!                             │  │ SqlGenerator │◀───│ Executor       │  │
//!                             │  └──────────────┘    └────────────────┘  │
//!                             │                              │           │
//!                             │                              ▼           │
//!                             │                      ┌────────────────┐  │
//!                             │                      │ History Table  │  │
//!                             │                      └────────────────┘  │
//!                             └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiller_migrate::{BoundaryOptions, ExecutorConfig, IsolationBoundary};
//! use tiller_sqlite::SqliteProvider;
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = BoundaryOptions::new("bin/SimpleProject.assembly.toml")
//!         .executor(ExecutorConfig::new().project_dir("."))
//!         .provider(Arc::new(SqliteProvider::new()));
//!
//!     let mut boundary = IsolationBoundary::open(options).await?;
//!
//!     // Which context are we talking about?
//!     let identity = boundary.get_context_type(Some("Simple")).await?;
//!     println!("Context: {}", identity);
//!
//!     // Scaffold, then apply everything
//!     boundary.add_migration("InitialCreate", None).await?;
//!     let report = boundary.apply_migration(None, None).await?;
//!     println!("{}", report.summary());
//!
//!     // Script from an empty database to the latest migration
//!     let sql = boundary.script_migration(None, None, true, None).await?;
//!     println!("{}", sql);
//!
//!     boundary.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Assemblies
//!
//! An assembly is anything implementing [`Assembly`]. Two loaders ship with
//! the crate:
//!
//! - [`ManifestLoader`] reads `<Name>.assembly.toml` manifests and the
//!   migration files next to them
//! - [`StaticLoader`] serves assemblies built in code
//!
//! ```text
//! bin/
//! ├── SimpleProject.assembly.toml
//! └── Migrations/
//!     ├── 201410102227260_InitialCreate.toml
//!     ├── 201410102227260_InitialCreate.designer.toml
//!     └── SimpleContextModelSnapshot.toml
//! ```
//!
//! ## Targets
//!
//! `apply_migration` and `script_migration` take an optional target:
//!
//! - none means the newest migration
//! - `"0"` means no migrations at all
//! - anything else is a migration id, or its name part
//!
//! When the database already has migrations after the target, they are
//! reverted newest first.

pub mod assembly;
pub mod boundary;
pub mod catalog;
pub mod context;
pub mod database;
pub mod diff;
pub mod error;
pub mod executor;
pub mod history;
pub mod manifest;
pub mod metadata;
pub mod model;
pub mod operation;
pub mod protocol;
pub mod scaffold;
pub mod sql;

// Re-exports
pub use assembly::{
    Assembly, AssemblyIdentity, AssemblyLoader, ContextType, MigrationType, StaticAssembly,
    StaticLoader, TypeDef,
};
pub use boundary::{BoundaryOptions, IsolationBoundary};
pub use catalog::{
    MigrationCatalog, MigrationDescriptor, MigrationEntry, MigrationTarget, INITIAL_MIGRATION,
};
pub use context::{ContextDescriptor, ResolvedContext};
pub use database::{CancelToken, Connection, DatabaseProvider, ProviderRegistry};
pub use diff::{ModelDiff, ModelDiffer};
pub use error::{MigrateResult, MigrationError};
pub use executor::{
    ApplyReport, ExecutorConfig, ExecutorState, MigrationExecutor, MigrationPlan, StatusReport,
};
pub use history::{HistoryRecord, HistoryStore, DEFAULT_HISTORY_TABLE};
pub use manifest::{ManifestAssembly, ManifestLoader};
pub use metadata::AssemblyScope;
pub use model::{Column, Entity, Index, Model};
pub use operation::{MigrationBuilder, MigrationDirection, Operation};
pub use protocol::{Request, Response, WireError};
pub use scaffold::{ScaffoldedMigration, Scaffolder};
pub use sql::{Dialect, PostgresGenerator, SqlGenerator, SqliteGenerator};
