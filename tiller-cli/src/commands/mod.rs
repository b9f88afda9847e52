//! CLI command implementations.

pub mod context;
pub mod database;
pub mod migration;
pub mod version;

use std::path::{Path, PathBuf};

use tiller_migrate::IsolationBoundary;

use crate::cli::GlobalArgs;
use crate::config::Config;
use crate::error::CliResult;

/// The working directory, its configuration and the global flags.
#[derive(Debug, Clone)]
pub struct Project {
    /// Current directory
    pub cwd: PathBuf,
    /// Loaded configuration
    pub config: Config,
    /// Global flags
    pub global: GlobalArgs,
}

impl Project {
    /// Load the configuration for the current directory.
    pub fn load(global: GlobalArgs) -> CliResult<Self> {
        let cwd = std::env::current_dir()?;
        let config = Config::discover(&cwd, global.config.as_deref())?;
        Ok(Self {
            cwd,
            config,
            global,
        })
    }

    /// Open a boundary over the target assembly.
    ///
    /// `connection` overrides the database URL and `migrations_dir` the
    /// directory scaffolded migrations are written to.
    pub async fn open(
        &self,
        connection: Option<&str>,
        migrations_dir: Option<&Path>,
    ) -> CliResult<IsolationBoundary> {
        let assembly = self.config.assembly_path(&self.cwd, &self.global)?;
        let mut executor = self.config.executor_config(&assembly, connection);
        if let Some(dir) = migrations_dir {
            executor = executor.migrations_dir(self.cwd.join(dir));
        }

        let options = self.config.boundary_options(&self.cwd, &self.global, executor)?;
        tracing::debug!(?options, "Opening isolation boundary");
        Ok(IsolationBoundary::open(options).await?)
    }
}

/// Close a boundary, logging instead of failing.
pub async fn close(mut boundary: IsolationBoundary) {
    if let Err(e) = boundary.close().await {
        tracing::warn!(error = %e, "Failed to close isolation boundary");
    }
}
