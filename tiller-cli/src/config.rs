//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tiller_migrate::{BoundaryOptions, ExecutorConfig};
use tiller_sqlite::SqliteProvider;

use crate::cli::GlobalArgs;
use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "tiller.toml";

/// tiller CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationConfig,

    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Project configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Path to the target assembly manifest
    pub assembly: Option<PathBuf>,

    /// Extra directories searched for referenced assemblies
    pub search_paths: Vec<PathBuf>,

    /// Assembly that defines the context types, if not the target
    pub context_assembly: Option<String>,

    /// Namespace for scaffolded migration types
    pub root_namespace: Option<String>,

    /// Directory for scaffolded migrations, relative to the assembly. Must be
    /// the directory the assembly loads migrations from.
    pub migrations_dir: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL; overrides the context's own URL
    pub url: Option<String>,

    /// Timeout for each database command, in seconds
    pub command_timeout_secs: Option<u64>,
}

/// Migration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Migration history table name
    pub history_table: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Load the explicit config file, or `tiller.toml` in `cwd` when present.
    pub fn discover(cwd: &Path, explicit: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(&cwd.join(path));
        }

        let default = cwd.join(CONFIG_FILE_NAME);
        if default.is_file() {
            tracing::debug!(path = %default.display(), "Loading configuration");
            Self::load(&default)
        } else {
            Ok(Self {
                base_dir: cwd.to_path_buf(),
                ..Self::default()
            })
        }
    }

    /// Target assembly: the command-line flag, else the configured path.
    pub fn assembly_path(&self, cwd: &Path, global: &GlobalArgs) -> CliResult<PathBuf> {
        if let Some(path) = &global.assembly {
            return Ok(cwd.join(path));
        }
        self.project
            .assembly
            .as_ref()
            .map(|p| self.base_dir.join(p))
            .ok_or_else(|| {
                CliError::Config(format!(
                    "No assembly given; pass --assembly or set project.assembly in {}",
                    CONFIG_FILE_NAME
                ))
            })
    }

    /// Executor configuration for an assembly. `connection` overrides the
    /// configured database URL.
    pub fn executor_config(&self, assembly: &Path, connection: Option<&str>) -> ExecutorConfig {
        let project_dir = assembly
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());

        let mut config = ExecutorConfig::new().project_dir(project_dir);

        if let Some(dir) = &self.project.migrations_dir {
            config = config.migrations_dir(dir);
        }
        if let Some(ns) = &self.project.root_namespace {
            config = config.root_namespace(ns);
        }
        if let Some(url) = connection.or(self.database.url.as_deref()) {
            config = config.database_url(url);
        }
        if let Some(secs) = self.database.command_timeout_secs {
            config = config.command_timeout(Duration::from_secs(secs));
        }
        if let Some(table) = &self.migrations.history_table {
            config = config.history_table(table);
        }

        config
    }

    /// Boundary options with the SQLite provider registered.
    pub fn boundary_options(
        &self,
        cwd: &Path,
        global: &GlobalArgs,
        executor: ExecutorConfig,
    ) -> CliResult<BoundaryOptions> {
        let assembly = self.assembly_path(cwd, global)?;
        let mut options = BoundaryOptions::new(assembly)
            .executor(executor)
            .provider(Arc::new(SqliteProvider::new()));

        for dir in &self.project.search_paths {
            options = options.search_path(self.base_dir.join(dir));
        }
        for dir in &global.search_paths {
            options = options.search_path(cwd.join(dir));
        }
        if let Some(name) = &self.project.context_assembly {
            options = options.context_assembly(name);
        }

        Ok(options)
    }
}
