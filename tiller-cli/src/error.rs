//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;
use tiller_migrate::MigrationError;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(tiller::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(tiller::config), help("Check tiller.toml or pass --assembly"))]
    Config(String),

    /// Context resolution failed
    #[error("{0}")]
    #[diagnostic(code(tiller::context), help("Run `tiller context list` to see every context type"))]
    Context(MigrationError),

    /// Migration catalog or scaffolding error
    #[error("{0}")]
    #[diagnostic(code(tiller::migration))]
    Migration(MigrationError),

    /// Database error while applying or reading history
    #[error("{0}")]
    #[diagnostic(code(tiller::database))]
    Database(MigrationError),

    /// Target code faulted
    #[error("{0}")]
    #[diagnostic(
        code(tiller::target),
        help("The target assembly panicked; the session was closed")
    )]
    Target(MigrationError),

    /// Command error
    #[error("Command error: {0}")]
    #[diagnostic(code(tiller::command))]
    Command(String),
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::ContextNotFound(_) | MigrationError::AmbiguousContext { .. } => {
                CliError::Context(err)
            }
            MigrationError::TargetFault(_) | MigrationError::BoundaryClosed => {
                CliError::Target(err)
            }
            MigrationError::ConnectionFailure(_)
            | MigrationError::StepExecutionFailure { .. }
            | MigrationError::ConsistencyError { .. }
            | MigrationError::Database(_)
            | MigrationError::Cancelled { .. } => CliError::Database(err),
            MigrationError::Io(e) => CliError::Io(e),
            other => CliError::Migration(other),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Command(format!("Failed to render JSON: {}", err))
    }
}
