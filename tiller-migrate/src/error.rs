//! Error types for the migration executor.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while discovering, applying or scripting migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No context matched the requested name.
    #[error("{}", context_not_found(.0))]
    ContextNotFound(String),

    /// More than one context matched, or no name was given and several exist.
    #[error("More than one context type was found{}. Specify one of: {}", requested_suffix(.requested), .candidates.join(", "))]
    AmbiguousContext {
        /// The name that was requested, if any.
        requested: Option<String>,
        /// Candidate context type names.
        candidates: Vec<String>,
    },

    /// Two migrations of one context share an id.
    #[error("Migration id '{id}' is defined more than once for context '{context}'")]
    DuplicateMigrationId {
        /// The duplicated id.
        id: String,
        /// Context full name.
        context: String,
    },

    /// A named migration does not exist in the catalog.
    #[error("Migration '{id}' was not found for context '{context}'")]
    MigrationNotFound {
        /// The requested id.
        id: String,
        /// Context full name.
        context: String,
    },

    /// Target code faulted inside the isolation boundary.
    #[error("The target assembly faulted: {0}")]
    TargetFault(String),

    /// The database could not be reached.
    #[error("Could not connect to the database: {0}")]
    ConnectionFailure(String),

    /// SQL failed while applying or reverting a migration step.
    #[error("Migration '{migration}' failed: {reason}")]
    StepExecutionFailure {
        /// Migration whose step failed.
        migration: String,
        /// Underlying failure.
        reason: String,
    },

    /// The history store disagrees with the catalog.
    #[error("Migration history for context '{context}' is inconsistent: {reason}")]
    ConsistencyError {
        /// Context full name.
        context: String,
        /// What is inconsistent.
        reason: String,
    },

    /// Database error outside of a migration step.
    #[error("Database error: {0}")]
    Database(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Assembly manifest or artifact could not be read or written.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Invalid migration definition.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Invalid migration name.
    #[error("Invalid migration name '{0}': names must start with a letter and contain only letters, digits and '_'")]
    InvalidName(String),

    /// The SQL generator cannot express an operation.
    #[error("Unsupported by the {dialect} generator: {what}")]
    Unsupported {
        /// Generator dialect.
        dialect: String,
        /// What could not be generated.
        what: String,
    },

    /// The operation was cancelled between migration steps.
    #[error("Cancelled after {} completed migration step(s)", .completed.len())]
    Cancelled {
        /// Steps committed before cancellation was observed.
        completed: Vec<String>,
    },

    /// The isolation boundary is no longer usable.
    #[error("The isolation boundary has been closed")]
    BoundaryClosed,
}

fn context_not_found(name: &str) -> String {
    if name.is_empty() {
        "No context types were found".to_string()
    } else {
        format!("No context type named '{}' was found", name)
    }
}

fn requested_suffix(requested: &Option<String>) -> String {
    match requested {
        Some(name) => format!(" matching '{}'", name),
        None => String::new(),
    }
}

impl MigrationError {
    /// Create a target fault error.
    pub fn target_fault(msg: impl Into<String>) -> Self {
        Self::TargetFault(msg.into())
    }

    /// Create a connection failure error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a step execution failure.
    pub fn step(migration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepExecutionFailure {
            migration: migration.into(),
            reason: reason.into(),
        }
    }

    /// Create a consistency error.
    pub fn consistency(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConsistencyError {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(dialect: impl Into<String>, what: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect: dialect.into(),
            what: what.into(),
        }
    }

    /// Errors raised while resolving contexts and catalogs, before any database I/O.
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            Self::ContextNotFound(_)
                | Self::AmbiguousContext { .. }
                | Self::DuplicateMigrationId { .. }
                | Self::MigrationNotFound { .. }
        )
    }

    /// Errors raised while executing against the database.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Self::StepExecutionFailure { .. } | Self::ConnectionFailure(_) | Self::Database(_)
        )
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(err: toml::de::Error) -> Self {
        MigrationError::Manifest(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for MigrationError {
    fn from(err: toml::ser::Error) -> Self {
        MigrationError::Manifest(format!("Failed to serialize TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_display_lists_candidates() {
        let err = MigrationError::AmbiguousContext {
            requested: None,
            candidates: vec!["App.Context1".into(), "App.Context2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("App.Context1"));
        assert!(msg.contains("App.Context2"));
        assert!(!msg.contains("matching"));
    }

    #[test]
    fn test_ambiguous_display_with_request() {
        let err = MigrationError::AmbiguousContext {
            requested: Some("blog".into()),
            candidates: vec!["A.Blog".into(), "B.BlogContext".into()],
        };
        assert!(err.to_string().contains("matching 'blog'"));
    }

    #[test]
    fn test_step_failure_names_migration() {
        let err = MigrationError::step("20240101000000_Init", "no such table: users");
        let msg = err.to_string();
        assert!(msg.contains("20240101000000_Init"));
        assert!(msg.contains("no such table"));
    }

    #[test]
    fn test_classification() {
        assert!(MigrationError::ContextNotFound("X".into()).is_discovery());
        assert!(!MigrationError::ContextNotFound("X".into()).is_execution());
        assert!(MigrationError::connection("refused").is_execution());
        assert!(!MigrationError::target_fault("boom").is_discovery());
    }

    #[test]
    fn test_context_not_found_display() {
        assert_eq!(
            MigrationError::ContextNotFound("Blog".into()).to_string(),
            "No context type named 'Blog' was found"
        );
        assert_eq!(
            MigrationError::ContextNotFound(String::new()).to_string(),
            "No context types were found"
        );
    }

    #[test]
    fn test_cancelled_display() {
        let err = MigrationError::Cancelled {
            completed: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("2 completed"));
    }
}
