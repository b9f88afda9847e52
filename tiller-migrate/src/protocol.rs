//! Messages that cross the isolation boundary.
//!
//! Requests and responses are encoded as JSON text. Nothing that crosses the
//! boundary refers to a live object inside it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::catalog::MigrationDescriptor;
use crate::context::ContextDescriptor;
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{ApplyReport, StatusReport};
use crate::scaffold::ScaffoldedMigration;

/// A request to the isolated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Resolve one context and return its type identity.
    GetContextType {
        /// Context name, or none for the only context.
        context: Option<String>,
    },
    /// List every context.
    GetContextTypes,
    /// List migration ids of a context.
    GetMigrations {
        /// Context name.
        context: Option<String>,
    },
    /// Materialize the migrations of a context.
    DescribeMigrations {
        /// Context name.
        context: Option<String>,
    },
    /// Scaffold a new migration.
    AddMigration {
        /// Migration name.
        name: String,
        /// Context name.
        context: Option<String>,
    },
    /// Apply or revert migrations.
    ApplyMigration {
        /// Target id or name; none for latest, `"0"` for initial.
        target: Option<String>,
        /// Context name.
        context: Option<String>,
    },
    /// Render a migration script.
    ScriptMigration {
        /// Starting point; none for an empty database.
        from: Option<String>,
        /// End point; none for latest.
        to: Option<String>,
        /// Guard each block.
        idempotent: bool,
        /// Context name.
        context: Option<String>,
    },
    /// Applied and pending migrations.
    GetStatus {
        /// Context name.
        context: Option<String>,
    },
}

impl Request {
    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetContextType { .. } => "get_context_type",
            Self::GetContextTypes => "get_context_types",
            Self::GetMigrations { .. } => "get_migrations",
            Self::DescribeMigrations { .. } => "describe_migrations",
            Self::AddMigration { .. } => "add_migration",
            Self::ApplyMigration { .. } => "apply_migration",
            Self::ScriptMigration { .. } => "script_migration",
            Self::GetStatus { .. } => "get_status",
        }
    }
}

/// A response from the isolated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Response {
    /// Assembly-qualified context identity.
    ContextType(String),
    /// Context descriptors.
    ContextTypes(Vec<ContextDescriptor>),
    /// Migration ids in order.
    Migrations(Vec<String>),
    /// Materialized migrations in order.
    MigrationDescriptors(Vec<MigrationDescriptor>),
    /// Scaffold result.
    Scaffolded(ScaffoldedMigration),
    /// Apply result.
    Applied(ApplyReport),
    /// Script text.
    Script(String),
    /// Status.
    Status(StatusReport),
    /// Failure.
    Error(WireError),
}

impl Response {
    /// Response kind for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContextType(_) => "context_type",
            Self::ContextTypes(_) => "context_types",
            Self::Migrations(_) => "migrations",
            Self::MigrationDescriptors(_) => "migration_descriptors",
            Self::Scaffolded(_) => "scaffolded",
            Self::Applied(_) => "applied",
            Self::Script(_) => "script",
            Self::Status(_) => "status",
            Self::Error(_) => "error",
        }
    }
}

/// Error kinds that can cross the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No matching context.
    ContextNotFound,
    /// Several matching contexts.
    AmbiguousContext,
    /// Two migrations share an id.
    DuplicateMigrationId,
    /// Unknown migration.
    MigrationNotFound,
    /// Target code faulted.
    TargetFault,
    /// Database unreachable.
    ConnectionFailure,
    /// A migration step failed.
    StepExecutionFailure,
    /// History disagrees with the catalog.
    ConsistencyError,
    /// Other database error.
    Database,
    /// File system error.
    Io,
    /// Manifest or artifact error.
    Manifest,
    /// Invalid migration.
    InvalidMigration,
    /// Invalid migration name.
    InvalidName,
    /// Generator cannot express an operation.
    Unsupported,
    /// Cancelled between steps.
    Cancelled,
    /// Boundary closed.
    BoundaryClosed,
}

/// A [`MigrationError`] flattened to data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Display message.
    pub message: String,
    /// Migration, context or name the error is about.
    #[serde(default)]
    pub subject: Option<String>,
    /// Secondary detail: reason, owning context, or inner message.
    #[serde(default)]
    pub detail: Option<String>,
    /// Candidate contexts or completed migrations.
    #[serde(default)]
    pub items: Vec<String>,
}

impl From<&MigrationError> for WireError {
    fn from(err: &MigrationError) -> Self {
        let (kind, subject, detail, items) = match err {
            MigrationError::ContextNotFound(name) => {
                (ErrorKind::ContextNotFound, Some(name.clone()), None, Vec::new())
            }
            MigrationError::AmbiguousContext {
                requested,
                candidates,
            } => (
                ErrorKind::AmbiguousContext,
                requested.clone(),
                None,
                candidates.clone(),
            ),
            MigrationError::DuplicateMigrationId { id, context } => (
                ErrorKind::DuplicateMigrationId,
                Some(id.clone()),
                Some(context.clone()),
                Vec::new(),
            ),
            MigrationError::MigrationNotFound { id, context } => (
                ErrorKind::MigrationNotFound,
                Some(id.clone()),
                Some(context.clone()),
                Vec::new(),
            ),
            MigrationError::TargetFault(msg) => {
                (ErrorKind::TargetFault, None, Some(msg.clone()), Vec::new())
            }
            MigrationError::ConnectionFailure(msg) => {
                (ErrorKind::ConnectionFailure, None, Some(msg.clone()), Vec::new())
            }
            MigrationError::StepExecutionFailure { migration, reason } => (
                ErrorKind::StepExecutionFailure,
                Some(migration.clone()),
                Some(reason.clone()),
                Vec::new(),
            ),
            MigrationError::ConsistencyError { context, reason } => (
                ErrorKind::ConsistencyError,
                Some(context.clone()),
                Some(reason.clone()),
                Vec::new(),
            ),
            MigrationError::Database(msg) => {
                (ErrorKind::Database, None, Some(msg.clone()), Vec::new())
            }
            MigrationError::Io(e) => (ErrorKind::Io, None, Some(e.to_string()), Vec::new()),
            MigrationError::Manifest(msg) => {
                (ErrorKind::Manifest, None, Some(msg.clone()), Vec::new())
            }
            MigrationError::InvalidMigration(msg) => {
                (ErrorKind::InvalidMigration, None, Some(msg.clone()), Vec::new())
            }
            MigrationError::InvalidName(name) => {
                (ErrorKind::InvalidName, Some(name.clone()), None, Vec::new())
            }
            MigrationError::Unsupported { dialect, what } => (
                ErrorKind::Unsupported,
                Some(dialect.clone()),
                Some(what.clone()),
                Vec::new(),
            ),
            MigrationError::Cancelled { completed } => {
                (ErrorKind::Cancelled, None, None, completed.clone())
            }
            MigrationError::BoundaryClosed => (ErrorKind::BoundaryClosed, None, None, Vec::new()),
        };

        Self {
            kind,
            message: err.to_string(),
            subject,
            detail,
            items,
        }
    }
}

impl From<WireError> for MigrationError {
    fn from(wire: WireError) -> Self {
        let subject = wire.subject.unwrap_or_default();
        let detail = wire.detail.unwrap_or(wire.message);

        match wire.kind {
            ErrorKind::ContextNotFound => Self::ContextNotFound(subject),
            ErrorKind::AmbiguousContext => Self::AmbiguousContext {
                requested: Some(subject).filter(|s| !s.is_empty()),
                candidates: wire.items,
            },
            ErrorKind::DuplicateMigrationId => Self::DuplicateMigrationId {
                id: subject,
                context: detail,
            },
            ErrorKind::MigrationNotFound => Self::MigrationNotFound {
                id: subject,
                context: detail,
            },
            ErrorKind::TargetFault => Self::TargetFault(detail),
            ErrorKind::ConnectionFailure => Self::ConnectionFailure(detail),
            ErrorKind::StepExecutionFailure => Self::StepExecutionFailure {
                migration: subject,
                reason: detail,
            },
            ErrorKind::ConsistencyError => Self::ConsistencyError {
                context: subject,
                reason: detail,
            },
            ErrorKind::Database => Self::Database(detail),
            ErrorKind::Io => Self::Io(std::io::Error::other(detail)),
            ErrorKind::Manifest => Self::Manifest(detail),
            ErrorKind::InvalidMigration => Self::InvalidMigration(detail),
            ErrorKind::InvalidName => Self::InvalidName(subject),
            ErrorKind::Unsupported => Self::Unsupported {
                dialect: subject,
                what: detail,
            },
            ErrorKind::Cancelled => Self::Cancelled {
                completed: wire.items,
            },
            ErrorKind::BoundaryClosed => Self::BoundaryClosed,
        }
    }
}

/// Encode a message.
pub fn encode<T: Serialize>(message: &T) -> MigrateResult<String> {
    serde_json::to_string(message)
        .map_err(|e| MigrationError::target_fault(format!("Failed to encode message: {}", e)))
}

/// Decode a message.
pub fn decode<T: DeserializeOwned>(payload: &str) -> MigrateResult<T> {
    serde_json::from_str(payload)
        .map_err(|e| MigrationError::target_fault(format!("Failed to decode message: {}", e)))
}

/// Error for a response of the wrong kind.
pub fn unexpected(request: &str, response: &Response) -> MigrationError {
    MigrationError::target_fault(format!(
        "Unexpected '{}' response to '{}'",
        response.kind(),
        request
    ))
}
