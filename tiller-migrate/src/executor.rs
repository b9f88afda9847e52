//! Migration executor.
//!
//! The executor resolves a context, builds its catalog, compares it with the
//! history store and then either runs the pending steps against the database
//! or renders them as a script. Every step runs in its own transaction.
//!
//! Two executors applying migrations to the same database at the same time is
//! not arbitrated here. Callers that may race must hold a database or advisory
//! lock around [`MigrationExecutor::apply`].

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::catalog::{MigrationCatalog, MigrationEntry, MigrationTarget};
use crate::context::{self, ResolvedContext};
use crate::database::{CancelToken, Connection, DatabaseProvider, ProviderRegistry};
use crate::error::{MigrateResult, MigrationError};
use crate::history::{HistoryRecord, HistoryStore, DEFAULT_HISTORY_TABLE};
use crate::manifest::DEFAULT_MIGRATIONS_DIR;
use crate::metadata::AssemblyScope;
use crate::operation::MigrationDirection;
use crate::sql::{Dialect, MigrationBlock, SqlGenerator};

/// Version recorded in history rows and scaffolded artifacts.
pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the migration executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// History table name.
    pub history_table: String,
    /// Product version written to history.
    pub product_version: String,
    /// Timeout for each database operation.
    pub command_timeout: Duration,
    /// Connection used instead of the one the context declares.
    pub database_url: Option<String>,
    /// Dialect used instead of the one derived from the connection.
    pub dialect: Option<Dialect>,
    /// Project directory a configured migrations directory resolves against.
    pub project_dir: PathBuf,
    /// Migrations directory, relative to the project directory. When unset,
    /// scaffolding uses the directory the target assembly loads from.
    pub migrations_dir: Option<PathBuf>,
    /// Namespace of scaffolded migration types.
    pub root_namespace: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            product_version: PRODUCT_VERSION.to_string(),
            command_timeout: Duration::from_secs(30),
            database_url: None,
            dialect: None,
            project_dir: PathBuf::from("."),
            migrations_dir: None,
            root_namespace: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the history table name.
    pub fn history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }

    /// Set the product version.
    pub fn product_version(mut self, version: impl Into<String>) -> Self {
        self.product_version = version.into();
        self
    }

    /// Set the per-operation timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Override the database connection.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Override the SQL dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Set the project directory.
    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    /// Set the root namespace.
    pub fn root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.root_namespace = Some(namespace.into());
        self
    }

    /// Configured migrations directory, or `Migrations` under the project directory.
    pub fn migrations_path(&self) -> PathBuf {
        self.project_dir.join(
            self.migrations_dir
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_MIGRATIONS_DIR)),
        )
    }
}

/// Executor progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    /// Nothing running.
    Idle,
    /// Resolving the context and catalog.
    Resolving,
    /// Reading history and planning steps.
    ComputingPending,
    /// Running step `i` of the plan.
    Applying(usize),
    /// The last operation finished.
    Committed,
    /// The last operation failed.
    Failed,
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resolving => write!(f, "resolving"),
            Self::ComputingPending => write!(f, "computing pending"),
            Self::Applying(i) => write!(f, "applying step {}", i + 1),
            Self::Committed => write!(f, "committed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of an `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Context full name.
    pub context: String,
    /// `Down` when anything was reverted, otherwise `Up`.
    pub direction: MigrationDirection,
    /// Ids applied, in order.
    pub applied: Vec<String>,
    /// Ids reverted, in order.
    pub reverted: Vec<String>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl ApplyReport {
    /// Check if any step ran.
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty() || !self.reverted.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.applied.is_empty() {
            parts.push(format!("{} applied", self.applied.len()));
        }

        if !self.reverted.is_empty() {
            parts.push(format!("{} reverted", self.reverted.len()));
        }

        if parts.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!("{} in {}ms", parts.join(", "), self.duration_ms)
        }
    }
}

/// Applied and pending migrations of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Context full name.
    pub context: String,
    /// Applied ids in application order.
    pub applied: Vec<String>,
    /// Pending ids in id order.
    pub pending: Vec<String>,
}

/// Steps to run, as catalog indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Applied migrations at or after the target, newest first.
    pub revert: Vec<usize>,
    /// Pending migrations before the target, in id order. Runs after `revert`.
    pub apply: Vec<usize>,
}

impl MigrationPlan {
    /// `Down` when anything is reverted, otherwise `Up`.
    pub fn direction(&self) -> MigrationDirection {
        if self.revert.is_empty() {
            MigrationDirection::Up
        } else {
            MigrationDirection::Down
        }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.revert.len() + self.apply.len()
    }

    /// Check if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.revert.is_empty() && self.apply.is_empty()
    }

    /// Every step with its direction, in execution order.
    pub fn steps(&self) -> impl Iterator<Item = (usize, MigrationDirection)> + '_ {
        self.revert
            .iter()
            .map(|i| (*i, MigrationDirection::Down))
            .chain(self.apply.iter().map(|i| (*i, MigrationDirection::Up)))
    }
}

/// Compute the steps that move the database to `target_len` catalog entries.
///
/// Applied migrations at or after `target_len` are reverted newest first.
/// Any migration before `target_len` missing from history is then applied in
/// id order, so a history with gaps still ends exactly at the target.
pub fn plan(
    catalog: &MigrationCatalog,
    applied: &[HistoryRecord],
    target_len: usize,
) -> MigrateResult<MigrationPlan> {
    let mut applied_positions = HashSet::new();
    for record in applied {
        let position = catalog.position(&record.migration_id).ok_or_else(|| {
            MigrationError::consistency(
                &catalog.context().full_name,
                format!(
                    "migration '{}' is recorded as applied but is not defined in the assembly",
                    record.migration_id
                ),
            )
        })?;
        applied_positions.insert(position);
    }

    let mut revert: Vec<usize> = applied_positions
        .iter()
        .copied()
        .filter(|p| *p >= target_len)
        .collect();
    revert.sort_unstable_by(|a, b| b.cmp(a));

    Ok(MigrationPlan {
        revert,
        apply: (0..target_len)
            .filter(|p| !applied_positions.contains(p))
            .collect(),
    })
}

/// Run a database operation under the command timeout.
async fn timed<T, F>(limit: Duration, what: &str, fut: F) -> MigrateResult<T>
where
    F: Future<Output = MigrateResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MigrationError::database(format!(
            "{} timed out after {:.1}s",
            what,
            limit.as_secs_f64()
        ))),
    }
}

/// The migration executor.
pub struct MigrationExecutor {
    config: ExecutorConfig,
    providers: ProviderRegistry,
    cancel: CancelToken,
    state: ExecutorState,
}

impl MigrationExecutor {
    /// Create an executor.
    pub fn new(config: ExecutorConfig, providers: ProviderRegistry) -> Self {
        Self {
            config,
            providers,
            cancel: CancelToken::new(),
            state: ExecutorState::Idle,
        }
    }

    /// Use a shared cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn resolve(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
    ) -> MigrateResult<(ResolvedContext, MigrationCatalog)> {
        self.state = ExecutorState::Resolving;
        let context = context::resolve_in(scope, context_name)?;
        let catalog = MigrationCatalog::build(&context.descriptor, &scope.migration_types())?;
        Ok((context, catalog))
    }

    fn database_url(&self, context: &ResolvedContext) -> MigrateResult<String> {
        self.config
            .database_url
            .clone()
            .or_else(|| context.ty.database_url())
            .ok_or_else(|| {
                MigrationError::connection(format!(
                    "No database is configured for context '{}'",
                    context.descriptor.full_name
                ))
            })
    }

    fn dialect(&self, context: &ResolvedContext) -> MigrateResult<Dialect> {
        if let Some(dialect) = self.config.dialect.or_else(|| context.ty.dialect()) {
            return Ok(dialect);
        }

        let url = self.database_url(context)?;
        match Dialect::from_url(&url) {
            Some(dialect) => Ok(dialect),
            None => Ok(self.providers.for_url(&url)?.dialect()),
        }
    }

    /// Apply or revert migrations so the database matches `target`.
    pub async fn apply(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        target: &MigrationTarget,
    ) -> MigrateResult<ApplyReport> {
        let result = self.try_apply(scope, context_name, target).await;
        self.state = match result {
            Ok(_) => ExecutorState::Committed,
            Err(_) => ExecutorState::Failed,
        };
        result
    }

    async fn try_apply(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        target: &MigrationTarget,
    ) -> MigrateResult<ApplyReport> {
        let started = Instant::now();
        let (context, catalog) = self.resolve(scope, context_name)?;
        let target_len = catalog.prefix_len(target)?;

        self.state = ExecutorState::ComputingPending;
        let url = self.database_url(&context)?;
        let provider = self.providers.for_url(&url)?;
        let dialect = self.dialect(&context)?;
        let generator = dialect.generator();

        let mut conn = self.connect(provider.as_ref(), &url).await?;
        let outcome = self
            .run_plan(conn.as_mut(), generator.as_ref(), &catalog, target_len)
            .await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close connection");
        }

        let (direction, applied, reverted) = outcome?;
        let report = ApplyReport {
            context: context.descriptor.full_name.clone(),
            direction,
            applied,
            reverted,
            duration_ms: started.elapsed().as_millis() as i64,
        };

        tracing::info!(
            context = %report.context,
            duration_ms = report.duration_ms,
            "{}",
            report.summary()
        );
        Ok(report)
    }

    async fn connect(
        &self,
        provider: &dyn DatabaseProvider,
        url: &str,
    ) -> MigrateResult<Box<dyn Connection>> {
        let limit = self.config.command_timeout;
        timed(limit, "Connecting", provider.connect(url, limit))
            .await
            .map_err(|e| match e {
                MigrationError::ConnectionFailure(_) => e,
                other => MigrationError::connection(other.to_string()),
            })
    }

    async fn run_plan(
        &mut self,
        conn: &mut dyn Connection,
        generator: &dyn SqlGenerator,
        catalog: &MigrationCatalog,
        target_len: usize,
    ) -> MigrateResult<(MigrationDirection, Vec<String>, Vec<String>)> {
        let limit = self.config.command_timeout;
        let context = catalog.context().full_name.clone();
        let history = HistoryStore::new(&self.config.history_table, generator);

        timed(limit, "Creating history table", history.ensure_schema(conn)).await?;
        let applied = timed(
            limit,
            "Reading history",
            history.list_applied(conn, &context),
        )
        .await?;

        let plan = plan(catalog, &applied, target_len)?;
        tracing::debug!(
            context = %context,
            direction = %plan.direction(),
            revert = plan.revert.len(),
            apply = plan.apply.len(),
            "Computed migration plan"
        );

        let mut completed = Vec::new();
        let mut applied_ids = Vec::new();
        let mut reverted_ids = Vec::new();
        for (i, (index, direction)) in plan.steps().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(context = %context, completed = completed.len(), "Cancelled");
                return Err(MigrationError::Cancelled { completed });
            }

            self.state = ExecutorState::Applying(i);
            let entry = &catalog.entries()[index];
            self.run_step(conn, generator, &history, &context, entry, direction)
                .await?;
            completed.push(entry.id.clone());
            match direction {
                MigrationDirection::Up => applied_ids.push(entry.id.clone()),
                MigrationDirection::Down => reverted_ids.push(entry.id.clone()),
            }
        }

        Ok((plan.direction(), applied_ids, reverted_ids))
    }

    async fn run_step(
        &self,
        conn: &mut dyn Connection,
        generator: &dyn SqlGenerator,
        history: &HistoryStore<'_>,
        context: &str,
        entry: &MigrationEntry,
        direction: MigrationDirection,
    ) -> MigrateResult<()> {
        let limit = self.config.command_timeout;
        let statements = generator
            .generate(&entry.operations(direction))
            .map_err(|e| MigrationError::step(&entry.id, e.to_string()))?;

        tracing::info!(
            context = %context,
            migration = %entry.id,
            direction = %direction,
            statements = statements.len(),
            "Running migration"
        );

        timed(limit, "Beginning transaction", conn.begin())
            .await
            .map_err(|e| MigrationError::step(&entry.id, e.to_string()))?;

        let outcome: MigrateResult<()> = async {
            for sql in &statements {
                timed(limit, "Statement", conn.execute(sql)).await?;
            }
            match direction {
                MigrationDirection::Up => {
                    let version = &self.config.product_version;
                    timed(
                        limit,
                        "Recording history",
                        history.append(conn, context, &entry.id, version),
                    )
                    .await?;
                }
                MigrationDirection::Down => {
                    timed(
                        limit,
                        "Removing history",
                        history.remove(conn, context, &entry.id),
                    )
                    .await?;
                }
            }
            timed(limit, "Committing", conn.commit()).await
        }
        .await;

        if let Err(e) = outcome {
            if let Err(rollback) = timed(limit, "Rolling back", conn.rollback()).await {
                tracing::error!(migration = %entry.id, error = %rollback, "Rollback failed");
            }
            tracing::error!(migration = %entry.id, error = %e, "Migration step failed");
            return Err(MigrationError::step(&entry.id, e.to_string()));
        }

        Ok(())
    }

    /// Render the SQL that moves a database from `from` to `to`.
    ///
    /// Never touches the database. With no `from`, the script starts by
    /// creating the history table.
    pub fn script(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        from: Option<&str>,
        to: &MigrationTarget,
        idempotent: bool,
    ) -> MigrateResult<String> {
        let result = self.try_script(scope, context_name, from, to, idempotent);
        self.state = match result {
            Ok(_) => ExecutorState::Idle,
            Err(_) => ExecutorState::Failed,
        };
        result
    }

    fn try_script(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        from: Option<&str>,
        to: &MigrationTarget,
        idempotent: bool,
    ) -> MigrateResult<String> {
        let (context, catalog) = self.resolve(scope, context_name)?;
        let from_target = from.map(|f| MigrationTarget::parse(Some(f)));
        let from_len = match &from_target {
            Some(target) => catalog.prefix_len(target)?,
            None => 0,
        };
        let to_len = catalog.prefix_len(to)?;

        let generator = self.dialect(&context)?.generator();
        let context_key = context.descriptor.full_name.as_str();

        let (direction, steps): (MigrationDirection, Vec<&MigrationEntry>) = if to_len >= from_len
        {
            (
                MigrationDirection::Up,
                catalog.entries()[from_len..to_len].iter().collect(),
            )
        } else {
            (
                MigrationDirection::Down,
                catalog.entries()[to_len..from_len].iter().rev().collect(),
            )
        };

        let mut script = String::new();
        if from_target.is_none() || from_target == Some(MigrationTarget::Initial) {
            script.push_str(&generator.create_history_table(&self.config.history_table));
            script.push_str("\n\n");
        }

        for entry in steps {
            let operations = entry.operations(direction);
            let block = MigrationBlock {
                history_table: &self.config.history_table,
                context: context_key,
                migration_id: &entry.id,
                product_version: &self.config.product_version,
                direction,
                operations: &operations,
            };
            let statements = if idempotent {
                generator.guarded_block(&block)?
            } else {
                generator.block(&block)?
            };

            script.push_str(&format!("-- Migration {} ({})\n", entry.id, direction));
            for statement in statements {
                script.push_str(&statement);
                script.push('\n');
            }
            script.push('\n');
        }

        tracing::debug!(
            context = %context_key,
            from = ?from,
            to = %to,
            idempotent,
            "Rendered migration script"
        );

        Ok(script.trim_end().to_string() + "\n")
    }

    /// Applied and pending migrations of a context.
    ///
    /// Read only. A database or history table that does not exist yet reports
    /// every migration as pending and is not created.
    pub async fn status(
        &mut self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
    ) -> MigrateResult<StatusReport> {
        let (context, catalog) = self.resolve(scope, context_name)?;
        self.state = ExecutorState::ComputingPending;
        let result = self.try_status(&context, &catalog).await;
        self.state = ExecutorState::Idle;
        result
    }

    async fn try_status(
        &self,
        context: &ResolvedContext,
        catalog: &MigrationCatalog,
    ) -> MigrateResult<StatusReport> {
        let limit = self.config.command_timeout;
        let url = self.database_url(context)?;
        let provider: Arc<dyn DatabaseProvider> = self.providers.for_url(&url)?;
        let key = context.descriptor.full_name.clone();

        if !timed(limit, "Checking database", provider.exists(&url)).await? {
            return Ok(StatusReport {
                context: key,
                applied: Vec::new(),
                pending: catalog.ids(),
            });
        }

        let generator = self.dialect(context)?.generator();
        let history = HistoryStore::new(&self.config.history_table, generator.as_ref());
        let mut conn = self.connect(provider.as_ref(), &url).await?;

        let applied: MigrateResult<Vec<HistoryRecord>> = async {
            if !timed(limit, "Checking history table", history.exists(conn.as_mut())).await? {
                return Ok(Vec::new());
            }
            timed(limit, "Reading history", history.list_applied(conn.as_mut(), &key)).await
        }
        .await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close connection");
        }
        let applied = applied?;

        // Validates every applied id against the catalog.
        let up = plan(catalog, &applied, catalog.len())?;

        Ok(StatusReport {
            context: key,
            applied: applied.into_iter().map(|r| r.migration_id).collect(),
            pending: up
                .apply
                .iter()
                .map(|i| catalog.entries()[*i].id.clone())
                .collect(),
        })
    }
}

impl std::fmt::Debug for MigrationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationExecutor")
            .field("config", &self.config)
            .field("providers", &self.providers)
            .field("state", &self.state)
            .finish()
    }
}
