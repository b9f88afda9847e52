//! The isolation boundary around a target assembly.
//!
//! The target assembly, its references and every type they define live on a
//! dedicated worker thread with its own single-threaded runtime. The host only
//! exchanges JSON text with it (see [`crate::protocol`]). A panic in target
//! code is caught on the worker, reported as [`MigrationError::TargetFault`]
//! and ends the session; the boundary closes itself and later calls fail with
//! [`MigrationError::BoundaryClosed`].
//!
//! ```rust,ignore
//! use tiller_migrate::{BoundaryOptions, ExecutorConfig, IsolationBoundary};
//!
//! let options = BoundaryOptions::new("bin/Blog.assembly.toml")
//!     .executor(ExecutorConfig::new().database_url("sqlite://blog.db"))
//!     .provider(Arc::new(SqliteProvider::new()));
//!
//! let mut boundary = IsolationBoundary::open(options).await?;
//! let report = boundary.apply_migration(None, None).await?;
//! boundary.close().await?;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::assembly::AssemblyLoader;
use crate::catalog::{MigrationCatalog, MigrationDescriptor, MigrationTarget};
use crate::context::{self, ContextDescriptor};
use crate::database::{CancelToken, DatabaseProvider, ProviderRegistry};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{ApplyReport, ExecutorConfig, MigrationExecutor, StatusReport};
use crate::manifest::ManifestLoader;
use crate::metadata::AssemblyScope;
use crate::protocol::{self, ErrorKind, Request, Response, WireError};
use crate::scaffold::{ScaffoldedMigration, Scaffolder};

const WORKER_THREAD_NAME: &str = "tiller-sandbox";

/// Options for opening an [`IsolationBoundary`].
#[derive(Clone)]
pub struct BoundaryOptions {
    assembly: PathBuf,
    search_paths: Vec<PathBuf>,
    context_assembly: Option<String>,
    executor: ExecutorConfig,
    providers: ProviderRegistry,
    loader: Arc<dyn AssemblyLoader>,
}

impl BoundaryOptions {
    /// Options for the target assembly at `assembly`.
    ///
    /// The directory containing the assembly is searched for references.
    pub fn new(assembly: impl Into<PathBuf>) -> Self {
        let assembly = assembly.into();
        let search_paths = assembly
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| vec![dir.to_path_buf()])
            .unwrap_or_default();

        Self {
            assembly,
            search_paths,
            context_assembly: None,
            executor: ExecutorConfig::default(),
            providers: ProviderRegistry::default(),
            loader: Arc::new(ManifestLoader),
        }
    }

    /// Add a directory to search for referenced assemblies.
    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !self.search_paths.contains(&dir) {
            self.search_paths.push(dir);
        }
        self
    }

    /// Name an extra assembly that defines context types.
    pub fn context_assembly(mut self, name: impl Into<String>) -> Self {
        self.context_assembly = Some(name.into());
        self
    }

    /// Set the executor configuration.
    pub fn executor(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    /// Register a database provider.
    pub fn provider(mut self, provider: Arc<dyn DatabaseProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    /// Use a custom assembly loader.
    pub fn loader(mut self, loader: Arc<dyn AssemblyLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Path of the target assembly.
    pub fn assembly(&self) -> &Path {
        &self.assembly
    }

    /// Directories searched for references.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl std::fmt::Debug for BoundaryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryOptions")
            .field("assembly", &self.assembly)
            .field("search_paths", &self.search_paths)
            .field("context_assembly", &self.context_assembly)
            .field("executor", &self.executor)
            .field("providers", &self.providers)
            .finish()
    }
}

struct Envelope {
    payload: String,
    reply: oneshot::Sender<String>,
}

/// Handle to an isolated session over one target assembly.
///
/// Every method sends one request and waits for its response. The handle
/// closes itself when the target faults.
pub struct IsolationBoundary {
    assembly: PathBuf,
    sender: Option<mpsc::UnboundedSender<Envelope>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancelToken,
}

impl IsolationBoundary {
    /// Load the target assembly on a fresh worker and wait until it is ready.
    pub async fn open(options: BoundaryOptions) -> MigrateResult<Self> {
        let assembly = options.assembly.clone();
        let cancel = CancelToken::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker_cancel = cancel.clone();
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(options, worker_cancel, receiver, ready_tx))
            .map_err(MigrationError::Io)?;

        let mut boundary = Self {
            assembly,
            sender: Some(sender),
            worker: Some(worker),
            cancel,
        };

        let ready = ready_rx
            .await
            .unwrap_or_else(|_| Err(MigrationError::target_fault("The worker exited while loading")));

        match ready {
            Ok(()) => {
                tracing::info!(assembly = %boundary.assembly.display(), "Opened isolation boundary");
                Ok(boundary)
            }
            Err(e) => {
                if let Err(close_err) = boundary.close().await {
                    tracing::warn!(error = %close_err, "Failed to stop worker");
                }
                Err(e)
            }
        }
    }

    /// Path of the target assembly.
    pub fn assembly(&self) -> &Path {
        &self.assembly
    }

    /// Check whether the boundary still accepts requests.
    pub fn is_open(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Token that stops `apply_migration` before its next step.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Assembly-qualified identity of one context.
    pub async fn get_context_type(&mut self, context: Option<&str>) -> MigrateResult<String> {
        let request = Request::GetContextType {
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::ContextType(identity) => Ok(identity),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Every context type in the target and its references.
    pub async fn get_context_types(&mut self) -> MigrateResult<Vec<ContextDescriptor>> {
        let request = Request::GetContextTypes;
        match self.invoke(&request).await? {
            Response::ContextTypes(contexts) => Ok(contexts),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Migration ids of a context in ascending order.
    pub async fn get_migrations(&mut self, context: Option<&str>) -> MigrateResult<Vec<String>> {
        let request = Request::GetMigrations {
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::Migrations(ids) => Ok(ids),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Fully materialized migrations of a context.
    pub async fn describe_migrations(
        &mut self,
        context: Option<&str>,
    ) -> MigrateResult<Vec<MigrationDescriptor>> {
        let request = Request::DescribeMigrations {
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::MigrationDescriptors(migrations) => Ok(migrations),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Scaffold a new migration. It is not part of the catalog until the
    /// boundary is reopened.
    pub async fn add_migration(
        &mut self,
        name: &str,
        context: Option<&str>,
    ) -> MigrateResult<ScaffoldedMigration> {
        let request = Request::AddMigration {
            name: name.to_string(),
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::Scaffolded(migration) => Ok(migration),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Apply or revert migrations up to `target`.
    pub async fn apply_migration(
        &mut self,
        target: Option<&str>,
        context: Option<&str>,
    ) -> MigrateResult<ApplyReport> {
        let request = Request::ApplyMigration {
            target: target.map(str::to_string),
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::Applied(report) => Ok(report),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Render the SQL script between two migrations.
    pub async fn script_migration(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        idempotent: bool,
        context: Option<&str>,
    ) -> MigrateResult<String> {
        let request = Request::ScriptMigration {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
            idempotent,
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::Script(script) => Ok(script),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Applied and pending migrations of a context.
    pub async fn status(&mut self, context: Option<&str>) -> MigrateResult<StatusReport> {
        let request = Request::GetStatus {
            context: context.map(str::to_string),
        };
        match self.invoke(&request).await? {
            Response::Status(report) => Ok(report),
            other => Err(protocol::unexpected(request.name(), &other)),
        }
    }

    /// Stop the worker and release the target assembly.
    pub async fn close(&mut self) -> MigrateResult<()> {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|e| MigrationError::target_fault(e.to_string()))?
            .map_err(|panic| MigrationError::target_fault(panic_message(panic)))?;

        tracing::debug!(assembly = %self.assembly.display(), "Closed isolation boundary");
        Ok(())
    }

    async fn invoke(&mut self, request: &Request) -> MigrateResult<Response> {
        let sender = self.sender.as_ref().ok_or(MigrationError::BoundaryClosed)?;
        let payload = protocol::encode(request)?;
        let (reply, reply_rx) = oneshot::channel();

        tracing::debug!(op = request.name(), "Sending request");
        sender
            .send(Envelope { payload, reply })
            .map_err(|_| MigrationError::BoundaryClosed)?;

        let Ok(text) = reply_rx.await else {
            self.close_after_fault().await;
            return Err(MigrationError::BoundaryClosed);
        };

        match protocol::decode::<Response>(&text)? {
            Response::Error(wire) => {
                let err = MigrationError::from(wire);
                if matches!(err, MigrationError::TargetFault(_)) {
                    self.close_after_fault().await;
                }
                Err(err)
            }
            response => Ok(response),
        }
    }

    async fn close_after_fault(&mut self) {
        tracing::warn!(assembly = %self.assembly.display(), "Closing isolation boundary after a fault");
        if let Err(e) = self.close().await {
            tracing::warn!(error = %e, "Failed to stop worker");
        }
    }
}

impl Drop for IsolationBoundary {
    fn drop(&mut self) {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return;
        };

        if worker.is_finished() {
            if worker.join().is_err() {
                tracing::warn!("Worker panicked during shutdown");
            }
            return;
        }

        // The worker exits after its current request once the channel is gone.
        self.cancel.cancel();
        tracing::warn!(
            assembly = %self.assembly.display(),
            "Isolation boundary dropped without close; detaching worker"
        );
    }
}

impl std::fmt::Debug for IsolationBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationBoundary")
            .field("assembly", &self.assembly)
            .field("open", &self.is_open())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "target code panicked".to_string()
    }
}

fn run_worker(
    options: BoundaryOptions,
    cancel: CancelToken,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    ready: oneshot::Sender<MigrateResult<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(MigrationError::Io(e)));
            return;
        }
    };

    runtime.block_on(async move {
        let BoundaryOptions {
            assembly,
            search_paths,
            context_assembly,
            executor,
            providers,
            loader,
        } = options;

        let loaded = std::panic::catch_unwind(AssertUnwindSafe(|| {
            AssemblyScope::load(
                loader.as_ref(),
                &assembly,
                &search_paths,
                context_assembly.as_deref(),
            )
        }));

        let scope = match loaded {
            Ok(Ok(scope)) => scope,
            Ok(Err(e)) => {
                let _ = ready.send(Err(e));
                return;
            }
            Err(panic) => {
                let _ = ready.send(Err(MigrationError::target_fault(panic_message(panic))));
                return;
            }
        };

        let mut session = Session {
            scope,
            executor: MigrationExecutor::new(executor, providers).with_cancel_token(cancel),
        };

        if ready.send(Ok(())).is_err() {
            return;
        }

        while let Some(envelope) = receiver.recv().await {
            let (response, faulted) = session.handle(&envelope.payload).await;
            // A dropped reply reads as a closed boundary on the host.
            let Some(response) = response else { break };
            let _ = envelope.reply.send(response);
            if faulted {
                break;
            }
        }

        tracing::debug!("Isolated session ended");
    });
}

/// State owned by the worker thread.
struct Session {
    scope: AssemblyScope,
    executor: MigrationExecutor,
}

impl Session {
    /// Handle one encoded request. Returns the encoded response and whether
    /// the target faulted.
    async fn handle(&mut self, payload: &str) -> (Option<String>, bool) {
        let response = match protocol::decode::<Request>(payload) {
            Ok(request) => {
                let op = request.name();
                match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        tracing::debug!(op, error = %e, "Request failed");
                        Response::Error(WireError::from(&e))
                    }
                    Err(panic) => {
                        let e = MigrationError::target_fault(panic_message(panic));
                        tracing::error!(op, error = %e, "Target code faulted");
                        Response::Error(WireError::from(&e))
                    }
                }
            }
            Err(e) => Response::Error(WireError::from(&e)),
        };

        let faulted =
            matches!(&response, Response::Error(wire) if wire.kind == ErrorKind::TargetFault);

        let encoded = protocol::encode(&response).or_else(|e| {
            protocol::encode(&Response::Error(WireError::from(&e)))
        });

        (encoded.ok(), faulted)
    }

    async fn dispatch(&mut self, request: Request) -> MigrateResult<Response> {
        match request {
            Request::GetContextType { context } => {
                let resolved = context::resolve_in(&self.scope, context.as_deref())?;
                Ok(Response::ContextType(resolved.descriptor.type_identity))
            }
            Request::GetContextTypes => Ok(Response::ContextTypes(context::list_contexts(
                &self.scope,
            ))),
            Request::GetMigrations { context } => {
                let catalog = self.catalog(context.as_deref())?;
                Ok(Response::Migrations(catalog.ids()))
            }
            Request::DescribeMigrations { context } => {
                let catalog = self.catalog(context.as_deref())?;
                Ok(Response::MigrationDescriptors(catalog.describe()))
            }
            Request::AddMigration { name, context } => {
                let migration = Scaffolder::new(self.executor.config())
                    .scaffold(&self.scope, context.as_deref(), &name)
                    .await?;
                Ok(Response::Scaffolded(migration))
            }
            Request::ApplyMigration { target, context } => {
                let report = self
                    .executor
                    .apply(
                        &self.scope,
                        context.as_deref(),
                        &MigrationTarget::parse(target.as_deref()),
                    )
                    .await?;
                Ok(Response::Applied(report))
            }
            Request::ScriptMigration {
                from,
                to,
                idempotent,
                context,
            } => {
                let script = self.executor.script(
                    &self.scope,
                    context.as_deref(),
                    from.as_deref(),
                    &MigrationTarget::parse(to.as_deref()),
                    idempotent,
                )?;
                Ok(Response::Script(script))
            }
            Request::GetStatus { context } => {
                let report = self.executor.status(&self.scope, context.as_deref()).await?;
                Ok(Response::Status(report))
            }
        }
    }

    fn catalog(&self, context: Option<&str>) -> MigrateResult<MigrationCatalog> {
        let resolved = context::resolve_in(&self.scope, context)?;
        MigrationCatalog::build(&resolved.descriptor, &self.scope.migration_types())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::assembly::{ContextType, MigrationType, StaticAssembly, StaticLoader};
    use crate::model::Model;
    use crate::operation::MigrationBuilder;

    struct SimpleContext;

    impl ContextType for SimpleContext {
        fn full_name(&self) -> &str {
            "SimpleProject.SimpleContext"
        }

        fn model(&self) -> Model {
            Model::new()
        }
    }

    struct FaultyContext;

    impl ContextType for FaultyContext {
        fn full_name(&self) -> &str {
            "SimpleProject.FaultyContext"
        }

        fn model(&self) -> Model {
            panic!("model building failed")
        }
    }

    struct LazyMigration;

    impl MigrationType for LazyMigration {
        fn full_name(&self) -> &str {
            "SimpleProject.Migrations.InitialCreate"
        }

        fn context_type(&self) -> &str {
            "SimpleProject.SimpleContext"
        }

        fn migration_id(&self) -> String {
            "201410102227260_InitialCreate".to_string()
        }

        fn product_version(&self) -> String {
            panic!("product version is never read while listing")
        }

        fn target_model(&self) -> Model {
            panic!("target model is never read while listing")
        }

        fn up(&self, builder: &mut MigrationBuilder) {
            builder.sql("SELECT 1");
        }

        fn down(&self, builder: &mut MigrationBuilder) {
            builder.sql("SELECT 0");
        }
    }

    struct SlowContext;

    impl ContextType for SlowContext {
        fn full_name(&self) -> &str {
            "SlowProject.SlowContext"
        }

        fn model(&self) -> Model {
            std::thread::sleep(std::time::Duration::from_secs(2));
            panic!("model building gave up")
        }
    }

    fn options() -> BoundaryOptions {
        let loader = StaticLoader::new().register("SimpleProject", || {
            StaticAssembly::new("SimpleProject")
                .context(SimpleContext)
                .context(FaultyContext)
                .migration(LazyMigration)
                .other("SimpleProject.Program")
        });
        BoundaryOptions::new("bin/SimpleProject.dll").loader(Arc::new(loader))
    }

    #[test]
    fn test_options_search_assembly_directory() {
        let options = BoundaryOptions::new("bin/Debug/App.dll").search_path("lib");
        assert_eq!(
            options.search_paths(),
            &[PathBuf::from("bin/Debug"), PathBuf::from("lib")]
        );
        assert!(BoundaryOptions::new("App.dll").search_paths().is_empty());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "target code panicked");
    }

    #[tokio::test]
    async fn test_discovery_through_boundary() {
        let mut boundary = IsolationBoundary::open(options()).await.unwrap();
        assert!(boundary.is_open());

        let identity = boundary.get_context_type(Some("Simple")).await.unwrap();
        assert!(identity.starts_with("SimpleProject.SimpleContext, "));

        let contexts = boundary.get_context_types().await.unwrap();
        assert_eq!(contexts.len(), 2);

        let migrations = boundary.get_migrations(Some("SimpleContext")).await.unwrap();
        assert_eq!(migrations, vec!["201410102227260_InitialCreate"]);

        boundary.close().await.unwrap();
        assert!(!boundary.is_open());
    }

    #[tokio::test]
    async fn test_ordinary_errors_keep_boundary_open() {
        let mut boundary = IsolationBoundary::open(options()).await.unwrap();

        let err = boundary.get_context_type(None).await.unwrap_err();
        assert!(matches!(err, MigrationError::AmbiguousContext { .. }));

        let err = boundary.get_migrations(Some("Missing")).await.unwrap_err();
        assert!(matches!(err, MigrationError::ContextNotFound(name) if name == "Missing"));

        // No provider is registered for the scheme.
        let err = boundary
            .apply_migration(None, Some("SimpleContext"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ConnectionFailure(_)));

        assert!(boundary.is_open());
    }

    #[tokio::test]
    async fn test_target_fault_closes_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let options = options().executor(ExecutorConfig::new().project_dir(dir.path()));
        let mut boundary = IsolationBoundary::open(options).await.unwrap();

        let err = boundary
            .add_migration("Broken", Some("Faulty"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::TargetFault(msg) if msg.contains("model building failed")));
        assert!(!boundary.is_open());

        let err = boundary.get_context_types().await.unwrap_err();
        assert!(matches!(err, MigrationError::BoundaryClosed));
    }

    #[tokio::test]
    async fn test_describe_reads_lazy_fields() {
        let mut boundary = IsolationBoundary::open(options()).await.unwrap();
        let err = boundary
            .describe_migrations(Some("SimpleContext"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::TargetFault(_)));
        assert!(!boundary.is_open());
    }

    #[tokio::test]
    async fn test_open_fails_for_unknown_assembly() {
        let options = BoundaryOptions::new("Missing.dll").loader(Arc::new(StaticLoader::new()));
        let err = IsolationBoundary::open(options).await.unwrap_err();
        assert!(matches!(err, MigrationError::Manifest(_)));
    }

    #[tokio::test]
    async fn test_loader_panic_is_a_target_fault() {
        struct PanickingLoader;

        impl AssemblyLoader for PanickingLoader {
            fn load(
                &self,
                _path: &Path,
                _search_paths: &[PathBuf],
            ) -> MigrateResult<Box<dyn crate::assembly::Assembly>> {
                panic!("static initializer failed")
            }

            fn resolve(
                &self,
                _name: &str,
                _search_paths: &[PathBuf],
            ) -> MigrateResult<Option<Box<dyn crate::assembly::Assembly>>> {
                Ok(None)
            }
        }

        let options = BoundaryOptions::new("App.dll").loader(Arc::new(PanickingLoader));
        let err = IsolationBoundary::open(options).await.unwrap_err();
        assert!(matches!(err, MigrationError::TargetFault(msg) if msg == "static initializer failed"));
    }

    #[tokio::test]
    async fn test_drop_does_not_wait_for_busy_worker() {
        let loader = StaticLoader::new().register("SlowProject", || {
            StaticAssembly::new("SlowProject").context(SlowContext)
        });
        let options = BoundaryOptions::new("bin/SlowProject.dll").loader(Arc::new(loader));
        let mut boundary = IsolationBoundary::open(options).await.unwrap();
        let cancel = boundary.cancel_token();

        let busy = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            boundary.add_migration("Slow", None),
        )
        .await;
        assert!(busy.is_err());

        let started = std::time::Instant::now();
        drop(boundary);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_after_close() {
        let mut boundary = IsolationBoundary::open(options()).await.unwrap();
        let cancel = boundary.cancel_token();
        boundary.close().await.unwrap();
        drop(boundary);
        assert!(!cancel.is_cancelled());
    }
}
