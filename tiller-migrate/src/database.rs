//! Database capability consumed by the executor.
//!
//! Drivers implement [`DatabaseProvider`] and [`Connection`]; the executor
//! never sees a concrete driver type.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{MigrateResult, MigrationError};
use crate::sql::Dialect;

/// Opens connections for one URL scheme.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// URL scheme handled by this provider, e.g. `sqlite`.
    fn scheme(&self) -> &str;

    /// Dialect of the databases this provider connects to.
    fn dialect(&self) -> Dialect;

    /// Check whether the database behind `url` exists.
    async fn exists(&self, url: &str) -> MigrateResult<bool>;

    /// Open a connection, creating the database if needed.
    async fn connect(&self, url: &str, timeout: Duration) -> MigrateResult<Box<dyn Connection>>;
}

/// An open database connection.
#[async_trait]
pub trait Connection: Send {
    /// Execute one or more statements that return no rows.
    async fn execute(&mut self, sql: &str) -> MigrateResult<()>;

    /// Run a query and return its rows as JSON objects keyed by column name.
    async fn query(&mut self, sql: &str) -> MigrateResult<Vec<serde_json::Value>>;

    /// Begin a transaction.
    async fn begin(&mut self) -> MigrateResult<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> MigrateResult<()>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> MigrateResult<()>;
}

/// Providers keyed by scheme.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn DatabaseProvider>>,
}

impl ProviderRegistry {
    /// Create a registry from a list of providers.
    pub fn new(providers: Vec<Arc<dyn DatabaseProvider>>) -> Self {
        Self { providers }
    }

    /// Add a provider.
    pub fn register(&mut self, provider: Arc<dyn DatabaseProvider>) {
        self.providers.push(provider);
    }

    /// Find the provider for a URL by scheme.
    pub fn for_url(&self, url: &str) -> MigrateResult<Arc<dyn DatabaseProvider>> {
        let scheme = url.split(':').next().unwrap_or_default();
        self.providers
            .iter()
            .find(|p| p.scheme().eq_ignore_ascii_case(scheme))
            .cloned()
            .ok_or_else(|| {
                MigrationError::connection(format!("No database provider for scheme '{}'", scheme))
            })
    }

    /// Check if no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.scheme()))
            .finish()
    }
}

/// Cooperative cancellation flag, checked between migration steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
