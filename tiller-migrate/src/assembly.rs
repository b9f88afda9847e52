//! Assemblies: the units of code that define contexts and migrations.
//!
//! An assembly is a named, versioned set of type definitions plus the names of
//! the assemblies it references. Context and migration types are trait objects
//! whose methods are *target code*: they may panic, and they are only ever
//! called from inside the isolation boundary.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::model::Model;
use crate::operation::MigrationBuilder;
use crate::sql::Dialect;

/// Name and version of an assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyIdentity {
    /// Simple name.
    pub name: String,
    /// Version string.
    pub version: String,
}

impl AssemblyIdentity {
    /// Create an identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Version={}", self.name, self.version)
    }
}

/// A persistence-context type.
pub trait ContextType: Send + Sync {
    /// Namespace-qualified type name, e.g. `SimpleProject.SimpleContext`.
    fn full_name(&self) -> &str;

    /// The model this context declares today.
    fn model(&self) -> Model;

    /// Connection the context is configured with, if any.
    fn database_url(&self) -> Option<String> {
        None
    }

    /// SQL dialect, when it cannot be derived from the connection URL.
    fn dialect(&self) -> Option<Dialect> {
        None
    }
}

/// A migration type.
pub trait MigrationType: Send + Sync {
    /// Namespace-qualified type name.
    fn full_name(&self) -> &str;

    /// Full name (or assembly-qualified identity) of the owning context type.
    fn context_type(&self) -> &str;

    /// Sortable migration id with a timestamp prefix.
    fn migration_id(&self) -> String;

    /// Version of the tool that produced the migration.
    fn product_version(&self) -> String;

    /// Model snapshot at this migration.
    fn target_model(&self) -> Model;

    /// Declare the forward operations.
    fn up(&self, builder: &mut MigrationBuilder);

    /// Declare the reverse operations.
    fn down(&self, builder: &mut MigrationBuilder);
}

/// One entry of an assembly's type table.
#[derive(Clone)]
pub enum TypeDef {
    /// A context type.
    Context(Arc<dyn ContextType>),
    /// A migration type.
    Migration(Arc<dyn MigrationType>),
    /// Any other type; ignored by discovery.
    Other(String),
}

impl TypeDef {
    /// Type name of the entry.
    pub fn full_name(&self) -> &str {
        match self {
            Self::Context(ty) => ty.full_name(),
            Self::Migration(ty) => ty.full_name(),
            Self::Other(name) => name,
        }
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(ty) => f.debug_tuple("Context").field(&ty.full_name()).finish(),
            Self::Migration(ty) => f.debug_tuple("Migration").field(&ty.full_name()).finish(),
            Self::Other(name) => f.debug_tuple("Other").field(name).finish(),
        }
    }
}

/// A loaded assembly.
pub trait Assembly: Send {
    /// Identity of the assembly.
    fn identity(&self) -> &AssemblyIdentity;

    /// Names of referenced assemblies.
    fn references(&self) -> Vec<String>;

    /// All type definitions.
    fn types(&self) -> Vec<TypeDef>;

    /// Directory migration artifacts are loaded from, for assemblies that read
    /// them from disk.
    fn migrations_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Turns assembly paths and names into loaded assemblies.
pub trait AssemblyLoader: Send + Sync {
    /// Load the assembly at `path`.
    fn load(&self, path: &Path, search_paths: &[PathBuf]) -> MigrateResult<Box<dyn Assembly>>;

    /// Load a referenced assembly by name. `Ok(None)` when it is not found.
    fn resolve(&self, name: &str, search_paths: &[PathBuf])
    -> MigrateResult<Option<Box<dyn Assembly>>>;
}

/// An assembly assembled in code.
pub struct StaticAssembly {
    identity: AssemblyIdentity,
    references: Vec<String>,
    types: Vec<TypeDef>,
}

impl StaticAssembly {
    /// Create an empty assembly with version `1.0.0.0`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: AssemblyIdentity::new(name, "1.0.0.0"),
            references: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Set the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.identity.version = version.into();
        self
    }

    /// Add a referenced assembly name.
    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.references.push(name.into());
        self
    }

    /// Add a context type.
    pub fn context(mut self, ty: impl ContextType + 'static) -> Self {
        self.types.push(TypeDef::Context(Arc::new(ty)));
        self
    }

    /// Add a migration type.
    pub fn migration(mut self, ty: impl MigrationType + 'static) -> Self {
        self.types.push(TypeDef::Migration(Arc::new(ty)));
        self
    }

    /// Add an unrelated type.
    pub fn other(mut self, name: impl Into<String>) -> Self {
        self.types.push(TypeDef::Other(name.into()));
        self
    }
}

impl Assembly for StaticAssembly {
    fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    fn references(&self) -> Vec<String> {
        self.references.clone()
    }

    fn types(&self) -> Vec<TypeDef> {
        self.types.clone()
    }
}

type AssemblyFactory = Arc<dyn Fn() -> Box<dyn Assembly> + Send + Sync>;

/// Loader over a registry of in-code assembly factories.
///
/// Factories run when the assembly is loaded, which happens inside the
/// isolation boundary. Paths resolve by file stem (`bin/App.dll` loads `App`).
#[derive(Clone, Default)]
pub struct StaticLoader {
    factories: HashMap<String, AssemblyFactory>,
}

impl StaticLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assembly factory under a name.
    pub fn register<F, A>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: Assembly + 'static,
    {
        self.factories
            .insert(name.into(), Arc::new(move || Box::new(factory()) as Box<dyn Assembly>));
        self
    }

    /// Names of registered assemblies.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl AssemblyLoader for StaticLoader {
    fn load(&self, path: &Path, search_paths: &[PathBuf]) -> MigrateResult<Box<dyn Assembly>> {
        let name = assembly_name(path)?;
        self.resolve(&name, search_paths)?
            .ok_or_else(|| MigrationError::manifest(format!("Assembly '{}' is not registered", name)))
    }

    fn resolve(
        &self,
        name: &str,
        _search_paths: &[PathBuf],
    ) -> MigrateResult<Option<Box<dyn Assembly>>> {
        Ok(self.factories.get(name).map(|factory| factory()))
    }
}

/// Simple assembly name of a path: its file name up to the first dot.
pub fn assembly_name(path: &Path) -> MigrateResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            MigrationError::manifest(format!("Invalid assembly path: {}", path.display()))
        })
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLoader")
            .field("assemblies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlogContext;

    impl ContextType for BlogContext {
        fn full_name(&self) -> &str {
            "Blogging.BlogContext"
        }

        fn model(&self) -> Model {
            Model::new()
        }
    }

    #[test]
    fn test_assembly_name() {
        assert_eq!(assembly_name(Path::new("bin/App.dll")).unwrap(), "App");
        assert_eq!(
            assembly_name(Path::new("build/App.assembly.toml")).unwrap(),
            "App"
        );
        assert!(assembly_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_identity_display() {
        let identity = AssemblyIdentity::new("App", "1.2.0.0");
        assert_eq!(identity.to_string(), "App, Version=1.2.0.0");
    }

    #[test]
    fn test_static_loader_resolves_registered() {
        let loader = StaticLoader::new().register("Blogging", || {
            StaticAssembly::new("Blogging")
                .context(BlogContext)
                .other("Blogging.Program")
        });

        let assembly = loader.load(Path::new("out/Blogging.dll"), &[]).unwrap();
        assert_eq!(assembly.identity().name, "Blogging");
        let types = assembly.types();
        assert_eq!(types.len(), 2);
        assert!(matches!(types[0], TypeDef::Context(_)));
        assert_eq!(types[1].full_name(), "Blogging.Program");

        assert!(loader.resolve("Missing", &[]).unwrap().is_none());
        assert!(loader.load(Path::new("Missing.dll"), &[]).is_err());
    }
}
