//! TOML assembly manifests and migration artifact files.
//!
//! A manifest assembly is described by `<Name>.assembly.toml`. Its migrations
//! come from inline `[[migration]]` tables and from the artifact pairs found
//! in its migrations directory:
//!
//! ```text
//! Migrations/
//!   201410102227260_InitialCreate.toml           # definition: up/down
//!   201410102227260_InitialCreate.designer.toml  # metadata + checksum
//!   SimpleContextModelSnapshot.toml              # latest model
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::assembly::{
    Assembly, AssemblyIdentity, AssemblyLoader, ContextType, MigrationType, TypeDef,
};
use crate::error::{MigrateResult, MigrationError};
use crate::model::{Entity, Model};
use crate::operation::{MigrationBuilder, Operation};
use crate::sql::Dialect;

/// File suffix of assembly manifests.
pub const MANIFEST_SUFFIX: &str = ".assembly.toml";

/// File suffix of designer records.
pub const DESIGNER_SUFFIX: &str = ".designer.toml";

/// File suffix of model snapshots.
pub const SNAPSHOT_SUFFIX: &str = "ModelSnapshot.toml";

/// Migrations directory used when a manifest or configuration names none.
pub const DEFAULT_MIGRATIONS_DIR: &str = "Migrations";

/// Contents of a `<Name>.assembly.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// Assembly header.
    pub assembly: AssemblySection,
    /// Context types.
    #[serde(default, rename = "context")]
    pub contexts: Vec<ContextSection>,
    /// Inline migration types.
    #[serde(default, rename = "migration")]
    pub migrations: Vec<MigrationSection>,
}

/// `[assembly]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySection {
    /// Simple name.
    pub name: String,
    /// Version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Referenced assembly names.
    #[serde(default)]
    pub references: Vec<String>,
    /// Directory holding migration artifacts, relative to the manifest.
    #[serde(default)]
    pub migrations_dir: Option<String>,
}

fn default_version() -> String {
    "1.0.0.0".to_string()
}

/// `[[context]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    /// Full type name.
    pub name: String,
    /// Configured connection.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Configured dialect.
    #[serde(default)]
    pub dialect: Option<Dialect>,
    /// Declared entities.
    #[serde(default, rename = "entity")]
    pub entities: Vec<Entity>,
}

/// `[[migration]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSection {
    /// Full type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Migration id.
    pub id: String,
    /// Owning context type.
    pub context: String,
    /// Product version that produced the migration.
    pub product_version: String,
    /// Forward operations.
    #[serde(default)]
    pub up: Vec<Operation>,
    /// Reverse operations.
    #[serde(default)]
    pub down: Vec<Operation>,
    /// Model snapshot.
    #[serde(default)]
    pub target_model: Model,
}

/// Contents of a `<id>.toml` migration definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDefinition {
    /// Migration id.
    pub id: String,
    /// Migration name.
    pub name: String,
    /// Forward operations.
    #[serde(default)]
    pub up: Vec<Operation>,
    /// Reverse operations.
    #[serde(default)]
    pub down: Vec<Operation>,
}

/// Contents of a `<id>.designer.toml` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignerRecord {
    /// Full type name of the migration.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Migration id.
    pub id: String,
    /// Owning context type.
    pub context: String,
    /// Product version that produced the migration.
    pub product_version: String,
    /// Scaffold time.
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the definition file.
    pub checksum: String,
    /// Model snapshot at this migration.
    #[serde(default)]
    pub target_model: Model,
}

/// Contents of a `<Context>ModelSnapshot.toml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Context type.
    pub context: String,
    /// Id of the migration the snapshot belongs to.
    pub migration_id: String,
    /// Model.
    #[serde(default)]
    pub model: Model,
}

/// Hex SHA-256 checksum of artifact text.
pub fn checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

struct ManifestContext {
    full_name: String,
    model: Model,
    database_url: Option<String>,
    dialect: Option<Dialect>,
}

impl ContextType for ManifestContext {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn model(&self) -> Model {
        self.model.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }
}

struct ManifestMigration {
    type_name: String,
    context: String,
    id: String,
    product_version: String,
    target_model: Model,
    up: Vec<Operation>,
    down: Vec<Operation>,
}

impl MigrationType for ManifestMigration {
    fn full_name(&self) -> &str {
        &self.type_name
    }

    fn context_type(&self) -> &str {
        &self.context
    }

    fn migration_id(&self) -> String {
        self.id.clone()
    }

    fn product_version(&self) -> String {
        self.product_version.clone()
    }

    fn target_model(&self) -> Model {
        self.target_model.clone()
    }

    fn up(&self, builder: &mut MigrationBuilder) {
        for op in &self.up {
            builder.push(op.clone());
        }
    }

    fn down(&self, builder: &mut MigrationBuilder) {
        for op in &self.down {
            builder.push(op.clone());
        }
    }
}

impl From<MigrationSection> for ManifestMigration {
    fn from(section: MigrationSection) -> Self {
        Self {
            type_name: section.type_name,
            context: section.context,
            id: section.id,
            product_version: section.product_version,
            target_model: section.target_model,
            up: section.up,
            down: section.down,
        }
    }
}

/// An assembly read from a manifest.
pub struct ManifestAssembly {
    identity: AssemblyIdentity,
    references: Vec<String>,
    types: Vec<TypeDef>,
    migrations_dir: PathBuf,
}

impl ManifestAssembly {
    /// Read a manifest and the artifacts in its migrations directory.
    pub fn read(path: &Path) -> MigrateResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MigrationError::manifest(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest: AssemblyManifest = toml::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut types = Vec::new();
        for context in manifest.contexts {
            types.push(TypeDef::Context(Arc::new(ManifestContext {
                database_url: context.database_url.map(|url| resolve_sqlite_url(&url, base)),
                full_name: context.name,
                model: Model {
                    entities: context.entities,
                },
                dialect: context.dialect,
            })));
        }
        for migration in manifest.migrations {
            types.push(TypeDef::Migration(Arc::new(ManifestMigration::from(
                migration,
            ))));
        }

        let migrations_dir = base.join(
            manifest
                .assembly
                .migrations_dir
                .as_deref()
                .unwrap_or(DEFAULT_MIGRATIONS_DIR),
        );
        for migration in read_migrations_dir(&migrations_dir)? {
            types.push(TypeDef::Migration(Arc::new(migration)));
        }

        tracing::debug!(
            assembly = %manifest.assembly.name,
            types = types.len(),
            "Read assembly manifest"
        );

        Ok(Self {
            identity: AssemblyIdentity::new(manifest.assembly.name, manifest.assembly.version),
            references: manifest.assembly.references,
            types,
            migrations_dir,
        })
    }
}

impl Assembly for ManifestAssembly {
    fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    fn references(&self) -> Vec<String> {
        self.references.clone()
    }

    fn types(&self) -> Vec<TypeDef> {
        self.types.clone()
    }

    fn migrations_dir(&self) -> Option<PathBuf> {
        Some(self.migrations_dir.clone())
    }
}

/// Load every designer/definition pair in a directory.
fn read_migrations_dir(dir: &Path) -> MigrateResult<Vec<ManifestMigration>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = file_name.strip_suffix(DESIGNER_SUFFIX) else {
            continue;
        };

        let designer: DesignerRecord = toml::from_str(&fs::read_to_string(&path)?)?;
        let definition_path = dir.join(format!("{}.toml", stem));
        let definition_text = fs::read_to_string(&definition_path).map_err(|e| {
            MigrationError::invalid_migration(format!(
                "Missing definition for '{}' ({}): {}",
                designer.id,
                definition_path.display(),
                e
            ))
        })?;

        if checksum(&definition_text) != designer.checksum {
            return Err(MigrationError::invalid_migration(format!(
                "Checksum mismatch for '{}': {} was modified after it was scaffolded",
                designer.id,
                definition_path.display()
            )));
        }

        let definition: MigrationDefinition = toml::from_str(&definition_text)?;
        if definition.id != designer.id {
            return Err(MigrationError::invalid_migration(format!(
                "Definition id '{}' does not match designer id '{}'",
                definition.id, designer.id
            )));
        }

        migrations.push(ManifestMigration {
            type_name: designer.type_name,
            context: designer.context,
            id: designer.id,
            product_version: designer.product_version,
            target_model: designer.target_model,
            up: definition.up,
            down: definition.down,
        });
    }

    Ok(migrations)
}

/// Make a relative `sqlite:` path absolute against the manifest directory.
fn resolve_sqlite_url(url: &str, base: &Path) -> String {
    let Some(rest) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return url.to_string();
    };

    if rest.starts_with(':') || Path::new(rest).is_absolute() {
        return url.to_string();
    }

    format!("sqlite://{}", base.join(rest).display())
}

/// Loader for TOML assembly manifests.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }

    fn find(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
        search_paths
            .iter()
            .map(|dir| dir.join(format!("{}{}", name, MANIFEST_SUFFIX)))
            .find(|candidate| candidate.is_file())
    }
}

impl AssemblyLoader for ManifestLoader {
    fn load(&self, path: &Path, _search_paths: &[PathBuf]) -> MigrateResult<Box<dyn Assembly>> {
        Ok(Box::new(ManifestAssembly::read(path)?))
    }

    fn resolve(
        &self,
        name: &str,
        search_paths: &[PathBuf],
    ) -> MigrateResult<Option<Box<dyn Assembly>>> {
        match Self::find(name, search_paths) {
            Some(path) => Ok(Some(Box::new(ManifestAssembly::read(&path)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[assembly]
name = "SimpleProject"
references = ["Contexts"]

[[context]]
name = "SimpleProject.SimpleContext"
database_url = "sqlite://simple.db"

[[context.entity]]
name = "Blog"
table = "blogs"
primary_key = ["id"]

[[context.entity.column]]
name = "id"
sql_type = "INTEGER"

[[migration]]
type = "SimpleProject.Migrations.InitialCreate"
id = "201410102227260_InitialCreate"
context = "SimpleProject.SimpleContext"
product_version = "0.1.0"

[[migration.up]]
op = "sql"
sql = "SELECT 1"
"#;

    fn write_pair(dir: &Path, id: &str, tamper: bool) {
        let definition = MigrationDefinition {
            id: id.to_string(),
            name: "AddPosts".to_string(),
            up: vec![Operation::Sql {
                sql: "CREATE TABLE posts (id INTEGER)".into(),
            }],
            down: vec![Operation::DropTable {
                table: "posts".into(),
            }],
        };
        let text = toml::to_string(&definition).unwrap();
        let designer = DesignerRecord {
            type_name: "SimpleProject.Migrations.AddPosts".into(),
            id: id.to_string(),
            context: "SimpleProject.SimpleContext".into(),
            product_version: "0.1.0".into(),
            created_at: Utc::now(),
            checksum: checksum(&text),
            target_model: Model::new(),
        };

        let written = if tamper {
            format!("{}\n# edited", text)
        } else {
            text
        };
        fs::write(dir.join(format!("{}.toml", id)), written).unwrap();
        fs::write(
            dir.join(format!("{}{}", id, DESIGNER_SUFFIX)),
            toml::to_string(&designer).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_read_manifest_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("SimpleProject.assembly.toml");
        fs::write(&manifest_path, MANIFEST).unwrap();

        let migrations = dir.path().join("Migrations");
        fs::create_dir(&migrations).unwrap();
        write_pair(&migrations, "201501010000000_AddPosts", false);

        let assembly = ManifestLoader.load(&manifest_path, &[]).unwrap();
        assert_eq!(assembly.identity().name, "SimpleProject");
        assert_eq!(assembly.identity().version, "1.0.0.0");
        assert_eq!(assembly.references(), vec!["Contexts".to_string()]);

        let types = assembly.types();
        assert_eq!(types.len(), 3);

        let TypeDef::Context(context) = &types[0] else {
            panic!("expected a context first");
        };
        let url = context.database_url().unwrap();
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("simple.db"));
        assert!(Path::new(url.trim_start_matches("sqlite://")).is_absolute());
        assert_eq!(context.model().entities[0].table, "blogs");

        let ids: Vec<String> = types
            .iter()
            .filter_map(|t| match t {
                TypeDef::Migration(m) => Some(m.migration_id()),
                _ => None,
            })
            .collect();
        assert!(ids.contains(&"201410102227260_InitialCreate".to_string()));
        assert!(ids.contains(&"201501010000000_AddPosts".to_string()));
    }

    #[test]
    fn test_checksum_mismatch_is_invalid_migration() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), "201501010000000_AddPosts", true);

        let err = read_migrations_dir(dir.path()).err().unwrap();
        assert!(matches!(err, MigrationError::InvalidMigration(_)));
    }

    #[test]
    fn test_resolve_reference_in_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Contexts.assembly.toml"),
            "[assembly]\nname = \"Contexts\"\n",
        )
        .unwrap();

        let search = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];
        let found = ManifestLoader.resolve("Contexts", &search).unwrap();
        assert_eq!(found.unwrap().identity().name, "Contexts");
        assert!(ManifestLoader.resolve("System", &search).unwrap().is_none());
    }

    #[test]
    fn test_resolve_sqlite_url() {
        let base = Path::new("/srv/app");
        assert_eq!(resolve_sqlite_url("sqlite://app.db", base), "sqlite:///srv/app/app.db");
        assert_eq!(resolve_sqlite_url("sqlite::memory:", base), "sqlite::memory:");
        assert_eq!(resolve_sqlite_url("sqlite:///tmp/x.db", base), "sqlite:///tmp/x.db");
        assert_eq!(
            resolve_sqlite_url("postgres://localhost/db", base),
            "postgres://localhost/db"
        );
    }
}
