//! Scaffolding new migrations from the declared model.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{migration_name, MigrationCatalog};
use crate::context;
use crate::diff::ModelDiffer;
use crate::error::{MigrateResult, MigrationError};
use crate::executor::ExecutorConfig;
use crate::manifest::{
    checksum, DesignerRecord, MigrationDefinition, SnapshotRecord, DESIGNER_SUFFIX,
    SNAPSHOT_SUFFIX,
};
use crate::metadata::AssemblyScope;
use crate::model::Model;
use crate::operation::Operation;

/// Width of the numeric id prefix: `%Y%m%d%H%M%S` plus tenths of a second.
pub const ID_PREFIX_WIDTH: usize = 15;

/// A scaffolded migration and the files written for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldedMigration {
    /// New migration id.
    pub migration_id: String,
    /// Migration type name.
    pub type_name: String,
    /// Owning context.
    pub context: String,
    /// Forward operations.
    pub up_operations: Vec<Operation>,
    /// Reverse operations.
    pub down_operations: Vec<Operation>,
    /// Model snapshot after the migration.
    pub snapshot: Model,
    /// Written files: definition, designer record, model snapshot.
    pub artifacts: Vec<PathBuf>,
}

/// Check that a migration name is usable in an id and a type name.
pub fn validate_name(name: &str) -> MigrateResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidName(name.to_string()))
    }
}

/// Generate a migration id that sorts after `last_id`.
pub fn generate_id(name: &str, now: DateTime<Utc>, last_id: Option<&str>) -> String {
    let mut prefix: u64 = format!(
        "{}{}",
        now.format("%Y%m%d%H%M%S"),
        now.timestamp_subsec_millis() / 100
    )
    .parse()
    .unwrap_or_default();

    let last_prefix = last_id
        .and_then(|id| id.split('_').next())
        .and_then(|p| p.parse::<u64>().ok());

    if let Some(last) = last_prefix {
        if prefix <= last {
            prefix = last + 1;
        }
    }

    format!("{:0width$}_{}", prefix, name, width = ID_PREFIX_WIDTH)
}

/// Writes new migrations for a context.
pub struct Scaffolder<'a> {
    config: &'a ExecutorConfig,
}

impl<'a> Scaffolder<'a> {
    /// Create a scaffolder.
    pub fn new(config: &'a ExecutorConfig) -> Self {
        Self { config }
    }

    /// Scaffold a migration named `name` for a context.
    pub async fn scaffold(
        &self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        name: &str,
    ) -> MigrateResult<ScaffoldedMigration> {
        self.scaffold_at(scope, context_name, name, Utc::now()).await
    }

    /// Scaffold with an explicit creation time.
    pub async fn scaffold_at(
        &self,
        scope: &AssemblyScope,
        context_name: Option<&str>,
        name: &str,
        now: DateTime<Utc>,
    ) -> MigrateResult<ScaffoldedMigration> {
        validate_name(name)?;

        let context = context::resolve_in(scope, context_name)?;
        let catalog = MigrationCatalog::build(&context.descriptor, &scope.migration_types())?;

        if let Some(existing) = catalog
            .entries()
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
        {
            return Err(MigrationError::invalid_migration(format!(
                "The name '{}' is already used by migration '{}'",
                name, existing.id
            )));
        }

        let last = catalog.last();
        let source = last.map(|e| e.target_model()).unwrap_or_default();
        let target = context.ty.model();
        let diff = ModelDiffer::new(target.clone()).with_source(source).diff();

        let migration_id = generate_id(name, now, last.map(|e| e.id.as_str()));
        let namespace = self
            .config
            .root_namespace
            .clone()
            .unwrap_or_else(|| scope.target().identity().name.clone());

        let scaffolded = ScaffoldedMigration {
            type_name: format!("{}.Migrations.{}", namespace, name),
            context: context.descriptor.full_name.clone(),
            up_operations: diff.up_operations(),
            down_operations: diff.down_operations(),
            snapshot: target,
            artifacts: Vec::new(),
            migration_id,
        };

        let dir = self.output_dir(scope)?;
        let artifacts = self
            .write(&dir, &scaffolded, &context.descriptor.display_name, now)
            .await?;

        tracing::info!(
            context = %scaffolded.context,
            migration = %scaffolded.migration_id,
            changes = %diff.summary(),
            "Scaffolded migration"
        );

        Ok(ScaffoldedMigration {
            artifacts,
            ..scaffolded
        })
    }

    /// Directory new artifacts go to: where the target assembly loads
    /// migrations from, so the next catalog build sees them.
    fn output_dir(&self, scope: &AssemblyScope) -> MigrateResult<PathBuf> {
        let configured = self
            .config
            .migrations_dir
            .is_some()
            .then(|| self.config.migrations_path());

        match (scope.target().migrations_dir(), configured) {
            (Some(loaded), Some(configured)) if normalized(&loaded) != normalized(&configured) => {
                Err(MigrationError::invalid_migration(format!(
                    "Migrations directory {} differs from {}, where assembly '{}' loads migrations from",
                    configured.display(),
                    loaded.display(),
                    scope.target().identity().name
                )))
            }
            (Some(loaded), _) => Ok(loaded),
            (None, _) => Ok(self.config.migrations_path()),
        }
    }

    async fn write(
        &self,
        dir: &Path,
        migration: &ScaffoldedMigration,
        context_short_name: &str,
        now: DateTime<Utc>,
    ) -> MigrateResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(MigrationError::Io)?;

        let definition = toml::to_string(&MigrationDefinition {
            id: migration.migration_id.clone(),
            name: migration_name(&migration.migration_id).to_string(),
            up: migration.up_operations.clone(),
            down: migration.down_operations.clone(),
        })?;

        let designer = toml::to_string(&DesignerRecord {
            type_name: migration.type_name.clone(),
            id: migration.migration_id.clone(),
            context: migration.context.clone(),
            product_version: self.config.product_version.clone(),
            created_at: now,
            checksum: checksum(&definition),
            target_model: migration.snapshot.clone(),
        })?;

        let snapshot = toml::to_string(&SnapshotRecord {
            context: migration.context.clone(),
            migration_id: migration.migration_id.clone(),
            model: migration.snapshot.clone(),
        })?;

        let definition_path = dir.join(format!("{}.toml", migration.migration_id));
        let designer_path = dir.join(format!("{}{}", migration.migration_id, DESIGNER_SUFFIX));
        let snapshot_path = dir.join(format!("{}{}", context_short_name, SNAPSHOT_SUFFIX));

        write_file(&definition_path, &definition).await?;
        write_file(&designer_path, &designer).await?;
        write_file(&snapshot_path, &snapshot).await?;

        Ok(vec![definition_path, designer_path, snapshot_path])
    }
}

fn normalized(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

async fn write_file(path: &Path, content: &str) -> MigrateResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(MigrationError::Io)?;
    tracing::debug!(path = %path.display(), "Wrote artifact");
    Ok(())
}
