//! Per-context migration catalog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assembly::MigrationType;
use crate::context::ContextDescriptor;
use crate::error::{MigrateResult, MigrationError};
use crate::model::Model;
use crate::operation::{MigrationBuilder, MigrationDirection, Operation};

/// Target id that stands for "before the first migration".
pub const INITIAL_MIGRATION: &str = "0";

/// Where an `apply` or `script` should end up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationTarget {
    /// The newest migration in the catalog.
    Latest,
    /// No migrations applied.
    Initial,
    /// A specific migration, by id or by name.
    Id(String),
}

impl MigrationTarget {
    /// Parse an optional target name. `None` is latest and `"0"` is initial.
    pub fn parse(target: Option<&str>) -> Self {
        match target.map(str::trim).filter(|t| !t.is_empty()) {
            None => Self::Latest,
            Some(INITIAL_MIGRATION) => Self::Initial,
            Some(id) => Self::Id(id.to_string()),
        }
    }
}

impl std::fmt::Display for MigrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Initial => f.write_str(INITIAL_MIGRATION),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// A fully materialized migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    /// Migration id.
    pub id: String,
    /// Migration type name.
    pub type_name: String,
    /// Product version that produced it.
    pub product_version: String,
    /// Owning context.
    pub target_context: ContextDescriptor,
    /// Model snapshot.
    pub model_snapshot: Model,
    /// Forward operations.
    pub up_operations: Vec<Operation>,
    /// Reverse operations.
    pub down_operations: Vec<Operation>,
}

/// A catalog entry. Only `id` is read eagerly; the rest is pulled from the
/// migration type on demand.
#[derive(Clone)]
pub struct MigrationEntry {
    /// Migration id.
    pub id: String,
    /// Migration type name.
    pub type_name: String,
    ty: Arc<dyn MigrationType>,
}

impl MigrationEntry {
    /// Name part of the id (after the timestamp prefix).
    pub fn name(&self) -> &str {
        migration_name(&self.id)
    }

    /// Operations for one direction.
    pub fn operations(&self, direction: MigrationDirection) -> Vec<Operation> {
        let mut builder = MigrationBuilder::new();
        match direction {
            MigrationDirection::Up => self.ty.up(&mut builder),
            MigrationDirection::Down => self.ty.down(&mut builder),
        }
        builder.into_operations()
    }

    /// Product version of the migration.
    pub fn product_version(&self) -> String {
        self.ty.product_version()
    }

    /// Model snapshot of the migration.
    pub fn target_model(&self) -> Model {
        self.ty.target_model()
    }

    /// Materialize every field into a descriptor.
    pub fn describe(&self, context: &ContextDescriptor) -> MigrationDescriptor {
        MigrationDescriptor {
            id: self.id.clone(),
            type_name: self.type_name.clone(),
            product_version: self.product_version(),
            target_context: context.clone(),
            model_snapshot: self.target_model(),
            up_operations: self.operations(MigrationDirection::Up),
            down_operations: self.operations(MigrationDirection::Down),
        }
    }
}

impl std::fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Name part of a migration id.
pub fn migration_name(id: &str) -> &str {
    id.split_once('_').map(|(_, name)| name).unwrap_or(id)
}

/// The ordered migrations of one context.
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    context: ContextDescriptor,
    entries: Vec<MigrationEntry>,
}

impl MigrationCatalog {
    /// Build the catalog of `context` from every migration type in scope.
    ///
    /// A migration belongs to the context only when its declared association
    /// names the context exactly.
    pub fn build(
        context: &ContextDescriptor,
        types: &[Arc<dyn MigrationType>],
    ) -> MigrateResult<Self> {
        let mut entries: Vec<MigrationEntry> = types
            .iter()
            .filter(|ty| context.is_named_by(ty.context_type()))
            .map(|ty| MigrationEntry {
                id: ty.migration_id(),
                type_name: ty.full_name().to_string(),
                ty: Arc::clone(ty),
            })
            .collect();

        entries.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(pair) = entries.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(MigrationError::DuplicateMigrationId {
                id: pair[0].id.clone(),
                context: context.full_name.clone(),
            });
        }

        tracing::debug!(
            context = %context.full_name,
            migrations = entries.len(),
            "Built migration catalog"
        );

        Ok(Self {
            context: context.clone(),
            entries,
        })
    }

    /// Owning context.
    pub fn context(&self) -> &ContextDescriptor {
        &self.context
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> &[MigrationEntry] {
        &self.entries
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The newest migration.
    pub fn last(&self) -> Option<&MigrationEntry> {
        self.entries.last()
    }

    /// Position of an exact id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Find a migration by exact id, or by name when no id matches.
    pub fn find(&self, id_or_name: &str) -> MigrateResult<usize> {
        if let Some(index) = self.position(id_or_name) {
            return Ok(index);
        }

        let by_name: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name().eq_ignore_ascii_case(id_or_name))
            .map(|(i, _)| i)
            .collect();

        match by_name.as_slice() {
            [index] => Ok(*index),
            [] => Err(MigrationError::MigrationNotFound {
                id: id_or_name.to_string(),
                context: self.context.full_name.clone(),
            }),
            many => Err(MigrationError::invalid_migration(format!(
                "'{}' matches more than one migration: {}",
                id_or_name,
                many.iter()
                    .map(|i| self.entries[*i].id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Number of catalog entries at or before a target.
    ///
    /// `Initial` is 0 and `Latest` is the catalog length.
    pub fn prefix_len(&self, target: &MigrationTarget) -> MigrateResult<usize> {
        match target {
            MigrationTarget::Latest => Ok(self.entries.len()),
            MigrationTarget::Initial => Ok(0),
            MigrationTarget::Id(id) => self.find(id).map(|index| index + 1),
        }
    }

    /// Materialize every entry.
    pub fn describe(&self) -> Vec<MigrationDescriptor> {
        self.entries
            .iter()
            .map(|e| e.describe(&self.context))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::AssemblyIdentity;

    struct Mig {
        id: &'static str,
        context: &'static str,
    }

    impl MigrationType for Mig {
        fn full_name(&self) -> &str {
            self.id
        }

        fn context_type(&self) -> &str {
            self.context
        }

        fn migration_id(&self) -> String {
            self.id.to_string()
        }

        fn product_version(&self) -> String {
            panic!("product version is not available")
        }

        fn target_model(&self) -> Model {
            Model::new()
        }

        fn up(&self, builder: &mut MigrationBuilder) {
            builder.sql(format!("-- up {}", self.id));
        }

        fn down(&self, builder: &mut MigrationBuilder) {
            builder.sql(format!("-- down {}", self.id));
        }
    }

    fn context(name: &str) -> ContextDescriptor {
        ContextDescriptor::new(name, AssemblyIdentity::new("MyProject", "1.0.0.0"))
    }

    fn types(migs: Vec<Mig>) -> Vec<Arc<dyn MigrationType>> {
        migs.into_iter()
            .map(|m| Arc::new(m) as Arc<dyn MigrationType>)
            .collect()
    }

    #[test]
    fn test_catalog_filters_and_sorts() {
        let all = types(vec![
            Mig { id: "002_Second", context: "MyProject.Context1" },
            Mig { id: "000_Other", context: "MyProject.Context2" },
            Mig { id: "001_First", context: "MyProject.Context1" },
        ]);

        let catalog = MigrationCatalog::build(&context("MyProject.Context1"), &all).unwrap();
        assert_eq!(catalog.ids(), vec!["001_First", "002_Second"]);

        let other = MigrationCatalog::build(&context("MyProject.Context2"), &all).unwrap();
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_catalog_listing_does_not_touch_lazy_fields() {
        // product_version panics; building and listing must not call it.
        let all = types(vec![Mig { id: "001_A", context: "MyProject.Ctx" }]);
        let catalog = MigrationCatalog::build(&context("MyProject.Ctx"), &all).unwrap();
        assert_eq!(catalog.entries()[0].name(), "A");
        assert_eq!(catalog.entries()[0].operations(MigrationDirection::Up).len(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let all = types(vec![
            Mig { id: "001_A", context: "MyProject.Ctx" },
            Mig { id: "001_A", context: "MyProject.Ctx" },
        ]);
        let err = MigrationCatalog::build(&context("MyProject.Ctx"), &all).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigrationId { id, .. } if id == "001_A"));
    }

    #[test]
    fn test_association_is_exact() {
        let ctx = context("MyProject.Ctx");
        let all = types(vec![
            Mig { id: "001_A", context: "Ctx" },
            Mig { id: "002_B", context: "myproject.ctx" },
        ]);
        assert!(MigrationCatalog::build(&ctx, &all).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_id_or_name() {
        let all = types(vec![
            Mig { id: "201410102227260_InitialCreate", context: "MyProject.Ctx" },
            Mig { id: "201501010000000_AddPosts", context: "MyProject.Ctx" },
        ]);
        let catalog = MigrationCatalog::build(&context("MyProject.Ctx"), &all).unwrap();

        assert_eq!(catalog.find("201501010000000_AddPosts").unwrap(), 1);
        assert_eq!(catalog.find("initialcreate").unwrap(), 0);
        assert!(matches!(
            catalog.find("Missing"),
            Err(MigrationError::MigrationNotFound { .. })
        ));

        assert_eq!(catalog.prefix_len(&MigrationTarget::Latest).unwrap(), 2);
        assert_eq!(catalog.prefix_len(&MigrationTarget::Initial).unwrap(), 0);
        assert_eq!(
            catalog
                .prefix_len(&MigrationTarget::Id("InitialCreate".into()))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(MigrationTarget::parse(None), MigrationTarget::Latest);
        assert_eq!(MigrationTarget::parse(Some(" ")), MigrationTarget::Latest);
        assert_eq!(MigrationTarget::parse(Some("0")), MigrationTarget::Initial);
        assert_eq!(
            MigrationTarget::parse(Some("InitialCreate")),
            MigrationTarget::Id("InitialCreate".into())
        );
    }
}
