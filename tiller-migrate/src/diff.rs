//! Model diffing for scaffolding migrations.

use crate::model::{Entity, Model};
use crate::operation::Operation;

/// One forward operation together with the operation that undoes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffStep {
    /// Forward operation.
    pub up: Operation,
    /// Inverse operation.
    pub down: Operation,
}

/// A diff between a snapshot and a declared model.
#[derive(Debug, Clone, Default)]
pub struct ModelDiff {
    /// Paired steps in forward order.
    pub steps: Vec<DiffStep>,
}

impl ModelDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Forward operations in order.
    pub fn up_operations(&self) -> Vec<Operation> {
        self.steps.iter().map(|s| s.up.clone()).collect()
    }

    /// Inverse operations, in reverse order of the forward steps.
    pub fn down_operations(&self) -> Vec<Operation> {
        self.steps.iter().rev().map(|s| s.down.clone()).collect()
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let mut creates = 0;
        let mut drops = 0;
        let mut columns = 0;
        let mut indexes = 0;

        for step in &self.steps {
            match step.up {
                Operation::CreateTable { .. } => creates += 1,
                Operation::DropTable { .. } => drops += 1,
                Operation::AddColumn { .. }
                | Operation::DropColumn { .. }
                | Operation::AlterColumn { .. } => columns += 1,
                Operation::CreateIndex { .. } | Operation::DropIndex { .. } => indexes += 1,
                _ => {}
            }
        }

        let mut parts = Vec::new();
        if creates > 0 {
            parts.push(format!("Create {} tables", creates));
        }
        if drops > 0 {
            parts.push(format!("Drop {} tables", drops));
        }
        if columns > 0 {
            parts.push(format!("Change {} columns", columns));
        }
        if indexes > 0 {
            parts.push(format!("Change {} indexes", indexes));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn push(&mut self, up: Operation, down: Operation) {
        self.steps.push(DiffStep { up, down });
    }
}

/// Compares a model snapshot (source) against a declared model (target).
pub struct ModelDiffer {
    /// Snapshot of the last migration, if any.
    source: Option<Model>,
    /// Declared model.
    target: Model,
}

impl ModelDiffer {
    /// Create a differ against an empty source model.
    pub fn new(target: Model) -> Self {
        Self {
            source: None,
            target,
        }
    }

    /// Set the source snapshot.
    pub fn with_source(mut self, source: Model) -> Self {
        self.source = Some(source);
        self
    }

    /// Compute the diff.
    ///
    /// Tables are matched by table name. New tables come first, then altered
    /// tables, then dropped tables; the inverse list is the exact reverse.
    pub fn diff(&self) -> ModelDiff {
        let empty = Model::default();
        let source = self.source.as_ref().unwrap_or(&empty);
        let mut result = ModelDiff::default();

        for entity in &self.target.entities {
            if source.table(&entity.table).is_none() {
                result.push(
                    Operation::create_table(entity),
                    Operation::DropTable {
                        table: entity.table.clone(),
                    },
                );
                for index in &entity.indexes {
                    result.push(
                        Operation::CreateIndex {
                            table: entity.table.clone(),
                            index: index.clone(),
                        },
                        Operation::DropIndex {
                            table: entity.table.clone(),
                            name: index.name.clone(),
                        },
                    );
                }
            }
        }

        for entity in &self.target.entities {
            if let Some(previous) = source.table(&entity.table) {
                diff_entities(previous, entity, &mut result);
            }
        }

        for entity in &source.entities {
            if self.target.table(&entity.table).is_none() {
                for index in &entity.indexes {
                    result.push(
                        Operation::DropIndex {
                            table: entity.table.clone(),
                            name: index.name.clone(),
                        },
                        Operation::CreateIndex {
                            table: entity.table.clone(),
                            index: index.clone(),
                        },
                    );
                }
                result.push(
                    Operation::DropTable {
                        table: entity.table.clone(),
                    },
                    Operation::create_table(entity),
                );
            }
        }

        result
    }
}

/// Diff two versions of the same table.
fn diff_entities(source: &Entity, target: &Entity, result: &mut ModelDiff) {
    let table = &target.table;

    // Indexes over dropped or altered columns go first.
    for index in &source.indexes {
        if target.find_index(&index.name) != Some(index) {
            result.push(
                Operation::DropIndex {
                    table: table.clone(),
                    name: index.name.clone(),
                },
                Operation::CreateIndex {
                    table: table.clone(),
                    index: index.clone(),
                },
            );
        }
    }

    for column in &target.columns {
        match source.find_column(&column.name) {
            None => result.push(
                Operation::AddColumn {
                    table: table.clone(),
                    column: column.clone(),
                },
                Operation::DropColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                },
            ),
            Some(previous) if previous != column => result.push(
                Operation::AlterColumn {
                    table: table.clone(),
                    column: column.clone(),
                    previous: previous.clone(),
                },
                Operation::AlterColumn {
                    table: table.clone(),
                    column: previous.clone(),
                    previous: column.clone(),
                },
            ),
            Some(_) => {}
        }
    }

    for column in &source.columns {
        if target.find_column(&column.name).is_none() {
            result.push(
                Operation::DropColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                },
                Operation::AddColumn {
                    table: table.clone(),
                    column: column.clone(),
                },
            );
        }
    }

    for index in &target.indexes {
        if source.find_index(&index.name) != Some(index) {
            result.push(
                Operation::CreateIndex {
                    table: table.clone(),
                    index: index.clone(),
                },
                Operation::DropIndex {
                    table: table.clone(),
                    name: index.name.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Column, Index};

    fn users(extra: Option<Column>) -> Entity {
        let mut entity = Entity::new("User")
            .table("users")
            .primary_key(["id"])
            .column(Column::new("id", "INTEGER"))
            .column(Column::new("name", "TEXT"));
        if let Some(column) = extra {
            entity = entity.column(column);
        }
        entity
    }

    #[test]
    fn test_diff_identical_models_is_empty() {
        let model = Model::new().entity(users(None));
        let diff = ModelDiffer::new(model.clone()).with_source(model).diff();
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "No changes");
    }

    #[test]
    fn test_diff_against_empty_creates_tables_and_indexes() {
        let model = Model::new().entity(users(None).index(Index::new("ix_users_name", ["name"])));
        let diff = ModelDiffer::new(model).diff();

        let up = diff.up_operations();
        assert_eq!(up.len(), 2);
        assert!(matches!(&up[0], Operation::CreateTable { table, .. } if table == "users"));
        assert!(matches!(&up[1], Operation::CreateIndex { .. }));

        let down = diff.down_operations();
        assert!(matches!(&down[0], Operation::DropIndex { name, .. } if name == "ix_users_name"));
        assert!(matches!(&down[1], Operation::DropTable { table } if table == "users"));
    }

    #[test]
    fn test_diff_added_and_altered_columns() {
        let source = Model::new().entity(users(None));
        let mut changed = users(Some(Column::new("email", "TEXT").nullable()));
        changed.columns[1] = Column::new("name", "VARCHAR(100)");
        let target = Model::new().entity(changed);

        let diff = ModelDiffer::new(target).with_source(source).diff();
        let up = diff.up_operations();
        assert_eq!(up.len(), 2);
        assert!(matches!(&up[0], Operation::AlterColumn { column, previous, .. }
            if column.sql_type == "VARCHAR(100)" && previous.sql_type == "TEXT"));
        assert!(matches!(&up[1], Operation::AddColumn { column, .. } if column.name == "email"));

        let down = diff.down_operations();
        assert!(matches!(&down[0], Operation::DropColumn { column, .. } if column == "email"));
        assert!(matches!(&down[1], Operation::AlterColumn { column, .. } if column.sql_type == "TEXT"));
    }

    #[test]
    fn test_diff_dropped_table_restores_definition() {
        let posts = Entity::new("Post")
            .table("posts")
            .column(Column::new("id", "INTEGER"))
            .index(Index::new("ix_posts_id", ["id"]).unique());
        let source = Model::new().entity(users(None)).entity(posts.clone());
        let target = Model::new().entity(users(None));

        let diff = ModelDiffer::new(target).with_source(source).diff();
        assert_eq!(diff.summary(), "Drop 1 tables, Change 1 indexes");

        let down = diff.down_operations();
        assert_eq!(down[0], Operation::create_table(&posts));
        assert!(matches!(&down[1], Operation::CreateIndex { index, .. } if index.unique));
    }

    #[test]
    fn test_down_is_reverse_of_up_pairs() {
        let source = Model::new().entity(users(None));
        let target = Model::new().entity(
            users(Some(Column::new("age", "INTEGER")))
                .index(Index::new("ix_users_age", ["age"])),
        );
        let diff = ModelDiffer::new(target).with_source(source).diff();

        let mut expected: Vec<Operation> = diff.steps.iter().map(|s| s.down.clone()).collect();
        expected.reverse();
        assert_eq!(diff.down_operations(), expected);
    }
}
