//! Schema operations and the builder migrations use to declare them.

use serde::{Deserialize, Serialize};

use crate::model::{Column, Entity, Index};

/// An abstract schema change. The only unit a [`SqlGenerator`](crate::sql::SqlGenerator) understands.
///
/// Order inside an operation list is significant and is preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a table.
    CreateTable {
        /// Table name.
        table: String,
        /// Primary key columns.
        #[serde(default)]
        primary_key: Vec<String>,
        /// Column definitions.
        #[serde(default, rename = "column")]
        columns: Vec<Column>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Change a column definition.
    AlterColumn {
        /// Table name.
        table: String,
        /// New definition.
        column: Column,
        /// Definition being replaced.
        previous: Column,
    },
    /// Create an index.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },
    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// A raw statement passed through verbatim.
    Sql {
        /// Statement text.
        sql: String,
    },
}

impl Operation {
    /// Build a `CreateTable` for an entity.
    pub fn create_table(entity: &Entity) -> Self {
        Self::CreateTable {
            table: entity.table.clone(),
            primary_key: entity.primary_key.clone(),
            columns: entity.columns.clone(),
        }
    }

    /// Table the operation touches, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. } => Some(table),
            Self::RenameTable { from, .. } => Some(from),
            Self::Sql { .. } => None,
        }
    }

    /// Short label used in logs and script comments.
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("create table {}", table),
            Self::DropTable { table } => format!("drop table {}", table),
            Self::RenameTable { from, to } => format!("rename table {} to {}", from, to),
            Self::AddColumn { table, column } => format!("add column {}.{}", table, column.name),
            Self::DropColumn { table, column } => format!("drop column {}.{}", table, column),
            Self::AlterColumn { table, column, .. } => {
                format!("alter column {}.{}", table, column.name)
            }
            Self::CreateIndex { index, .. } => format!("create index {}", index.name),
            Self::DropIndex { name, .. } => format!("drop index {}", name),
            Self::Sql { .. } => "sql".to_string(),
        }
    }
}

/// Direction a migration is run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// Apply the migration (up).
    Up,
    /// Reverse the migration (down).
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Collects the operations of one migration direction.
#[derive(Debug, Default)]
pub struct MigrationBuilder {
    operations: Vec<Operation>,
}

impl MigrationBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table.
    pub fn create_table(&mut self, entity: &Entity) -> &mut Self {
        self.operations.push(Operation::create_table(entity));
        for index in &entity.indexes {
            self.operations.push(Operation::CreateIndex {
                table: entity.table.clone(),
                index: index.clone(),
            });
        }
        self
    }

    /// Drop a table.
    pub fn drop_table(&mut self, table: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::DropTable {
            table: table.into(),
        });
        self
    }

    /// Rename a table.
    pub fn rename_table(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::RenameTable {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add a column.
    pub fn add_column(&mut self, table: impl Into<String>, column: Column) -> &mut Self {
        self.operations.push(Operation::AddColumn {
            table: table.into(),
            column,
        });
        self
    }

    /// Drop a column.
    pub fn drop_column(&mut self, table: impl Into<String>, column: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::DropColumn {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Create an index.
    pub fn create_index(&mut self, table: impl Into<String>, index: Index) -> &mut Self {
        self.operations.push(Operation::CreateIndex {
            table: table.into(),
            index,
        });
        self
    }

    /// Drop an index.
    pub fn drop_index(&mut self, table: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::DropIndex {
            table: table.into(),
            name: name.into(),
        });
        self
    }

    /// Append a raw statement.
    pub fn sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::Sql { sql: sql.into() });
        self
    }

    /// Append an arbitrary operation.
    pub fn push(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    /// Borrow the collected operations.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Take the collected operations.
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let users = Entity::new("User")
            .table("users")
            .primary_key(["id"])
            .column(Column::new("id", "INTEGER"))
            .index(Index::new("ix_users_id", ["id"]));

        let mut builder = MigrationBuilder::new();
        builder
            .create_table(&users)
            .add_column("users", Column::new("email", "TEXT").nullable())
            .sql("UPDATE users SET email = ''");

        let ops = builder.into_operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[0], Operation::CreateTable { .. }));
        assert!(matches!(ops[1], Operation::CreateIndex { .. }));
        assert!(matches!(ops[2], Operation::AddColumn { .. }));
        assert!(matches!(ops[3], Operation::Sql { .. }));
    }

    #[test]
    fn test_operation_tagged_serialization() {
        let op = Operation::DropColumn {
            table: "users".into(),
            column: "email".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "drop_column");
        assert_eq!(json["table"], "users");
    }

    #[test]
    fn test_describe_and_table() {
        let op = Operation::RenameTable {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(op.table(), Some("a"));
        assert_eq!(op.describe(), "rename table a to b");
        assert_eq!(Operation::Sql { sql: "SELECT 1".into() }.table(), None);
    }
}
