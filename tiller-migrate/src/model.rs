//! Declared data model and model snapshots.
//!
//! A [`Model`] is what a context declares today; a snapshot is the same value
//! frozen into a migration. Snapshots are compared structurally by the
//! [`ModelDiffer`](crate::diff::ModelDiffer).

use serde::{Deserialize, Serialize};

/// A data model: the set of entities a context owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Entities in declaration order.
    #[serde(default, rename = "entity")]
    pub entities: Vec<Entity>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity.
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Find an entity by table name.
    pub fn table(&self, table: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.table == table)
    }

    /// Check if the model has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// A mapped entity (one table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Primary key columns.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Columns in declaration order.
    #[serde(default, rename = "column")]
    pub columns: Vec<Column>,
    /// Secondary indexes.
    #[serde(default, rename = "index")]
    pub indexes: Vec<Index>,
}

impl Entity {
    /// Create an entity whose table is named after it.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.clone(),
            name,
            primary_key: Vec::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Set the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an index.
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Find a column by name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find an index by name.
    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type, passed through to the generator.
    pub sql_type: String,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Column {
    /// Create a non-nullable column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
            default: None,
        }
    }

    /// Mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    /// Create a non-unique index.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_model() -> Model {
        Model::new().entity(
            Entity::new("Blog")
                .table("blogs")
                .primary_key(["id"])
                .column(Column::new("id", "INTEGER"))
                .column(Column::new("url", "TEXT").nullable())
                .index(Index::new("ix_blogs_url", ["url"]).unique()),
        )
    }

    #[test]
    fn test_lookup_by_table() {
        let model = blog_model();
        let blog = model.table("blogs").unwrap();
        assert_eq!(blog.name, "Blog");
        assert!(blog.find_column("url").unwrap().nullable);
        assert!(blog.find_index("ix_blogs_url").unwrap().unique);
        assert!(model.table("Blog").is_none());
    }

    #[test]
    fn test_snapshot_toml_shape() {
        let model = blog_model();
        let text = toml::to_string(&model).unwrap();
        assert!(text.contains("[[entity]]"));
        assert!(text.contains("[[entity.column]]"));

        let parsed: Model = toml::from_str(&text).unwrap();
        assert_eq!(parsed, model);
    }

    #[test]
    fn test_empty_model() {
        assert!(Model::new().is_empty());
        let parsed: Model = toml::from_str("").unwrap();
        assert!(parsed.is_empty());
    }
}
