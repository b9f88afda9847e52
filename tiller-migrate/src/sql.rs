//! SQL generation for migrations.
//!
//! Statement generation is vendor specific and sits behind [`SqlGenerator`].
//! The executor and the script renderer both go through
//! [`SqlGenerator::block`], so a script contains exactly what `apply` would run.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::model::{Column, Index};
use crate::operation::{MigrationDirection, Operation};

/// Database dialects with a bundled generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Get the generator for this dialect.
    pub fn generator(self) -> Box<dyn SqlGenerator> {
        match self {
            Self::Sqlite => Box::new(SqliteGenerator),
            Self::Postgres => Box::new(PostgresGenerator),
        }
    }

    /// Lowercase dialect name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(MigrationError::manifest(format!("Unknown dialect '{}'", other))),
        }
    }
}

/// Everything a generator needs to render one migration in one direction.
#[derive(Debug, Clone, Copy)]
pub struct MigrationBlock<'a> {
    /// History table name.
    pub history_table: &'a str,
    /// Context key recorded in history.
    pub context: &'a str,
    /// Migration id.
    pub migration_id: &'a str,
    /// Product version recorded in history.
    pub product_version: &'a str,
    /// Direction being rendered.
    pub direction: MigrationDirection,
    /// Operations for that direction.
    pub operations: &'a [Operation],
}

/// Vendor-specific SQL generation.
pub trait SqlGenerator: Send + Sync {
    /// Dialect produced by this generator.
    fn dialect(&self) -> Dialect;

    /// Generate statements for an ordered operation list.
    fn generate(&self, operations: &[Operation]) -> MigrateResult<Vec<String>>;

    /// DDL creating the history table if it does not exist.
    fn create_history_table(&self, table: &str) -> String;

    /// Query returning one row when the history table exists and none otherwise.
    fn history_table_exists(&self, table: &str) -> String;

    /// Query listing applied migrations of a context, ordered by ordinal.
    ///
    /// Result columns: `migration_id`, `product_version`, `applied_ordinal`.
    fn select_history(&self, table: &str, context: &str) -> String {
        format!(
            "SELECT {id}, {version}, {ordinal} FROM {table} WHERE {ctx} = {context} ORDER BY {ordinal};",
            id = quote_ident("migration_id"),
            version = quote_ident("product_version"),
            ordinal = quote_ident("applied_ordinal"),
            table = quote_ident(table),
            ctx = quote_ident("context_key"),
            context = quote_literal(context),
        )
    }

    /// Statement appending a history record.
    fn insert_history(
        &self,
        table: &str,
        context: &str,
        migration_id: &str,
        product_version: &str,
    ) -> String {
        format!(
            "INSERT INTO {} ({}, {}, {}) VALUES ({}, {}, {});",
            quote_ident(table),
            quote_ident("migration_id"),
            quote_ident("context_key"),
            quote_ident("product_version"),
            quote_literal(migration_id),
            quote_literal(context),
            quote_literal(product_version),
        )
    }

    /// Statement removing a history record.
    fn delete_history(&self, table: &str, context: &str, migration_id: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {} AND {} = {};",
            quote_ident(table),
            quote_ident("context_key"),
            quote_literal(context),
            quote_ident("migration_id"),
            quote_literal(migration_id),
        )
    }

    /// Render one migration block: its operations followed by the history change.
    fn block(&self, block: &MigrationBlock<'_>) -> MigrateResult<Vec<String>> {
        let mut statements = self.generate(block.operations)?;
        statements.push(history_statement(self, block));
        Ok(statements)
    }

    /// Render one migration block so it is safe to run against a database
    /// that may already contain its effect.
    fn guarded_block(&self, block: &MigrationBlock<'_>) -> MigrateResult<Vec<String>>;
}

fn history_statement<G: SqlGenerator + ?Sized>(generator: &G, block: &MigrationBlock<'_>) -> String {
    match block.direction {
        MigrationDirection::Up => generator.insert_history(
            block.history_table,
            block.context,
            block.migration_id,
            block.product_version,
        ),
        MigrationDirection::Down => {
            generator.delete_history(block.history_table, block.context, block.migration_id)
        }
    }
}

/// Quote an identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal with single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_definition(column: &Column) -> String {
    let mut parts = vec![quote_ident(&column.name), column.sql_type.clone()];

    if !column.nullable {
        parts.push("NOT NULL".to_string());
    }

    if let Some(default) = &column.default {
        parts.push(format!("DEFAULT {}", default));
    }

    parts.join(" ")
}

fn create_table(table: &str, primary_key: &[String], columns: &[Column]) -> String {
    let mut defs: Vec<String> = columns.iter().map(column_definition).collect();

    if !primary_key.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", column_list(primary_key)));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(table),
        defs.join(",\n    ")
    )
}

fn create_index(table: &str, index: &Index) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(table),
        column_list(&index.columns)
    )
}

/// SQL generator for SQLite.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteGenerator;

impl SqliteGenerator {
    fn statement(&self, operation: &Operation) -> MigrateResult<String> {
        Ok(match operation {
            Operation::CreateTable {
                table,
                primary_key,
                columns,
            } => create_table(table, primary_key, columns),
            Operation::DropTable { table } => format!("DROP TABLE {};", quote_ident(table)),
            Operation::RenameTable { from, to } => format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_ident(from),
                quote_ident(to)
            ),
            Operation::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {};",
                quote_ident(table),
                column_definition(column)
            ),
            Operation::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_ident(table),
                quote_ident(column)
            ),
            Operation::AlterColumn { .. } => {
                // SQLite has no ALTER COLUMN; a table rebuild is out of reach of a single statement
                return Err(MigrationError::unsupported(
                    self.dialect().as_str(),
                    operation.describe(),
                ));
            }
            Operation::CreateIndex { table, index } => create_index(table, index),
            Operation::DropIndex { name, .. } => format!("DROP INDEX {};", quote_ident(name)),
            Operation::Sql { sql } => sql.clone(),
        })
    }
}

impl SqlGenerator for SqliteGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn generate(&self, operations: &[Operation]) -> MigrateResult<Vec<String>> {
        operations.iter().map(|op| self.statement(op)).collect()
    }

    fn create_history_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n    {} TEXT NOT NULL,\n    {} TEXT NOT NULL,\n    {} TEXT NOT NULL,\n    UNIQUE ({}, {})\n);",
            quote_ident(table),
            quote_ident("applied_ordinal"),
            quote_ident("migration_id"),
            quote_ident("context_key"),
            quote_ident("product_version"),
            quote_ident("context_key"),
            quote_ident("migration_id"),
        )
    }

    fn history_table_exists(&self, table: &str) -> String {
        format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {};",
            quote_literal(table)
        )
    }

    fn guarded_block(&self, block: &MigrationBlock<'_>) -> MigrateResult<Vec<String>> {
        // SQLite has no procedural IF, so DDL cannot be made conditional on history.
        if !block.operations.is_empty() {
            return Err(MigrationError::unsupported(
                self.dialect().as_str(),
                format!(
                    "idempotent script for migration '{}' with schema operations",
                    block.migration_id
                ),
            ));
        }

        Ok(vec![match block.direction {
            MigrationDirection::Up => format!(
                "INSERT INTO {table} ({id}, {ctx}, {version}) SELECT {mid}, {context}, {pv} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {ctx} = {context} AND {id} = {mid});",
                table = quote_ident(block.history_table),
                id = quote_ident("migration_id"),
                ctx = quote_ident("context_key"),
                version = quote_ident("product_version"),
                mid = quote_literal(block.migration_id),
                context = quote_literal(block.context),
                pv = quote_literal(block.product_version),
            ),
            MigrationDirection::Down => {
                self.delete_history(block.history_table, block.context, block.migration_id)
            }
        }])
    }
}

/// SQL generator for PostgreSQL.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresGenerator;

impl PostgresGenerator {
    fn statements(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable {
                table,
                primary_key,
                columns,
            } => vec![create_table(table, primary_key, columns)],
            Operation::DropTable { table } => vec![format!("DROP TABLE {};", quote_ident(table))],
            Operation::RenameTable { from, to } => vec![format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_ident(from),
                quote_ident(to)
            )],
            Operation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {};",
                quote_ident(table),
                column_definition(column)
            )],
            Operation::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_ident(table),
                quote_ident(column)
            )],
            Operation::AlterColumn {
                table,
                column,
                previous,
            } => self.alter_column(table, column, previous),
            Operation::CreateIndex { table, index } => vec![create_index(table, index)],
            Operation::DropIndex { name, .. } => vec![format!("DROP INDEX {};", quote_ident(name))],
            Operation::Sql { sql } => vec![sql.clone()],
        }
    }

    /// Generate ALTER COLUMN statements for the parts that changed.
    fn alter_column(&self, table: &str, column: &Column, previous: &Column) -> Vec<String> {
        let table = quote_ident(table);
        let name = quote_ident(&column.name);
        let mut stmts = Vec::new();

        if column.sql_type != previous.sql_type {
            stmts.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                table, name, column.sql_type, name, column.sql_type
            ));
        }

        if column.nullable != previous.nullable {
            let action = if column.nullable {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            stmts.push(format!("ALTER TABLE {} ALTER COLUMN {} {};", table, name, action));
        }

        if column.default != previous.default {
            stmts.push(match &column.default {
                Some(default) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    table, name, default
                ),
                None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;", table, name),
            });
        }

        stmts
    }
}

impl SqlGenerator for PostgresGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn generate(&self, operations: &[Operation]) -> MigrateResult<Vec<String>> {
        Ok(operations.iter().flat_map(|op| self.statements(op)).collect())
    }

    fn create_history_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} BIGSERIAL PRIMARY KEY,\n    {} VARCHAR(150) NOT NULL,\n    {} VARCHAR(300) NOT NULL,\n    {} VARCHAR(32) NOT NULL,\n    UNIQUE ({}, {})\n);",
            quote_ident(table),
            quote_ident("applied_ordinal"),
            quote_ident("migration_id"),
            quote_ident("context_key"),
            quote_ident("product_version"),
            quote_ident("context_key"),
            quote_ident("migration_id"),
        )
    }

    fn history_table_exists(&self, table: &str) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {};",
            quote_literal(table)
        )
    }

    fn guarded_block(&self, block: &MigrationBlock<'_>) -> MigrateResult<Vec<String>> {
        let body = self.block(block)?;
        let condition = match block.direction {
            MigrationDirection::Up => "NOT EXISTS",
            MigrationDirection::Down => "EXISTS",
        };

        let mut sql = format!(
            "DO $tiller$\nBEGIN\n    IF {} (SELECT 1 FROM {} WHERE {} = {} AND {} = {}) THEN\n",
            condition,
            quote_ident(block.history_table),
            quote_ident("context_key"),
            quote_literal(block.context),
            quote_ident("migration_id"),
            quote_literal(block.migration_id),
        );
        for statement in body {
            for line in statement.lines() {
                sql.push_str("        ");
                sql.push_str(line);
                sql.push('\n');
            }
        }
        sql.push_str("    END IF;\nEND $tiller$;");

        Ok(vec![sql])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entity;

    fn users() -> Entity {
        Entity::new("User")
            .table("users")
            .primary_key(["id"])
            .column(Column::new("id", "INTEGER"))
            .column(Column::new("email", "TEXT").nullable().default_value("''"))
    }

    fn block<'a>(ops: &'a [Operation], direction: MigrationDirection) -> MigrationBlock<'a> {
        MigrationBlock {
            history_table: "__tiller_migrations",
            context: "App.BlogContext",
            migration_id: "20240101000000_Init",
            product_version: "0.4.0",
            direction,
            operations: ops,
        }
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("sqlite://app.db"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("postgresql://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("mysql://localhost"), None);
        assert_eq!("Postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_sqlite_create_table() {
        let sql = SqliteGenerator
            .generate(&[Operation::create_table(&users())])
            .unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("CREATE TABLE \"users\""));
        assert!(sql[0].contains("\"id\" INTEGER NOT NULL"));
        assert!(sql[0].contains("\"email\" TEXT DEFAULT ''"));
        assert!(sql[0].contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_sqlite_rejects_alter_column() {
        let op = Operation::AlterColumn {
            table: "users".into(),
            column: Column::new("email", "VARCHAR(10)"),
            previous: Column::new("email", "TEXT"),
        };
        let err = SqliteGenerator.generate(&[op]).unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));
    }

    #[test]
    fn test_block_appends_history() {
        let ops = [Operation::DropTable {
            table: "users".into(),
        }];
        let up = SqliteGenerator.block(&block(&ops, MigrationDirection::Up)).unwrap();
        assert_eq!(up.len(), 2);
        assert!(up[1].starts_with("INSERT INTO \"__tiller_migrations\""));
        assert!(up[1].contains("'20240101000000_Init'"));

        let down = SqliteGenerator.block(&block(&ops, MigrationDirection::Down)).unwrap();
        assert!(down[1].starts_with("DELETE FROM \"__tiller_migrations\""));
    }

    #[test]
    fn test_sqlite_guarded_block_rejects_schema_operations() {
        let ops = [Operation::create_table(&users())];
        let err = SqliteGenerator
            .guarded_block(&block(&ops, MigrationDirection::Up))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));
        assert!(err.to_string().contains("20240101000000_Init"));

        let drop = [Operation::DropTable {
            table: "users".into(),
        }];
        assert!(SqliteGenerator
            .guarded_block(&block(&drop, MigrationDirection::Down))
            .is_err());
    }

    #[test]
    fn test_sqlite_guarded_block_without_operations() {
        let up = SqliteGenerator
            .guarded_block(&block(&[], MigrationDirection::Up))
            .unwrap();
        assert_eq!(up.len(), 1);
        assert!(up[0].starts_with("INSERT INTO \"__tiller_migrations\""));
        assert!(up[0].contains("WHERE NOT EXISTS"));

        let down = SqliteGenerator
            .guarded_block(&block(&[], MigrationDirection::Down))
            .unwrap();
        assert!(down[0].starts_with("DELETE FROM \"__tiller_migrations\""));
    }

    #[test]
    fn test_postgres_guarded_block() {
        let ops = [Operation::create_table(&users())];
        let stmts = PostgresGenerator
            .guarded_block(&block(&ops, MigrationDirection::Up))
            .unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("DO $tiller$"));
        assert!(stmts[0].contains("IF NOT EXISTS (SELECT 1 FROM \"__tiller_migrations\""));
        assert!(stmts[0].contains("CREATE TABLE \"users\""));
        assert!(stmts[0].ends_with("END $tiller$;"));

        let down = PostgresGenerator
            .guarded_block(&block(&ops, MigrationDirection::Down))
            .unwrap();
        assert!(down[0].contains("IF EXISTS (SELECT 1"));
    }

    #[test]
    fn test_postgres_alter_column() {
        let op = Operation::AlterColumn {
            table: "users".into(),
            column: Column::new("email", "VARCHAR(255)"),
            previous: Column::new("email", "TEXT").nullable(),
        };
        let stmts = PostgresGenerator.generate(&[op]).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("TYPE VARCHAR(255)"));
        assert!(stmts[1].contains("SET NOT NULL"));
    }

    #[test]
    fn test_history_table_ddl() {
        let ddl = SqliteGenerator.create_history_table("__tiller_migrations");
        assert!(ddl.contains("IF NOT EXISTS \"__tiller_migrations\""));
        assert!(ddl.contains("AUTOINCREMENT"));
        let pg = PostgresGenerator.create_history_table("__tiller_migrations");
        assert!(pg.contains("BIGSERIAL"));
    }

    #[test]
    fn test_history_table_exists_query() {
        let sql = SqliteGenerator.history_table_exists("__tiller_migrations");
        assert!(sql.contains("sqlite_master"));
        assert!(sql.contains("name = '__tiller_migrations'"));
        let pg = PostgresGenerator.history_table_exists("__tiller_migrations");
        assert!(pg.contains("information_schema.tables"));
    }
}
