//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// tiller - schema migrations for context types
#[derive(Parser, Debug)]
#[command(name = "tiller")]
#[command(version)]
#[command(about = "tiller - schema migrations for context types", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to the configuration file
    #[arg(long, global = true, env = "TILLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the target assembly manifest
    #[arg(short, long, global = true)]
    pub assembly: Option<PathBuf>,

    /// Extra directory to search for referenced assemblies
    #[arg(long = "search-path", global = true)]
    pub search_paths: Vec<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect context types
    Context(ContextArgs),

    /// Migration commands
    Migration(MigrationArgs),

    /// Database commands
    Database(DatabaseArgs),

    /// Display version information
    Version,
}

// =============================================================================
// Context Command
// =============================================================================

/// Arguments for the `context` command
#[derive(Args, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub command: ContextSubcommand,
}

/// Context subcommands
#[derive(Subcommand, Debug)]
pub enum ContextSubcommand {
    /// List every context type
    List(ListArgs),

    /// Show the resolved context type
    Info(ContextInfoArgs),
}

/// Output options for list commands
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `context info`
#[derive(Args, Debug)]
pub struct ContextInfoArgs {
    /// Context name
    #[arg(short, long)]
    pub context: Option<String>,
}

// =============================================================================
// Migration Command
// =============================================================================

/// Arguments for the `migration` command
#[derive(Args, Debug)]
pub struct MigrationArgs {
    #[command(subcommand)]
    pub command: MigrationSubcommand,
}

/// Migration subcommands
#[derive(Subcommand, Debug)]
pub enum MigrationSubcommand {
    /// List migrations of a context
    List(MigrationListArgs),

    /// Scaffold a new migration
    Add(MigrationAddArgs),

    /// Generate a SQL script
    Script(MigrationScriptArgs),
}

/// Arguments for `migration list`
#[derive(Args, Debug)]
pub struct MigrationListArgs {
    /// Context name
    #[arg(short, long)]
    pub context: Option<String>,

    /// Show which migrations are applied (connects to the database)
    #[arg(long)]
    pub status: bool,

    /// Database connection URL
    #[arg(long)]
    pub connection: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `migration add`
#[derive(Args, Debug)]
pub struct MigrationAddArgs {
    /// Name for the migration
    pub name: String,

    /// Context name
    #[arg(short, long)]
    pub context: Option<String>,

    /// Directory the migration files are written to; must be where the assembly loads migrations from
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `migration script`
#[derive(Args, Debug)]
pub struct MigrationScriptArgs {
    /// Starting migration; omit for an empty database
    #[arg(long)]
    pub from: Option<String>,

    /// Ending migration; omit for the latest
    #[arg(long)]
    pub to: Option<String>,

    /// Guard every block so the script can run more than once (not supported for SQLite)
    #[arg(short, long)]
    pub idempotent: bool,

    /// Context name
    #[arg(short, long)]
    pub context: Option<String>,

    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// =============================================================================
// Database Command
// =============================================================================

/// Arguments for the `database` command
#[derive(Args, Debug)]
pub struct DatabaseArgs {
    #[command(subcommand)]
    pub command: DatabaseSubcommand,
}

/// Database subcommands
#[derive(Subcommand, Debug)]
pub enum DatabaseSubcommand {
    /// Apply or revert migrations
    Update(DatabaseUpdateArgs),
}

/// Arguments for `database update`
#[derive(Args, Debug)]
pub struct DatabaseUpdateArgs {
    /// Target migration; omit for the latest, `0` to revert everything
    pub target: Option<String>,

    /// Context name
    #[arg(short, long)]
    pub context: Option<String>,

    /// Database connection URL
    #[arg(long)]
    pub connection: Option<String>,
}
