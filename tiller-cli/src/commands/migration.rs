//! `tiller migration` commands - List, scaffold and script migrations.

use std::collections::HashSet;

use tiller_migrate::IsolationBoundary;

use crate::cli::{
    MigrationAddArgs, MigrationArgs, MigrationListArgs, MigrationScriptArgs, MigrationSubcommand,
};
use crate::commands::{self, Project};
use crate::error::CliResult;
use crate::output;

/// Run the migration command
pub async fn run(project: &Project, args: MigrationArgs) -> CliResult<()> {
    match args.command {
        MigrationSubcommand::List(list_args) => run_list(project, list_args).await,
        MigrationSubcommand::Add(add_args) => run_add(project, add_args).await,
        MigrationSubcommand::Script(script_args) => run_script(project, script_args).await,
    }
}

/// Run `tiller migration list`
async fn run_list(project: &Project, args: MigrationListArgs) -> CliResult<()> {
    let mut boundary = project.open(args.connection.as_deref(), None).await?;
    let result = list(&mut boundary, &args).await;
    commands::close(boundary).await;
    result
}

async fn list(boundary: &mut IsolationBoundary, args: &MigrationListArgs) -> CliResult<()> {
    let context = args.context.as_deref();

    if args.status {
        let status = boundary.status(context).await?;
        if args.json {
            output::json(&status)?;
            return Ok(());
        }

        output::header("Migrations");
        output::kv("Context", &status.context);
        output::newline();

        let applied: HashSet<&str> = status.applied.iter().map(String::as_str).collect();
        let all = boundary.get_migrations(context).await?;
        for (i, id) in all.iter().enumerate() {
            let state = if applied.contains(id.as_str()) {
                output::style_success("applied")
            } else {
                output::style_pending("pending")
            };
            output::numbered_item(i + 1, &format!("{} {}", id, state));
        }

        output::newline();
        output::dim(&format!(
            "{} applied, {} pending",
            status.applied.len(),
            status.pending.len()
        ));
        return Ok(());
    }

    let migrations = boundary.get_migrations(context).await?;
    if args.json {
        output::json(&migrations)?;
        return Ok(());
    }

    if migrations.is_empty() {
        output::info("No migrations were found.");
        return Ok(());
    }

    for id in &migrations {
        println!("{}", id);
    }
    Ok(())
}

/// Run `tiller migration add`
async fn run_add(project: &Project, args: MigrationAddArgs) -> CliResult<()> {
    let mut boundary = project.open(None, args.output_dir.as_deref()).await?;
    let result = boundary
        .add_migration(&args.name, args.context.as_deref())
        .await;
    commands::close(boundary).await;
    let migration = result?;

    if args.json {
        output::json(&migration)?;
        return Ok(());
    }

    output::header("Migration Added");
    output::kv("Id", &migration.migration_id);
    output::kv("Type", &migration.type_name);
    output::kv("Context", &migration.context);
    output::kv("Operations", &migration.up_operations.len().to_string());
    output::newline();

    output::section("Files");
    for path in &migration.artifacts {
        output::list_item(&path.display().to_string());
    }

    output::newline();
    if migration.up_operations.is_empty() {
        output::warn("The model has not changed; the migration is empty.");
    }
    output::success(&format!("Migration '{}' created", args.name));

    Ok(())
}

/// Run `tiller migration script`
async fn run_script(project: &Project, args: MigrationScriptArgs) -> CliResult<()> {
    let mut boundary = project.open(None, None).await?;
    let result = boundary
        .script_migration(
            args.from.as_deref(),
            args.to.as_deref(),
            args.idempotent,
            args.context.as_deref(),
        )
        .await;
    commands::close(boundary).await;
    let script = result?;

    match &args.output {
        Some(path) => {
            let path = project.cwd.join(path);
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, &script).await?;
            output::success(&format!("Script written to {}", path.display()));
        }
        None => print!("{}", script),
    }

    Ok(())
}
