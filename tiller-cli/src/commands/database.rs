//! `tiller database` commands - Apply or revert migrations.

use crate::cli::{DatabaseArgs, DatabaseSubcommand, DatabaseUpdateArgs};
use crate::commands::{self, Project};
use crate::error::CliResult;
use crate::output;

/// Run the database command
pub async fn run(project: &Project, args: DatabaseArgs) -> CliResult<()> {
    match args.command {
        DatabaseSubcommand::Update(update_args) => run_update(project, update_args).await,
    }
}

/// Run `tiller database update`
async fn run_update(project: &Project, args: DatabaseUpdateArgs) -> CliResult<()> {
    let mut boundary = project.open(args.connection.as_deref(), None).await?;

    // Ctrl-C stops before the next migration step.
    let cancel = boundary.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warn("Cancelling after the current migration...");
            cancel.cancel();
        }
    });

    let result = boundary
        .apply_migration(args.target.as_deref(), args.context.as_deref())
        .await;
    watcher.abort();
    commands::close(boundary).await;
    let report = result?;

    output::header("Database Update");
    output::kv("Context", &report.context);
    output::kv("Direction", &report.direction.to_string());

    for id in &report.applied {
        output::list_item(&format!("{} {}", output::style_success("applied"), id));
    }
    for id in &report.reverted {
        output::list_item(&format!("{} {}", output::style_pending("reverted"), id));
    }

    output::newline();
    if report.has_changes() {
        output::success(&report.summary());
    } else {
        output::info("The database is already up to date.");
    }

    Ok(())
}
