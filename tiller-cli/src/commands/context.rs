//! `tiller context` commands - Inspect context types.

use tiller_migrate::IsolationBoundary;

use crate::cli::{ContextArgs, ContextInfoArgs, ContextSubcommand, ListArgs};
use crate::commands::{self, Project};
use crate::error::CliResult;
use crate::output;

/// Run the context command
pub async fn run(project: &Project, args: ContextArgs) -> CliResult<()> {
    let mut boundary = project.open(None, None).await?;
    let result = match args.command {
        ContextSubcommand::List(list_args) => run_list(&mut boundary, list_args).await,
        ContextSubcommand::Info(info_args) => run_info(&mut boundary, info_args).await,
    };
    commands::close(boundary).await;
    result
}

/// Run `tiller context list`
async fn run_list(boundary: &mut IsolationBoundary, args: ListArgs) -> CliResult<()> {
    let contexts = boundary.get_context_types().await?;

    if args.json {
        output::json(&contexts)?;
        return Ok(());
    }

    if contexts.is_empty() {
        output::info("No context types were found.");
        return Ok(());
    }

    output::header("Context Types");
    for context in &contexts {
        output::list_item(&format!(
            "{} {}",
            context.full_name,
            output::style_pending(&format!("({})", context.assembly))
        ));
    }
    output::newline();
    output::dim(&format!("{} context type(s)", contexts.len()));

    Ok(())
}

/// Run `tiller context info`
async fn run_info(boundary: &mut IsolationBoundary, args: ContextInfoArgs) -> CliResult<()> {
    let identity = boundary.get_context_type(args.context.as_deref()).await?;
    let migrations = boundary.get_migrations(args.context.as_deref()).await?;

    output::header("Context");
    output::kv("Type", &identity);
    output::kv("Migrations", &migrations.len().to_string());
    if let Some(last) = migrations.last() {
        output::kv("Latest", last);
    }

    Ok(())
}
