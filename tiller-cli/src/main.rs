//! tiller CLI - Command-line interface for the tiller migration executor.

use clap::Parser;

use tiller_cli::cli::{Cli, Command};
use tiller_cli::commands::{self, Project};
use tiller_cli::error::CliResult;
use tiller_cli::{logging, output};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(&e.to_string());
        if let Some(help) = miette::Diagnostic::help(&e) {
            eprintln!("  help: {}", help);
        }
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    match cli.command {
        Command::Version => commands::version::run().await,
        Command::Context(args) => {
            let project = Project::load(cli.global)?;
            commands::context::run(&project, args).await
        }
        Command::Migration(args) => {
            let project = Project::load(cli.global)?;
            commands::migration::run(&project, args).await
        }
        Command::Database(args) => {
            let project = Project::load(cli.global)?;
            commands::database::run(&project, args).await
        }
    }
}
