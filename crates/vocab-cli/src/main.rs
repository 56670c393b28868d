//! vocab CLI - review vocabulary cards and sync them from a terminal

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use vocab_core::CardEdit;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::list::{run_due, run_list};
use crate::commands::reset::run_reset;
use crate::commands::review::{run_rate, run_snooze};
use crate::commands::settings::run_settings;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::config::{EffectiveConfig, Overrides};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "vocab=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        db_path: cli.db_path,
        server_url: cli.server_url,
        token: cli.token,
    };

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let effective = EffectiveConfig::load(&overrides)?;
    let db_path = effective.db_path.as_path();

    match cli.command {
        Commands::Add {
            original,
            translation,
            article,
        } => run_add(&original, &translation, &article, db_path).await?,
        Commands::List {
            limit,
            offset,
            json,
        } => run_list(limit, offset, json, db_path).await?,
        Commands::Due { limit, json } => run_due(limit, json, db_path).await?,
        Commands::Rate { id, rating, adjust } => run_rate(&id, rating, adjust, db_path).await?,
        Commands::Snooze { id } => run_snooze(&id, db_path).await?,
        Commands::Edit {
            id,
            original,
            translation,
            article,
        } => {
            let edit = CardEdit {
                original,
                translation,
                article,
            };
            run_edit(&id, edit, db_path).await?;
        }
        Commands::Delete { id } => run_delete(&id, db_path).await?,
        Commands::Reset { yes } => run_reset(yes, db_path).await?,
        Commands::Settings { command } => run_settings(command, db_path).await?,
        Commands::Sync { command, json } => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, db_path).await?;
            }
            None => run_sync(&effective, json).await?,
        },
        Commands::Export { format, output } => {
            run_export(format, output.as_deref(), db_path).await?;
        }
        Commands::Completions { .. } => {}
        Commands::Config { command } => run_config(command, &effective)?,
    }

    Ok(())
}
