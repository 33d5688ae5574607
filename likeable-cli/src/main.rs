mod commands;

use crate::commands::{CliError, Command};
use clap::Parser;
use likeable_db::client::DbClient;
use likeable_db::config::DbConfig;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Like, unlike and list likes between entities stored in PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "likeable")]
struct Cli {
    /// Read environment variables from this file instead of `.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "likeable_cli=debug,\
                likeable_db=debug,\
                likeable_common=debug,\
                sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = DbConfig::from_env(cli.env_file.as_deref())?;
    let db = Arc::new(DbClient::connect(&config).await?);

    debug!(command = ?cli.command, "Running command");
    let output = cli.command.run(&db).await?;
    output.print(cli.json)?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    install_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Cli, commands::Command};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["likeable", "count", "book#1", "--json"]);

        assert!(cli.json);
        assert!(cli.env_file.is_none());
        assert!(matches!(
            cli.command,
            Command::Count { reference, by: false } if reference.to_string() == "book#1"
        ));
    }

    #[test]
    fn references_are_validated() {
        assert!(Cli::try_parse_from(["likeable", "like", "book", "user#7"]).is_err());
        assert!(Cli::try_parse_from(["likeable", "like", "book#1", "user#x"]).is_err());
        assert!(Cli::try_parse_from(["likeable", "like", "bad tag#1", "user#7"]).is_err());
    }
}
