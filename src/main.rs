//! embedml entry point

use clap::Parser;
use embedml::cli::{cmd_info, cmd_inspect, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "embedml=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { request } => {
            cmd_train(&request, cli.quiet)?;
        }
        Commands::Inspect {
            data,
            filetype,
            key,
        } => {
            cmd_inspect(&data, filetype.as_deref(), key.as_deref(), cli.quiet)?;
        }
        Commands::Info => {
            cmd_info()?;
        }
    }

    Ok(())
}
