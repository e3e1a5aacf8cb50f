use clap::{Parser, Subcommand};

mod commands;
mod request;

use commands::{AdmitArgs, CheckConfigArgs};

#[derive(Parser)]
#[command(name = "admission")]
#[command(about = "Deterministic portfolio admission with auditable evidence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate candidate sets (or replacements) and write evidence bundles
    Admit(AdmitArgs),
    /// Validate a governance file and print its snapshot hash
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Admit(args) => {
            commands::run_admit(args).await?;
        }
        Commands::CheckConfig(args) => {
            commands::run_check_config(&args)?;
        }
    }

    Ok(())
}
