//! Suikou - AI proofreading CLI
//!
#![doc = "Suikou - AI proofreading CLI"]
#![doc = "Main entry point for the Suikou application."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use suikou::cli::{Cli, Commands};
use suikou::commands;
use suikou::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Proofread {
            text,
            stdin,
            no_chat,
        } => {
            tracing::info!("Starting proofreading");
            commands::proofread::run_proofread(config, text, stdin, no_chat).await?;
            Ok(())
        }
        Commands::Show { json } => {
            commands::show::run_show(config, json).await?;
            Ok(())
        }
        Commands::Reset => {
            commands::reset::run_reset(config).await?;
            Ok(())
        }
        Commands::Serve { bind } => {
            tracing::info!("Starting HTTP server");
            commands::serve::run_serve(config, bind).await?;
            Ok(())
        }
        Commands::Check => {
            commands::check::run_check(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they never interleave with the rendered session
/// on stdout.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "suikou=debug" } else { "suikou=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
