//! omsdeploy - Roll out the Log Analytics monitoring agent to Azure VMs
//!
//! This is the main entry point for the omsdeploy CLI.

mod cli;

use anyhow::{Context, Result};
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use omsdeploy::config::{Config, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    init_logging(cli.verbosity(), &config.logging.level, config.logging.format);
    tracing::debug!("omsdeploy v{}", omsdeploy::version());

    let mut ctx = CommandContext::new(&cli, config);

    let result = match &cli.command {
        Commands::Deploy(args) => args.execute(&mut ctx).await,
        Commands::List(args) => args.execute(&mut ctx).await,
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&e.to_string());
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
///
/// `RUST_LOG` wins; otherwise `-v` flags raise the configured level.
fn init_logging(verbosity: u8, configured_level: &str, format: LogFormat) {
    let filter = match verbosity {
        0 => configured_level,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
