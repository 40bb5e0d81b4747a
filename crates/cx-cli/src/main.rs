//! cf-expose CLI
//!
//! Exposes a local web service on a public hostname through a Cloudflare
//! tunnel, and removes the tunnel and its DNS record when it stops.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cf_expose::commands::{self, UpOptions};
use cf_expose::output::print_error;

#[derive(Parser)]
#[command(name = "cf-expose")]
#[command(author, version, about = "Expose a local web service through a Cloudflare tunnel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tunnel and DNS record, run the connector until stopped
    Up {
        /// Local service port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Base domain (overrides config)
        #[arg(short, long)]
        domain: Option<String>,
        /// Static subdomain (overrides config)
        #[arg(short, long, conflicts_with = "random")]
        subdomain: Option<String>,
        /// Use a random 4-letter subdomain
        #[arg(short, long)]
        random: bool,
        /// Path to the cloudflared executable
        #[arg(long)]
        connector: Option<String>,
        /// Do not wait for the local port to accept connections
        #[arg(long)]
        skip_readiness: bool,
        /// Command launching the local service
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Check credentials, configuration and the connector installation
    Check,

    /// Delete a DNS record and tunnel left behind by an unclean exit
    Cleanup {
        /// Public hostname whose DNS record should be removed
        #[arg(long)]
        hostname: String,
        /// Tunnel to delete
        #[arg(long)]
        tunnel_id: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Create a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Up {
            port,
            domain,
            subdomain,
            random,
            connector,
            skip_readiness,
            command,
        } => {
            let options = UpOptions {
                port,
                domain,
                subdomain,
                random,
                connector,
                skip_readiness,
                command,
            };
            commands::up_command(config, options).await?;
        }

        Commands::Check => {
            commands::check_command(config)?;
        }

        Commands::Cleanup {
            hostname,
            tunnel_id,
        } => {
            commands::cleanup_command(config, &hostname, tunnel_id.as_deref()).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_show(config)?;
            }
            ConfigAction::Get { key } => {
                commands::config_get(config, &key)?;
            }
            ConfigAction::Init { force } => {
                commands::config_init(config, force)?;
            }
            ConfigAction::Path => {
                commands::config_path(config)?;
            }
        },
    }

    Ok(())
}
