//! guildlink daemon
//!
//! Links Discord accounts to EVE characters and keeps guild membership in
//! line with the validation server:
//! - Discord OAuth2 linking handshake
//! - Validation pass every 20 minutes, evicting and renaming members
//! - Daily token refresh pass

use clap::{Args, Parser, Subcommand};
use guildlink_daemon::error::{DaemonError, DaemonResult};
use guildlink_daemon::{DaemonConfig, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// guildlink daemon CLI
#[derive(Parser)]
#[command(name = "guildlinkd")]
#[command(about = "guildlink - Discord guild membership for EVE characters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon
    Run(RunArgs),

    /// Write a configuration template
    Init(InitArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, env = "GUILDLINK_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides server.listen_addr
    #[arg(short, long, env = "GUILDLINK_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides logging.level
    #[arg(long, env = "GUILDLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "GUILDLINK_LOG_JSON")]
    json: bool,
}

#[derive(Args)]
struct InitArgs {
    /// Where to write the template
    #[arg(short, long, default_value = "config.json")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Init(args) => init(args),
    }
}

async fn run(args: RunArgs) -> DaemonResult<()> {
    // Load configuration
    let mut config = DaemonConfig::load(args.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &args.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.json;

    init_tracing(&config.logging.level, config.logging.json);

    config.validate().map_err(DaemonError::Config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.server.listen_addr,
        guild_id = %config.discord.guild_id,
        "Starting guildlink daemon"
    );

    let server = Server::new(config).await?;
    server.run().await
}

fn init(args: InitArgs) -> DaemonResult<()> {
    if args.output.exists() && !args.force {
        return Err(DaemonError::Config(format!(
            "{} already exists, pass --force to overwrite",
            args.output.display()
        )));
    }

    let template = serde_json::to_string_pretty(&DaemonConfig::template())
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    std::fs::write(&args.output, template)?;

    println!("Wrote configuration template to {}", args.output.display());
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
