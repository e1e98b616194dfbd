use std::sync::Arc;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "parlance",
    about = "Streaming voice pipeline server — hear, think, speak",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check the configuration for common problems
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(parlance_core::config::Config::config_path);

    let config = parlance_core::config::Config::load(&config_path)?;

    // Initialize logging: --verbose wins, then config, then "info"
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!("Starting Parlance gateway on port {port}");

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Configuration invalid, refusing to start");
            }

            let state = Arc::new(parlance_gateway::GatewayState::new(Arc::new(config)));
            parlance_gateway::start_gateway(state, port).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{value}"),
                None => {
                    anyhow::bail!("Key not found: {key}");
                }
            },
            ConfigAction::Set { key, value } => {
                let mut config = config;
                let parsed: serde_json::Value = serde_json::from_str(&value)
                    .unwrap_or(serde_json::Value::String(value.clone()));
                config.set_path(&key, parsed)?;
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(&config_path)?;
                println!("Set {key}");
            }
        },
        Commands::Doctor => {
            let (warnings, errors) = config.validate();
            if warnings.is_empty() && errors.is_empty() {
                println!("Config OK: {}", config_path.display());
            }
            for warning in &warnings {
                println!("warning: {warning}");
            }
            for error in &errors {
                println!("error: {error}");
            }
            if !errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
