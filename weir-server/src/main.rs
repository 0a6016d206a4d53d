//! weir: traffic and virtual-model control plane.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use weir_core::WeirConfig;

/// weir: canary rollouts and virtual models over KServe and Envoy AI Gateway
#[derive(Parser, Debug)]
#[command(name = "weir", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WEIR_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create or upgrade the database schema and exit
    Migrate,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

fn load(cli: &Cli) -> anyhow::Result<WeirConfig> {
    weir_core::load_config(cli.config.as_deref(), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = load(&cli)?;

    match &cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            let _guard = weir_server::telemetry::init(&config.logging, cli.verbose)?;
            weir_server::serve(&config).await
        }
        Commands::Migrate => {
            let _guard = weir_server::telemetry::init(&config.logging, cli.verbose)?;
            let store = weir_store::SqliteStore::from_config(&config.database)
                .with_context(|| format!("migrating {}", config.database.path.display()))?;
            let version = store.schema_version()?;
            println!("Database {} at schema version {version}", config.database.path.display());
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
