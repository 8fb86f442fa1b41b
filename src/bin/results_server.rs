use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use retail_analytics::config::Config;
use retail_analytics::constants;
use retail_analytics::pipeline::{FsResultStore, ResultStore};
use retail_analytics::server::{self, AppState};

#[derive(Parser)]
#[command(name = "results-server")]
#[command(about = "Read-only JSON API over the published analytics generation")]
#[command(version = "0.1.0")]
struct Cli {
    /// Port to run the server on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(long, default_value = constants::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output root to read generations from (overrides the config file)
    #[arg(long)]
    results: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let _guard = retail_analytics::logging::init_logging("logs");

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(root) = cli.results {
        config.output.root = root;
    }
    let port = cli.port.unwrap_or(config.server.port);

    println!("🚀 Starting results server on port {}...", port);

    retail_analytics::observability::metrics::init().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to initialize metrics: {}", e);
    });

    let store: Arc<dyn ResultStore> = Arc::new(FsResultStore::from_config(&config.output));
    let state = AppState::load(store).await?;
    info!("Reading generations from {}", config.output.root.display());

    server::start_server(state, port)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}
