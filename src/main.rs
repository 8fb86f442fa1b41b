use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

use retail_analytics::config::Config;
use retail_analytics::constants;
use retail_analytics::logging;
use retail_analytics::observability::metrics;
use retail_analytics::pipeline::{FsResultStore, PipelineOrchestrator, ResultStore};
use retail_analytics::server::{self, AppState};

#[derive(Parser)]
#[command(name = "retail_analytics")]
#[command(about = "Batch analytics pipeline for retail shopping transactions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = constants::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for rolling log files
    #[arg(long, default_value = "logs")]
    log_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and publish a new generation
    Run,
    /// Load and validate the inputs without exporting anything
    Validate,
    /// Print the summary and tables of the current generation
    Show {
        /// Also print the rows of this table
        #[arg(long)]
        table: Option<String>,
    },
    /// Serve the current generation over HTTP
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

async fn run(config: Config) -> Result<()> {
    println!("🔄 Running analytics pipeline...");
    let store = FsResultStore::from_config(&config.output);
    let orchestrator = PipelineOrchestrator::new(config);

    let outcome = orchestrator.run(&store).await?;
    let report = &outcome.report;

    println!("\n📊 Pipeline Results ({}):", outcome.snapshot.generation());
    println!(
        "   Transactions: {} in, {} excluded",
        report.transactions_in, report.transactions_excluded
    );
    for (rule, count) in &report.excluded_by_rule {
        println!("     - {}: {}", rule, count);
    }
    if report.regions_excluded > 0 {
        println!("   Regions: {} in, {} excluded", report.regions_in, report.regions_excluded);
        for (rule, count) in &report.regions_excluded_by_rule {
            println!("     - {}: {}", rule, count);
        }
    }
    if !report.unmatched_malls.is_empty() {
        warn!("{} rows without region", report.unmatched_region_rows);
        println!(
            "   ⚠️  Malls without region: {}",
            report.unmatched_malls.join(", ")
        );
    }
    for stage in &report.stages {
        println!(
            "   {:<10} {:>8} → {:<8} {:.3}s",
            stage.stage, stage.rows_in, stage.rows_out, stage.duration_secs
        );
    }
    println!(
        "   Output: {}",
        store.generation_dir(outcome.snapshot.generation()).display()
    );
    Ok(())
}

fn validate(config: Config) -> Result<()> {
    println!("🔍 Validating inputs...");
    let outcome = PipelineOrchestrator::new(config).validate()?;
    let v = &outcome.validation;

    println!(
        "   Transactions: {} in, {} accepted, {} excluded",
        v.transactions_in, v.transactions_accepted, v.transactions_excluded
    );
    println!(
        "   Regions:      {} in, {} accepted, {} excluded",
        v.regions_in, v.regions_accepted, v.regions_excluded
    );
    for (rule, count) in &v.transactions_excluded_by_rule {
        println!("     - transactions {}: {}", rule.as_str(), count);
    }
    for (rule, count) in &v.regions_excluded_by_rule {
        println!("     - regions {}: {}", rule.as_str(), count);
    }
    println!("   Warnings: {}", v.warning_count());
    if !outcome.join.unmatched_malls.is_empty() {
        println!(
            "   ⚠️  {} rows reference malls without region: {:?}",
            outcome.join.unmatched_rows, outcome.join.unmatched_malls
        );
    }
    println!("✅ Inputs are usable");
    Ok(())
}

async fn show(config: Config, table: Option<String>) -> Result<()> {
    let store = FsResultStore::from_config(&config.output);
    let Some(snapshot) = store.load_current().await? else {
        println!("No generation has been published under {}", store.root().display());
        return Ok(());
    };

    println!("📦 Generation {} ({})", snapshot.generation(), snapshot.created_at());
    println!("{}", serde_json::to_string_pretty(snapshot.summary())?);
    for (name, rows) in snapshot.row_counts() {
        println!("   {:<24} {:>8} rows", name, rows);
    }

    if let Some(name) = table {
        let table = snapshot
            .table(&name)
            .with_context(|| format!("unknown table '{}'", name))?;
        let mut out = std::io::stdout().lock();
        table.write_csv(&mut out, config.output.decimal_places)?;
    }
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    metrics::init().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to initialize metrics: {}", e);
    });

    let store: Arc<dyn ResultStore> = Arc::new(FsResultStore::from_config(&config.output));
    let state = AppState::load(store).await?;

    let port = port.unwrap_or(config.server.port);
    server::start_server(state, port)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = logging::init_logging(&cli.log_dir);

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let result = match cli.command {
        Commands::Run => {
            metrics::init().unwrap_or_else(|e| {
                eprintln!("Warning: Failed to initialize metrics: {}", e);
            });
            run(config).await
        }
        Commands::Validate => validate(config),
        Commands::Show { table } => show(config, table).await,
        Commands::Serve { port } => serve(config, port).await,
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
        println!("❌ {:#}", e);
    }
    result
}
