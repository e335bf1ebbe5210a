use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use drifter::config::{Config, DEFAULT_CONFIG_PATH};
use drifter::drift::detect_drift;
use drifter::output::json::render_inventory_json;
use drifter::output::table::render_drift_table;
use drifter::scanner::{ScanOutcome, Scanner};
use drifter::session::{AwsConnector, DEFAULT_REGION};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "drifter",
    about = "Detect version drift of Lambda functions and Kubernetes deployments across environments"
)]
struct Cli {
    /// Config file location, JSON or YAML
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Enable diagnostic logging on stderr
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    /// Region for environments that do not set one
    #[arg(long, default_value = DEFAULT_REGION)]
    region: String,
    /// Per-task discovery timeout in seconds
    #[arg(long = "timeout", default_value_t = 120)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing();
    }
    let started = Instant::now();

    let config = Config::load(&cli.config)?;
    info!(
        "loaded {} environments, baseline {}",
        config.envs.len(),
        config.baseline().map(|e| e.name.as_str()).unwrap_or_default()
    );

    let connector = AwsConnector::load(&cli.region).await;
    let scanner = Scanner::new(Arc::new(connector))
        .with_timeout(Duration::from_secs(cli.timeout_secs.max(1)));
    let outcome = scanner.scan(&config).await?;
    info!(
        "scanned {} resources between {} and {}",
        outcome.inventory.total(),
        outcome.started_at.to_rfc3339(),
        outcome.finished_at.to_rfc3339()
    );

    print_outcome(&config, &outcome, cli.format)?;
    info!("done in {}ms", started.elapsed().as_millis());

    if !outcome.is_complete() {
        for failure in &outcome.failures {
            error!("{failure}");
            eprintln!("discovery failed: {failure}");
        }
        bail!("{} discovery task(s) failed", outcome.failures.len());
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drifter=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_outcome(config: &Config, outcome: &ScanOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let rows = detect_drift(&config.envs, &outcome.inventory, &outcome.failures);
            println!("{}", render_drift_table(&config.envs, &rows));
        }
        OutputFormat::Json => println!("{}", render_inventory_json(&outcome.inventory)?),
    }
    Ok(())
}
