//! call-governor CLI
//!
//! Fetches pages through the governed page-fetch dependency and reports the
//! outcome of every fetch alongside the bulkhead and breaker state.
//!
//! ```text
//!   URLs ──▶ PageFetcher ──▶ Dependency::call ──▶ reqwest
//!                               │
//!                   bulkhead · breaker · retry · timeout
//!                               │
//!              shared DeadlineBudget + root Signal (Ctrl+C)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use call_governor::config::{load_config, GovernorConfig, PAGE_FETCH_DEPENDENCY};
use call_governor::governor::DependencySnapshot;
use call_governor::lifecycle::{listen_for_ctrl_c, Shutdown};
use call_governor::observability::{logging::init_logging, metrics::init_metrics};
use call_governor::{CallOptions, DeadlineBudget, DependencyRegistry, PageFetcher};

#[derive(Parser)]
#[command(name = "call-governor")]
#[command(about = "Governed outbound calls: bulkhead, circuit breaker, retries, deadlines", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch pages concurrently through the governor
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        /// End-to-end deadline shared by every fetch
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Dependency class to govern the fetches with
        #[arg(long, default_value = PAGE_FETCH_DEPENDENCY)]
        dependency: String,

        /// Skip pages instead of failing when admission is refused
        #[arg(long)]
        optional: bool,
    },
    /// Validate a configuration file
    Check { path: PathBuf },
}

#[derive(Serialize)]
struct FetchReport {
    request_id: String,
    url: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct RunReport {
    budget_ms: u64,
    remaining_ms: u64,
    fetches: Vec<FetchReport>,
    dependencies: Vec<DependencySnapshot>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path } => {
            init_logging(&GovernorConfig::default().observability);
            match load_config(&path) {
                Ok(config) => {
                    println!(
                        "{}: OK ({} dependencies)",
                        path.display(),
                        config.dependencies.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Fetch {
            urls,
            budget_ms,
            dependency,
            optional,
        } => {
            let config = match &cli.config {
                Some(path) => load_config(path)?,
                None => GovernorConfig::default(),
            };
            run_fetch(config, urls, budget_ms, &dependency, optional).await
        }
    }
}

async fn run_fetch(
    config: GovernorConfig,
    urls: Vec<String>,
    budget_ms: Option<u64>,
    dependency: &str,
    optional: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "call-governor starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(DependencyRegistry::from_config(&config));
    let shutdown = Shutdown::with_registry(registry.clone());
    let ctrl_c = listen_for_ctrl_c(shutdown.clone());

    let fetcher = PageFetcher::new(registry.get_or_create(dependency))?;
    let total = budget_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.deadline.default_budget());
    let budget = DeadlineBudget::new(total);
    let signal = shutdown.subscribe();

    tracing::info!(
        urls = urls.len(),
        dependency = %dependency,
        budget_ms = total.as_millis() as u64,
        "Fetching"
    );

    let fetches = urls.iter().map(|url| {
        let fetcher = &fetcher;
        let budget = &budget;
        let signal = &signal;
        async move {
            let request_id = Uuid::new_v4().to_string();
            let options = CallOptions::new()
                .budget(budget)
                .signal(signal)
                .request_id(&request_id);
            let start = Instant::now();

            let result = if optional {
                fetcher.fetch_optional(url, options).await
            } else {
                fetcher.fetch(url, options).await.map(Some)
            };

            let (outcome, bytes, error) = match result {
                Ok(Some(body)) => ("success", Some(body.len()), None),
                Ok(None) => ("skipped", None, None),
                Err(e) => (e.kind(), None, Some(e.to_string())),
            };
            FetchReport {
                request_id,
                url: url.clone(),
                outcome,
                bytes,
                error,
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        }
    });
    let fetches = futures_util::future::join_all(fetches).await;

    let report = RunReport {
        budget_ms: total.as_millis() as u64,
        remaining_ms: budget.remaining().as_millis() as u64,
        fetches,
        dependencies: registry.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    shutdown.trigger();
    let _ = ctrl_c.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
