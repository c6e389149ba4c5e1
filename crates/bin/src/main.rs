//! Keystone CLI binary.
//!
//! Stress tests an index against a one-period shock to a single constituent.

mod integration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use integration::cache_manager;
use integration::runner::{
    FetchConfig, build_source, fetch_with_spinner, parse_continuation, parse_reference,
    parse_shock_mode, print_analysis, print_rolling_report,
};
use keystone::pipeline::{
    AnalysisConfig, PipelineError, estimate_rolling, latest_associations, run_analysis,
};
use keystone_engine::{ContinuationPolicy, DrawdownReference, ShockMode};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "Keystone: constituent shock stress testing", long_about = None)]
#[command(version)]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that fetch prices.
#[derive(Args)]
struct MarketArgs {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Aggregate (index) ticker
    #[arg(long)]
    aggregate: Option<String>,

    /// Constituent ticker
    #[arg(long)]
    constituent: Option<String>,

    /// Years of history when --start is not given
    #[arg(long)]
    years: Option<u32>,

    /// First price date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last price date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Output format (json or text)
    #[arg(long, default_value = "text")]
    format: String,

    /// Disable caching (always fetch fresh data)
    #[arg(long)]
    no_cache: bool,

    /// Force refresh cached data
    #[arg(long)]
    refresh: bool,
}

impl MarketArgs {
    fn load_config(&self) -> Result<AnalysisConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(aggregate) = &self.aggregate {
            config.aggregate = aggregate.to_uppercase();
        }
        if let Some(constituent) = &self.constituent {
            config.constituent = constituent.to_uppercase();
        }
        if let Some(years) = self.years {
            config.history_years = years;
        }
        if self.start.is_some() {
            config.start = self.start;
        }
        if self.end.is_some() {
            config.end = self.end;
        }
        Ok(config)
    }

    const fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            use_cache: !self.no_cache,
            force_refresh: self.refresh,
        }
    }

    fn json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the shock scenario grid for a constituent
    Analyze {
        #[command(flatten)]
        market: MarketArgs,

        /// Weight used to back out ex-constituent returns (fraction)
        #[arg(long)]
        weight: Option<f64>,

        /// Grid weights, comma separated fractions
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        weights: Option<Vec<f64>>,

        /// Grid shocks, comma separated fractions (e.g. -0.1,-0.3)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        shocks: Option<Vec<f64>>,

        /// Simulated periods including the shock
        #[arg(long)]
        horizon: Option<usize>,

        /// Pre-shock reference date (YYYY-MM-DD)
        #[arg(long)]
        pre_shock_date: Option<NaiveDate>,

        /// Shock mode: additive or replace
        #[arg(long, value_parser = parse_shock_mode)]
        mode: Option<ShockMode>,

        /// Continuation: flat or historical-replay
        #[arg(long, value_parser = parse_continuation)]
        continuation: Option<ContinuationPolicy>,

        /// Drawdown reference: fixed or peak
        #[arg(long, value_parser = parse_reference)]
        reference: Option<DrawdownReference>,

        /// Write CSV/JSON artifacts to this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Show the latest rolling beta and correlation per window
    Rolling {
        #[command(flatten)]
        market: MarketArgs,

        /// Window lengths, comma separated
        #[arg(long, value_delimiter = ',')]
        windows: Option<Vec<usize>>,
    },

    /// Print the default configuration as JSON
    Config {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inspect or clear the quote cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache location and contents
    Info,

    /// Remove cached quotes
    Clear {
        /// Only this symbol
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Analyze {
            market,
            weight,
            weights,
            shocks,
            horizon,
            pre_shock_date,
            mode,
            continuation,
            reference,
            output_dir,
        } => {
            let mut config = market.load_config()?;
            if let Some(weight) = weight {
                config.weight = weight;
            }
            if let Some(weights) = weights {
                config.grid.weights = weights;
            }
            if let Some(shocks) = shocks {
                config.grid.shocks = shocks;
            }
            if let Some(horizon) = horizon {
                config.grid.shock.horizon = horizon;
            }
            if pre_shock_date.is_some() {
                config.pre_shock_date = pre_shock_date;
            }
            if let Some(mode) = mode {
                config.grid.shock.mode = mode;
            }
            if let Some(continuation) = continuation {
                config.grid.shock.continuation = continuation;
            }
            if let Some(reference) = reference {
                config.grid.drawdown.reference = reference;
            }
            config.validate()?;

            let source = build_source(market.fetch_config())?;
            let prices = fetch_with_spinner(&source, &config).await?;
            let result = run_analysis(&prices, &config)?;

            if market.json() {
                println!("{}", result.report()?.to_json()?);
            } else {
                print_analysis(&result);
            }

            if let Some(dir) = output_dir {
                let written = result.export(&dir)?;
                info!(files = written.len(), "artifacts written");
                if !market.json() {
                    println!("Artifacts written to {}:", dir.display());
                    for path in written {
                        println!("  {}", path.display());
                    }
                }
            }
        }
        Commands::Rolling { market, windows } => {
            let mut config = market.load_config()?;
            if let Some(windows) = windows {
                config.rolling.windows = windows;
            }
            config.validate()?;

            let source = build_source(market.fetch_config())?;
            let prices = fetch_with_spinner(&source, &config).await?;
            let latest = latest_associations(&estimate_rolling(&prices, &config)?);

            if market.json() {
                let output = json!({
                    "aggregate": config.aggregate,
                    "constituent": config.constituent,
                    "latest": latest,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_rolling_report(&config, &latest);
            }
        }
        Commands::Config { output } => {
            let config = AnalysisConfig::default();
            match output {
                Some(path) => {
                    config.to_json_file(&path)?;
                    println!("Default configuration written to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&config)?),
            }
        }
        Commands::Cache { action } => {
            let cache = cache_manager::open_cache()?;
            match action {
                CacheAction::Info => cache_manager::print_cache_info(&cache)?,
                CacheAction::Clear { symbol } => {
                    cache_manager::clear_cache(&cache, symbol.as_deref())?
                }
            }
        }
    }

    Ok(())
}
