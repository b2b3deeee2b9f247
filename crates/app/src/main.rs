//! Reckon pricing calculator CLI

use std::{path::PathBuf, process};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use reckon::totals::GrandTotalDiscountStrategy;
use reckon_app::demo::{self, DemoOptions};

#[derive(Debug, Parser)]
#[command(name = "reckon-app", about = "Reckon pricing calculator CLI", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Price a scripted quote against a fixture set
    Demo(DemoArgs),
}

#[derive(Debug, Args)]
struct DemoArgs {
    /// Directory holding the fixture sets
    #[arg(long, env = "RECKON_FIXTURES", default_value = "crates/core/fixtures")]
    fixtures: PathBuf,

    /// Fixture set to price
    #[arg(long, default_value = "demo")]
    set: String,

    /// How the grand total's discount cell is derived
    #[arg(long, value_enum, default_value_t = StrategyArg::SummedPercentages)]
    strategy: StrategyArg,
}

/// CLI face of [`GrandTotalDiscountStrategy`].
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Sum the per-product discount percentages
    SummedPercentages,

    /// Recompute from the grand list and discounted totals
    RatioOfTotals,
}

impl From<StrategyArg> for GrandTotalDiscountStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::SummedPercentages => Self::SummedPercentages,
            StrategyArg::RatioOfTotals => Self::RatioOfTotals,
        }
    }
}

#[tokio::main]
pub async fn main() {
    let _env = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Demo(args) => demo::run(DemoOptions {
            fixtures: args.fixtures,
            set: args.set,
            strategy: args.strategy.into(),
        })
        .await
        .map_err(|error| format!("demo failed: {error}")),
    }
}
