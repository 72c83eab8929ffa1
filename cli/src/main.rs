//! Portfolio CLI - scenario simulator and snapshot tooling
//!
//! Replays lender deposits, capital deployment, marks and repayments against
//! a tranched portfolio, and inspects or migrates stored portfolio snapshots.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod config;
mod report;
mod simulate;
mod snapshot;

use config::Scenario;
use portfolio_core::{math, Address, ProtocolConfig, SECONDS_PER_YEAR};
use simulate::Simulation;

#[derive(Parser)]
#[command(name = "portfolio")]
#[command(about = "Tranched portfolio accounting - simulate scenarios and manage snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a TOML scenario against a fresh portfolio
    Simulate {
        /// Scenario file
        scenario: PathBuf,

        /// Stop at the first rejected step
        #[arg(long)]
        strict: bool,

        /// Write the final portfolio snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Project a value forward at a target APY
    Interest {
        /// Starting value
        value: u128,

        /// Annual rate (basis points)
        #[arg(long)]
        apy_bps: u64,

        /// Elapsed days
        #[arg(long, default_value = "365")]
        days: u64,

        /// Protocol fee on the earned yield (basis points)
        #[arg(long, default_value = "0")]
        fee_bps: u64,
    },

    /// Rewrite a stored snapshot in the current storage layout
    Migrate {
        /// Snapshot file
        input: PathBuf,

        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a stored snapshot
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,

        /// Checkpoint to this unix timestamp before printing
        #[arg(long)]
        at: Option<u64>,

        /// Protocol fee used for the checkpoint (basis points)
        #[arg(long, default_value = "0")]
        fee_bps: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { scenario, strict, snapshot } => {
            run_simulation(&scenario, strict, snapshot, cli.verbose)?;
        }
        Commands::Interest { value, apy_bps, days, fee_bps } => {
            show_interest(value, apy_bps, days, fee_bps)?;
        }
        Commands::Migrate { input, output } => {
            snapshot::migrate_file(&input, output.as_deref())?;
        }
        Commands::Inspect { snapshot, at, fee_bps } => {
            inspect_snapshot(&snapshot, at, fee_bps)?;
        }
    }

    Ok(())
}

fn run_simulation(path: &std::path::Path, strict: bool, snapshot_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    if verbose {
        println!("{} {}", "Scenario:".bright_cyan(), config::expand_path(path).display());
        println!("{} {}", "Steps:".bright_cyan(), scenario.steps.len());
    }

    let mut sim = Simulation::new(&scenario)?;
    println!("{}", format!("=== Simulating {} ===", scenario.portfolio.name).bright_green().bold());
    let outcomes = sim.run(&scenario, strict)?;
    for outcome in &outcomes {
        report::print_step(outcome, verbose);
    }
    report::print_summary(&outcomes);
    report::print_portfolio(sim.portfolio(), sim.now());
    println!(
        "\n{} {}",
        "Treasury received:".bright_cyan(),
        sim.balance_of(&simulate::TREASURY)
    );

    if let Some(path) = snapshot_path {
        snapshot::save(&path, sim.portfolio())?;
        println!("{} {}", "Snapshot:".bright_cyan(), path.display());
    }
    Ok(())
}

fn show_interest(value: u128, apy_bps: u64, days: u64, fee_bps: u64) -> Result<()> {
    let elapsed = days.checked_mul(config::SECONDS_PER_DAY).context("Elapsed time overflows")?;
    let grown = math::with_interest(value, apy_bps, elapsed)?;
    let earned = grown - value;
    let fee = math::fee_on(earned, fee_bps)?;

    println!("{}", "=== Interest Projection ===".bright_green().bold());
    println!("{} {}", "Start value:".bright_cyan(), value);
    println!("{} {}", "Rate:".bright_cyan(), report::format_bps(apy_bps));
    println!(
        "{} {} days ({:.4} years)",
        "Elapsed:".bright_cyan(),
        days,
        elapsed as f64 / SECONDS_PER_YEAR as f64
    );
    println!("{} {}", "End value:".bright_cyan(), grown.to_string().bold());
    println!("{} {}", "Earned:".bright_cyan(), earned);
    println!("{} {}", "Protocol fee:".bright_cyan(), fee);
    Ok(())
}

fn inspect_snapshot(path: &std::path::Path, at: Option<u64>, fee_bps: u64) -> Result<()> {
    let mut portfolio = snapshot::load(path)?;
    let mut now = portfolio.start_date();

    if let Some(timestamp) = at {
        let fees = ProtocolConfig::new(Address::ZERO, fee_bps, Address::ZERO)?;
        portfolio
            .update_checkpoints(timestamp, &fees)
            .with_context(|| format!("Failed to checkpoint {} at {}", portfolio.name(), timestamp))?;
        now = timestamp;
    }

    report::print_portfolio(&portfolio, now);
    println!(
        "\n{} {} v{}",
        "Implementation:".bright_cyan(),
        portfolio.implementation().name,
        portfolio.implementation().version
    );
    for event in portfolio.events().as_slice() {
        println!("  {}", report::describe_event(event).dimmed());
    }
    Ok(())
}
