//! Terminal rendering of portfolios and simulation steps

use chrono::DateTime;
use colored::Colorize;

use portfolio_core::{Event, Portfolio, Status};

use crate::simulate::StepOutcome;

/// Unix seconds as an RFC 3339 string, or the raw number when out of range
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Basis points as a percentage
pub fn format_bps(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

fn format_status(status: Status) -> colored::ColoredString {
    match status {
        Status::CapitalFormation => status.to_string().yellow(),
        Status::Live => status.to_string().bright_green(),
        Status::Closed => status.to_string().dimmed(),
    }
}

pub fn print_step(outcome: &StepOutcome, verbose: bool) {
    let when = format_timestamp(outcome.timestamp);
    match &outcome.result {
        Ok(()) => println!(
            "{} {} {}",
            format!("[{:>3}]", outcome.index).dimmed(),
            when.bright_cyan(),
            outcome.action.to_string().green()
        ),
        Err(err) => println!(
            "{} {} {} {}",
            format!("[{:>3}]", outcome.index).dimmed(),
            when.bright_cyan(),
            outcome.action.to_string().red(),
            format!("rejected: {}", err).red().bold()
        ),
    }

    if verbose {
        for event in &outcome.events {
            println!("        {}", describe_event(event).dimmed());
        }
    }
}

pub fn describe_event(event: &Event) -> String {
    match event {
        Event::CheckpointUpdated { tranche, total_assets, unpaid_fees, deficit, .. } => format!(
            "checkpoint tranche {}: assets {} fees {} deficit {}",
            tranche, total_assets, unpaid_fees, deficit
        ),
        Event::StatusChanged { status } => format!("status -> {}", status),
        Event::Transferred { to, amount } => format!("transferred {} to {}", amount, to),
        Event::ReceivablesUpdated { value } => format!("receivables {}", value),
        Event::ProtocolFeesPaid { tranche, amount } => format!("tranche {} paid {} protocol fees", tranche, amount),
        Event::Upgraded { name, version } => format!("upgraded to {} v{}", name, version),
        other => format!("{:?}", other),
    }
}

pub fn print_portfolio(portfolio: &Portfolio, now: u64) {
    println!("\n{}", format!("=== {} ===", portfolio.name()).bright_green().bold());
    println!("{} {}", "Status:".bright_cyan(), format_status(portfolio.status()));
    println!("{} {}", "As of:".bright_cyan(), format_timestamp(now));
    if portfolio.status() != Status::CapitalFormation {
        println!("{} {}", "Started:".bright_cyan(), format_timestamp(portfolio.start_date()));
        println!("{} {}", "Ends:".bright_cyan(), format_timestamp(portfolio.end_date()));
    } else {
        println!("{} {}", "Start deadline:".bright_cyan(), format_timestamp(portfolio.start_deadline()));
    }
    println!("{} {}", "Pool balance:".bright_cyan(), portfolio.virtual_token_balance());
    println!("{} {}", "Receivables:".bright_cyan(), portfolio.receivables());
    if portfolio.is_paused() {
        println!("{}", "PAUSED".red().bold());
    }

    println!(
        "\n{:<4} {:<16} {:>8} {:>16} {:>12} {:>14} {:>16}",
        "#", "Tranche", "APY", "Assets", "Fees", "Deficit", "Value"
    );
    for (index, tranche) in portfolio.tranches().iter().enumerate().rev() {
        let checkpoint = &tranche.checkpoint;
        let deficit = if checkpoint.deficit > 0 {
            checkpoint.deficit.to_string().red()
        } else {
            checkpoint.deficit.to_string().normal()
        };
        println!(
            "{:<4} {:<16} {:>8} {:>16} {:>12} {:>14} {:>16}",
            index,
            tranche.name,
            format_bps(tranche.target_apy),
            checkpoint.total_assets,
            checkpoint.unpaid_fees,
            deficit,
            tranche.effective_value().to_string().bold()
        );
    }
}

pub fn print_summary(outcomes: &[StepOutcome]) {
    let rejected = outcomes.iter().filter(|o| o.result.is_err()).count();
    let line = format!("{} steps, {} applied, {} rejected", outcomes.len(), outcomes.len() - rejected, rejected);
    if rejected == 0 {
        println!("\n{}", line.green());
    } else {
        println!("\n{}", line.yellow());
    }
}
