//! Portfolio snapshots on disk

use anyhow::{Context, Result};
use colored::Colorize;
use log::info;
use std::fs;
use std::path::Path;

use portfolio_core::{Portfolio, StorageLayout};

use crate::config::expand_path;

fn layout_name(layout: &StorageLayout) -> &'static str {
    match layout {
        StorageLayout::V1(_) => "V1",
        StorageLayout::V2(_) => "V2",
    }
}

/// Read a snapshot in any layout
pub fn read_layout(path: &Path) -> Result<StorageLayout> {
    let path = expand_path(path);
    let data = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse snapshot JSON: {}", path.display()))
}

/// Read a snapshot and bring it up to the current layout
pub fn load(path: &Path) -> Result<Portfolio> {
    Ok(Portfolio::restore(read_layout(path)?))
}

pub fn save(path: &Path, portfolio: &Portfolio) -> Result<()> {
    let path = expand_path(path);
    let data = serde_json::to_string_pretty(&portfolio.snapshot()).context("Failed to encode snapshot")?;
    fs::write(&path, data).with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    info!("snapshot of {} written to {}", portfolio.name(), path.display());
    Ok(())
}

/// Rewrite `input` in the current layout, in place unless `output` is given
pub fn migrate_file(input: &Path, output: Option<&Path>) -> Result<()> {
    let layout = read_layout(input)?;
    let from = layout_name(&layout);
    let portfolio = Portfolio::restore(layout);
    let target = output.unwrap_or(input);
    save(target, &portfolio)?;

    println!("{}", "=== Snapshot Migrated ===".bright_green().bold());
    println!("{} {}", "Portfolio:".bright_cyan(), portfolio.name());
    println!("{} {} -> V2", "Layout:".bright_cyan(), from);
    println!(
        "{} {} v{}",
        "Implementation:".bright_cyan(),
        portfolio.implementation().name,
        portfolio.implementation().version
    );
    println!("{} {}", "Written to:".bright_cyan(), expand_path(target).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::simulate::Simulation;

    const SCENARIO: &str = r#"
        [portfolio]
        name = "Snapshot fund"
        duration_days = 30
        capital_formation_days = 5

        [[tranches]]
        name = "Equity"

        [[tranches]]
        name = "Senior"
        target_apy_bps = 800

        [[steps]]
        day = 0
        action = "deposit"
        tranche = 1
        amount = 5000

        [[steps]]
        day = 1
        action = "start"
    "#;

    fn simulated() -> Portfolio {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let mut sim = Simulation::new(&scenario).unwrap();
        sim.run(&scenario, true).unwrap();
        sim.portfolio().clone()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let portfolio = simulated();

        save(&path, &portfolio).unwrap();
        assert_eq!(load(&path).unwrap(), portfolio);
        assert!(matches!(read_layout(&path).unwrap(), StorageLayout::V2(_)));
    }

    #[test]
    fn test_migrate_to_separate_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");
        save(&input, &simulated()).unwrap();

        migrate_file(&input, Some(&output)).unwrap();
        assert_eq!(load(&output).unwrap(), load(&input).unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"layout\":\"V9\"}").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse snapshot JSON"));
    }
}
