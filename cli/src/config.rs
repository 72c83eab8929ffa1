//! Scenario files: portfolio setup plus a timeline of steps

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use portfolio_core::{Address, PortfolioParams, TrancheParams};

pub const SECONDS_PER_DAY: u64 = 86_400;

const DEFAULT_GENESIS: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("scenario defines no tranches")]
    NoTranches,

    #[error("step {step} refers to tranche {tranche}, but only {count} are defined")]
    UnknownTranche { step: usize, tranche: usize, count: usize },

    #[error("step {step} happens on day {day}, before the step preceding it")]
    OutOfOrder { step: usize, day: u64 },

    #[error("invalid genesis timestamp {0:?}, expected RFC 3339")]
    InvalidGenesis(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub portfolio: PortfolioSection,
    pub tranches: Vec<TrancheSection>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioSection {
    pub name: String,
    /// Creation time of the portfolio, RFC 3339
    #[serde(default = "default_genesis")]
    pub genesis: String,
    pub duration_days: u64,
    pub capital_formation_days: u64,
    #[serde(default)]
    pub minimum_size: u64,
    #[serde(default)]
    pub protocol_fee_bps: u64,
    /// Custom protocol fee for this portfolio's manager
    #[serde(default)]
    pub manager_fee_bps: Option<u64>,
    /// Tokens minted to the simulated lender up front
    #[serde(default = "default_lender_funds")]
    pub lender_funds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrancheSection {
    pub name: String,
    #[serde(default)]
    pub target_apy_bps: u64,
    #[serde(default)]
    pub min_subordinate_ratio_bps: u64,
    /// Maximum tranche value accepted by its deposit controller
    #[serde(default)]
    pub deposit_ceiling: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Step {
    /// Days since genesis
    pub day: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    Deposit { tranche: usize, amount: u64 },
    Withdraw { tranche: usize, amount: u64 },
    Start,
    Close,
    Checkpoint,
    /// Move pool capital into the demo vault
    Deploy { amount: u64 },
    /// Mark the deployed capital to a new value
    Mark { value: u64 },
    /// Demo vault returns capital
    Repay { amount: u64 },
    SweepFees,
    Pause,
    Unpause,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Deposit { tranche, amount } => write!(f, "deposit {} into tranche {}", amount, tranche),
            Action::Withdraw { tranche, amount } => write!(f, "withdraw {} from tranche {}", amount, tranche),
            Action::Start => f.write_str("start"),
            Action::Close => f.write_str("close"),
            Action::Checkpoint => f.write_str("checkpoint"),
            Action::Deploy { amount } => write!(f, "deploy {}", amount),
            Action::Mark { value } => write!(f, "mark receivables at {}", value),
            Action::Repay { amount } => write!(f, "repay {}", amount),
            Action::SweepFees => f.write_str("sweep fees"),
            Action::Pause => f.write_str("pause"),
            Action::Unpause => f.write_str("unpause"),
        }
    }
}

fn default_genesis() -> String {
    DEFAULT_GENESIS.to_string()
}

fn default_lender_funds() -> u64 {
    1_000_000_000_000
}

impl Scenario {
    /// Read and validate a scenario file; `~` is expanded
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_path(path);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Invalid scenario: {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(data).context("Failed to parse scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.tranches.is_empty() {
            return Err(ScenarioError::NoTranches);
        }
        self.genesis_timestamp()?;

        let count = self.tranches.len();
        let mut last_day = 0;
        for (step, entry) in self.steps.iter().enumerate() {
            if entry.day < last_day {
                return Err(ScenarioError::OutOfOrder { step, day: entry.day });
            }
            last_day = entry.day;

            if let Action::Deposit { tranche, .. } | Action::Withdraw { tranche, .. } = entry.action {
                if tranche >= count {
                    return Err(ScenarioError::UnknownTranche { step, tranche, count });
                }
            }
        }
        Ok(())
    }

    /// Genesis as unix seconds
    pub fn genesis_timestamp(&self) -> Result<u64, ScenarioError> {
        let invalid = || ScenarioError::InvalidGenesis(self.portfolio.genesis.clone());
        let parsed = DateTime::parse_from_rfc3339(&self.portfolio.genesis).map_err(|_| invalid())?;
        u64::try_from(parsed.timestamp()).map_err(|_| invalid())
    }

    /// Engine parameters, with tranche `i` identified by `tranche_address(i)`
    pub fn portfolio_params(&self, asset: Address, tranche_address: impl Fn(usize) -> Address) -> PortfolioParams {
        PortfolioParams {
            name: self.portfolio.name.clone(),
            asset,
            duration: self.portfolio.duration_days.saturating_mul(SECONDS_PER_DAY),
            capital_formation_period: self.portfolio.capital_formation_days.saturating_mul(SECONDS_PER_DAY),
            minimum_size: u128::from(self.portfolio.minimum_size),
            tranches: self
                .tranches
                .iter()
                .enumerate()
                .map(|(i, tranche)| TrancheParams {
                    name: tranche.name.clone(),
                    address: tranche_address(i),
                    target_apy: tranche.target_apy_bps,
                    min_subordinate_ratio: tranche.min_subordinate_ratio_bps,
                })
                .collect(),
        }
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"
        [portfolio]
        name = "Test fund"
        duration_days = 365
        capital_formation_days = 30
        minimum_size = 1000
        protocol_fee_bps = 50

        [[tranches]]
        name = "Equity"

        [[tranches]]
        name = "Senior"
        target_apy_bps = 600
        min_subordinate_ratio_bps = 2000
        deposit_ceiling = 5000

        [[steps]]
        day = 0
        action = "deposit"
        tranche = 1
        amount = 4000

        [[steps]]
        day = 3
        action = "start"

        [[steps]]
        day = 90
        action = "sweep-fees"
    "#;

    #[test]
    fn test_load_scenario_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.portfolio.genesis, DEFAULT_GENESIS);
        assert_eq!(scenario.tranches[1].deposit_ceiling, Some(5000));
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].action, Action::Deposit { tranche: 1, amount: 4000 });
        assert_eq!(scenario.steps[2].action, Action::SweepFees);
    }

    #[test]
    fn test_portfolio_params() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let params = scenario.portfolio_params(Address::from_seed(11), |i| Address::from_seed(20 + i as u8));
        assert_eq!(params.duration, 365 * SECONDS_PER_DAY);
        assert_eq!(params.capital_formation_period, 30 * SECONDS_PER_DAY);
        assert_eq!(params.tranches[1].target_apy, 600);
        assert_eq!(params.tranches[1].address, Address::from_seed(21));
    }

    #[test]
    fn test_genesis_timestamp() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        assert_eq!(scenario.genesis_timestamp().unwrap(), 1_704_067_200);
    }

    #[test]
    fn test_rejects_out_of_order_steps() {
        let data = SCENARIO.replace("day = 90", "day = 1").replace("day = 3", "day = 5");
        let err = Scenario::parse(&data).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ScenarioError>(),
            Some(&ScenarioError::OutOfOrder { step: 2, day: 1 })
        );
    }

    #[test]
    fn test_rejects_unknown_tranche() {
        let data = SCENARIO.replace("tranche = 1", "tranche = 7");
        let err = Scenario::parse(&data).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ScenarioError>(),
            Some(&ScenarioError::UnknownTranche { step: 0, tranche: 7, count: 2 })
        );
    }

    #[test]
    fn test_rejects_bad_genesis() {
        let data = SCENARIO.replace("name = \"Test fund\"", "name = \"Test fund\"\ngenesis = \"yesterday\"");
        assert!(Scenario::parse(&data).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Scenario::load(Path::new("/nonexistent/scenario.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read scenario file"));
    }
}
