//! Replay a scenario against an in-memory portfolio

use anyhow::{bail, Result};
use log::{debug, warn};

use portfolio_core::{
    Address, AllowAll, AssetLedger, Collaborators, DepositCeiling, DepositController, Event,
    InMemoryLedger, Portfolio, PortfolioError, ProtocolConfig, Role, VaultsRegistry,
};

use crate::config::{Action, Scenario, SECONDS_PER_DAY};

pub const ADMIN: Address = Address::from_seed(1);
pub const MANAGER: Address = Address::from_seed(2);
pub const TREASURY: Address = Address::from_seed(3);
pub const LENDER: Address = Address::from_seed(4);
pub const VAULT: Address = Address::from_seed(6);
pub const PORTFOLIO: Address = Address::from_seed(10);
pub const ASSET: Address = Address::from_seed(11);

pub fn tranche_address(index: usize) -> Address {
    Address::from_seed(20u8.wrapping_add(index as u8))
}

/// Result of one scenario step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub timestamp: u64,
    pub action: Action,
    pub result: Result<(), PortfolioError>,
    pub events: Vec<Event>,
}

pub struct Simulation {
    fees: ProtocolConfig,
    vaults: VaultsRegistry,
    ledger: InMemoryLedger,
    portfolio: Portfolio,
    controllers: Vec<Box<dyn DepositController>>,
    genesis: u64,
    now: u64,
}

impl Simulation {
    pub fn new(scenario: &Scenario) -> Result<Self> {
        let genesis = scenario.genesis_timestamp()?;

        let mut fees = ProtocolConfig::new(ADMIN, scenario.portfolio.protocol_fee_bps, TREASURY)?;
        if let Some(rate) = scenario.portfolio.manager_fee_bps {
            fees.set_custom_protocol_fee_rate(&ADMIN, MANAGER, rate)?;
        }

        let mut vaults = VaultsRegistry::new(ADMIN);
        vaults.grant_role(&ADMIN, Role::ListAdmin, ADMIN)?;
        vaults.add_vault(&ADMIN, VAULT)?;

        let params = scenario.portfolio_params(ASSET, tranche_address);
        let portfolio = Portfolio::new(PORTFOLIO, ADMIN, MANAGER, params, genesis, &fees)?;

        let controllers = scenario
            .tranches
            .iter()
            .map(|tranche| -> Box<dyn DepositController> {
                match tranche.deposit_ceiling {
                    Some(ceiling) => Box::new(DepositCeiling { ceiling: u128::from(ceiling) }),
                    None => Box::new(AllowAll),
                }
            })
            .collect();

        let mut ledger = InMemoryLedger::default();
        ledger.mint(LENDER, u128::from(scenario.portfolio.lender_funds));
        ledger.approve(LENDER, PORTFOLIO, u128::MAX);

        Ok(Self { fees, vaults, ledger, portfolio, controllers, genesis, now: genesis })
    }

    /// Apply every step in order. Rejected steps are recorded and skipped
    /// unless `strict` is set.
    pub fn run(&mut self, scenario: &Scenario, strict: bool) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let timestamp = self.genesis.saturating_add(step.day.saturating_mul(SECONDS_PER_DAY));
            let result = self.apply(&step.action, timestamp);
            let events = self.portfolio.drain_events();

            match &result {
                Ok(()) => debug!("step {} ({}) applied, {} events", index, step.action, events.len()),
                Err(err) => {
                    if strict {
                        bail!("step {} on day {} ({}) rejected: {}", index, step.day, step.action, err);
                    }
                    warn!("step {} ({}) rejected: {}", index, step.action, err);
                }
            }
            outcomes.push(StepOutcome { index, timestamp, action: step.action.clone(), result, events });
        }
        Ok(outcomes)
    }

    pub fn apply(&mut self, action: &Action, now: u64) -> Result<(), PortfolioError> {
        self.now = now;
        let mut env = Collaborators { fees: &self.fees, vaults: &self.vaults, token: &mut self.ledger };
        let portfolio = &mut self.portfolio;

        match *action {
            Action::Deposit { tranche, amount } => {
                let controller = self.controllers.get(tranche).ok_or(PortfolioError::NotATranche)?;
                portfolio.deposit(tranche, &LENDER, u128::from(amount), now, &mut env, controller.as_ref())
            }
            Action::Withdraw { tranche, amount } => {
                portfolio.withdraw(tranche, &LENDER, u128::from(amount), now, &mut env, &AllowAll)
            }
            Action::Start => portfolio.start(&MANAGER, now, env.fees),
            Action::Close => portfolio.close(&MANAGER, now, env.fees),
            Action::Checkpoint => portfolio.update_checkpoints(now, env.fees).map(|_| ()),
            Action::Deploy { amount } => {
                portfolio.transfer(&MANAGER, VAULT, u128::from(amount), now, &mut env, &AllowAll, None)
            }
            Action::Mark { value } => portfolio.update_receivables(&MANAGER, u128::from(value), now, env.fees),
            Action::Repay { amount } => portfolio.receive_from_vault(&VAULT, u128::from(amount), now, &mut env),
            Action::SweepFees => portfolio.sweep_protocol_fees(now, &mut env).map(|_| ()),
            Action::Pause => portfolio.pause(&ADMIN),
            Action::Unpause => portfolio.unpause(&ADMIN),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.ledger.balance_of(account)
    }
}
