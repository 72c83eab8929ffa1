//! Versioned storage layouts and implementation upgrades
//!
//! Persisted portfolios are tagged with their layout. Each layout only ever
//! appends fields to the previous one, so `migrate` fills the new fields with
//! neutral values and carries everything else across unchanged.

use log::info;
use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::error::{PortfolioError, Result};
use crate::events::{Event, EventLog};
use crate::portfolio::Portfolio;
use crate::tranche::Tranche;
use crate::types::{Address, Role, Status};

/// Name and version of the logic a portfolio runs under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: u32,
}

impl Implementation {
    pub const CURRENT_VERSION: u32 = 2;

    pub fn current() -> Self {
        Self { name: "portfolio".to_string(), version: Self::CURRENT_VERSION }
    }

    fn legacy() -> Self {
        Self { name: "portfolio-v1".to_string(), version: 1 }
    }
}

/// First storage layout, before receivables were tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioV1 {
    pub address: Address,
    pub asset: Address,
    pub manager: Address,
    pub name: String,
    pub status: Status,
    pub created_at: u64,
    pub start_deadline: u64,
    pub start_date: u64,
    pub end_date: u64,
    pub duration: u64,
    pub capital_formation_period: u64,
    pub minimum_size: u128,
    pub virtual_token_balance: u128,
    pub tranches: Vec<Tranche>,
    pub access: AccessControl,
    pub events: EventLog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", content = "state")]
pub enum StorageLayout {
    V1(PortfolioV1),
    V2(Portfolio),
}

/// Bring any stored layout up to the current one
pub fn migrate(layout: StorageLayout) -> Portfolio {
    match layout {
        StorageLayout::V2(portfolio) => portfolio,
        StorageLayout::V1(old) => {
            info!("migrating portfolio {} from layout V1", old.name);
            Portfolio {
                address: old.address,
                asset: old.asset,
                manager: old.manager,
                name: old.name,
                status: old.status,
                created_at: old.created_at,
                start_deadline: old.start_deadline,
                start_date: old.start_date,
                end_date: old.end_date,
                duration: old.duration,
                capital_formation_period: old.capital_formation_period,
                minimum_size: old.minimum_size,
                virtual_token_balance: old.virtual_token_balance,
                tranches: old.tranches,
                access: old.access,
                events: old.events,
                receivables: 0,
                implementation: Implementation::legacy(),
            }
        }
    }
}

impl Portfolio {
    /// Current state, tagged with the current layout
    pub fn snapshot(&self) -> StorageLayout {
        StorageLayout::V2(self.clone())
    }

    pub fn restore(layout: StorageLayout) -> Self {
        migrate(layout)
    }

    /// Point the portfolio at a newer implementation; state is preserved
    pub fn upgrade_to(&mut self, caller: &Address, implementation: Implementation) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        if implementation.version < self.implementation.version {
            return Err(PortfolioError::InvalidState);
        }
        if implementation.version == self.implementation.version {
            return Err(PortfolioError::NoOpRejected);
        }

        info!(
            "upgrading {} from {} v{} to {} v{}",
            self.name,
            self.implementation.name,
            self.implementation.version,
            implementation.name,
            implementation.version
        );
        self.events.emit(Event::Upgraded {
            name: implementation.name.clone(),
            version: implementation.version,
        });
        self.implementation = implementation;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::ProtocolConfig;
    use crate::portfolio::PortfolioParams;
    use crate::tranche::TrancheParams;

    const ADMIN: Address = Address::from_seed(1);
    const MANAGER: Address = Address::from_seed(2);
    const EQUITY: Address = Address::from_seed(20);
    const SENIOR: Address = Address::from_seed(21);

    fn live_portfolio() -> Portfolio {
        let fees = ProtocolConfig::new(ADMIN, 50, Address::from_seed(3)).unwrap();
        let params = PortfolioParams {
            name: "upgradeable".to_string(),
            asset: Address::from_seed(30),
            duration: 10_000,
            capital_formation_period: 100,
            minimum_size: 0,
            tranches: vec![
                TrancheParams { name: "equity".into(), address: EQUITY, target_apy: 0, min_subordinate_ratio: 0 },
                TrancheParams { name: "senior".into(), address: SENIOR, target_apy: 500, min_subordinate_ratio: 0 },
            ],
        };
        let mut portfolio = Portfolio::new(Address::from_seed(10), ADMIN, MANAGER, params, 0, &fees).unwrap();
        portfolio.increase_virtual_token_balance(&EQUITY, 1_000, 0, &fees).unwrap();
        portfolio.increase_virtual_token_balance(&SENIOR, 4_000, 0, &fees).unwrap();
        portfolio.start(&MANAGER, 10, &fees).unwrap();
        portfolio.update_checkpoints(500, &fees).unwrap();
        portfolio
    }

    fn downgrade(portfolio: &Portfolio) -> PortfolioV1 {
        PortfolioV1 {
            address: portfolio.address,
            asset: portfolio.asset,
            manager: portfolio.manager,
            name: portfolio.name.clone(),
            status: portfolio.status,
            created_at: portfolio.created_at,
            start_deadline: portfolio.start_deadline,
            start_date: portfolio.start_date,
            end_date: portfolio.end_date,
            duration: portfolio.duration,
            capital_formation_period: portfolio.capital_formation_period,
            minimum_size: portfolio.minimum_size,
            virtual_token_balance: portfolio.virtual_token_balance,
            tranches: portfolio.tranches.clone(),
            access: portfolio.access.clone(),
            events: portfolio.events.clone(),
        }
    }

    #[test]
    fn test_v1_migration_preserves_state() {
        let portfolio = live_portfolio();
        let json = serde_json::to_string(&StorageLayout::V1(downgrade(&portfolio))).unwrap();
        let restored = Portfolio::restore(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.receivables, 0);
        assert_eq!(restored.implementation, Implementation::legacy());
        // Everything else carried across
        let expected = Portfolio { implementation: Implementation::legacy(), ..portfolio };
        assert_eq!(restored, expected);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let portfolio = live_portfolio();
        let json = serde_json::to_string(&portfolio.snapshot()).unwrap();
        assert!(json.contains("\"layout\":\"V2\""));
        let restored = Portfolio::restore(serde_json::from_str(&json).unwrap());
        assert_eq!(restored, portfolio);
    }

    #[test]
    fn test_upgrade_to() {
        let mut portfolio = Portfolio::restore(StorageLayout::V1(downgrade(&live_portfolio())));

        assert_eq!(
            portfolio.upgrade_to(&MANAGER, Implementation::current()),
            Err(PortfolioError::Unauthorized)
        );
        portfolio.upgrade_to(&ADMIN, Implementation::current()).unwrap();
        assert_eq!(portfolio.implementation().version, 2);
        assert_eq!(
            portfolio.events().last(),
            Some(&Event::Upgraded { name: "portfolio".to_string(), version: 2 })
        );

        assert_eq!(
            portfolio.upgrade_to(&ADMIN, Implementation::current()),
            Err(PortfolioError::NoOpRejected)
        );
        assert_eq!(
            portfolio.upgrade_to(&ADMIN, Implementation::legacy()),
            Err(PortfolioError::InvalidState)
        );
    }
}
