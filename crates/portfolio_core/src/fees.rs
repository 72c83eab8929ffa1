//! Protocol fee rate resolution
//!
//! A per-address override wins over the pool default. Presence in the
//! override map is the signal: a custom rate of zero is a real override,
//! distinct from having none.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::error::{PortfolioError, Result};
use crate::events::{Event, EventLog};
use crate::types::{Address, Role, BPS};

/// Source of the protocol fee rate charged to a portfolio manager
pub trait FeeRateSource {
    /// Effective rate (bps) for `account`
    fn effective_fee_rate(&self, account: &Address) -> u64;

    /// Destination of swept protocol fees
    fn protocol_treasury(&self) -> Address;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    default_protocol_fee_rate: u64,
    custom_fee_rates: BTreeMap<Address, u64>,
    protocol_treasury: Address,
    access: AccessControl,
    events: EventLog,
}

impl ProtocolConfig {
    pub fn new(admin: Address, default_protocol_fee_rate: u64, protocol_treasury: Address) -> Result<Self> {
        validate_rate(default_protocol_fee_rate)?;
        Ok(Self {
            default_protocol_fee_rate,
            custom_fee_rates: BTreeMap::new(),
            protocol_treasury,
            access: AccessControl::new(admin),
            events: EventLog::default(),
        })
    }

    pub fn default_protocol_fee_rate(&self) -> u64 {
        self.default_protocol_fee_rate
    }

    pub fn custom_fee_rate(&self, account: &Address) -> Option<u64> {
        self.custom_fee_rates.get(account).copied()
    }

    pub fn set_default_protocol_fee_rate(&mut self, caller: &Address, rate: u64) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        validate_rate(rate)?;
        if rate == self.default_protocol_fee_rate {
            return Err(PortfolioError::NoOpRejected);
        }
        let old_rate = self.default_protocol_fee_rate;
        self.default_protocol_fee_rate = rate;
        info!("default protocol fee rate {} -> {} bps", old_rate, rate);
        self.events.emit(Event::DefaultProtocolFeeRateChanged { old_rate, new_rate: rate });
        Ok(())
    }

    pub fn set_custom_protocol_fee_rate(&mut self, caller: &Address, account: Address, rate: u64) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        validate_rate(rate)?;
        if self.custom_fee_rates.get(&account) == Some(&rate) {
            return Err(PortfolioError::NoOpRejected);
        }
        self.custom_fee_rates.insert(account, rate);
        info!("custom protocol fee rate for {} set to {} bps", account, rate);
        self.events.emit(Event::CustomProtocolFeeRateChanged { account, rate });
        Ok(())
    }

    pub fn remove_custom_protocol_fee_rate(&mut self, caller: &Address, account: &Address) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        if self.custom_fee_rates.remove(account).is_none() {
            return Err(PortfolioError::NotFound);
        }
        info!("custom protocol fee rate for {} removed", account);
        self.events.emit(Event::CustomProtocolFeeRateRemoved { account: *account });
        Ok(())
    }

    pub fn set_protocol_treasury(&mut self, caller: &Address, treasury: Address) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        if treasury == self.protocol_treasury {
            return Err(PortfolioError::NoOpRejected);
        }
        self.protocol_treasury = treasury;
        self.events.emit(Event::ProtocolTreasuryChanged { treasury });
        Ok(())
    }

    pub fn grant_role(&mut self, caller: &Address, role: Role, account: Address) -> Result<()> {
        self.access.grant_role(caller, role, account, &mut self.events)
    }

    pub fn revoke_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<()> {
        self.access.revoke_role(caller, role, account, &mut self.events)
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

impl FeeRateSource for ProtocolConfig {
    fn effective_fee_rate(&self, account: &Address) -> u64 {
        self.custom_fee_rates
            .get(account)
            .copied()
            .unwrap_or(self.default_protocol_fee_rate)
    }

    fn protocol_treasury(&self) -> Address {
        self.protocol_treasury
    }
}

fn validate_rate(rate: u64) -> Result<()> {
    if rate > BPS {
        return Err(PortfolioError::InvalidParams("fee rate above 100%"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = Address::from_seed(1);
    const MANAGER: Address = Address::from_seed(2);
    const STRANGER: Address = Address::from_seed(9);
    const TREASURY: Address = Address::from_seed(3);

    fn config() -> ProtocolConfig {
        ProtocolConfig::new(ADMIN, 50, TREASURY).unwrap()
    }

    #[test]
    fn test_default_rate_applies_without_override() {
        let config = config();
        assert_eq!(config.effective_fee_rate(&MANAGER), 50);
        assert_eq!(config.protocol_treasury(), TREASURY);
    }

    #[test]
    fn test_custom_rate_wins_until_removed() {
        let mut config = config();
        config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 20).unwrap();
        assert_eq!(config.effective_fee_rate(&MANAGER), 20);

        // Default changes do not leak through an override
        config.set_default_protocol_fee_rate(&ADMIN, 75).unwrap();
        assert_eq!(config.effective_fee_rate(&MANAGER), 20);

        config.remove_custom_protocol_fee_rate(&ADMIN, &MANAGER).unwrap();
        assert_eq!(config.effective_fee_rate(&MANAGER), 75);
    }

    #[test]
    fn test_zero_override_is_distinct_from_none() {
        let mut config = config();
        config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 0).unwrap();
        assert_eq!(config.custom_fee_rate(&MANAGER), Some(0));
        assert_eq!(config.effective_fee_rate(&MANAGER), 0);
        assert_eq!(
            config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 0),
            Err(PortfolioError::NoOpRejected)
        );
    }

    #[test]
    fn test_noop_writes_rejected() {
        let mut config = config();
        assert_eq!(config.set_default_protocol_fee_rate(&ADMIN, 50), Err(PortfolioError::NoOpRejected));

        config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 30).unwrap();
        assert_eq!(
            config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 30),
            Err(PortfolioError::NoOpRejected)
        );
        assert_eq!(config.set_protocol_treasury(&ADMIN, TREASURY), Err(PortfolioError::NoOpRejected));
    }

    #[test]
    fn test_remove_missing_override_not_found() {
        let mut config = config();
        assert_eq!(
            config.remove_custom_protocol_fee_rate(&ADMIN, &MANAGER),
            Err(PortfolioError::NotFound)
        );
    }

    #[test]
    fn test_mutators_are_admin_only() {
        let mut config = config();
        assert_eq!(config.set_default_protocol_fee_rate(&STRANGER, 10), Err(PortfolioError::Unauthorized));
        assert_eq!(
            config.set_custom_protocol_fee_rate(&STRANGER, MANAGER, 10),
            Err(PortfolioError::Unauthorized)
        );
        assert_eq!(
            config.remove_custom_protocol_fee_rate(&STRANGER, &MANAGER),
            Err(PortfolioError::Unauthorized)
        );
        assert_eq!(config.set_protocol_treasury(&STRANGER, STRANGER), Err(PortfolioError::Unauthorized));
        assert!(config.events().is_empty());
    }

    #[test]
    fn test_every_write_emits_one_event() {
        let mut config = config();
        config.set_default_protocol_fee_rate(&ADMIN, 60).unwrap();
        config.set_custom_protocol_fee_rate(&ADMIN, MANAGER, 10).unwrap();
        config.remove_custom_protocol_fee_rate(&ADMIN, &MANAGER).unwrap();

        assert_eq!(
            config.drain_events(),
            vec![
                Event::DefaultProtocolFeeRateChanged { old_rate: 50, new_rate: 60 },
                Event::CustomProtocolFeeRateChanged { account: MANAGER, rate: 10 },
                Event::CustomProtocolFeeRateRemoved { account: MANAGER },
            ]
        );
    }

    #[test]
    fn test_rate_above_bps_rejected() {
        let mut config = config();
        assert!(matches!(
            config.set_default_protocol_fee_rate(&ADMIN, BPS + 1),
            Err(PortfolioError::InvalidParams(_))
        ));
    }
}
