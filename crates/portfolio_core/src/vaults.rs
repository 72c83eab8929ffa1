//! Allow-list of external vaults eligible to exchange capital with portfolios
//!
//! Membership is the guaranteed invariant. Listing follows insertion order and
//! a removal keeps the relative order of the remaining vaults.

use log::info;
use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::error::{PortfolioError, Result};
use crate::events::{Event, EventLog};
use crate::types::{Address, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultsRegistry {
    vaults: Vec<Address>,
    access: AccessControl,
    events: EventLog,
}

impl VaultsRegistry {
    pub fn new(admin: Address) -> Self {
        Self {
            vaults: Vec::new(),
            access: AccessControl::new(admin),
            events: EventLog::default(),
        }
    }

    /// Requires `ListAdmin`
    pub fn add_vault(&mut self, caller: &Address, vault: Address) -> Result<()> {
        self.access.require_role(Role::ListAdmin, caller)?;
        if self.is_vault_added(&vault) {
            return Err(PortfolioError::AlreadyPresent);
        }
        self.vaults.push(vault);
        info!("vault {} added", vault);
        self.events.emit(Event::VaultAdded { vault });
        Ok(())
    }

    /// Requires `Admin`, stricter than adding
    pub fn remove_vault(&mut self, caller: &Address, vault: &Address) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        let position = self
            .vaults
            .iter()
            .position(|v| v == vault)
            .ok_or(PortfolioError::NotFound)?;
        self.vaults.remove(position);
        info!("vault {} removed", vault);
        self.events.emit(Event::VaultRemoved { vault: *vault });
        Ok(())
    }

    pub fn is_vault_added(&self, vault: &Address) -> bool {
        self.vaults.contains(vault)
    }

    pub fn list_vaults(&self) -> &[Address] {
        &self.vaults
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

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
