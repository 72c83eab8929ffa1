//! Role table, role-admin tree and pause flag
//!
//! Each role has exactly one admin role. The admin pointers form a tree rooted
//! at `Role::Admin`, which administers itself; `set_role_admin` refuses any
//! change that would introduce a cycle.

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};
use crate::events::{Event, EventLog};
use crate::types::{Address, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<Address>>,
    role_admin: BTreeMap<Role, Role>,
    paused: bool,
}

impl AccessControl {
    /// New table with `admin` holding the root role
    pub fn new(admin: Address) -> Self {
        let mut access = Self::default();
        access.insert(Role::Admin, admin);
        access
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map_or(false, |members| members.contains(account))
    }

    pub fn require_role(&self, role: Role, account: &Address) -> Result<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(PortfolioError::Unauthorized)
        }
    }

    /// Role whose holders may grant and revoke `role`
    pub fn role_admin(&self, role: Role) -> Role {
        self.role_admin.get(&role).copied().unwrap_or(Role::Admin)
    }

    pub fn members(&self, role: Role) -> impl Iterator<Item = &Address> {
        self.members.get(&role).into_iter().flatten()
    }

    /// Grant `role` to `account`. Granting a held role is a silent no-op.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
        events: &mut EventLog,
    ) -> Result<()> {
        self.require_role(self.role_admin(role), caller)?;
        if self.insert(role, account) {
            info!("granted {} to {}", role, account);
            events.emit(Event::RoleGranted { role, account, sender: *caller });
        }
        Ok(())
    }

    /// Revoke `role` from `account`. Revoking an absent role is a silent no-op.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
        events: &mut EventLog,
    ) -> Result<()> {
        self.require_role(self.role_admin(role), caller)?;
        self.remove(role, account, caller, events);
        Ok(())
    }

    /// Drop a role held by the caller itself
    pub fn renounce_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
        events: &mut EventLog,
    ) -> Result<()> {
        if caller != account {
            return Err(PortfolioError::Unauthorized);
        }
        self.remove(role, account, caller, events);
        Ok(())
    }

    /// Re-point the admin of `role`; only the root admin may do this
    pub fn set_role_admin(
        &mut self,
        caller: &Address,
        role: Role,
        admin_role: Role,
        events: &mut EventLog,
    ) -> Result<()> {
        self.require_role(Role::Admin, caller)?;
        if role == Role::Admin {
            return Err(PortfolioError::InvalidParams("admin role is the root of the role tree"));
        }
        // Walk up from the proposed admin; reaching `role` means a cycle.
        let mut cursor = admin_role;
        for _ in 0..Role::ALL.len() {
            if cursor == role {
                return Err(PortfolioError::InvalidParams("role admin change would create a cycle"));
            }
            if cursor == Role::Admin {
                break;
            }
            cursor = self.role_admin(cursor);
        }
        let previous = self.role_admin(role);
        if previous == admin_role {
            return Err(PortfolioError::NoOpRejected);
        }
        self.role_admin.insert(role, admin_role);
        events.emit(Event::RoleAdminChanged { role, previous, new: admin_role });
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_not_paused(&self) -> Result<()> {
        if self.paused {
            Err(PortfolioError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn pause(&mut self, caller: &Address, events: &mut EventLog) -> Result<()> {
        self.require_role(Role::Pauser, caller)?;
        if self.paused {
            return Err(PortfolioError::NoOpRejected);
        }
        self.paused = true;
        info!("paused by {}", caller);
        events.emit(Event::Paused { account: *caller });
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address, events: &mut EventLog) -> Result<()> {
        self.require_role(Role::Pauser, caller)?;
        if !self.paused {
            return Err(PortfolioError::NoOpRejected);
        }
        self.paused = false;
        info!("unpaused by {}", caller);
        events.emit(Event::Unpaused { account: *caller });
        Ok(())
    }

    /// Unchecked grant used while wiring a freshly constructed component
    pub(crate) fn insert(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    fn remove(&mut self, role: Role, account: &Address, sender: &Address, events: &mut EventLog) {
        let removed = self
            .members
            .get_mut(&role)
            .map_or(false, |members| members.remove(account));
        if removed {
            info!("revoked {} from {}", role, account);
            events.emit(Event::RoleRevoked { role, account: *account, sender: *sender });
        }
    }
}
