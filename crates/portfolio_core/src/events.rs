//! Change notifications emitted by successful writes

use serde::{Deserialize, Serialize};

use crate::types::{Address, Role, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DefaultProtocolFeeRateChanged { old_rate: u64, new_rate: u64 },
    CustomProtocolFeeRateChanged { account: Address, rate: u64 },
    CustomProtocolFeeRateRemoved { account: Address },
    ProtocolTreasuryChanged { treasury: Address },

    VaultAdded { vault: Address },
    VaultRemoved { vault: Address },

    RoleGranted { role: Role, account: Address, sender: Address },
    RoleRevoked { role: Role, account: Address, sender: Address },
    RoleAdminChanged { role: Role, previous: Role, new: Role },
    Paused { account: Address },
    Unpaused { account: Address },
    Upgraded { name: String, version: u32 },

    StatusChanged { status: Status },
    CheckpointUpdated {
        tranche: usize,
        timestamp: u64,
        total_assets: u128,
        unpaid_fees: u128,
        deficit: u128,
    },
    Transferred { to: Address, amount: u128 },
    ReceivablesUpdated { value: u128 },
    ProtocolFeesPaid { tranche: usize, amount: u128 },
}

/// Append-only event buffer owned by each component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog(Vec<Event>);

impl EventLog {
    pub fn emit(&mut self, event: Event) {
        self.0.push(event);
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.0
    }

    pub fn last(&self) -> Option<&Event> {
        self.0.last()
    }

    /// Move every event of `other` to the end of this log
    pub fn append(&mut self, other: &mut EventLog) {
        self.0.append(&mut other.0);
    }

    /// Take every pending event, leaving the log empty
    pub fn drain(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
