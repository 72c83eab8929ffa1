//! Risk layers owned by a portfolio

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::types::Address;

/// Construction parameters for one tranche
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheParams {
    pub name: String,
    /// Identity used when the tranche calls back into the portfolio
    pub address: Address,
    /// Annualized yield target (bps)
    pub target_apy: u64,
    /// Minimum value of all more junior tranches, relative to this one (bps)
    pub min_subordinate_ratio: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tranche {
    pub name: String,
    pub address: Address,
    pub target_apy: u64,
    pub min_subordinate_ratio: u64,
    /// Cumulative assets released to the tranche
    pub distributed_assets: u128,
    /// Effective value snapshotted at close
    pub max_value_on_close: u128,
    pub checkpoint: Checkpoint,
}

impl Tranche {
    pub fn new(params: TrancheParams, protocol_fee_rate: u64) -> Self {
        Self {
            name: params.name,
            address: params.address,
            target_apy: params.target_apy,
            min_subordinate_ratio: params.min_subordinate_ratio,
            distributed_assets: 0,
            max_value_on_close: 0,
            checkpoint: Checkpoint::new(protocol_fee_rate),
        }
    }

    pub fn effective_value(&self) -> u128 {
        self.checkpoint.effective_value()
    }
}
