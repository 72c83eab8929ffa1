//! Per-tranche accounting snapshot

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::{checked_add_u128, checked_sub_u128, fee_on, saturating_sub, with_interest};

/// Accrued value, fees and deficit of one tranche as of `timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last accrual time, never decreases
    pub timestamp: u64,
    /// Promised value including accrued, undistributed yield
    pub total_assets: u128,
    /// Protocol fees accrued but not yet swept
    pub unpaid_fees: u128,
    /// Part of `total_assets` the pool cannot currently back
    pub deficit: u128,
    /// Fee rate (bps) in force at the last update
    pub protocol_fee_rate: u64,
}

impl Checkpoint {
    pub fn new(protocol_fee_rate: u64) -> Self {
        Self {
            protocol_fee_rate,
            ..Self::default()
        }
    }

    /// total_assets - deficit, clamped at zero
    pub fn effective_value(&self) -> u128 {
        saturating_sub(self.total_assets, self.deficit)
    }

    /// Project this checkpoint forward to `limited_timestamp`
    ///
    /// Simple yield on the promised value at `target_apy`. The protocol fee
    /// is charged only on yield earned by the backed part of the tranche, so
    /// a tranche carrying a deficit pays fees on its effective value alone.
    /// A timestamp at or before the current one is a no-op apart from the
    /// fee rate snapshot.
    pub fn accrue(&self, target_apy: u64, limited_timestamp: u64, fee_rate: u64) -> Result<Checkpoint> {
        let elapsed = saturating_sub(limited_timestamp, self.timestamp);
        let total_assets = with_interest(self.total_assets, target_apy, elapsed)?;

        let backed = self.effective_value();
        let backed_earned = checked_sub_u128(with_interest(backed, target_apy, elapsed)?, backed)?;
        let fee = fee_on(backed_earned, fee_rate)?;

        Ok(Checkpoint {
            timestamp: self.timestamp.max(limited_timestamp),
            total_assets,
            unpaid_fees: checked_add_u128(self.unpaid_fees, fee)?,
            deficit: self.deficit,
            protocol_fee_rate: fee_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SECONDS_PER_YEAR;

    #[test]
    fn test_accrue_one_year() {
        let checkpoint = Checkpoint {
            total_assets: 1_000_000,
            protocol_fee_rate: 100,
            ..Checkpoint::default()
        };

        let next = checkpoint.accrue(500, SECONDS_PER_YEAR, 100).unwrap();
        assert_eq!(next.total_assets, 1_050_000);
        // 1% of the 50_000 earned
        assert_eq!(next.unpaid_fees, 500);
        assert_eq!(next.timestamp, SECONDS_PER_YEAR);
    }

    #[test]
    fn test_fee_only_on_backed_yield() {
        let wiped = Checkpoint {
            total_assets: 1_000,
            deficit: 1_000,
            ..Checkpoint::default()
        };
        let next = wiped.accrue(5_000, SECONDS_PER_YEAR, 1_000).unwrap();
        assert_eq!(next.total_assets, 1_500);
        assert_eq!(next.unpaid_fees, 0);

        // Half backed: the fee applies to the 250 earned by the backed 500
        let partial = Checkpoint { deficit: 500, ..wiped };
        let next = partial.accrue(5_000, SECONDS_PER_YEAR, 1_000).unwrap();
        assert_eq!(next.total_assets, 1_500);
        assert_eq!(next.unpaid_fees, 25);
    }

    #[test]
    fn test_accrue_zero_elapsed_is_noop() {
        let checkpoint = Checkpoint {
            timestamp: 1_000,
            total_assets: 5_000,
            unpaid_fees: 7,
            deficit: 3,
            protocol_fee_rate: 50,
        };

        let next = checkpoint.accrue(800, 1_000, 50).unwrap();
        assert_eq!(next, checkpoint);
    }

    #[test]
    fn test_accrue_never_moves_time_backwards() {
        let checkpoint = Checkpoint {
            timestamp: 2_000,
            total_assets: 5_000,
            ..Checkpoint::default()
        };

        let next = checkpoint.accrue(800, 1_000, 0).unwrap();
        assert_eq!(next.timestamp, 2_000);
        assert_eq!(next.total_assets, 5_000);
    }

    #[test]
    fn test_fee_rate_snapshot_refreshed() {
        let checkpoint = Checkpoint::new(10);
        let next = checkpoint.accrue(0, 100, 25).unwrap();
        assert_eq!(next.protocol_fee_rate, 25);
    }

    #[test]
    fn test_effective_value_clamps() {
        let checkpoint = Checkpoint {
            total_assets: 100,
            deficit: 140,
            ..Checkpoint::default()
        };
        assert_eq!(checkpoint.effective_value(), 0);
    }
}
