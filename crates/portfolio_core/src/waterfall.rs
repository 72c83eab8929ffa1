//! Loss waterfall and subordination checks
//!
//! Backing is handed out senior-first, so a shortfall lands on the equity
//! tranche, then the junior tranches, and reaches a senior tranche only once
//! every tranche below it has been zeroed. Each tranche's unpaid protocol
//! fees rank just ahead of its own value, never ahead of a more senior
//! tranche. Backing left after every promise is met belongs to the equity
//! tranche.

use log::debug;

use crate::error::{PortfolioError, Result};
use crate::math::{checked_add_u128, checked_sub_u128, min};
use crate::tranche::Tranche;
use crate::types::BPS;

/// Outcome of one waterfall pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    /// Unpaid fees of each tranche that the backing covers, by tranche index
    pub backed_fees: Vec<u128>,
    /// Backing beyond every promise, credited to equity
    pub surplus: u128,
    /// Sum of all tranche deficits after the pass
    pub total_deficit: u128,
}

impl Allocation {
    pub fn total_backed_fees(&self) -> u128 {
        self.backed_fees.iter().fold(0u128, |acc, fee| acc.saturating_add(*fee))
    }
}

/// Recompute every tranche deficit against `backing`
///
/// A shortfall exactly equal to the value of the junior tranches zeroes them
/// and leaves the senior tranche whole. Fees that the backing does not cover
/// stay unpaid but are not part of any deficit.
pub fn allocate(tranches: &mut [Tranche], backing: u128) -> Result<Allocation> {
    let mut remaining = backing;
    let mut total_deficit = 0u128;
    let mut backed_fees = vec![0u128; tranches.len()];

    for (index, tranche) in tranches.iter_mut().enumerate().rev() {
        let fees = min(remaining, tranche.checkpoint.unpaid_fees);
        remaining = checked_sub_u128(remaining, fees)?;
        backed_fees[index] = fees;

        let promised = tranche.checkpoint.total_assets;
        let backed = min(remaining, promised);
        remaining = checked_sub_u128(remaining, backed)?;
        tranche.checkpoint.deficit = checked_sub_u128(promised, backed)?;
        total_deficit = checked_add_u128(total_deficit, tranche.checkpoint.deficit)?;
        debug!(
            "waterfall tranche {}: fees {} promised {} backed {} deficit {}",
            index, fees, promised, backed, tranche.checkpoint.deficit
        );
    }

    let surplus = remaining;
    if surplus > 0 {
        if let Some(equity) = tranches.first_mut() {
            equity.checkpoint.total_assets = checked_add_u128(equity.checkpoint.total_assets, surplus)?;
        }
    }

    Ok(Allocation { backed_fees, surplus, total_deficit })
}

/// Verify the minimum subordinate ratio of each tranche in `indices`
///
/// Tranche i holds when sum(effective value of tranches below i) * BPS is at
/// least min_subordinate_ratio * effective value of i. The equity tranche has
/// nothing below it and is never checked.
pub fn check_subordination<I>(tranches: &[Tranche], indices: I) -> Result<()>
where
    I: IntoIterator<Item = usize>,
{
    for index in indices {
        if index == 0 || index >= tranches.len() {
            continue;
        }
        let tranche = &tranches[index];
        let mut subordinate = 0u128;
        for junior in &tranches[..index] {
            subordinate = checked_add_u128(subordinate, junior.effective_value())?;
        }
        let lhs = subordinate
            .checked_mul(BPS as u128)
            .ok_or(PortfolioError::ArithmeticOverflow)?;
        let rhs = tranche
            .effective_value()
            .checked_mul(tranche.min_subordinate_ratio as u128)
            .ok_or(PortfolioError::ArithmeticOverflow)?;
        if lhs < rhs {
            return Err(PortfolioError::SubordinationRatioViolated { tranche: index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tranche::TrancheParams;
    use crate::types::Address;

    fn tranches(values: &[u128], ratios: &[u64]) -> Vec<Tranche> {
        values
            .iter()
            .zip(ratios)
            .enumerate()
            .map(|(i, (&value, &ratio))| {
                let mut tranche = Tranche::new(
                    TrancheParams {
                        name: format!("t{}", i),
                        address: Address::from_seed(20 + i as u8),
                        target_apy: 0,
                        min_subordinate_ratio: ratio,
                    },
                    0,
                );
                tranche.checkpoint.total_assets = value;
                tranche
            })
            .collect()
    }

    fn deficits(tranches: &[Tranche]) -> Vec<u128> {
        tranches.iter().map(|t| t.checkpoint.deficit).collect()
    }

    #[test]
    fn test_fully_backed_has_no_deficit() {
        let mut t = tranches(&[100, 200, 300], &[0, 0, 0]);
        let allocation = allocate(&mut t, 600).unwrap();
        assert_eq!(deficits(&t), vec![0, 0, 0]);
        assert_eq!(allocation.surplus, 0);
    }

    #[test]
    fn test_shortfall_hits_equity_then_junior_then_senior() {
        let mut t = tranches(&[100, 100, 100], &[0, 0, 0]);

        allocate(&mut t, 250).unwrap();
        assert_eq!(deficits(&t), vec![50, 0, 0]);

        allocate(&mut t, 150).unwrap();
        assert_eq!(deficits(&t), vec![100, 50, 0]);

        allocate(&mut t, 50).unwrap();
        assert_eq!(deficits(&t), vec![100, 100, 50]);
    }

    #[test]
    fn test_shortfall_equal_to_junior_value_spares_senior() {
        let mut t = tranches(&[100, 100, 100], &[0, 0, 0]);
        allocate(&mut t, 100).unwrap();
        assert_eq!(deficits(&t), vec![100, 100, 0]);
    }

    #[test]
    fn test_recovery_repays_deficits() {
        let mut t = tranches(&[100, 100], &[0, 0]);
        allocate(&mut t, 50).unwrap();
        assert_eq!(deficits(&t), vec![100, 50]);

        allocate(&mut t, 200).unwrap();
        assert_eq!(deficits(&t), vec![0, 0]);
    }

    #[test]
    fn test_surplus_goes_to_equity() {
        let mut t = tranches(&[100, 100], &[0, 0]);
        let allocation = allocate(&mut t, 260).unwrap();
        assert_eq!(allocation.surplus, 60);
        assert_eq!(t[0].checkpoint.total_assets, 160);
        assert_eq!(t[1].checkpoint.total_assets, 100);
    }

    #[test]
    fn test_senior_fees_rank_ahead_of_juniors() {
        let mut t = tranches(&[100, 100], &[0, 0]);
        t[1].checkpoint.unpaid_fees = 30;
        let allocation = allocate(&mut t, 200).unwrap();
        assert_eq!(allocation.backed_fees, vec![0, 30]);
        assert_eq!(deficits(&t), vec![30, 0]);
    }

    #[test]
    fn test_junior_fees_never_reach_the_senior() {
        let mut t = tranches(&[100, 100], &[0, 0]);
        t[0].checkpoint.unpaid_fees = 20;

        let allocation = allocate(&mut t, 100).unwrap();
        assert_eq!(deficits(&t), vec![100, 0]);
        assert_eq!(allocation.backed_fees, vec![0, 0]);

        let allocation = allocate(&mut t, 150).unwrap();
        assert_eq!(deficits(&t), vec![70, 0]);
        assert_eq!(allocation.backed_fees, vec![20, 0]);
        assert_eq!(allocation.total_backed_fees(), 20);
    }

    #[test]
    fn test_subordination_ratio() {
        // Senior needs juniors worth 50% of it
        let t = tranches(&[100, 100, 400], &[0, 0, 5_000]);
        assert!(check_subordination(&t, 0..3).is_ok());

        let t = tranches(&[100, 50, 400], &[0, 0, 5_000]);
        assert_eq!(
            check_subordination(&t, 0..3),
            Err(PortfolioError::SubordinationRatioViolated { tranche: 2 })
        );
        // Unchecked indices are skipped
        assert!(check_subordination(&t, [1]).is_ok());
    }

    #[test]
    fn test_subordination_uses_effective_value() {
        let mut t = tranches(&[100, 100], &[0, 10_000]);
        assert!(check_subordination(&t, [1]).is_ok());
        t[0].checkpoint.deficit = 1;
        assert_eq!(
            check_subordination(&t, [1]),
            Err(PortfolioError::SubordinationRatioViolated { tranche: 1 })
        );
    }
}
