//! Fixed-point interest and checked arithmetic helpers
//!
//! All rates are annualized basis points. Every division rounds down and the
//! remainder is dropped, so identical inputs always give identical outputs.

use core::ops::Sub;

use crate::error::{PortfolioError, Result};
use crate::types::{BPS, SECONDS_PER_YEAR};

/// Simple interest over `elapsed_secs`, rounded down
///
/// value = initial + floor(initial * rate * elapsed / (BPS * SECONDS_PER_YEAR))
#[inline]
pub fn with_interest(initial_value: u128, annual_rate_bps: u64, elapsed_secs: u64) -> Result<u128> {
    if annual_rate_bps == 0 || elapsed_secs == 0 {
        return Ok(initial_value);
    }
    let numerator = initial_value
        .checked_mul(annual_rate_bps as u128)
        .and_then(|v| v.checked_mul(elapsed_secs as u128))
        .ok_or(PortfolioError::ArithmeticOverflow)?;
    let interest = numerator / (BPS as u128 * SECONDS_PER_YEAR as u128);
    checked_add_u128(initial_value, interest)
}

/// floor(amount * rate_bps / BPS)
#[inline]
pub fn fee_on(amount: u128, rate_bps: u64) -> Result<u128> {
    amount
        .checked_mul(rate_bps as u128)
        .map(|v| v / BPS as u128)
        .ok_or(PortfolioError::ArithmeticOverflow)
}

/// Two-argument minimum
#[inline]
pub fn min<T: Ord>(a: T, b: T) -> T {
    if a <= b {
        a
    } else {
        b
    }
}

/// `a - b` when `a >= b`, otherwise zero
#[inline]
pub fn saturating_sub<T>(a: T, b: T) -> T
where
    T: Ord + Sub<Output = T> + Default,
{
    if a >= b {
        a - b
    } else {
        T::default()
    }
}

#[inline]
pub fn checked_add_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(PortfolioError::ArithmeticOverflow)
}

#[inline]
pub fn checked_sub_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(PortfolioError::ArithmeticUnderflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_YEAR: u64 = SECONDS_PER_YEAR / 2;

    #[test]
    fn test_with_interest_reference_values() {
        assert_eq!(with_interest(100, 300, SECONDS_PER_YEAR), Ok(103));
        assert_eq!(with_interest(100, 300, HALF_YEAR), Ok(101));
        // 0.5 of a unit is dropped
        assert_eq!(with_interest(10, 500, SECONDS_PER_YEAR), Ok(10));
    }

    #[test]
    fn test_with_interest_identity_cases() {
        assert_eq!(with_interest(1_000, 0, SECONDS_PER_YEAR), Ok(1_000));
        assert_eq!(with_interest(1_000, 500, 0), Ok(1_000));
        assert_eq!(with_interest(0, 500, SECONDS_PER_YEAR), Ok(0));
    }

    #[test]
    fn test_with_interest_overflow_is_an_error() {
        assert_eq!(
            with_interest(u128::MAX / 2, 10_000, SECONDS_PER_YEAR),
            Err(PortfolioError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_fee_on_rounds_down() {
        assert_eq!(fee_on(999, 100), Ok(9));
        assert_eq!(fee_on(1_000_000, 50), Ok(5_000));
        assert_eq!(fee_on(u128::MAX, 2), Err(PortfolioError::ArithmeticOverflow));
    }

    #[test]
    fn test_min() {
        assert_eq!(min(3, 2), 2);
        assert_eq!(min(1, 2), 1);
        assert_eq!(min(1, 1), 1);
    }

    #[test]
    fn test_saturating_sub() {
        assert_eq!(saturating_sub(10u128, 6), 4);
        assert_eq!(saturating_sub(15u128, 40), 0);
        assert_eq!(saturating_sub(11u64, 11), 0);
    }

    #[test]
    fn test_checked_helpers() {
        assert_eq!(checked_add_u128(u128::MAX, 1), Err(PortfolioError::ArithmeticOverflow));
        assert_eq!(checked_sub_u128(0, 1), Err(PortfolioError::ArithmeticUnderflow));
        assert_eq!(checked_sub_u128(5, 5), Ok(0));
    }
}

// ═══════════════════════════════════════════════════════════════
// KANI FORMAL VERIFICATION PROOFS
// ═══════════════════════════════════════════════════════════════

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Interest never decreases the principal
    #[kani::proof]
    fn k1_interest_is_monotonic() {
        let initial: u64 = kani::any();
        let rate: u16 = kani::any();
        let elapsed: u32 = kani::any();

        if let Ok(value) = with_interest(initial as u128, rate as u64, elapsed as u64) {
            assert!(value >= initial as u128, "K1: interest reduced principal");
        }
    }

    /// Zero rate or zero time is the identity
    #[kani::proof]
    fn k2_interest_identity() {
        let initial: u128 = kani::any();
        let elapsed: u64 = kani::any();

        assert!(with_interest(initial, 0, elapsed) == Ok(initial));
        assert!(with_interest(initial, 1_000, 0) == Ok(initial));
    }

    /// saturating_sub never exceeds its first operand and is exact when a >= b
    #[kani::proof]
    fn k3_saturating_sub_bounds() {
        let a: u128 = kani::any();
        let b: u128 = kani::any();

        let r = saturating_sub(a, b);
        assert!(r <= a);
        if a >= b {
            assert!(r + b == a);
        } else {
            assert!(r == 0);
        }
    }

    /// Fees never exceed the amount they are charged on while rate <= 100%
    #[kani::proof]
    fn k4_fee_bounded_by_amount() {
        let amount: u64 = kani::any();
        let rate: u64 = kani::any();
        kani::assume(rate <= BPS);

        let fee = fee_on(amount as u128, rate).unwrap();
        assert!(fee <= amount as u128);
    }
}
