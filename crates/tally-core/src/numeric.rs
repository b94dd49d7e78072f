//! # Rounding
//!
//! Every division in the reward split goes through [`div_round`], which
//! rounds half away from zero on non-negative integers:
//!
//! | n / d   | exact | result |
//! |---------|-------|--------|
//! | 5 / 2   | 2.5   | 3      |
//! | 7 / 3   | 2.33  | 2      |
//! | 8 / 3   | 2.67  | 3      |
//! | 1 / 2   | 0.5   | 1      |
//!
//! Reconstructed era totals are compared against the on-chain era payout,
//! so a single rule must be used everywhere or the drift compounds across
//! eras.

use crate::types::{Balance, SignedBalance};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Divide rounding half away from zero. `None` when `d == 0` or on overflow.
pub fn div_round(n: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    let q = n / d;
    let r = n % d;
    // r >= d - r  <=>  2r >= d, written without overflowing on 2r
    if r >= d - r {
        q.checked_add(1)
    } else {
        Some(q)
    }
}

/// `round(a * b / d)` with the same rounding rule as [`div_round`]
pub fn mul_div_round(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    match a.checked_mul(b) {
        Some(product) => div_round(product, d),
        None => {
            // a * b = (qa * d + ra) * b, so a * b / d = qa * b + ra * b / d
            let qa = a / d;
            let ra = a % d;
            let head = qa.checked_mul(b)?;
            let tail = div_round(ra.checked_mul(b)?, d)?;
            head.checked_add(tail)
        }
    }
}

/// `a - b` as a signed balance. `None` if either side exceeds `i128::MAX`.
pub fn signed_sub(a: Balance, b: Balance) -> Option<SignedBalance> {
    let a = SignedBalance::try_from(a).ok()?;
    let b = SignedBalance::try_from(b).ok()?;
    a.checked_sub(b)
}

/// Parts per billion, the on-chain encoding of validator commission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perbill(u32);

impl Perbill {
    pub const ACCURACY: u32 = 1_000_000_000;

    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(Self::ACCURACY);

    /// Saturates at 100%
    pub fn from_parts(parts: u32) -> Self {
        Self(parts.min(Self::ACCURACY))
    }

    pub fn from_percent(percent: u32) -> Self {
        Self::from_parts(percent.saturating_mul(Self::ACCURACY / 100))
    }

    pub fn deconstruct(self) -> u32 {
        self.0
    }

    /// `round(self * amount)`
    pub fn mul_round(self, amount: Balance) -> Balance {
        // self <= 1, so the result never exceeds `amount` and cannot overflow
        mul_div_round(amount, self.0 as u128, Self::ACCURACY as u128).unwrap_or(amount)
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / Self::ACCURACY as f64
    }
}

impl fmt::Display for Perbill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}%", self.as_fraction() * 100.0)
    }
}
