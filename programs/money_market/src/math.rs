//! 18-decimal fixed point used by every ledger and risk calculation.
//!
//! Values are carried as `u128` mantissas scaled by `EXP_SCALE`. Products are
//! formed in 256 bits before dividing back down, so `a * b / c` only fails
//! when the final quotient does not fit in 128 bits. Every division takes an
//! explicit [`Rounding`] so callers decide which side the truncation favours.

use anchor_lang::prelude::*;

pub const EXP_SCALE: u128 = 1_000_000_000_000_000_000;

const LOW_MASK: u128 = u64::MAX as u128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Exp {
    pub mantissa: u128,
}

impl Exp {
    pub const ZERO: Exp = Exp { mantissa: 0 };
    pub const ONE: Exp = Exp { mantissa: EXP_SCALE };

    pub const fn new(mantissa: u128) -> Self {
        Self { mantissa }
    }

    /// `num / den` as an Exp.
    pub fn from_ratio(num: u128, den: u128, rounding: Rounding) -> Option<Exp> {
        mul_div(num, EXP_SCALE, den, rounding).map(Exp::new)
    }

    /// Whole units, e.g. `Exp::from_units(100)` is 100.0.
    pub fn from_units(units: u128) -> Option<Exp> {
        units.checked_mul(EXP_SCALE).map(Exp::new)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn checked_add(self, other: Exp) -> Option<Exp> {
        self.mantissa.checked_add(other.mantissa).map(Exp::new)
    }

    pub fn checked_sub(self, other: Exp) -> Option<Exp> {
        self.mantissa.checked_sub(other.mantissa).map(Exp::new)
    }

    pub fn mul(self, other: Exp, rounding: Rounding) -> Option<Exp> {
        mul_div(self.mantissa, other.mantissa, EXP_SCALE, rounding).map(Exp::new)
    }

    pub fn div(self, other: Exp, rounding: Rounding) -> Option<Exp> {
        mul_div(self.mantissa, EXP_SCALE, other.mantissa, rounding).map(Exp::new)
    }

    /// `self * amount`, scaled back to base units.
    pub fn mul_scalar(self, amount: u128, rounding: Rounding) -> Option<u128> {
        mul_div(self.mantissa, amount, EXP_SCALE, rounding)
    }

    /// `amount / self`, in base units.
    pub fn div_into(self, amount: u128, rounding: Rounding) -> Option<u128> {
        mul_div(amount, EXP_SCALE, self.mantissa, rounding)
    }

    /// Parses plain decimal notation ("0.5", "1.08", "100") into an exact mantissa.
    /// More than 18 fractional digits is rejected rather than truncated.
    pub fn from_decimal_str(value: &str) -> Option<Exp> {
        let value = value.trim();
        let (whole, fraction) = match value.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (value, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if fraction.len() > 18 {
            return None;
        }
        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !digits_only(whole) || !digits_only(fraction) {
            return None;
        }

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let fraction_mantissa: u128 = if fraction.is_empty() {
            0
        } else {
            let padding = 10u128.checked_pow((18 - fraction.len()) as u32)?;
            fraction.parse::<u128>().ok()?.checked_mul(padding)?
        };

        whole
            .checked_mul(EXP_SCALE)?
            .checked_add(fraction_mantissa)
            .map(Exp::new)
    }
}

impl std::fmt::Display for Exp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.mantissa / EXP_SCALE;
        let fraction = self.mantissa % EXP_SCALE;
        if fraction == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:018}", fraction);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// `a * b / denom` with a 256-bit intermediate. `None` when `denom` is zero or
/// the quotient exceeds `u128::MAX`.
pub fn mul_div(a: u128, b: u128, denom: u128, rounding: Rounding) -> Option<u128> {
    if denom == 0 {
        return None;
    }
    let (hi, lo) = widening_mul(a, b);
    if hi >= denom {
        return None;
    }

    let (quotient, remainder) = if hi == 0 {
        (lo / denom, lo % denom)
    } else {
        div_wide(hi, lo, denom)
    };

    match rounding {
        Rounding::Up if remainder != 0 => quotient.checked_add(1),
        _ => Some(quotient),
    }
}

/// Full 256-bit product as (high, low) words.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Each term is below 2^64, so the sum fits comfortably.
    let mid = (ll >> 64) + (lh & LOW_MASK) + (hl & LOW_MASK);
    let lo = (ll & LOW_MASK) | ((mid & LOW_MASK) << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Shift-subtract division of `hi:lo` by `denom`. Requires `hi < denom`.
fn div_wide(hi: u128, lo: u128, denom: u128) -> (u128, u128) {
    let mut remainder = hi;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || remainder >= denom {
            remainder = remainder.wrapping_sub(denom);
            quotient |= 1;
        }
    }
    (quotient, remainder)
}
