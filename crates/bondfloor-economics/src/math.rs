//! Fixed-point helpers.
//!
//! Amounts are `u128` with 18 decimals. Curve products (`x * y`) and
//! reward-per-token terms overflow 128 bits at realistic sizes, so every
//! `a * b / c` goes through a 256-bit intermediate.

use crate::constants::{DECIMALS, ONE};
use crate::error::{Error, Result};
use primitive_types::U256;

fn narrow(value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow);
    }
    Ok(value.as_u128())
}

/// `floor(a * b / denom)`
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(Error::DivisionByZero);
    }
    narrow(U256::from(a) * U256::from(b) / U256::from(denom))
}

/// `ceil(a * b / denom)`
pub fn mul_div_ceil(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(Error::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denom = U256::from(denom);
    let (quotient, remainder) = product.div_mod(denom);
    let rounded = if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::one()
    };
    narrow(rounded)
}

pub fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow)
}

pub fn checked_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Overflow)
}

/// Parse a decimal string in whole-token units ("10", "0.5") into 18-decimal
/// base units.
pub fn parse_units(text: &str) -> Result<u128> {
    let text = text.trim().replace('_', "");
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(Error::InvalidConfig(format!("empty amount '{text}'")));
    }
    if frac.len() > DECIMALS as usize {
        return Err(Error::InvalidConfig(format!("too many decimals in '{text}'")));
    }
    let parse = |digits: &str| -> Result<u128> {
        if digits.is_empty() {
            return Ok(0);
        }
        digits
            .parse::<u128>()
            .map_err(|_| Error::InvalidConfig(format!("invalid amount '{text}'")))
    };
    let whole = parse(whole)?;
    let scale = 10u128.pow(DECIMALS as u32 - frac.len() as u32);
    let frac = parse(frac)?.checked_mul(scale).ok_or(Error::Overflow)?;
    checked_add(whole.checked_mul(ONE).ok_or(Error::Overflow)?, frac)
}

/// Render 18-decimal base units as a decimal string, trimming trailing zeros
pub fn format_units(amount: u128) -> String {
    let whole = amount / ONE;
    let frac = amount % ONE;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Serde adapter for token amounts in human-readable config files.
///
/// Serializes as a decimal string in whole tokens; accepts either a string
/// or a non-negative integer (whole tokens) when reading.
pub mod units {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_units(*amount))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = u128;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a token amount as a decimal string or whole-token integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                super::parse_units(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                (v as u128)
                    .checked_mul(crate::constants::ONE)
                    .ok_or_else(|| E::custom("amount overflows"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
                if v < 0 {
                    return Err(E::custom("amount must not be negative"));
                }
                self.visit_u64(v as u64)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_wide_product() {
        // 1e24 * 1e24 overflows u128 but the quotient fits
        let big = 1_000_000 * ONE;
        assert_eq!(mul_div(big, big, big).unwrap(), big);
    }

    #[test]
    fn test_ceil_rounds_up_only_with_remainder() {
        assert_eq!(mul_div_ceil(10, 3, 3).unwrap(), 10);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div(10, 1, 3).unwrap(), 3);
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(Error::DivisionByZero));
        assert_eq!(mul_div_ceil(1, 1, 0), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_parse_and_format_units() {
        assert_eq!(parse_units("10").unwrap(), 10 * ONE);
        assert_eq!(parse_units("0.5").unwrap(), ONE / 2);
        assert_eq!(parse_units("1_000_000").unwrap(), 1_000_000 * ONE);
        assert_eq!(format_units(ONE / 2), "0.5");
        assert_eq!(format_units(3 * ONE), "3");
        assert!(parse_units("1.0000000000000000001").is_err());
        assert!(parse_units("abc").is_err());
    }

    #[test]
    fn test_overflowing_quotient() {
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(Error::Overflow));
    }
}
