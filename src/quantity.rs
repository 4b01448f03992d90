//! Arbitrary-precision signed rationals with a compound unit.
//!
//! Wire layout: sign byte (0 = negative), `u16` numerator length, `u16`
//! denominator length, both magnitudes big-endian, then a factor count byte
//! followed by `(unit code, i8 exponent)` pairs.

use std::fmt;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::error::QuantityError;
use crate::unit::{self, Unit, UnitFactor};
use crate::wire::{push_i8, push_u8, push_u16};

pub type Result<T> = std::result::Result<T, QuantityError>;

/// Numerator and denominator each carry a `u16` length prefix on the wire.
pub const MAX_MAGNITUDE_BYTES: usize = u16::MAX as usize;

pub type Factors = SmallVec<[UnitFactor; 4]>;

/// Reduced rational value with normalized unit factors.
///
/// Construction always reduces by the gcd and merges/sorts the unit factors,
/// so derived equality is numeric and unit equivalence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quantity {
    negative: bool,
    numerator: BigUint,
    denominator: BigUint,
    unit: Factors,
}

impl Quantity {
    pub fn new(
        negative: bool,
        numerator: BigUint,
        denominator: BigUint,
        factors: impl IntoIterator<Item = UnitFactor>,
    ) -> Result<Self> {
        if denominator.is_zero() {
            return Err(QuantityError::ZeroDenominator);
        }
        let gcd = numerator.gcd(&denominator);
        let (numerator, denominator) = if gcd.is_one() || gcd.is_zero() {
            (numerator, denominator)
        } else {
            (numerator / &gcd, denominator / &gcd)
        };
        for magnitude in [&numerator, &denominator] {
            let bytes = magnitude.bits().div_ceil(8) as usize;
            if bytes > MAX_MAGNITUDE_BYTES {
                return Err(QuantityError::TooLarge {
                    bytes,
                    max: MAX_MAGNITUDE_BYTES,
                });
            }
        }
        Ok(Self {
            negative: negative && !numerator.is_zero(),
            numerator,
            denominator,
            unit: normalize_factors(factors),
        })
    }

    /// Integer quantity, convenient for fixtures.
    pub fn from_integer(value: i64, factors: impl IntoIterator<Item = UnitFactor>) -> Self {
        Self {
            negative: value < 0,
            numerator: BigUint::from(value.unsigned_abs()),
            denominator: BigUint::one(),
            unit: normalize_factors(factors),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn numerator(&self) -> &BigUint {
        &self.numerator
    }

    pub fn denominator(&self) -> &BigUint {
        &self.denominator
    }

    pub fn unit(&self) -> &[UnitFactor] {
        &self.unit
    }

    /// Whether both quantities have the same compound unit.
    pub fn has_same_dimension(&self, other: &Quantity) -> bool {
        self.unit == other.unit
    }

    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let sign = cur.u8()?;
        let num_len = cur.u16()? as usize;
        let den_len = cur.u16()? as usize;
        let numerator = BigUint::from_bytes_be(cur.bytes(num_len)?);
        let denominator = BigUint::from_bytes_be(cur.bytes(den_len)?);
        let count = cur.u8()?;
        let mut raw = SmallVec::<[(u8, i8); 4]>::new();
        for _ in 0..count {
            raw.push((cur.u8()?, cur.i8()?));
        }
        // the whole record is consumed before any value check
        let factors = raw
            .into_iter()
            .map(|(code, exponent)| Ok(UnitFactor::new(Unit::from_code(code)?, exponent)))
            .collect::<Result<Factors>>()?;
        Quantity::new(sign == 0, numerator, denominator, factors)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let numerator = self.numerator.to_bytes_be();
        let denominator = self.denominator.to_bytes_be();
        push_u8(buf, if self.negative { 0 } else { 1 });
        // lengths fit, `new` bounds both magnitudes
        push_u16(buf, numerator.len() as u16);
        push_u16(buf, denominator.len() as u16);
        buf.extend_from_slice(&numerator);
        buf.extend_from_slice(&denominator);
        push_u8(buf, self.unit.len() as u8);
        for factor in &self.unit {
            push_u8(buf, factor.unit.code());
            push_i8(buf, factor.exponent);
        }
    }

    /// Unit text without aliases, `x` when dimensionless.
    pub fn unit_text(&self) -> String {
        let formatted = unit::format_factors(&self.unit);
        if formatted.is_empty() {
            Unit::Dimensionless.symbol().to_string()
        } else {
            formatted
        }
    }

    /// Render with base units only (`1000g*m^2/s^2` rather than `1J`).
    pub fn to_base_string(&self) -> String {
        format!(
            "{}{}",
            value_text(self.negative, &self.numerator, &self.denominator),
            self.unit_text()
        )
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = unit::format_factors(&self.unit);
        let (unit_text, divisor) = unit::apply_aliases(&formatted);
        let unit_text = if unit_text.is_empty() {
            Unit::Dimensionless.symbol().to_string()
        } else {
            unit_text
        };
        let scaled = self.denominator.clone() * BigUint::from(divisor);
        let gcd = self.numerator.gcd(&scaled);
        let (numerator, denominator) = if gcd.is_zero() {
            (self.numerator.clone(), scaled)
        } else {
            (&self.numerator / &gcd, scaled / &gcd)
        };
        write!(
            f,
            "{}{unit_text}",
            value_text(self.negative, &numerator, &denominator)
        )
    }
}

/// Merge repeated units, drop zero exponents and dimensionless factors, then
/// sort: positive exponents first, each group by descending unit code.
fn normalize_factors(factors: impl IntoIterator<Item = UnitFactor>) -> Factors {
    let mut merged: SmallVec<[(Unit, i16); 4]> = SmallVec::new();
    for factor in factors {
        if factor.unit == Unit::Dimensionless {
            continue;
        }
        match merged.iter_mut().find(|(unit, _)| *unit == factor.unit) {
            Some((_, exponent)) => *exponent += i16::from(factor.exponent),
            None => merged.push((factor.unit, i16::from(factor.exponent))),
        }
    }
    let mut out: Factors = merged
        .into_iter()
        .filter(|(_, exponent)| *exponent != 0)
        .map(|(unit, exponent)| {
            UnitFactor::new(unit, exponent.clamp(i8::MIN.into(), i8::MAX.into()) as i8)
        })
        .collect();
    out.sort_by(|a, b| {
        (b.exponent > 0)
            .cmp(&(a.exponent > 0))
            .then_with(|| b.unit.code().cmp(&a.unit.code()))
    });
    out
}

/// Finite decimal when the denominator only has factors 2 and 5, else `n/d`.
fn value_text(negative: bool, numerator: &BigUint, denominator: &BigUint) -> String {
    let sign = if negative { "-" } else { "" };
    let Some(shift) = decimal_shift(denominator) else {
        return format!("{sign}{numerator}/{denominator}");
    };
    let scale = BigUint::from(10u32).pow(shift);
    let digits = (numerator * &scale / denominator).to_string();
    if shift == 0 {
        return format!("{sign}{digits}");
    }
    let shift = shift as usize;
    let digits = format!("{digits:0>width$}", width = shift + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - shift);
    format!("{sign}{int_part}.{frac_part}")
}

/// Smallest `k` with `denominator | 10^k`, if any.
fn decimal_shift(denominator: &BigUint) -> Option<u32> {
    let two = BigUint::from(2u32);
    let five = BigUint::from(5u32);
    let mut rest = denominator.clone();
    let (mut twos, mut fives) = (0u32, 0u32);
    while !rest.is_zero() && rest.is_multiple_of(&two) {
        rest /= &two;
        twos += 1;
    }
    while !rest.is_zero() && rest.is_multiple_of(&five) {
        rest /= &five;
        fives += 1;
    }
    rest.is_one().then_some(twos.max(fives))
}
