//! Unit codes attached to quantities.

use crate::error::QuantityError;

/// Base unit identified by its one-byte wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    Second,
    Metre,
    Gram,
    Ampere,
    Kelvin,
    Mole,
    Candela,
    Eur,
    Usd,
    Gbp,
    Rub,
    Cny,
    Jpy,
    /// Calendar month.
    Cmo,
    Unyt,
    Dimensionless,
}

impl Unit {
    pub fn code(self) -> u8 {
        match self {
            Unit::Second => 0x00,
            Unit::Metre => 0x01,
            Unit::Gram => 0x02,
            Unit::Ampere => 0x03,
            Unit::Kelvin => 0x04,
            Unit::Mole => 0x05,
            Unit::Candela => 0x06,
            Unit::Eur => 0xa0,
            Unit::Usd => 0xa1,
            Unit::Gbp => 0xa2,
            Unit::Rub => 0xa3,
            Unit::Cny => 0xa4,
            Unit::Jpy => 0xa5,
            Unit::Cmo => 0xc0,
            Unit::Unyt => 0xd0,
            Unit::Dimensionless => 0xff,
        }
    }

    pub fn from_code(code: u8) -> Result<Unit, QuantityError> {
        Ok(match code {
            0x00 => Unit::Second,
            0x01 => Unit::Metre,
            0x02 => Unit::Gram,
            0x03 => Unit::Ampere,
            0x04 => Unit::Kelvin,
            0x05 => Unit::Mole,
            0x06 => Unit::Candela,
            0xa0 => Unit::Eur,
            0xa1 => Unit::Usd,
            0xa2 => Unit::Gbp,
            0xa3 => Unit::Rub,
            0xa4 => Unit::Cny,
            0xa5 => Unit::Jpy,
            0xc0 => Unit::Cmo,
            0xd0 => Unit::Unyt,
            0xff => Unit::Dimensionless,
            other => return Err(QuantityError::UnknownUnit(other)),
        })
    }

    /// Full symbol, e.g. `USD`.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Second => "s",
            Unit::Metre => "m",
            Unit::Gram => "g",
            Unit::Ampere => "A",
            Unit::Kelvin => "K",
            Unit::Mole => "mol",
            Unit::Candela => "cd",
            Unit::Eur => "EUR",
            Unit::Usd => "USD",
            Unit::Gbp => "GBP",
            Unit::Rub => "RUB",
            Unit::Cny => "CNY",
            Unit::Jpy => "JPY",
            Unit::Cmo => "Cmo",
            Unit::Unyt => "UNYT",
            Unit::Dimensionless => "x",
        }
    }

    /// Short display symbol; currencies with a sign use it.
    pub fn short_symbol(self) -> &'static str {
        match self {
            Unit::Eur => "€",
            Unit::Usd => "$",
            Unit::Gbp => "£",
            Unit::Rub => "₽",
            Unit::Cny => "¥",
            other => other.symbol(),
        }
    }
}

/// One `(unit, exponent)` factor of a compound unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitFactor {
    pub unit: Unit,
    pub exponent: i8,
}

impl UnitFactor {
    pub fn new(unit: Unit, exponent: i8) -> Self {
        Self { unit, exponent }
    }
}

/// Derived units shown in place of their base expansion, with the factor the
/// numeric value is divided by when the alias is used.
pub(crate) const KNOWN_ALIASES: &[(&str, &str, u32)] = &[
    ("g*m^2/A/s^3", "V", 1000),
    ("g*m^2/s^2", "J", 1000),
    ("g*m/s^2", "N", 1000),
    ("g*m^2/s^3", "W", 1000),
    ("A^2*s^4/g/m^2", "F", 1000),
    ("g*m^2/A^2/s^3", "Ω", 1000),
    ("x/s", "Hz", 1),
    ("A*s", "C", 1),
    ("g", "kg", 1000),
];

/// Render sorted factors as `a*b^2/c`, with `x/` leading a purely negative unit.
/// Returns an empty string for a dimensionless unit.
pub fn format_factors(factors: &[UnitFactor]) -> String {
    let mut out = String::new();
    for (idx, factor) in factors.iter().enumerate() {
        if idx == 0 {
            if factor.exponent < 0 {
                out.push_str("x/");
            }
        } else {
            out.push(if factor.exponent < 0 { '/' } else { '*' });
        }
        out.push_str(factor.unit.short_symbol());
        let magnitude = factor.exponent.unsigned_abs();
        if magnitude != 1 {
            out.push('^');
            out.push_str(&magnitude.to_string());
        }
    }
    out
}

/// Replace known base expansions with their alias.
///
/// An expression only matches at a factor boundary, so `x/s` does not alias `x/s^2`.
/// Returns the aliased text and the accumulated value divisor.
pub fn apply_aliases(formatted: &str) -> (String, u64) {
    let mut text = formatted.to_string();
    let mut divisor = 1u64;
    for (expression, alias, factor) in KNOWN_ALIASES {
        let Some(rest) = text.strip_prefix(expression) else {
            continue;
        };
        if !(rest.is_empty() || rest.starts_with('*') || rest.starts_with('/')) {
            continue;
        }
        text = format!("{alias}{rest}");
        divisor *= u64::from(*factor);
    }
    (text, divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() -> Result<(), QuantityError> {
        for code in [0x00, 0x06, 0xa0, 0xa5, 0xc0, 0xd0, 0xff] {
            assert_eq!(Unit::from_code(code)?.code(), code);
        }
        assert_eq!(Unit::from_code(0x42), Err(QuantityError::UnknownUnit(0x42)));
        Ok(())
    }

    #[test]
    fn formats_mixed_exponents() {
        let factors = [
            UnitFactor::new(Unit::Metre, 1),
            UnitFactor::new(Unit::Second, -2),
        ];
        assert_eq!(format_factors(&factors), "m/s^2");
        assert_eq!(format_factors(&[UnitFactor::new(Unit::Second, -1)]), "x/s");
        assert_eq!(format_factors(&[UnitFactor::new(Unit::Usd, 1)]), "$");
    }

    #[test]
    fn aliases_respect_factor_boundaries() {
        assert_eq!(apply_aliases("g*m^2/s^2"), ("J".to_string(), 1000));
        assert_eq!(apply_aliases("x/s"), ("Hz".to_string(), 1));
        assert_eq!(apply_aliases("x/s^2"), ("x/s^2".to_string(), 1));
        assert_eq!(apply_aliases("g*m"), ("kg*m".to_string(), 1000));
        assert_eq!(apply_aliases("m"), ("m".to_string(), 1));
    }
}
