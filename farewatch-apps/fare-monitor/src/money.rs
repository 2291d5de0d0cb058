//!  Farewatch Fare Monitor
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Money
//!
//! Fixed-point prices. Provider quotes are decimal strings with at most two
//! fractional digits, so amounts are stored as integer hundredths of the
//! currency unit regardless of the currency's own minor unit.

use serde::{Deserialize, Serialize};

/// Currencies whose conventional minor unit is the whole unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in hundredths of the currency unit.
    pub hundredths: i64,
    /// ISO 4217 code, uppercase.
    pub currency: String,
}

impl Money {
    pub fn from_hundredths(hundredths: i64, currency: &str) -> Self {
        Self {
            hundredths,
            currency: currency.to_ascii_uppercase(),
        }
    }

    pub fn from_units(units: i64, currency: &str) -> Self {
        Self::from_hundredths(units * 100, currency)
    }

    /// Parse a non-negative decimal string such as `"1450000.00"`,
    /// `"725000"` or `"1,500,000"`.
    pub fn parse(raw: &str, currency: &str) -> Result<Self, String> {
        let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
        if cleaned.is_empty() {
            return Err("empty amount".to_string());
        }

        let (int_part, frac_part) = match cleaned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (cleaned.as_str(), ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a non-negative decimal amount", raw));
        }
        if frac_part.len() > 2 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!(
                "'{}' has more than two fractional digits or stray characters",
                raw
            ));
        }

        let units: i64 = int_part
            .parse()
            .map_err(|_| format!("'{}' is out of range", raw))?;
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
            _ => frac_part.parse::<i64>().unwrap_or(0),
        };

        let hundredths = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| format!("'{}' is out of range", raw))?;

        Ok(Self::from_hundredths(hundredths, currency))
    }

    pub fn is_positive(&self) -> bool {
        self.hundredths > 0
    }

    pub fn times(&self, factor: u32) -> Self {
        Self {
            hundredths: self.hundredths.saturating_mul(factor as i64),
            currency: self.currency.clone(),
        }
    }

    /// Number of fractional digits conventionally displayed for the currency.
    pub fn minor_digits(&self) -> u32 {
        minor_digits(&self.currency)
    }

    /// One minor unit of the currency, expressed in hundredths.
    pub fn minor_unit(&self) -> i64 {
        10_i64.pow(2 - self.minor_digits())
    }

    /// True when both amounts agree to within one minor unit.
    pub fn approx_eq(&self, other: &Money) -> bool {
        self.currency == other.currency
            && (self.hundredths - other.hundredths).abs() <= self.minor_unit()
    }

    /// Render with thousands separators in the currency's usual style:
    /// `₩1,450,000`, `$1,234.50`, `1,234.50 CHF`.
    pub fn display(&self) -> String {
        let digits = self.minor_digits();
        let sign = if self.hundredths < 0 { "-" } else { "" };
        let magnitude = self.hundredths.unsigned_abs();
        let amount = if digits == 0 {
            group_thousands((magnitude + 50) / 100)
        } else {
            format!("{}.{:02}", group_thousands(magnitude / 100), magnitude % 100)
        };

        match currency_symbol(&self.currency) {
            Some(symbol) => format!("{}{}{}", sign, symbol, amount),
            None => format!("{}{} {}", sign, amount, self.currency),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

pub fn minor_digits(currency: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES.contains(&currency) {
        0
    } else {
        2
    }
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "KRW" => Some("₩"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(Money::parse("1450000.00", "KRW").unwrap().hundredths, 145_000_000);
        assert_eq!(Money::parse("725000", "krw").unwrap().currency, "KRW");
        assert_eq!(Money::parse("1,500,000", "KRW").unwrap().hundredths, 150_000_000);
        assert_eq!(Money::parse("12.5", "USD").unwrap().hundredths, 1250);
        assert!(Money::parse("", "USD").is_err());
        assert!(Money::parse("-3", "USD").is_err());
        assert!(Money::parse("1.234", "USD").is_err());
        assert!(Money::parse("12a", "USD").is_err());
    }

    #[test]
    fn test_display_uses_conventions() {
        assert_eq!(Money::from_units(1_450_000, "KRW").display(), "₩1,450,000");
        assert_eq!(Money::from_hundredths(123_450, "USD").display(), "$1,234.50");
        assert_eq!(Money::from_hundredths(99, "EUR").display(), "€0.99");
        assert_eq!(Money::from_hundredths(100_000_05, "CHF").display(), "100,000.05 CHF");
        assert_eq!(Money::from_units(100, "JPY").display(), "¥100");
    }

    #[test]
    fn test_tolerance_follows_minor_unit() {
        let total = Money::parse("1450000.00", "KRW").unwrap();
        let per_pax = Money::parse("725000.50", "KRW").unwrap();
        assert!(total.approx_eq(&per_pax.times(2)));

        let usd_total = Money::parse("100.00", "USD").unwrap();
        let usd_pax = Money::parse("50.02", "USD").unwrap();
        assert!(!usd_total.approx_eq(&usd_pax.times(2)));
    }

    #[test]
    fn test_negative_amount_has_single_leading_sign() {
        assert_eq!(Money::from_hundredths(-1234, "USD").display(), "-$12.34");
        assert_eq!(Money::from_hundredths(-34, "CHF").display(), "-0.34 CHF");
        assert_eq!(Money::from_hundredths(-123_456_789, "EUR").display(), "-€1,234,567.89");
        assert_eq!(Money::from_units(-1_450_000, "KRW").display(), "-₩1,450,000");
        assert_eq!(Money::from_hundredths(i64::MIN, "USD").display().matches('-').count(), 1);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
