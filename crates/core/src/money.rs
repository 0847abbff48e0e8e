use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Invalid amount: {0}")]
pub struct AmountError(pub String);

/// A statement amount rounded to two decimal places. Currency is implied by
/// the bank profile (MYR or SGD), so no symbol is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    /// Parses a spreadsheet amount cell. Accepts thousands separators, stray
    /// quotes, an `RM`/`SGD`/`S$`/`$` prefix and accounting parentheses.
    /// Blank cells parse as `None`.
    pub fn parse_cell(raw: &str) -> Result<Option<Self>, AmountError> {
        let s = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if s.is_empty() || s == "-" || s.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }

        let (negative, s) = match s.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, s),
        };

        let mut body = s.trim();
        for prefix in ["RM", "SGD", "S$", "$"] {
            if let Some(rest) = body.strip_prefix(prefix) {
                body = rest.trim_start();
                break;
            }
        }
        let cleaned: String = body.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

        let value = Decimal::from_str(&cleaned).map_err(|_| AmountError(raw.to_string()))?;
        let value = if negative { -value } else { value };
        Ok(Some(Money::from_decimal(value)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        Money::from_decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn parses_thousands_separators() {
        assert_eq!(Money::parse_cell("1,234.50").unwrap(), Some(money("1234.50")));
    }

    #[test]
    fn parses_currency_prefix_and_quotes() {
        assert_eq!(Money::parse_cell("\"RM 2,000.00\"").unwrap(), Some(money("2000")));
        assert_eq!(Money::parse_cell("S$15.10").unwrap(), Some(money("15.10")));
    }

    #[test]
    fn parentheses_are_negative() {
        assert_eq!(Money::parse_cell("(45.00)").unwrap(), Some(money("-45")));
    }

    #[test]
    fn blank_cells_are_none() {
        assert_eq!(Money::parse_cell("").unwrap(), None);
        assert_eq!(Money::parse_cell("  ").unwrap(), None);
        assert_eq!(Money::parse_cell("nan").unwrap(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(Money::parse_cell("twelve").is_err());
    }

    #[test]
    fn display_has_two_places() {
        assert_eq!(money("7.5").to_string(), "7.50");
    }
}
