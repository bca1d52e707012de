use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 currencies the ledger operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    DOP,
    MXN,
    COP,
    GTQ,
    HNL,
    NIO,
    PEN,
}

impl Currency {
    /// Number of decimal places amounts in this currency are rounded to.
    pub fn decimal_places(&self) -> u32 {
        2
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::DOP => "DOP",
            Currency::MXN => "MXN",
            Currency::COP => "COP",
            Currency::GTQ => "GTQ",
            Currency::HNL => "HNL",
            Currency::NIO => "NIO",
            Currency::PEN => "PEN",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "DOP" => Ok(Currency::DOP),
            "MXN" => Ok(Currency::MXN),
            "COP" => Ok(Currency::COP),
            "GTQ" => Ok(Currency::GTQ),
            "HNL" => Ok(Currency::HNL),
            "NIO" => Ok(Currency::NIO),
            "PEN" => Ok(Currency::PEN),
            _ => Err(CurrencyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrencyParseError(String);

impl fmt::Display for CurrencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown currency code: {}", self.0)
    }
}

impl std::error::Error for CurrencyParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::from_str("DOP").unwrap(), Currency::DOP);
        assert!(Currency::from_str("XXX").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for c in [Currency::USD, Currency::MXN, Currency::PEN] {
            assert_eq!(Currency::from_str(&c.to_string()).unwrap(), c);
        }
    }
}
