use std::fmt;
use std::str::FromStr;

use crate::error::PairError;

/// An ordered base/quote pair of currency codes.
///
/// Codes are upper-cased on construction and must differ afterwards. No other
/// check is made, so any string is accepted as a code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair {
    base: String,
    quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Result<Self, PairError> {
        let base = base.as_ref().to_uppercase();
        let quote = quote.as_ref().to_uppercase();
        if base == quote {
            return Err(PairError::InvalidPair(base));
        }

        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| PairError::Malformed(s.to_string()))?;
        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() {
            return Err(PairError::Malformed(s.to_string()));
        }

        Self::new(base, quote)
    }
}
