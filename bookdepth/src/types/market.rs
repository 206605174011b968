use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BookError;

/// Which Binance market an order book comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    #[default]
    Spot,
    Futures,
}

impl Market {
    /// The other market, used as the fallback target.
    pub fn other(self) -> Market {
        match self {
            Market::Spot => Market::Futures,
            Market::Futures => Market::Spot,
        }
    }

    /// Markets in the order a fetch should try them: `self` first.
    pub fn fallback_order(self) -> [Market; 2] {
        [self, self.other()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Market::Spot => "spot",
            Market::Futures => "futures",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Market::Spot),
            "futures" | "fut" | "usdm" => Ok(Market::Futures),
            other => Err(BookError::Config(format!("unknown market \"{other}\""))),
        }
    }
}

/// A validated trading pair, stored upper-case (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse a user-supplied symbol. Surrounding whitespace is ignored and
    /// case is normalised; anything other than ASCII letters and digits is
    /// rejected.
    pub fn parse(raw: &str) -> Result<Self, BookError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BookError::MalformedInput(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Upper-case form used by the REST API.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in stream names.
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = BookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
