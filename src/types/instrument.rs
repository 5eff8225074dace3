use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange segment of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSegment {
    /// Index feed (NIFTY, BANKNIFTY, ...).
    #[serde(rename = "IDX_I")]
    Index,
    /// NSE cash equity.
    #[serde(rename = "NSE_EQ")]
    Equity,
    /// NSE futures & options.
    #[serde(rename = "NSE_FNO")]
    Derivatives,
    /// Currency derivatives.
    #[serde(rename = "NSE_CURRENCY")]
    Currency,
    /// Commodity derivatives.
    #[serde(rename = "MCX_COMM")]
    Commodity,
}

impl ExchangeSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeSegment::Index => "IDX_I",
            ExchangeSegment::Equity => "NSE_EQ",
            ExchangeSegment::Derivatives => "NSE_FNO",
            ExchangeSegment::Currency => "NSE_CURRENCY",
            ExchangeSegment::Commodity => "MCX_COMM",
        }
    }
}

impl fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeSegment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDX_I" => Ok(ExchangeSegment::Index),
            "NSE_EQ" => Ok(ExchangeSegment::Equity),
            "NSE_FNO" => Ok(ExchangeSegment::Derivatives),
            "NSE_CURRENCY" => Ok(ExchangeSegment::Currency),
            "MCX_COMM" => Ok(ExchangeSegment::Commodity),
            _ => Err(()),
        }
    }
}

/// Immutable instrument configuration, seeded via the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub security_id: String,
    pub symbol: String,
    pub exchange_segment: ExchangeSegment,
    pub lot_size: u32,
    pub tick_size: f64,
}

/// A `(segment, security_id)` pair used in feed subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionInstrument {
    pub segment: ExchangeSegment,
    pub security_id: String,
}
