use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the pair the bot is positioned to trade next.
///
/// Always derived fresh from an [`AccountSnapshot`], never updated
/// incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingState {
    /// Principal balance dominates: looking for an entry.
    Buying,
    /// Subject balance dominates: holding, looking for an exit.
    Selling,
    /// Both balances empty (or equal).
    #[default]
    Idle,
}

impl TradingState {
    /// Derive the trading state from the two balances of the traded pair.
    pub fn from_balances(principal: f64, subject: f64) -> Self {
        if principal > 0.0 && principal > subject {
            TradingState::Buying
        } else if subject > 0.0 && subject > principal {
            TradingState::Selling
        } else {
            TradingState::Idle
        }
    }
}

impl std::fmt::Display for TradingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingState::Buying => write!(f, "buying"),
            TradingState::Selling => write!(f, "selling"),
            TradingState::Idle => write!(f, "idle"),
        }
    }
}

/// Balances per currency code, captured on a single poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    balances: HashMap<String, f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl AccountSnapshot {
    pub fn new(balances: HashMap<String, f64>) -> Self {
        Self {
            balances,
            captured_at: Some(Utc::now()),
        }
    }

    /// Balance for `currency`, zero when the exchange did not report it.
    pub fn balance(&self, currency: &str) -> f64 {
        self.balances.get(currency).copied().unwrap_or(0.0)
    }

    /// Non-zero balances sorted by currency code.
    pub fn non_zero(&self) -> Vec<(String, f64)> {
        let mut held: Vec<(String, f64)> = self
            .balances
            .iter()
            .filter(|(_, amount)| **amount > 0.0)
            .map(|(code, &amount)| (code.clone(), amount))
            .collect();
        held.sort_by(|a, b| a.0.cmp(&b.0));
        held
    }

    pub fn trading_state(&self, pair: &CurrencyPair) -> TradingState {
        TradingState::from_balances(self.balance(&pair.principal), self.balance(&pair.subject))
    }
}

/// A traded pair. `principal` is the fixed reference asset (quote),
/// `subject` is the coin being bought and sold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub principal: String,
    pub subject: String,
}

impl CurrencyPair {
    pub fn new(principal: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            subject: subject.into(),
        }
    }

    /// Exchange symbol, e.g. `BTC_ETH`.
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.principal, self.subject)
    }

    /// Parse an exchange symbol of the form `PRINCIPAL_SUBJECT`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let (principal, subject) = symbol.split_once('_')?;
        if principal.is_empty() || subject.is_empty() {
            return None;
        }
        Some(Self::new(principal, subject))
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.principal, self.subject)
    }
}

/// Latest market summary for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ticker {
    pub last: f64,
    pub lowest_ask: f64,
    pub highest_bid: f64,
    pub percent_change: f64,
}

/// Spendable and locked amounts for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompleteBalance {
    pub available: f64,
    pub on_orders: f64,
}

/// One candlestick bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, epoch seconds.
    pub date: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// An unfilled order resting on the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_number: String,
    pub side: OrderSide,
    pub rate: f64,
    pub amount: f64,
}

/// Confirmation returned by the exchange after a buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_number: String,
    pub pair: String,
    pub side: OrderSide,
    pub rate: f64,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Unit the candlestick window is expressed in.
///
/// Unknown strings are kept so they can be reported at refresh time
/// instead of failing at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PeriodUnit {
    Days,
    Hours,
    Minutes,
    Unsupported(String),
}

impl From<String> for PeriodUnit {
    fn from(raw: String) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "DAYS" => PeriodUnit::Days,
            "HOURS" => PeriodUnit::Hours,
            "MINUTES" => PeriodUnit::Minutes,
            _ => PeriodUnit::Unsupported(raw),
        }
    }
}

impl From<PeriodUnit> for String {
    fn from(unit: PeriodUnit) -> Self {
        unit.to_string()
    }
}

impl std::fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodUnit::Days => write!(f, "DAYS"),
            PeriodUnit::Hours => write!(f, "HOURS"),
            PeriodUnit::Minutes => write!(f, "MINUTES"),
            PeriodUnit::Unsupported(raw) => write!(f, "{raw}"),
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
