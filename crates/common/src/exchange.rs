use std::collections::HashMap;

use async_trait::async_trait;

use crate::{Candle, CompleteBalance, OpenOrder, OrderReceipt, Result, Ticker};

/// Abstraction over the exchange connection.
///
/// `PoloniexClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Every call reports transport, authentication and validation failures
/// as an `Err`; callers decide whether the failure is fatal.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest ticker for every listed pair, keyed by pair symbol.
    async fn ticker(&self) -> Result<HashMap<String, Ticker>>;

    /// Total balance per currency code.
    async fn balances(&self) -> Result<HashMap<String, f64>>;

    /// Unfilled orders for `pair`. An empty list means nothing is pending.
    async fn open_orders(&self, pair: &str) -> Result<Vec<OpenOrder>>;

    /// Available and on-order amounts per currency code.
    async fn complete_balances(&self) -> Result<HashMap<String, CompleteBalance>>;

    /// Candlesticks for `pair` between two epoch-second bounds, oldest first.
    async fn candles(
        &self,
        pair: &str,
        start: i64,
        end: i64,
        period_secs: u64,
    ) -> Result<Vec<Candle>>;

    /// Place a limit buy of `amount` subject units at `rate`.
    async fn buy(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        immediate_or_cancel: bool,
    ) -> Result<OrderReceipt>;

    /// Place a limit sell of `amount` subject units at `rate`.
    async fn sell(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        immediate_or_cancel: bool,
    ) -> Result<OrderReceipt>;
}
