use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Candle, CompleteBalance, CurrencyPair, Error, ExchangeClient, OpenOrder, OrderReceipt,
    OrderSide, Result, Ticker,
};

/// Simulated exchange account for paper trading.
///
/// Orders fill immediately at the requested rate with configurable
/// slippage, so no order is ever left open. Market data comes from an
/// optional live source; without one, prices and candles are whatever was
/// set through `set_price` and `push_candle`.
pub struct PaperClient {
    /// Live market-data source for ticker and candles.
    market: Option<Arc<dyn ExchangeClient>>,
    /// Simulated balances per currency code.
    balances: RwLock<HashMap<String, f64>>,
    /// Latest known ticker per pair symbol.
    tickers: RwLock<HashMap<String, Ticker>>,
    /// Offline candle history per pair symbol, oldest first.
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(initial_balances: HashMap<String, f64>, slippage_bps: f64) -> Self {
        info!(
            balances = ?initial_balances,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            market: None,
            balances: RwLock::new(initial_balances),
            tickers: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            slippage_bps,
        }
    }

    /// Mirror ticker and candles from a live exchange.
    pub fn with_market(mut self, market: Arc<dyn ExchangeClient>) -> Self {
        self.market = Some(market);
        self
    }

    /// Set the last price for a pair (offline mode).
    pub async fn set_price(&self, pair: &str, price: f64) {
        self.tickers.write().await.insert(
            pair.to_string(),
            Ticker {
                last: price,
                lowest_ask: price,
                highest_bid: price,
                percent_change: 0.0,
            },
        );
    }

    /// Append a candle to a pair's history (offline mode).
    pub async fn push_candle(&self, pair: &str, candle: Candle) {
        self.candles
            .write()
            .await
            .entry(pair.to_string())
            .or_default()
            .push(candle);
    }

    pub async fn set_balance(&self, currency: &str, amount: f64) {
        self.balances
            .write()
            .await
            .insert(currency.to_string(), amount);
    }

    pub async fn balance(&self, currency: &str) -> f64 {
        self.balances
            .read()
            .await
            .get(currency)
            .copied()
            .unwrap_or(0.0)
    }

    fn parse_pair(pair: &str) -> Result<CurrencyPair> {
        CurrencyPair::from_symbol(pair)
            .ok_or_else(|| Error::Exchange(format!("invalid currency pair '{pair}'")))
    }

    fn receipt(pair: &str, side: OrderSide, rate: f64, amount: f64) -> OrderReceipt {
        OrderReceipt {
            order_number: uuid::Uuid::new_v4().to_string(),
            pair: pair.to_string(),
            side,
            rate,
            amount,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn ticker(&self) -> Result<HashMap<String, Ticker>> {
        if let Some(market) = &self.market {
            let live = market.ticker().await?;
            *self.tickers.write().await = live.clone();
            return Ok(live);
        }
        Ok(self.tickers.read().await.clone())
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        Ok(self.balances.read().await.clone())
    }

    async fn open_orders(&self, _pair: &str) -> Result<Vec<OpenOrder>> {
        // Every paper order fills on submission.
        Ok(Vec::new())
    }

    async fn complete_balances(&self) -> Result<HashMap<String, CompleteBalance>> {
        Ok(self
            .balances
            .read()
            .await
            .iter()
            .map(|(code, &amount)| {
                (
                    code.clone(),
                    CompleteBalance {
                        available: amount,
                        on_orders: 0.0,
                    },
                )
            })
            .collect())
    }

    async fn candles(
        &self,
        pair: &str,
        start: i64,
        end: i64,
        period_secs: u64,
    ) -> Result<Vec<Candle>> {
        if let Some(market) = &self.market {
            return market.candles(pair, start, end, period_secs).await;
        }
        Ok(self
            .candles
            .read()
            .await
            .get(pair)
            .map(|history| {
                history
                    .iter()
                    .filter(|c| c.date >= start && c.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn buy(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        _immediate_or_cancel: bool,
    ) -> Result<OrderReceipt> {
        let symbols = Self::parse_pair(pair)?;
        let fill_price = rate * (1.0 + self.slippage_bps / 10_000.0);

        let mut balances = self.balances.write().await;
        let principal = balances.get(&symbols.principal).copied().unwrap_or(0.0);
        if principal <= 0.0 || amount <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: symbols.principal,
            });
        }

        // Slippage can push the cost past what is held: fill what is affordable.
        let filled = amount.min(principal / fill_price);
        let cost = (filled * fill_price).min(principal);
        *balances.entry(symbols.principal.clone()).or_insert(0.0) -= cost;
        *balances.entry(symbols.subject.clone()).or_insert(0.0) += filled;

        debug!(pair, rate, fill = fill_price, qty = filled, "Paper buy filled");
        Ok(Self::receipt(pair, OrderSide::Buy, fill_price, filled))
    }

    async fn sell(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        _immediate_or_cancel: bool,
    ) -> Result<OrderReceipt> {
        let symbols = Self::parse_pair(pair)?;
        let fill_price = rate * (1.0 - self.slippage_bps / 10_000.0);

        let mut balances = self.balances.write().await;
        let subject = balances.get(&symbols.subject).copied().unwrap_or(0.0);
        if subject <= 0.0 || amount <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: symbols.subject,
            });
        }

        let filled = amount.min(subject);
        *balances.entry(symbols.subject.clone()).or_insert(0.0) -= filled;
        *balances.entry(symbols.principal.clone()).or_insert(0.0) += filled * fill_price;

        debug!(pair, rate, fill = fill_price, qty = filled, "Paper sell filled");
        Ok(Self::receipt(pair, OrderSide::Sell, fill_price, filled))
    }
}
