use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use sha2::Sha512;
use tracing::debug;

use common::{
    Candle, CompleteBalance, Error, ExchangeClient, OpenOrder, OrderReceipt, OrderSide, Result,
    Ticker,
};

const BASE_URL: &str = "https://poloniex.com";

/// REST API client for Poloniex. Public endpoints for market data, signed
/// trading endpoints for balances and orders.
pub struct PoloniexClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
    /// Last nonce sent; every signed request must use a larger one.
    nonce: AtomicU64,
}

impl PoloniexClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, secret, BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            nonce: AtomicU64::new(0),
        })
    }

    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        match self
            .nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        {
            Ok(prev) | Err(prev) => now.max(prev + 1),
        }
    }

    fn sign(&self, body: &str) -> Result<String> {
        type HmacSha512 = Hmac<Sha512>;
        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("invalid API secret: {e}")))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T> {
        let query = encode_form(params);
        let url = format!("{}/public?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        decode(&body)
    }

    async fn trading_post<T: DeserializeOwned>(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut all: Vec<(&str, String)> = vec![
            ("command", command.to_string()),
            ("nonce", self.next_nonce().to_string()),
        ];
        all.extend(params.iter().cloned());
        let body = encode_form(&all);
        let signature = self.sign(&body)?;
        let url = format!("{}/tradingApi", self.base_url);

        debug!(command, "Poloniex trading API call");
        let resp = self
            .http
            .post(&url)
            .header("Key", &self.api_key)
            .header("Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        decode(&text)
    }

    async fn place_order(
        &self,
        side: OrderSide,
        pair: &str,
        rate: f64,
        amount: f64,
        immediate_or_cancel: bool,
    ) -> Result<OrderReceipt> {
        let mut params = vec![
            ("currencyPair", pair.to_string()),
            ("rate", format!("{rate:.8}")),
            ("amount", format!("{amount:.8}")),
        ];
        if immediate_or_cancel {
            params.push(("immediateOrCancel", "1".to_string()));
        }

        let command = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let resp: OrderResponse = self.trading_post(command, &params).await?;

        Ok(OrderReceipt {
            order_number: resp.order_number,
            pair: pair.to_string(),
            side,
            rate,
            amount,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeClient for PoloniexClient {
    async fn ticker(&self) -> Result<HashMap<String, Ticker>> {
        let raw: HashMap<String, TickerEntry> = self
            .public_get(&[("command", "returnTicker".to_string())])
            .await?;
        Ok(raw
            .into_iter()
            .map(|(pair, t)| {
                (
                    pair,
                    Ticker {
                        last: t.last,
                        lowest_ask: t.lowest_ask,
                        highest_bid: t.highest_bid,
                        percent_change: t.percent_change,
                    },
                )
            })
            .collect())
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        let raw: HashMap<String, Amount> = self.trading_post("returnBalances", &[]).await?;
        Ok(raw.into_iter().map(|(code, a)| (code, a.0)).collect())
    }

    async fn open_orders(&self, pair: &str) -> Result<Vec<OpenOrder>> {
        let raw: Vec<OpenOrderEntry> = self
            .trading_post("returnOpenOrders", &[("currencyPair", pair.to_string())])
            .await?;
        raw.into_iter()
            .map(|o| {
                let side = match o.kind.as_str() {
                    "buy" => OrderSide::Buy,
                    "sell" => OrderSide::Sell,
                    other => {
                        return Err(Error::Exchange(format!("unknown order type '{other}'")))
                    }
                };
                Ok(OpenOrder {
                    order_number: o.order_number,
                    side,
                    rate: o.rate,
                    amount: o.amount,
                })
            })
            .collect()
    }

    async fn complete_balances(&self) -> Result<HashMap<String, CompleteBalance>> {
        let raw: HashMap<String, CompleteBalanceEntry> =
            self.trading_post("returnCompleteBalances", &[]).await?;
        Ok(raw
            .into_iter()
            .map(|(code, b)| {
                (
                    code,
                    CompleteBalance {
                        available: b.available,
                        on_orders: b.on_orders,
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
        let raw: Vec<ChartEntry> = self
            .public_get(&[
                ("command", "returnChartData".to_string()),
                ("currencyPair", pair.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("period", period_secs.to_string()),
            ])
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| Candle {
                date: c.date,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .collect())
    }

    async fn buy(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        immediate_or_cancel: bool,
    ) -> Result<OrderReceipt> {
        self.place_order(OrderSide::Buy, pair, rate, amount, immediate_or_cancel)
            .await
    }

    async fn sell(
        &self,
        pair: &str,
        rate: f64,
        amount: f64,
        immediate_or_cancel: bool,
    ) -> Result<OrderReceipt> {
        self.place_order(OrderSide::Sell, pair, rate, amount, immediate_or_cancel)
            .await
    }
}

fn encode_form(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Decode a response body. Poloniex reports failures as `{"error": "..."}`
/// with a 200 status.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(Error::Exchange(message.to_string()));
    }
    serde_json::from_value(value).map_err(|e| Error::Exchange(format!("unexpected response: {e}")))
}

// ─── Response types ───────────────────────────────────────────────────────────

/// Poloniex sends most numbers as strings, chart data as JSON numbers.
fn number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

#[derive(Deserialize)]
struct Amount(#[serde(deserialize_with = "number")] f64);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    #[serde(deserialize_with = "number")]
    last: f64,
    #[serde(deserialize_with = "number", default)]
    lowest_ask: f64,
    #[serde(deserialize_with = "number", default)]
    highest_bid: f64,
    #[serde(deserialize_with = "number", default)]
    percent_change: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderEntry {
    #[serde(deserialize_with = "text")]
    order_number: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "number")]
    rate: f64,
    #[serde(deserialize_with = "number")]
    amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBalanceEntry {
    #[serde(deserialize_with = "number")]
    available: f64,
    #[serde(deserialize_with = "number")]
    on_orders: f64,
}

#[derive(Deserialize)]
struct ChartEntry {
    date: i64,
    #[serde(deserialize_with = "number")]
    open: f64,
    #[serde(deserialize_with = "number")]
    high: f64,
    #[serde(deserialize_with = "number")]
    low: f64,
    #[serde(deserialize_with = "number")]
    close: f64,
    #[serde(deserialize_with = "number", default)]
    volume: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(deserialize_with = "text")]
    order_number: String,
}
