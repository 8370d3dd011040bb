use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{
    AccountSnapshot, CurrencyPair, Error, ExchangeClient, OrderReceipt, Result, TraderConfig,
    TradingState,
};
use policy::{Policy, PolicyContext};

use crate::status::{keys, StatusPublisher, StatusValue};

/// Result of polling balances and open orders.
#[derive(Debug, Clone)]
pub struct StateCheck {
    pub state: TradingState,
    pub orders_pending: bool,
    pub balances: AccountSnapshot,
}

/// What a single controller tick ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    /// An order is still open on the exchange.
    AwaitingOrders,
    /// The pending order disappeared without moving the balances.
    OrderCanceled,
    /// The pending order cleared and the state was recomputed.
    OrdersCleared,
    Bought(OrderReceipt),
    Sold { receipt: OrderReceipt, profit_pct: f64 },
    /// The policy declined, or no price is known yet.
    Hold,
    /// Nothing to trade with.
    Idle,
    /// An exchange call failed; nothing changed.
    Failed,
}

/// Single-pair trading loop: polls the exchange, asks the policy, places
/// all-in orders and reports progress on the status channel.
pub struct TradingController {
    client: Arc<dyn ExchangeClient>,
    policy: Box<dyn Policy>,
    status: StatusPublisher,
    settings: TraderConfig,
    pair: CurrencyPair,

    state: TradingState,
    orders_pending: bool,
    balances: AccountSnapshot,
    /// Closing prices, oldest first.
    candlesticks: Vec<f64>,
    /// Seconds until the next candle refresh. Starts at zero so the first
    /// tick fetches history.
    candle_countdown: i64,
    current_price: Option<f64>,
    buy_price: f64,
    sell_price: f64,
    started_at: Instant,
}

impl TradingController {
    pub fn new(
        settings: TraderConfig,
        client: Arc<dyn ExchangeClient>,
        policy: Box<dyn Policy>,
        status: StatusPublisher,
    ) -> Self {
        let pair = settings.pair();
        Self {
            client,
            policy,
            status,
            settings,
            pair,
            state: TradingState::Idle,
            orders_pending: false,
            balances: AccountSnapshot::default(),
            candlesticks: Vec::new(),
            candle_countdown: 0,
            current_price: None,
            buy_price: 0.0,
            sell_price: 0.0,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> TradingState {
        self.state
    }

    pub fn orders_pending(&self) -> bool {
        self.orders_pending
    }

    pub fn buy_price(&self) -> f64 {
        self.buy_price
    }

    pub fn sell_price(&self) -> f64 {
        self.sell_price
    }

    pub fn current_price(&self) -> Option<f64> {
        self.current_price
    }

    pub fn candlesticks(&self) -> &[f64] {
        &self.candlesticks
    }

    pub fn balances(&self) -> &AccountSnapshot {
        &self.balances
    }

    // ─── Exchange polling ────────────────────────────────────────────────────

    /// Poll balances and open orders and derive the state from them.
    /// Never consults cached values.
    pub async fn check_state(&self) -> Result<StateCheck> {
        let balances = AccountSnapshot::new(self.client.balances().await?);
        let state = balances.trading_state(&self.pair);
        let open = self.client.open_orders(&self.pair.symbol()).await?;
        Ok(StateCheck {
            state,
            orders_pending: !open.is_empty(),
            balances,
        })
    }

    fn apply(&mut self, check: StateCheck) {
        self.state = check.state;
        self.orders_pending = check.orders_pending;
        self.balances = check.balances;
    }

    /// Derive the initial state before the loop starts.
    pub async fn initialize(&mut self) -> Result<()> {
        let check = self.check_state().await?;
        info!(
            pair = %self.pair,
            state = %check.state,
            orders_pending = check.orders_pending,
            policy = self.policy.name(),
            "Trader initialized"
        );
        self.apply(check);
        self.status.update(keys::POLICY, self.policy.name());
        self.status.remove(keys::ERROR);
        Ok(())
    }

    async fn refresh_ticker(&mut self) -> Result<()> {
        let tickers = self.client.ticker().await?;
        let symbol = self.pair.symbol();
        let ticker = tickers
            .get(&symbol)
            .ok_or_else(|| Error::Exchange(format!("no ticker for {symbol}")))?;
        self.current_price = Some(ticker.last);
        Ok(())
    }

    /// Fetch closing prices covering two measurement windows.
    ///
    /// An unsupported period unit yields an empty series.
    pub async fn refresh_candles(&mut self) -> Result<()> {
        let Some(window) = self.settings.candle_window() else {
            self.candlesticks.clear();
            return Err(Error::Config(format!(
                "unsupported period unit '{}'",
                self.settings.period_unit
            )));
        };

        let end = Utc::now().timestamp();
        let start = end - window.as_secs() as i64;
        let candles = self
            .client
            .candles(
                &self.pair.symbol(),
                start,
                end,
                self.settings.candlestick_period_secs,
            )
            .await?;
        self.candlesticks = candles.iter().map(|c| c.close).collect();
        debug!(count = self.candlesticks.len(), "Candles refreshed");
        Ok(())
    }

    async fn refresh_market(&mut self) {
        if let Err(e) = self.refresh_ticker().await {
            self.report_failure("ticker", &e);
        }
        if self.buy_price == 0.0 {
            // Starting with a position: treat the first seen price as entry.
            if let Some(price) = self.current_price {
                self.buy_price = price;
            }
        }

        self.candle_countdown -= self.settings.poll_interval_secs as i64;
        if self.candle_countdown <= 0 {
            self.candle_countdown = self.settings.candlestick_period_secs as i64;
            if let Err(e) = self.refresh_candles().await {
                self.report_failure("candles", &e);
            }
        }
    }

    // ─── Orders ─────────────────────────────────────────────────────────────

    /// Spend the whole available principal balance at `price`.
    pub async fn buy_all_in(&self, price: f64) -> Result<OrderReceipt> {
        let complete = self.client.complete_balances().await?;
        let available = complete
            .get(&self.pair.principal)
            .map(|b| b.available)
            .unwrap_or(0.0);
        let amount = if price > 0.0 { available / price } else { 0.0 };
        if amount <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: self.pair.principal.clone(),
            });
        }
        self.client
            .buy(
                &self.pair.symbol(),
                price,
                amount,
                self.settings.immediate_or_cancel,
            )
            .await
    }

    /// Offer the whole available subject balance at `price`.
    pub async fn sell_all_in(&self, price: f64) -> Result<OrderReceipt> {
        let complete = self.client.complete_balances().await?;
        let amount = complete
            .get(&self.pair.subject)
            .map(|b| b.available)
            .unwrap_or(0.0);
        if amount <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: self.pair.subject.clone(),
            });
        }
        self.client
            .sell(
                &self.pair.symbol(),
                price,
                amount,
                self.settings.immediate_or_cancel,
            )
            .await
    }

    // ─── Loop ───────────────────────────────────────────────────────────────

    /// One pass of the trading loop, without the trailing wait.
    pub async fn tick(&mut self) -> TickAction {
        self.refresh_market().await;

        let action = if self.orders_pending {
            self.settle_pending().await
        } else if !self.refresh_state().await {
            self.set_status("Waiting for orders to clear");
            TickAction::AwaitingOrders
        } else {
            match self.state {
                TradingState::Buying => self.try_buy().await,
                TradingState::Selling => self.try_sell().await,
                TradingState::Idle => {
                    self.set_status("Account Balance is Empty");
                    TickAction::Idle
                }
            }
        };

        self.status.update(
            keys::ACCOUNT_BALANCE,
            StatusValue::Balances(self.balances.non_zero()),
        );
        if let Some(price) = self.current_price {
            self.status.update(keys::TICKER_PRICE, format!("{price:.8}"));
        }
        action
    }

    /// Re-derive the state from fresh balances so deposits and withdrawals
    /// made outside the bot are picked up, including out of IDLE. A failed
    /// poll keeps the last known state. Returns false when an order is open.
    async fn refresh_state(&mut self) -> bool {
        match self.check_state().await {
            Ok(check) => {
                if check.state != self.state {
                    info!(
                        pair = %self.pair,
                        from = %self.state,
                        to = %check.state,
                        "Balances changed outside the bot"
                    );
                }
                self.apply(check);
            }
            Err(e) => self.report_failure("balances", &e),
        }
        !self.orders_pending
    }

    async fn settle_pending(&mut self) -> TickAction {
        self.set_status("Waiting for orders to clear");
        let check = match self.check_state().await {
            Ok(check) => check,
            Err(e) => {
                self.report_failure("open orders", &e);
                return TickAction::Failed;
            }
        };

        if check.orders_pending {
            self.balances = check.balances;
            return TickAction::AwaitingOrders;
        }

        let canceled = check.state == self.state;
        self.apply(check);
        if canceled {
            warn!(pair = %self.pair, state = %self.state, "Order was canceled");
            TickAction::OrderCanceled
        } else {
            info!(pair = %self.pair, state = %self.state, "Orders cleared");
            TickAction::OrdersCleared
        }
    }

    async fn try_buy(&mut self) -> TickAction {
        self.set_status("Looking to Buy");
        let Some(price) = self.current_price else {
            return TickAction::Hold;
        };

        let ctx = context(
            &self.pair,
            &self.settings,
            &self.candlesticks,
            price,
            self.buy_price,
            self.sell_price,
        );
        if !self.policy.should_buy(&ctx) {
            return TickAction::Hold;
        }

        match self.buy_all_in(price).await {
            Ok(receipt) => {
                self.buy_price = price;
                self.orders_pending = true;
                info!(
                    pair = %self.pair,
                    price,
                    qty = receipt.amount,
                    order = %receipt.order_number,
                    "Buy order placed"
                );
                self.set_status(format!("Buying at {price:.8}"));
                self.status.remove(keys::ERROR);
                TickAction::Bought(receipt)
            }
            Err(e) => {
                self.report_failure("buy", &e);
                TickAction::Failed
            }
        }
    }

    async fn try_sell(&mut self) -> TickAction {
        self.set_status(format!("Looking to Sell (Bought at {:.8})", self.buy_price));
        let Some(price) = self.current_price else {
            return TickAction::Hold;
        };

        let ctx = context(
            &self.pair,
            &self.settings,
            &self.candlesticks,
            price,
            self.buy_price,
            self.sell_price,
        );
        if !self.policy.should_sell(&ctx) {
            return TickAction::Hold;
        }

        match self.sell_all_in(price).await {
            Ok(receipt) => {
                self.sell_price = price;
                let profit_pct = profit_percent(self.buy_price, self.sell_price);

                let ctx = context(
                    &self.pair,
                    &self.settings,
                    &self.candlesticks,
                    price,
                    self.buy_price,
                    self.sell_price,
                );
                self.policy.clean_up(&ctx);
                self.orders_pending = true;

                info!(
                    pair = %self.pair,
                    price,
                    qty = receipt.amount,
                    profit_pct,
                    order = %receipt.order_number,
                    "Sell order placed"
                );
                self.set_status(format!("Selling at {price:.8}  Profit: {profit_pct:.2}%"));
                self.status.remove(keys::ERROR);
                TickAction::Sold {
                    receipt,
                    profit_pct,
                }
            }
            Err(e) => {
                self.report_failure("sell", &e);
                TickAction::Failed
            }
        }
    }

    /// Run until `shutdown` flips to true. Call from `tokio::spawn`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(pair = %self.pair, "Trader starting");

        // The loop cannot start without a known state; keep asking.
        while let Err(e) = self.initialize().await {
            self.report_failure("initial state", &e);
            if !self.pause(&mut shutdown).await {
                info!("Trader stopped before initialization");
                return;
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            let action = self.tick().await;
            debug!(?action, state = %self.state, "Tick complete");

            if !self.pause(&mut shutdown).await {
                break;
            }
        }

        info!(pair = %self.pair, "Trader stopped");
    }

    /// Wait one poll interval in one-second steps, publishing uptime.
    /// Returns false once shutdown has been requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        for _ in 0..self.settings.poll_interval_secs.max(1) {
            if *shutdown.borrow() {
                return false;
            }
            self.status
                .update(keys::UPTIME, format_uptime(self.started_at.elapsed()));
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                changed = shutdown.changed() => {
                    // A dropped sender counts as a stop request.
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
        !*shutdown.borrow()
    }

    // ─── Status helpers ─────────────────────────────────────────────────────

    fn set_status(&self, message: impl Into<String>) {
        self.status.update(keys::STATUS, message.into());
    }

    fn report_failure(&self, what: &str, err: &Error) {
        match err {
            Error::Config(_) => {
                warn!(pair = %self.pair, operation = what, error = %err, "Misconfigured, skipping")
            }
            _ => error!(pair = %self.pair, operation = what, error = %err, "Exchange call failed"),
        }
        self.status.update(keys::ERROR, format!("{what}: {err}"));
    }
}

fn context<'a>(
    pair: &'a CurrencyPair,
    settings: &'a TraderConfig,
    candlesticks: &'a [f64],
    current_price: f64,
    buy_price: f64,
    sell_price: f64,
) -> PolicyContext<'a> {
    PolicyContext {
        pair,
        candlesticks,
        current_price,
        buy_price,
        sell_price,
        measurement_period: settings.measurement_period,
        period_unit: &settings.period_unit,
    }
}

/// Percentage gained selling at `sell` after buying at `buy`.
pub fn profit_percent(buy: f64, sell: f64) -> f64 {
    if buy <= 0.0 {
        return 0.0;
    }
    (sell / buy * 100.0) - 100.0
}

/// `H:MM:SS`, hours unbounded.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use common::{Candle, CompleteBalance, OpenOrder, OrderSide, PeriodUnit, Ticker};
    use paper::PaperClient;

    use crate::status::{StatusBoard, StatusChannel, StatusReceiver};

    const PAIR: &str = "BTC_ETH";

    fn settings() -> TraderConfig {
        TraderConfig {
            principal_currency: "BTC".into(),
            subject_currency: "ETH".into(),
            poll_interval_secs: 1,
            measurement_period: 3,
            candlestick_period_secs: 300,
            period_unit: PeriodUnit::Minutes,
            immediate_or_cancel: false,
            status_queue_capacity: 64,
            display_refresh_ms: 10,
        }
    }

    /// Policy with fixed answers that counts clean-ups.
    struct Scripted {
        buy: bool,
        sell: bool,
        clean_ups: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Policy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn should_buy(&self, _ctx: &PolicyContext<'_>) -> bool {
            self.buy
        }
        fn should_sell(&mut self, _ctx: &PolicyContext<'_>) -> bool {
            self.sell
        }
        fn clean_up(&mut self, _ctx: &PolicyContext<'_>) {
            self.clean_ups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted(buy: bool, sell: bool) -> Box<dyn Policy> {
        Box::new(Scripted {
            buy,
            sell,
            clean_ups: Arc::default(),
        })
    }

    /// Wraps the paper exchange with switchable failures and open orders.
    struct Flaky {
        inner: PaperClient,
        fail_ticker: AtomicBool,
        fail_orders: AtomicBool,
        fail_balances: AtomicBool,
        open: AtomicBool,
    }

    impl Flaky {
        fn new(inner: PaperClient) -> Self {
            Self {
                inner,
                fail_ticker: AtomicBool::new(false),
                fail_orders: AtomicBool::new(false),
                fail_balances: AtomicBool::new(false),
                open: AtomicBool::new(false),
            }
        }

        fn check(flag: &AtomicBool, what: &str) -> Result<()> {
            if flag.load(Ordering::SeqCst) {
                Err(Error::Http(format!("{what} unavailable")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for Flaky {
        async fn ticker(&self) -> Result<HashMap<String, Ticker>> {
            Self::check(&self.fail_ticker, "ticker")?;
            self.inner.ticker().await
        }
        async fn balances(&self) -> Result<HashMap<String, f64>> {
            Self::check(&self.fail_balances, "balances")?;
            self.inner.balances().await
        }
        async fn open_orders(&self, pair: &str) -> Result<Vec<OpenOrder>> {
            if self.open.load(Ordering::SeqCst) {
                return Ok(vec![OpenOrder {
                    order_number: "1".into(),
                    side: OrderSide::Buy,
                    rate: 0.02,
                    amount: 1.0,
                }]);
            }
            self.inner.open_orders(pair).await
        }
        async fn complete_balances(&self) -> Result<HashMap<String, CompleteBalance>> {
            self.inner.complete_balances().await
        }
        async fn candles(
            &self,
            pair: &str,
            start: i64,
            end: i64,
            period_secs: u64,
        ) -> Result<Vec<Candle>> {
            self.inner.candles(pair, start, end, period_secs).await
        }
        async fn buy(
            &self,
            pair: &str,
            rate: f64,
            amount: f64,
            ioc: bool,
        ) -> Result<OrderReceipt> {
            Self::check(&self.fail_orders, "buy")?;
            self.inner.buy(pair, rate, amount, ioc).await
        }
        async fn sell(
            &self,
            pair: &str,
            rate: f64,
            amount: f64,
            ioc: bool,
        ) -> Result<OrderReceipt> {
            Self::check(&self.fail_orders, "sell")?;
            self.inner.sell(pair, rate, amount, ioc).await
        }
    }

    async fn exchange(btc: f64, eth: f64, price: f64) -> Arc<Flaky> {
        let paper = PaperClient::new(
            HashMap::from([("BTC".to_string(), btc), ("ETH".to_string(), eth)]),
            0.0,
        );
        paper.set_price(PAIR, price).await;
        let now = Utc::now().timestamp();
        for (i, close) in [0.01, 0.02, 0.03, 0.04].into_iter().enumerate() {
            paper
                .push_candle(
                    PAIR,
                    Candle {
                        date: now - 900 + i as i64 * 300,
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 1.0,
                    },
                )
                .await;
        }
        Arc::new(Flaky::new(paper))
    }

    async fn controller(
        client: Arc<Flaky>,
        policy: Box<dyn Policy>,
    ) -> (TradingController, StatusReceiver) {
        let (publisher, receiver) = StatusChannel::new(64);
        let mut ctl = TradingController::new(settings(), client, policy, publisher);
        ctl.initialize().await.unwrap();
        (ctl, receiver)
    }

    fn board(receiver: &mut StatusReceiver) -> StatusBoard {
        let mut board = StatusBoard::new();
        receiver.drain_into(&mut board);
        board
    }

    #[tokio::test]
    async fn initial_state_follows_balances() {
        let (ctl, _) = controller(exchange(1.0, 0.0, 0.02).await, scripted(false, false)).await;
        assert_eq!(ctl.state(), TradingState::Buying);
        assert!(!ctl.orders_pending());

        let (ctl, _) = controller(exchange(0.0, 3.0, 0.02).await, scripted(false, false)).await;
        assert_eq!(ctl.state(), TradingState::Selling);

        let (ctl, _) = controller(exchange(0.0, 0.0, 0.02).await, scripted(false, false)).await;
        assert_eq!(ctl.state(), TradingState::Idle);
    }

    #[tokio::test]
    async fn first_tick_loads_candles_and_price() {
        let (mut ctl, _) =
            controller(exchange(1.0, 0.0, 0.02).await, scripted(false, false)).await;
        assert_eq!(ctl.tick().await, TickAction::Hold);
        assert_eq!(ctl.candlesticks(), &[0.01, 0.02, 0.03, 0.04]);
        assert_eq!(ctl.current_price(), Some(0.02));
    }

    #[tokio::test]
    async fn successful_buy_sets_pending_and_price() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, mut rx) = controller(client.clone(), scripted(true, false)).await;

        let action = ctl.tick().await;
        assert!(matches!(action, TickAction::Bought(ref r) if (r.amount - 50.0).abs() < 1e-9));
        assert!(ctl.orders_pending());
        assert_eq!(ctl.buy_price(), 0.02);
        // State only moves once the next check observes the fill.
        assert_eq!(ctl.state(), TradingState::Buying);

        let board = board(&mut rx);
        assert_eq!(board.get(keys::STATUS).unwrap().to_string(), "Buying at 0.02000000");
        assert_eq!(board.get(keys::POLICY).unwrap().to_string(), "scripted");
    }

    #[tokio::test]
    async fn cleared_order_moves_to_selling() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;

        ctl.tick().await;
        assert_eq!(ctl.tick().await, TickAction::OrdersCleared);
        assert_eq!(ctl.state(), TradingState::Selling);
        assert!(!ctl.orders_pending());
    }

    #[tokio::test]
    async fn no_new_order_while_orders_open() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;

        ctl.tick().await;
        client.open.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            assert_eq!(ctl.tick().await, TickAction::AwaitingOrders);
        }
        assert!(ctl.orders_pending());
        assert_eq!(client.inner.balance("BTC").await, 0.0);
    }

    #[tokio::test]
    async fn unchanged_state_after_clearing_is_a_cancel() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;

        ctl.tick().await;
        // Simulate the exchange undoing the fill.
        client.inner.set_balance("BTC", 1.0).await;
        client.inner.set_balance("ETH", 0.0).await;

        assert_eq!(ctl.tick().await, TickAction::OrderCanceled);
        assert_eq!(ctl.state(), TradingState::Buying);
        assert!(!ctl.orders_pending());
    }

    #[tokio::test]
    async fn sell_records_profit_and_cleans_up_policy() {
        let client = exchange(0.0, 10.0, 0.02).await;
        let clean_ups = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let policy = Box::new(Scripted {
            buy: false,
            sell: true,
            clean_ups: clean_ups.clone(),
        });
        let (mut ctl, mut rx) = controller(client.clone(), policy).await;

        // First tick adopts the ticker as the entry price, then sells.
        let action = ctl.tick().await;
        let TickAction::Sold { profit_pct, .. } = &action else {
            panic!("expected a sell, got {action:?}");
        };
        let profit_pct = *profit_pct;
        assert!(profit_pct.abs() < 1e-9);
        assert_eq!(ctl.sell_price(), 0.02);
        assert!(ctl.orders_pending());
        assert_eq!(clean_ups.load(Ordering::SeqCst), 1);

        let board = board(&mut rx);
        assert!(board
            .get(keys::STATUS)
            .unwrap()
            .to_string()
            .starts_with("Selling at 0.02000000"));
    }

    #[tokio::test]
    async fn order_failure_changes_nothing_and_is_reported() {
        let client = exchange(1.0, 0.0, 0.02).await;
        client.fail_orders.store(true, Ordering::SeqCst);
        let (mut ctl, mut rx) = controller(client.clone(), scripted(true, false)).await;

        assert_eq!(ctl.tick().await, TickAction::Failed);
        assert!(!ctl.orders_pending());
        assert_eq!(ctl.state(), TradingState::Buying);
        assert_eq!(client.inner.balance("BTC").await, 1.0);
        assert!(board(&mut rx).get(keys::ERROR).is_some());

        // Retried on the next tick once the exchange recovers.
        client.fail_orders.store(false, Ordering::SeqCst);
        assert!(matches!(ctl.tick().await, TickAction::Bought(_)));
    }

    #[tokio::test]
    async fn ticker_failure_keeps_last_price() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, mut rx) = controller(client.clone(), scripted(false, false)).await;

        ctl.tick().await;
        client.fail_ticker.store(true, Ordering::SeqCst);
        client.inner.set_price(PAIR, 0.05).await;
        assert_eq!(ctl.tick().await, TickAction::Hold);
        assert_eq!(ctl.current_price(), Some(0.02));
        assert!(board(&mut rx).get(keys::ERROR).is_some());
    }

    #[tokio::test]
    async fn failed_state_check_while_pending_keeps_state() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;

        ctl.tick().await;
        client.fail_balances.store(true, Ordering::SeqCst);
        assert_eq!(ctl.tick().await, TickAction::Failed);
        assert!(ctl.orders_pending());
        assert_eq!(ctl.state(), TradingState::Buying);
    }

    #[tokio::test]
    async fn idle_account_takes_no_action() {
        let (mut ctl, mut rx) =
            controller(exchange(0.0, 0.0, 0.02).await, scripted(true, true)).await;
        assert_eq!(ctl.tick().await, TickAction::Idle);
        assert_eq!(
            board(&mut rx).get(keys::STATUS).unwrap().to_string(),
            "Account Balance is Empty"
        );
    }

    #[tokio::test]
    async fn deposit_moves_idle_account_to_buying() {
        let client = exchange(0.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;
        assert_eq!(ctl.tick().await, TickAction::Idle);

        client.inner.set_balance("BTC", 1.0).await;
        assert!(matches!(ctl.tick().await, TickAction::Bought(_)));
        assert_eq!(ctl.state(), TradingState::Buying);
    }

    #[tokio::test]
    async fn withdrawal_moves_buying_account_to_idle() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, mut rx) = controller(client.clone(), scripted(false, false)).await;
        assert_eq!(ctl.tick().await, TickAction::Hold);

        client.inner.set_balance("BTC", 0.0).await;
        assert_eq!(ctl.tick().await, TickAction::Idle);
        assert_eq!(ctl.state(), TradingState::Idle);
        assert_eq!(
            board(&mut rx).get(keys::ACCOUNT_BALANCE).unwrap().to_string(),
            ""
        );
    }

    #[tokio::test]
    async fn open_order_found_while_not_pending_blocks_trading() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(true, false)).await;

        client.open.store(true, Ordering::SeqCst);
        assert_eq!(ctl.tick().await, TickAction::AwaitingOrders);
        assert!(ctl.orders_pending());
        assert_eq!(client.inner.balance("BTC").await, 1.0);
    }

    #[tokio::test]
    async fn balance_poll_failure_keeps_last_state() {
        let client = exchange(0.0, 3.0, 0.02).await;
        let (mut ctl, mut rx) = controller(client.clone(), scripted(false, false)).await;

        client.fail_balances.store(true, Ordering::SeqCst);
        assert_eq!(ctl.tick().await, TickAction::Hold);
        assert_eq!(ctl.state(), TradingState::Selling);
        assert!(board(&mut rx)
            .get(keys::ERROR)
            .unwrap()
            .to_string()
            .starts_with("balances:"));
    }

    #[tokio::test]
    async fn first_tick_error_reaches_the_board() {
        let client = exchange(1.0, 0.0, 0.02).await;
        client.fail_ticker.store(true, Ordering::SeqCst);
        let (mut ctl, mut rx) = controller(client, scripted(false, false)).await;

        // initialize() cleared the error key just before this failure.
        ctl.tick().await;
        assert!(board(&mut rx)
            .get(keys::ERROR)
            .unwrap()
            .to_string()
            .starts_with("ticker:"));
    }

    #[tokio::test]
    async fn unsupported_unit_yields_empty_series_and_error() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (publisher, mut rx) = StatusChannel::new(64);
        let mut cfg = settings();
        cfg.period_unit = PeriodUnit::Unsupported("WEEKS".into());
        let mut ctl =
            TradingController::new(cfg, client, Box::new(policy::BollingerPolicy::new(Default::default())), publisher);
        ctl.initialize().await.unwrap();

        assert_eq!(ctl.tick().await, TickAction::Hold);
        assert!(ctl.candlesticks().is_empty());
        let error = board(&mut rx).get(keys::ERROR).unwrap().to_string();
        assert!(error.starts_with("candles: Configuration error"), "got {error}");
        assert!(error.contains("WEEKS"));
    }

    #[tokio::test]
    async fn candles_refresh_on_their_own_countdown() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (mut ctl, _) = controller(client.clone(), scripted(false, false)).await;

        ctl.tick().await;
        assert_eq!(ctl.candlesticks().len(), 4);
        client
            .inner
            .push_candle(
                PAIR,
                Candle {
                    date: Utc::now().timestamp(),
                    open: 0.05,
                    high: 0.05,
                    low: 0.05,
                    close: 0.05,
                    volume: 1.0,
                },
            )
            .await;
        // Poll interval is 1s against a 300s candle period.
        ctl.tick().await;
        assert_eq!(ctl.candlesticks().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let client = exchange(1.0, 0.0, 0.02).await;
        let (publisher, mut rx) = StatusChannel::new(64);
        let ctl = TradingController::new(settings(), client, scripted(false, false), publisher);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(ctl.run(stop_rx));
        tokio::time::sleep(Duration::from_secs(3)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("timeout")
            .unwrap();
        assert!(board(&mut rx).get(keys::UPTIME).is_some());
    }

    #[test]
    fn profit_is_relative_to_buy_price() {
        assert!((profit_percent(100.0, 110.0) - 10.0).abs() < 1e-9);
        assert!((profit_percent(100.0, 89.0) + 11.0).abs() < 1e-9);
        assert_eq!(profit_percent(0.0, 5.0), 0.0);
    }

    #[test]
    fn uptime_formats_hours_minutes_seconds() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(format_uptime(Duration::from_secs(90_000)), "25:00:00");
    }
}
