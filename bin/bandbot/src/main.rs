use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{BotFileConfig, Config, ExchangeClient, TradingMode};
use engine::{run_display, LogSink, PoloniexClient, StatusChannel, TerminalSink, TradingController};
use paper::PaperClient;
use policy::PolicyRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, "Bandbot starting");

    let bot = BotFileConfig::load(&cfg.bot_config_path)
        .with_context(|| format!("loading bot config from {}", cfg.bot_config_path))?;
    let pair = bot.trader.pair();

    // ── Policy ────────────────────────────────────────────────────────────────
    let registry = PolicyRegistry::with_builtin();
    let policy = registry.build(&bot.policy).with_context(|| {
        format!("available policies: {}", registry.names().join(", "))
    })?;

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(pair = %pair, "Live trading mode -> PoloniexClient");
            Arc::new(PoloniexClient::new(&cfg.api_key, &cfg.api_secret)?)
        }
        TradingMode::Paper => {
            info!(
                pair = %pair,
                principal = cfg.paper_principal_balance,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode -> PaperClient over live market data"
            );
            let market = Arc::new(PoloniexClient::new(&cfg.api_key, &cfg.api_secret)?);
            let balances = HashMap::from([(pair.principal.clone(), cfg.paper_principal_balance)]);
            Arc::new(PaperClient::new(balances, cfg.paper_slippage_bps).with_market(market))
        }
    };

    // ── Status channel ────────────────────────────────────────────────────────
    let (publisher, receiver) = StatusChannel::new(bot.trader.status_queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = bot.trader.display_refresh();

    let display = if std::io::stdout().is_terminal() {
        tokio::spawn(run_display(receiver, TerminalSink::stdout(), refresh, shutdown_rx.clone()))
    } else {
        tokio::spawn(run_display(receiver, LogSink::new(), refresh, shutdown_rx.clone()))
    };

    // ── Trader ────────────────────────────────────────────────────────────────
    let controller = TradingController::new(bot.trader, exchange, policy, publisher);
    let trader = tokio::spawn(controller.run(shutdown_rx));

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping.");

    shutdown_tx.send(true)?;
    trader.await?;
    display.await?;
    Ok(())
}
