pub mod bollinger;
pub mod indicators;
pub mod registry;
pub mod zone;

pub use bollinger::{BollingerParams, BollingerPolicy};
pub use registry::PolicyRegistry;
pub use zone::{ZoneParams, ZonePolicy};

use common::{CurrencyPair, PeriodUnit};

/// Immutable snapshot handed to a policy on every evaluation.
///
/// Built fresh by the trading controller each tick; policies must not
/// retain it.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub pair: &'a CurrencyPair,
    /// Candle closing prices, oldest first.
    pub candlesticks: &'a [f64],
    /// Last traded price from the ticker.
    pub current_price: f64,
    /// Price of the last completed buy (0 when unknown).
    pub buy_price: f64,
    /// Price of the last completed sell (0 when unknown).
    pub sell_price: f64,
    /// Rolling window size, in candles.
    pub measurement_period: usize,
    pub period_unit: &'a PeriodUnit,
}

/// All trading policies must satisfy this trait.
pub trait Policy: Send + Sync {
    /// Identifier this policy was registered under.
    fn name(&self) -> &str;

    /// Should the whole principal balance be spent on the subject now?
    fn should_buy(&self, ctx: &PolicyContext<'_>) -> bool;

    /// Should the whole subject balance be sold now?
    ///
    /// Takes `&mut self` because exit rules may track state across calls
    /// while a position is held.
    fn should_sell(&mut self, ctx: &PolicyContext<'_>) -> bool;

    /// Reset per-position state after a completed sell.
    fn clean_up(&mut self, ctx: &PolicyContext<'_>);
}
