use tracing::{debug, info};

use crate::indicators::{amplify_gradient, BollingerBands};
use crate::{Policy, PolicyContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerParams {
    /// Amplified SMA and upper-band slopes must both reach this to buy.
    pub min_gradient: f64,
    /// Amplified SMA and lower-band slopes at or below this confirm a downtrend.
    pub sell_gradient: f64,
    /// Percent drop, from entry or from the peak since entry, that forces a sell.
    pub sell_safety_threshold: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            min_gradient: 1.0,
            sell_gradient: 1.0,
            sell_safety_threshold: 10.0,
        }
    }
}

/// Trend-following policy on Bollinger bands.
///
/// Buys on a confirmed uptrend (SMA and upper band both rising). While
/// holding, sells on a stop-loss from the entry price, a trailing stop
/// from the highest price seen since entry, or a confirmed downtrend.
#[derive(Debug, Clone)]
pub struct BollingerPolicy {
    params: BollingerParams,
    /// Highest ticker price seen while holding. Only reset by `clean_up`.
    highest_price: f64,
}

impl BollingerPolicy {
    pub const NAME: &'static str = "bollinger";

    pub fn new(params: BollingerParams) -> Self {
        Self {
            params,
            highest_price: 0.0,
        }
    }

    pub fn params(&self) -> &BollingerParams {
        &self.params
    }

    pub fn highest_price(&self) -> f64 {
        self.highest_price
    }
}

impl Policy for BollingerPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn should_buy(&self, ctx: &PolicyContext<'_>) -> bool {
        let bands = BollingerBands::compute(ctx.candlesticks, ctx.measurement_period);

        let (Some(upper), Some(sma)) = (bands.upperband_slope(), bands.sma_slope()) else {
            debug!(candles = ctx.candlesticks.len(), "Not enough candles for band slopes");
            return false;
        };
        let (Some(upper_gradient), Some(sma_gradient)) =
            (amplify_gradient(upper), amplify_gradient(sma))
        else {
            debug!(upper, sma, "Flat band slope, no buy");
            return false;
        };

        debug!(upper_gradient, sma_gradient, price = ctx.current_price, "Bollinger buy check");

        let threshold = self.params.min_gradient;
        if upper_gradient >= threshold && sma_gradient >= threshold {
            info!(upper_gradient, sma_gradient, "Buy signal: upper band and SMA trending up");
            return true;
        }
        false
    }

    fn should_sell(&mut self, ctx: &PolicyContext<'_>) -> bool {
        let price = ctx.current_price;
        if price > self.highest_price {
            self.highest_price = price;
        }

        let bands = BollingerBands::compute(ctx.candlesticks, ctx.measurement_period);
        let (Some(lower), Some(sma)) = (bands.lowerband_slope(), bands.sma_slope()) else {
            debug!(candles = ctx.candlesticks.len(), "Not enough candles for band slopes");
            return false;
        };

        let safety = self.params.sell_safety_threshold;

        if ctx.buy_price > 0.0 {
            let from_buy = (price / ctx.buy_price * 100.0) - 100.0;
            if from_buy <= -safety {
                info!(from_buy, buy_price = ctx.buy_price, price, "Sell signal: stop-loss from entry");
                return true;
            }
        }

        if self.highest_price > 0.0 {
            let from_peak = 100.0 - (price / self.highest_price * 100.0);
            if from_peak >= safety {
                info!(from_peak, highest = self.highest_price, price, "Sell signal: trailing stop");
                return true;
            }
        }

        if let (Some(lower_gradient), Some(sma_gradient)) =
            (amplify_gradient(lower), amplify_gradient(sma))
        {
            debug!(lower_gradient, sma_gradient, price, "Bollinger sell check");
            let threshold = self.params.sell_gradient;
            if lower_gradient <= threshold && sma_gradient <= threshold {
                info!(lower_gradient, sma_gradient, "Sell signal: lower band and SMA trending down");
                return true;
            }
        }

        false
    }

    fn clean_up(&mut self, _ctx: &PolicyContext<'_>) {
        self.highest_price = 0.0;
    }
}
