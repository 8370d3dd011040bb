use tracing::{debug, info};

use crate::indicators::Zones;
use crate::{Policy, PolicyContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneParams {
    /// Height of each outer zone, in standard deviations.
    pub zone_height: f64,
    /// How far (0..=1) into an outer zone the price must reach to buy.
    pub zone_threshold: f64,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            zone_height: 1.0,
            zone_threshold: 0.5,
        }
    }
}

/// Breakout policy on statistical zones around the window mean.
///
/// Buys when the price pushes far enough into either outer zone. Exits are
/// deliberately conservative: any held position is sold at the next check.
#[derive(Debug, Clone)]
pub struct ZonePolicy {
    params: ZoneParams,
}

impl ZonePolicy {
    pub const NAME: &'static str = "zone";

    pub fn new(params: ZoneParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ZoneParams {
        &self.params
    }
}

impl Policy for ZonePolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn should_buy(&self, ctx: &PolicyContext<'_>) -> bool {
        let Some(zones) = Zones::compute(ctx.candlesticks, self.params.zone_height) else {
            debug!(candles = ctx.candlesticks.len(), "Not enough candles for zones");
            return false;
        };

        let price = ctx.current_price;
        let upper = zones.upper_trigger(self.params.zone_threshold);
        let lower = zones.lower_trigger(self.params.zone_threshold);
        debug!(mean = zones.mean, std = zones.std, upper, lower, price, "Zone buy check");

        if price >= upper {
            info!(price, upper, "Buy signal: price deep in upper zone");
            return true;
        }
        if price <= lower {
            info!(price, lower, "Buy signal: price deep in lower zone");
            return true;
        }
        false
    }

    fn should_sell(&mut self, _ctx: &PolicyContext<'_>) -> bool {
        true
    }

    fn clean_up(&mut self, _ctx: &PolicyContext<'_>) {}
}
