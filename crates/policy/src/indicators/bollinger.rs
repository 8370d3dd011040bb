use super::{mean, sample_std};

/// Rolling SMA with upper and lower bands at two standard deviations.
///
/// All three series have the same length: one entry per full window,
/// i.e. `closes.len() - period + 1`. Positions where the window is not yet
/// full are dropped, never zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerBands {
    pub sma: Vec<f64>,
    pub upperband: Vec<f64>,
    pub lowerband: Vec<f64>,
}

impl BollingerBands {
    pub const WIDTH: f64 = 2.0;

    /// Compute bands over `closes` (oldest first) with a window of `period`.
    /// Empty when `period < 2` or there are fewer closes than `period`.
    pub fn compute(closes: &[f64], period: usize) -> Self {
        if period < 2 || closes.len() < period {
            return Self::default();
        }

        let mut bands = Self {
            sma: Vec::with_capacity(closes.len() - period + 1),
            upperband: Vec::with_capacity(closes.len() - period + 1),
            lowerband: Vec::with_capacity(closes.len() - period + 1),
        };

        for window in closes.windows(period) {
            // Both are Some: the window holds at least two values.
            let (Some(sma), Some(std)) = (mean(window), sample_std(window)) else {
                continue;
            };
            bands.sma.push(sma);
            bands.upperband.push(sma + Self::WIDTH * std);
            bands.lowerband.push(sma - Self::WIDTH * std);
        }

        bands
    }

    pub fn len(&self) -> usize {
        self.sma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma.is_empty()
    }

    pub fn sma_slope(&self) -> Option<f64> {
        last_slope(&self.sma)
    }

    pub fn upperband_slope(&self) -> Option<f64> {
        last_slope(&self.upperband)
    }

    pub fn lowerband_slope(&self) -> Option<f64> {
        last_slope(&self.lowerband)
    }
}

/// Difference between the last two entries.
fn last_slope(series: &[f64]) -> Option<f64> {
    match series {
        [.., prev, last] => Some(last - prev),
        _ => None,
    }
}
