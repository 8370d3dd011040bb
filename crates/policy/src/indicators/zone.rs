use super::{mean, sample_std};

/// Upper and lower "zones" one standard deviation away from the mean of
/// the whole window, each `height` standard deviations tall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zones {
    pub mean: f64,
    pub std: f64,
    pub upper_floor: f64,
    pub upper_ceil: f64,
    pub lower_ceil: f64,
    pub lower_floor: f64,
}

impl Zones {
    /// Single pass over `closes`. `None` below two values.
    pub fn compute(closes: &[f64], height: f64) -> Option<Self> {
        let mean = mean(closes)?;
        let std = sample_std(closes)?;

        let upper_floor = mean + std;
        let lower_ceil = mean - std;
        Some(Self {
            mean,
            std,
            upper_floor,
            upper_ceil: upper_floor + std * height,
            lower_ceil,
            lower_floor: lower_ceil - std * height,
        })
    }

    /// Price at `threshold` (0..=1) of the way up through the upper zone.
    pub fn upper_trigger(&self, threshold: f64) -> f64 {
        self.upper_floor + (self.upper_ceil - self.upper_floor) * threshold
    }

    /// Price at `threshold` (0..=1) of the way down through the lower zone.
    pub fn lower_trigger(&self, threshold: f64) -> f64 {
        self.lower_ceil - (self.lower_ceil - self.lower_floor) * threshold
    }
}
