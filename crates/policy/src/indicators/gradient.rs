/// Scale a sub-unit slope so its first significant digit sits before the
/// decimal point, keeping its sign.
///
/// Slopes with magnitude above 1 are returned unchanged, and a magnitude of
/// exactly 1 is scaled to 10. This lets one configured threshold be compared
/// against slopes of instruments priced at very different scales. Returns `None` for zero or non-finite input,
/// which callers treat as non-actionable.
pub fn amplify_gradient(gradient: f64) -> Option<f64> {
    if gradient == 0.0 || !gradient.is_finite() {
        return None;
    }

    let magnitude = gradient.abs();
    if magnitude > 1.0 {
        return Some(gradient);
    }
    if magnitude == 1.0 {
        return Some(gradient * 10.0);
    }

    // Number of places the first significant digit sits after the point.
    let leading = -magnitude.log10().floor() as i32;
    let mut amplified = magnitude * 10f64.powi(leading);

    // log10 can land a hair off at exact powers of ten.
    if amplified >= 10.0 {
        amplified /= 10.0;
    } else if amplified < 1.0 {
        amplified *= 10.0;
    }

    Some(amplified.copysign(gradient))
}
