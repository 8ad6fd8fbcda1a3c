//! Response curves for utility-AI considerations.
//!
//! Every curve accepts an input in `[0, 1]` (clamped first) and returns a
//! value in `[0, 1]` (clamped last).

fn clamp(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// `y = m*x + b`, clamped.
pub fn linear(x: f64, m: f64, b: f64) -> f64 {
    clamp(m * clamp(x) + b)
}

/// Power curve `y = x^exp`.
pub fn quadratic(x: f64, exp: f64) -> f64 {
    clamp(clamp(x).powf(exp))
}

/// Logistic (sigmoid) with steepness `k` around `midpoint`.
pub fn logistic(x: f64, k: f64, midpoint: f64) -> f64 {
    clamp(1.0 / (1.0 + (-k * (clamp(x) - midpoint)).exp()))
}

/// `y = 1 - x^steepness`.
pub fn inverse(x: f64, steepness: f64) -> f64 {
    clamp(1.0 - clamp(x).powf(steepness))
}

/// 0 below `threshold`, 1 at or above.
pub fn step(x: f64, threshold: f64) -> f64 {
    if clamp(x) >= threshold {
        1.0
    } else {
        0.0
    }
}
