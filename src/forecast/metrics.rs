//! Forecast error metrics.

/// Mean squared error. Returns NaN for empty or mismatched inputs.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    sum / actual.len() as f64
}

/// Mean absolute error. Returns NaN for empty or mismatched inputs.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    sum / actual.len() as f64
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Scores of one model on one held-out block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl Scores {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        Self {
            mse: mse(actual, predicted),
            mae: mae(actual, predicted),
            rmse: rmse(actual, predicted),
        }
    }
}
