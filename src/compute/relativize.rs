//! Normalization used to put rewards and distances on a comparable scale.

/// Relativize a signal so it can be used as the base of an exponent.
///
/// The values are standardized to zero mean and unit variance, then the
/// positive side is compressed logarithmically and the negative side
/// exponentially:
///
/// - `z > 0` maps to `1 + ln(1 + z)`
/// - `z <= 0` maps to `exp(z)`
///
/// Both branches meet at 1.0, the mapping is strictly increasing and every
/// output is strictly positive for finite input. A constant signal carries no
/// information and maps to all ones.
pub fn relativize(values: &[f64]) -> Vec<f64> {
    let (mean, std) = mean_std(values);
    if std == 0.0 {
        return vec![1.0; values.len()];
    }
    values
        .iter()
        .map(|&x| {
            let z = (x - mean) / std;
            if z > 0.0 { 1.0 + z.ln_1p() } else { z.exp() }
        })
        .collect()
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Summary statistics of a batch of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub min: f64,
}

impl Statistics {
    pub fn from_values(values: &[f64]) -> Self {
        let (mean, std) = mean_std(values);
        Self {
            mean,
            std,
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}
