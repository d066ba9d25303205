use std::cmp::Ordering;

use crate::report::{DurationStats, DurationValues};

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// `p`-th percentile of an ascending slice, linearly interpolated between
/// the two nearest order statistics (rank = p/100 * (n - 1)).
///
/// Returns `None` for an empty slice.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted {
        [] => None,
        [only] => Some(*only),
        _ => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
        }
    }
}

/// Summarizes duration samples. The samples are sorted first so the result
/// does not depend on the order they were collected in.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(mut samples: Vec<f64>) -> DurationStats {
    samples.retain(|v| v.is_finite());
    samples.sort_by(|a, b| cmp_f64(*a, *b));

    let values = match (samples.first(), samples.last()) {
        (Some(&min), Some(&max)) => {
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            Some(DurationValues {
                min,
                max,
                // Summation error can land a ulp outside [min, max].
                mean: mean.clamp(min, max),
                median: percentile(&samples, 50.0).unwrap_or(min),
                p90: percentile(&samples, 90.0).unwrap_or(max),
            })
        }
        _ => None,
    };

    DurationStats {
        samples: samples.len(),
        values,
    }
}
