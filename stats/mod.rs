//! # Hypothesis Tests
//!
//! Small, dependency-light implementations of the tests the association stage
//! runs per antigen. Inputs are plain slices of finite values; pairing and
//! missing-value handling happen in `complete_pairs` before a test is called.
//!
//! A test never panics on degenerate input. It returns `TestOutcome::Undefined`
//! with the reason, so one bad antigen cannot abort a batch.

pub mod multiplicity;
pub mod rank;
pub mod spearman;
pub mod ttest;

pub use multiplicity::bonferroni;
pub use rank::average_ranks;
pub use spearman::spearman_test;
pub use ttest::welch_t_test;

use std::fmt;

/// Why a statistic could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegenerateInput {
    TooFewObservations { found: usize, required: usize },
    ZeroVariance,
    InvalidDistribution,
}

impl fmt::Display for DegenerateInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewObservations { found, required } => {
                write!(f, "too few observations ({found} < {required})")
            }
            Self::ZeroVariance => f.write_str("zero variance"),
            Self::InvalidDistribution => f.write_str("invalid reference distribution"),
        }
    }
}

/// A computed test statistic with its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestStatistic {
    pub statistic: f64,
    pub p_value: f64,
    /// Number of observations the statistic was computed from.
    pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestOutcome {
    Defined(TestStatistic),
    Undefined(DegenerateInput),
}

impl TestOutcome {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            TestOutcome::Defined(stat) => Some(stat.p_value),
            TestOutcome::Undefined(_) => None,
        }
    }

    pub fn statistic(&self) -> Option<f64> {
        match self {
            TestOutcome::Defined(stat) => Some(stat.statistic),
            TestOutcome::Undefined(_) => None,
        }
    }
}

/// Keeps the positions where both values are present and finite.
pub fn complete_pairs<X, Y>(x: X, y: Y) -> (Vec<f64>, Vec<f64>)
where
    X: IntoIterator<Item = Option<f64>>,
    Y: IntoIterator<Item = Option<f64>>,
{
    x.into_iter()
        .zip(y)
        .filter_map(|pair| match pair {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a, b)),
            _ => None,
        })
        .unzip()
}

/// Sample mean and unbiased variance; `None` for fewer than two values.
pub(crate) fn mean_and_variance(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((mean, ss / (n - 1) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn complete_pairs_drops_missing_on_either_side() {
        let (x, y) = complete_pairs(
            vec![Some(1.0), None, Some(3.0), Some(f64::INFINITY)],
            vec![Some(10.0), Some(20.0), None, Some(40.0)],
        );
        assert_eq!(x, vec![1.0]);
        assert_eq!(y, vec![10.0]);
    }

    #[test]
    fn mean_and_variance_matches_hand_computation() {
        let (mean, var) = mean_and_variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_abs_diff_eq!(mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var, 32.0 / 7.0, epsilon = 1e-12);
        assert!(mean_and_variance(&[1.0]).is_none());
    }
}
