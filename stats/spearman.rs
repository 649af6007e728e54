//! Spearman rank correlation with a two-sided p-value.
//!
//! The p-value uses the t approximation `t = rho * sqrt((n - 2) / (1 - rho^2))`
//! on `n - 2` degrees of freedom. It is valid in the presence of ties, which
//! cutoff imputation produces in almost every antigen column.

use super::{DegenerateInput, TestOutcome, TestStatistic, average_ranks};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Minimum number of complete pairs for a defined statistic.
pub const MIN_PAIRS: usize = 3;

/// Pearson correlation; `None` when either input has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

/// Two-sided Spearman test on paired, complete observations.
pub fn spearman_test(x: &[f64], y: &[f64]) -> TestOutcome {
    let n = x.len().min(y.len());
    if n < MIN_PAIRS {
        return TestOutcome::Undefined(DegenerateInput::TooFewObservations {
            found: n,
            required: MIN_PAIRS,
        });
    }

    let rank_x = average_ranks(&x[..n]);
    let rank_y = average_ranks(&y[..n]);
    let Some(rho) = pearson(&rank_x, &rank_y) else {
        return TestOutcome::Undefined(DegenerateInput::ZeroVariance);
    };

    let df = (n - 2) as f64;
    let denominator = 1.0 - rho * rho;
    let p_value = if denominator <= 0.0 {
        0.0
    } else {
        let t = rho * (df / denominator).sqrt();
        let Ok(dist) = StudentsT::new(0.0, 1.0, df) else {
            return TestOutcome::Undefined(DegenerateInput::InvalidDistribution);
        };
        (2.0 * dist.sf(t.abs())).min(1.0)
    };

    TestOutcome::Defined(TestStatistic {
        statistic: rho,
        p_value,
        n,
    })
}
