//! Welch's two-sample t-test (unequal variances), two-sided.

use super::{DegenerateInput, TestOutcome, TestStatistic, mean_and_variance};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Minimum observations per sample.
pub const MIN_GROUP_SIZE: usize = 2;

/// Tests the difference in means of `a` and `b`. The statistic is
/// `(mean(a) - mean(b)) / se` with Welch-Satterthwaite degrees of freedom.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> TestOutcome {
    let smallest = a.len().min(b.len());
    let (Some((mean_a, var_a)), Some((mean_b, var_b))) = (mean_and_variance(a), mean_and_variance(b))
    else {
        return TestOutcome::Undefined(DegenerateInput::TooFewObservations {
            found: smallest,
            required: MIN_GROUP_SIZE,
        });
    };

    let n_a = a.len() as f64;
    let n_b = b.len() as f64;
    let se_a = var_a / n_a;
    let se_b = var_b / n_b;
    let se_squared = se_a + se_b;
    if se_squared <= 0.0 {
        return TestOutcome::Undefined(DegenerateInput::ZeroVariance);
    }

    let t = (mean_a - mean_b) / se_squared.sqrt();
    let df = se_squared.powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));
    let Ok(dist) = StudentsT::new(0.0, 1.0, df) else {
        return TestOutcome::Undefined(DegenerateInput::InvalidDistribution);
    };
    let p_value = (2.0 * dist.sf(t.abs())).min(1.0);

    TestOutcome::Defined(TestStatistic {
        statistic: t,
        p_value,
        n: a.len() + b.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn matches_reference_welch_values() {
        let outcome = welch_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 11.0]);
        let TestOutcome::Defined(stat) = outcome else {
            panic!("expected a defined statistic, got {outcome:?}");
        };
        assert_abs_diff_eq!(stat.statistic, -1.866_277_899_263_374, epsilon = 1e-10);
        assert_abs_diff_eq!(stat.p_value, 0.114_990_160_5, epsilon = 1e-6);
        assert_eq!(stat.n, 10);
    }

    #[test]
    fn separated_groups_are_significant() {
        let outcome = welch_t_test(
            &[5.1, 4.9, 5.6, 5.8, 6.0, 5.5],
            &[4.1, 4.5, 3.9, 4.8, 4.4],
        );
        let TestOutcome::Defined(stat) = outcome else {
            panic!("expected a defined statistic, got {outcome:?}");
        };
        assert_abs_diff_eq!(stat.statistic, 4.941_009_135_829_299, epsilon = 1e-10);
        assert_abs_diff_eq!(stat.p_value, 8.032_855_551e-4, epsilon = 1e-7);
    }

    #[test]
    fn singleton_group_is_undefined() {
        assert_eq!(
            welch_t_test(&[1.0], &[2.0, 3.0]),
            TestOutcome::Undefined(DegenerateInput::TooFewObservations {
                found: 1,
                required: MIN_GROUP_SIZE
            })
        );
    }

    #[test]
    fn constant_groups_are_undefined() {
        assert_eq!(
            welch_t_test(&[1.0, 1.0, 1.0], &[2.0, 2.0]),
            TestOutcome::Undefined(DegenerateInput::ZeroVariance)
        );
    }
}
