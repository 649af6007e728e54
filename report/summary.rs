use std::fmt;

/// Five-number style summary of a set of proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub n: usize,
    pub min: f64,
    pub median: f64,
    pub mean: f64,
    pub max: f64,
}

impl Distribution {
    /// Summarizes finite values; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            n,
            min: sorted[0],
            median,
            mean: sorted.iter().sum::<f64>() / n as f64,
            max: sorted[n - 1],
        })
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {:.3}, median {:.3}, mean {:.3}, max {:.3} (n = {})",
            self.min, self.median, self.mean, self.max, self.n
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn odd_and_even_medians() {
        let odd = Distribution::from_values(&[0.9, 0.1, 0.5]).unwrap();
        assert_abs_diff_eq!(odd.median, 0.5);
        assert_abs_diff_eq!(odd.min, 0.1);
        assert_abs_diff_eq!(odd.max, 0.9);
        assert_abs_diff_eq!(odd.mean, 0.5, epsilon = 1e-12);

        let even = Distribution::from_values(&[0.4, 0.1, 0.2, 0.3]).unwrap();
        assert_abs_diff_eq!(even.median, 0.25, epsilon = 1e-12);
        assert_eq!(even.n, 4);
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(Distribution::from_values(&[]).is_none());
        assert!(Distribution::from_values(&[f64::NAN]).is_none());
    }
}
