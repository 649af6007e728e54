//! Family-wise multiple-comparison correction.

/// Bonferroni adjustment: each defined p-value is multiplied by the number of
/// defined p-values in the family and capped at 1. Undefined entries stay
/// undefined and do not count toward the family size.
pub fn bonferroni(p_values: &[Option<f64>]) -> Vec<Option<f64>> {
    let family_size = p_values.iter().filter(|p| p.is_some()).count() as f64;
    p_values
        .iter()
        .map(|p| p.map(|value| (value * family_size).min(1.0)))
        .collect()
}
