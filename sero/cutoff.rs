//! Stage 3: Cutoff & Classification.
//!
//! Each antigen gets its own background threshold, half the smallest
//! non-negative log10 level observed for it. Missing levels are imputed at the
//! threshold, and a participant is seroreactive to an antigen only when the
//! level is strictly above it.

use crate::types::{AntigenPanel, CohortTable, Participant, TransformedCohort};
use ndarray::{Array2, Axis};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CutoffError {
    #[error(
        "Antigen '{0}' has no non-negative log10 measurement; its seropositivity cutoff is undefined."
    )]
    NoUsableObservations(String),
    #[error("Antigen '{antigen}' has {found} values but the cohort has {expected} participants.")]
    RaggedColumn {
        antigen: String,
        found: usize,
        expected: usize,
    },
}

/// Half the minimum non-negative value of one antigen's log10 levels.
/// Missing values are ignored. Fails when no value is at or above zero.
pub fn compute_cutoff(antigen: &str, log_levels: &[Option<f64>]) -> Result<f64, CutoffError> {
    log_levels
        .iter()
        .flatten()
        .copied()
        .filter(|value| *value >= 0.0)
        .min_by(f64::total_cmp)
        .map(|minimum| minimum / 2.0)
        .ok_or_else(|| CutoffError::NoUsableObservations(antigen.to_string()))
}

/// Replaces missing levels with the antigen's cutoff.
pub fn impute(log_levels: &[Option<f64>], cutoff: f64) -> Vec<f64> {
    log_levels
        .iter()
        .map(|value| value.unwrap_or(cutoff))
        .collect()
}

/// Seroreactive iff strictly above the cutoff.
pub fn is_seroreactive(level: f64, cutoff: f64) -> bool {
    level > cutoff
}

/// Per-antigen seroreactivity summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AntigenSeroreactivity {
    pub antigen: String,
    pub cutoff: f64,
    /// Participants with a measured (pre-imputation) level.
    pub n_observed: usize,
    pub n_seroreactive: usize,
    pub n_below: usize,
    /// `n_seroreactive / n_observed`.
    pub proportion: f64,
}

/// Per-participant seroreactivity summary over the whole panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSeroreactivity {
    pub participant_id: String,
    pub n_reactive: usize,
    /// `n_reactive / panel size`.
    pub proportion: f64,
}

/// Everything stage 3 derives besides the cohort table itself.
#[derive(Debug, Clone)]
pub struct Classification {
    pub antigens: Vec<AntigenSeroreactivity>,
    pub participants: Vec<ParticipantSeroreactivity>,
    /// `[participants, antigens]` seroreactivity calls.
    pub reactive: Array2<bool>,
}

fn summarize_participants(
    participants: &[Participant],
    reactive: &Array2<bool>,
    panel: &AntigenPanel,
) -> Vec<ParticipantSeroreactivity> {
    let panel_size = panel.len() as f64;
    participants
        .iter()
        .zip(reactive.axis_iter(Axis(0)))
        .map(|(participant, row)| {
            let n_reactive = row.iter().filter(|&&call| call).count();
            ParticipantSeroreactivity {
                participant_id: participant.id.clone(),
                n_reactive,
                proportion: n_reactive as f64 / panel_size,
            }
        })
        .collect()
}

/// Runs the cutoff and classification stage, producing the persisted cohort
/// table and the seroreactivity summaries.
pub fn classify_cohort(
    transformed: TransformedCohort,
) -> Result<(CohortTable, Classification), CutoffError> {
    let TransformedCohort {
        participants,
        panel,
        log_levels,
    } = transformed;
    let n_participants = participants.len();
    let n_antigens = panel.len();

    let mut levels = Array2::<f64>::zeros((n_participants, n_antigens));
    let mut reactive = Array2::from_elem((n_participants, n_antigens), false);
    let mut antigens = Vec::with_capacity(n_antigens);

    for (index, (antigen, column)) in panel.ids().iter().zip(&log_levels).enumerate() {
        if column.len() != n_participants {
            return Err(CutoffError::RaggedColumn {
                antigen: antigen.clone(),
                found: column.len(),
                expected: n_participants,
            });
        }

        let cutoff = compute_cutoff(antigen, column)?;
        let imputed = impute(column, cutoff);
        let n_observed = column.iter().filter(|value| value.is_some()).count();

        let mut n_seroreactive = 0usize;
        for (row, &level) in imputed.iter().enumerate() {
            levels[[row, index]] = level;
            if is_seroreactive(level, cutoff) {
                reactive[[row, index]] = true;
                n_seroreactive += 1;
            }
        }

        log::debug!(
            "Antigen '{antigen}': cutoff {cutoff:.4}, {n_seroreactive}/{n_observed} seroreactive"
        );
        antigens.push(AntigenSeroreactivity {
            antigen: antigen.clone(),
            cutoff,
            n_observed,
            n_seroreactive,
            n_below: n_observed - n_seroreactive,
            proportion: n_seroreactive as f64 / n_observed as f64,
        });
    }

    let participant_summaries = summarize_participants(&participants, &reactive, &panel);
    log::info!(
        "Classified {} participants against {} antigen cutoffs",
        n_participants,
        n_antigens
    );

    let table = CohortTable {
        participants,
        panel,
        levels,
    };
    let classification = Classification {
        antigens,
        participants: participant_summaries,
        reactive,
    };
    Ok((table, classification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            age_days: None,
            age_years: None,
            age_months: None,
            infection_marker: None,
            force_of_infection: None,
            sqrt_force_of_infection: None,
            lifetime_exposure: None,
        }
    }

    #[test]
    fn cutoff_is_half_the_smallest_non_negative_value() {
        let levels = [Some(-0.3), Some(1.2), None, Some(0.4), Some(2.0)];
        assert_abs_diff_eq!(compute_cutoff("AMA1", &levels).unwrap(), 0.2, epsilon = 1e-15);
    }

    #[test]
    fn single_observation_of_one_gives_half() {
        assert_abs_diff_eq!(compute_cutoff("AMA1", &[Some(1.0)]).unwrap(), 0.5);
    }

    #[test]
    fn all_missing_column_has_no_cutoff() {
        assert_eq!(
            compute_cutoff("CSP", &[None, None]),
            Err(CutoffError::NoUsableObservations("CSP".to_string()))
        );
    }

    #[test]
    fn all_negative_column_has_no_cutoff() {
        assert!(compute_cutoff("CSP", &[Some(-1.0), Some(-0.5)]).is_err());
    }

    #[test]
    fn level_equal_to_cutoff_is_not_reactive() {
        assert!(!is_seroreactive(0.5, 0.5));
        assert!(is_seroreactive(0.500001, 0.5));
    }

    #[test]
    fn imputation_leaves_no_missing_value() {
        let imputed = impute(&[None, Some(1.0), None], 0.5);
        assert_eq!(imputed, vec![0.5, 1.0, 0.5]);
    }

    #[test]
    fn classification_counts_are_consistent() {
        let transformed = TransformedCohort {
            participants: vec![participant("A"), participant("B"), participant("C")],
            panel: AntigenPanel::new(vec!["AMA1".to_string(), "MSP1".to_string()]),
            log_levels: vec![
                vec![Some(1.0), None, Some(2.0)],
                vec![Some(0.0), Some(-0.2), Some(3.0)],
            ],
        };
        let (table, classification) = classify_cohort(transformed).unwrap();

        // AMA1: cutoff 0.5, B imputed at 0.5 and not reactive.
        assert_eq!(table.levels.column(0).to_vec(), vec![1.0, 0.5, 2.0]);
        let ama1 = &classification.antigens[0];
        assert_eq!(ama1.n_observed, 2);
        assert_eq!(ama1.n_seroreactive, 2);
        assert_eq!(ama1.n_below, 0);
        assert_abs_diff_eq!(ama1.proportion, 1.0);

        // MSP1: minimum non-negative is 0, so the cutoff is 0.
        let msp1 = &classification.antigens[1];
        assert_eq!(msp1.cutoff, 0.0);
        assert_eq!(msp1.n_observed, 3);
        assert_eq!(msp1.n_seroreactive, 1);
        assert_eq!(msp1.n_seroreactive + msp1.n_below, msp1.n_observed);

        let per_participant: Vec<usize> = classification
            .participants
            .iter()
            .map(|p| p.n_reactive)
            .collect();
        assert_eq!(per_participant, vec![1, 0, 2]);
        assert_abs_diff_eq!(classification.participants[2].proportion, 1.0);
        assert_abs_diff_eq!(classification.participants[0].proportion, 0.5);
        assert!(table.levels.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn undefined_cutoff_aborts_classification() {
        let transformed = TransformedCohort {
            participants: vec![participant("A")],
            panel: AntigenPanel::new(vec!["CSP".to_string()]),
            log_levels: vec![vec![None]],
        };
        assert_eq!(
            classify_cohort(transformed).unwrap_err(),
            CutoffError::NoUsableObservations("CSP".to_string())
        );
    }
}
