//! Stage 1: Data Assembly.
//!
//! Joins the epidemiology rows to their force-of-infection record, restricts both
//! the epidemiology and antibody tables to the analysis cohort, and derives the
//! age fields. The cohort size checks here are part of the stage's contract: a
//! mismatch aborts the run.

use crate::config::PipelineConfig;
use crate::types::{
    AntibodyTable, AssembledCohort, EpidemiologyRecord, ExposureRecord, MeasurementColumn,
    Participant,
};
use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error(
        "Participant '{id}' has cohort category '{found}', which is not one of the allowed categories {allowed:?}."
    )]
    UnexpectedCategory {
        id: String,
        found: String,
        allowed: Vec<String>,
    },
    #[error(
        "After filtering, the epidemiology table has {epidemiology} participants but the antibody table has {antibody}."
    )]
    CohortMismatch { epidemiology: usize, antibody: usize },
    #[error("The analysis cohort has {found} participants, but {expected} were expected.")]
    CohortSize { found: usize, expected: usize },
}

/// Age in months from age in days; missing propagates.
pub fn age_in_months(age_days: Option<f64>, days_per_month: f64) -> Option<f64> {
    age_days.map(|days| days / days_per_month)
}

/// Runs the assembly stage.
pub fn assemble(
    epidemiology: &[EpidemiologyRecord],
    exposures: &[ExposureRecord],
    antibody: &AntibodyTable,
    config: &PipelineConfig,
) -> Result<AssembledCohort, AssemblyError> {
    let cohort = &config.cohort;

    if let Some(allowed) = &cohort.allowed_values {
        for record in epidemiology {
            if let Some(category) = &record.category {
                if !allowed.iter().any(|value| value == category) {
                    return Err(AssemblyError::UnexpectedCategory {
                        id: record.id.clone(),
                        found: category.clone(),
                        allowed: allowed.clone(),
                    });
                }
            }
        }
    }

    let exposure_by_id: AHashMap<&str, &ExposureRecord> = exposures
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();

    let mut unmatched_exposure = 0usize;
    let participants: Vec<Participant> = epidemiology
        .iter()
        .filter(|record| {
            record
                .category
                .as_deref()
                .is_some_and(|category| cohort.keeps(category))
        })
        .map(|record| {
            let exposure = exposure_by_id.get(record.id.as_str());
            if exposure.is_none() {
                unmatched_exposure += 1;
            }
            let age_years = record
                .age_years
                .or_else(|| record.age_days.map(|days| days / config.units.days_per_year));
            Participant {
                id: record.id.clone(),
                age_days: record.age_days,
                age_years,
                age_months: age_in_months(record.age_days, config.units.days_per_month),
                infection_marker: record.infection_marker,
                force_of_infection: exposure.and_then(|e| e.force_of_infection),
                sqrt_force_of_infection: exposure.and_then(|e| e.sqrt_force_of_infection),
                lifetime_exposure: None,
            }
        })
        .collect();

    log::info!(
        "Cohort filter '{}' == '{}' kept {} of {} epidemiology rows",
        cohort.column,
        cohort.keep,
        participants.len(),
        epidemiology.len()
    );
    if unmatched_exposure > 0 {
        log::warn!(
            "{unmatched_exposure} cohort participants have no force-of-infection record; their exposure fields are missing"
        );
    }

    let row_by_id: AHashMap<&str, usize> = antibody
        .participant_ids
        .iter()
        .enumerate()
        .map(|(row, id)| (id.as_str(), row))
        .collect();

    let rows: Vec<usize> = participants
        .iter()
        .filter_map(|participant| row_by_id.get(participant.id.as_str()).copied())
        .collect();

    if rows.len() != participants.len() {
        return Err(AssemblyError::CohortMismatch {
            epidemiology: participants.len(),
            antibody: rows.len(),
        });
    }
    if participants.len() != cohort.expected_participants {
        return Err(AssemblyError::CohortSize {
            found: participants.len(),
            expected: cohort.expected_participants,
        });
    }

    let measurements = antibody
        .columns
        .iter()
        .map(|column| MeasurementColumn {
            name: column.name.clone(),
            values: rows.iter().map(|&row| column.values[row]).collect(),
        })
        .collect();

    Ok(AssembledCohort {
        participants,
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn epi(id: &str, age_days: f64, category: &str) -> EpidemiologyRecord {
        EpidemiologyRecord {
            id: id.to_string(),
            age_days: Some(age_days),
            age_years: None,
            infection_marker: Some(0.0),
            category: Some(category.to_string()),
        }
    }

    fn antibody(ids: &[&str], values: &[f64]) -> AntibodyTable {
        AntibodyTable {
            participant_ids: ids.iter().map(|id| id.to_string()).collect(),
            columns: vec![MeasurementColumn {
                name: "AMA1".to_string(),
                values: values.iter().map(|v| Some(*v)).collect(),
            }],
        }
    }

    fn config(expected: usize) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.cohort.expected_participants = expected;
        config
    }

    #[test]
    fn filters_cohort_and_derives_age_in_months() {
        let records = vec![epi("A", 365.0, "KEEP"), epi("B", 730.0, "DROP")];
        let table = antibody(&["A", "B"], &[0.0, 10.0]);
        let assembled = assemble(&records, &[], &table, &config(1)).unwrap();

        assert_eq!(assembled.participants.len(), 1);
        let participant = &assembled.participants[0];
        assert_eq!(participant.id, "A");
        assert_abs_diff_eq!(participant.age_months.unwrap(), 12.0, epsilon = 0.01);
        assert_abs_diff_eq!(participant.age_years.unwrap(), 365.0 / 365.25, epsilon = 1e-12);
        assert_eq!(assembled.measurements[0].values, vec![Some(0.0)]);
    }

    #[test]
    fn unmatched_exposure_is_missing_not_dropped() {
        let records = vec![epi("A", 365.0, "KEEP"), epi("B", 400.0, "KEEP")];
        let exposures = vec![ExposureRecord {
            id: "B".to_string(),
            force_of_infection: Some(4.0),
            sqrt_force_of_infection: Some(2.0),
        }];
        let table = antibody(&["B", "A"], &[1.0, 2.0]);
        let assembled = assemble(&records, &exposures, &table, &config(2)).unwrap();

        assert_eq!(assembled.participants[0].force_of_infection, None);
        assert_eq!(assembled.participants[0].sqrt_force_of_infection, None);
        assert_eq!(assembled.participants[1].force_of_infection, Some(4.0));
        // Antibody rows follow the epidemiology order, not the antibody file order.
        assert_eq!(assembled.measurements[0].values, vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn missing_antibody_rows_are_an_integrity_fault() {
        let records = vec![epi("A", 365.0, "KEEP"), epi("B", 400.0, "KEEP")];
        let table = antibody(&["A"], &[1.0]);
        let err = assemble(&records, &[], &table, &config(2)).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::CohortMismatch {
                epidemiology: 2,
                antibody: 1
            }
        );
    }

    #[test]
    fn unexpected_cohort_size_is_an_integrity_fault() {
        let records = vec![epi("A", 365.0, "KEEP")];
        let table = antibody(&["A"], &[1.0]);
        let err = assemble(&records, &[], &table, &config(183)).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::CohortSize {
                found: 1,
                expected: 183
            }
        );
    }

    #[test]
    fn categories_outside_the_allowed_set_are_rejected() {
        let records = vec![epi("A", 365.0, "KEEP"), epi("B", 400.0, "MAYBE")];
        let table = antibody(&["A", "B"], &[1.0, 2.0]);
        let mut config = config(1);
        config.cohort.allowed_values = Some(vec!["KEEP".to_string(), "DROP".to_string()]);
        match assemble(&records, &[], &table, &config) {
            Err(AssemblyError::UnexpectedCategory { id, found, .. }) => {
                assert_eq!(id, "B");
                assert_eq!(found, "MAYBE");
            }
            other => panic!("expected UnexpectedCategory, got {other:?}"),
        }
    }

    #[test]
    fn missing_age_propagates_to_months() {
        assert_eq!(age_in_months(None, 30.42), None);
        assert_abs_diff_eq!(age_in_months(Some(60.84), 30.42).unwrap(), 2.0, epsilon = 1e-12);
    }
}
