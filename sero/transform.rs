//! Stage 2: Transformation.
//!
//! Resolves the antigen panel from the antibody columns, converts raw
//! measurements to log10, and derives lifetime exposure.

use crate::config::PipelineConfig;
use crate::types::{AntigenPanel, AssembledCohort, MeasurementColumn, Participant, TransformedCohort};
use ahash::{AHashMap, AHashSet};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("Antigen '{0}' is listed in the panel but is not a column of the antibody table.")]
    AntigenColumnMissing(String),
    #[error("Antigen '{0}' is listed in the panel more than once.")]
    DuplicateAntigen(String),
    #[error("The antigen panel has {found} antigens, but {expected} were expected.")]
    AntigenCount { found: usize, expected: usize },
}

/// log10 of a raw measurement. Non-positive and missing values are missing.
pub fn log10_level(raw: Option<f64>) -> Option<f64> {
    raw.filter(|value| *value > 0.0)
        .map(f64::log10)
        .filter(|value| value.is_finite())
}

pub fn log10_column(raw: &[Option<f64>]) -> Vec<Option<f64>> {
    raw.iter().map(|value| log10_level(*value)).collect()
}

/// Age in years times force of infection; missing unless both operands are present.
pub fn lifetime_exposure(participant: &Participant) -> Option<f64> {
    match (participant.age_years, participant.force_of_infection) {
        (Some(age), Some(foi)) => Some(age * foi),
        _ => None,
    }
}

/// Chooses the antigen columns: the explicit panel when configured, otherwise
/// every measurement column not on the exclusion list.
pub fn resolve_panel(
    measurements: &[MeasurementColumn],
    config: &PipelineConfig,
) -> Result<AntigenPanel, TransformError> {
    let panel_config = &config.panel;
    let excluded: AHashSet<&str> = panel_config
        .excluded_columns
        .iter()
        .map(String::as_str)
        .collect();

    let ids: Vec<String> = match &panel_config.antigens {
        Some(antigens) => {
            let available: AHashSet<&str> =
                measurements.iter().map(|c| c.name.as_str()).collect();
            let mut seen = AHashSet::with_capacity(antigens.len());
            for antigen in antigens {
                if !available.contains(antigen.as_str()) {
                    return Err(TransformError::AntigenColumnMissing(antigen.clone()));
                }
                if !seen.insert(antigen.as_str()) {
                    return Err(TransformError::DuplicateAntigen(antigen.clone()));
                }
            }
            antigens
                .iter()
                .filter(|antigen| !excluded.contains(antigen.as_str()))
                .cloned()
                .collect()
        }
        None => measurements
            .iter()
            .map(|column| column.name.clone())
            .filter(|name| !excluded.contains(name.as_str()))
            .collect(),
    };

    let dropped = measurements.len().saturating_sub(ids.len());
    if dropped > 0 {
        log::info!("Dropped {dropped} non-antigen columns from the antibody table");
    }

    if ids.len() != panel_config.expected_antigens {
        return Err(TransformError::AntigenCount {
            found: ids.len(),
            expected: panel_config.expected_antigens,
        });
    }
    Ok(AntigenPanel::new(ids))
}

/// Runs the transformation stage.
pub fn transform(
    assembled: AssembledCohort,
    config: &PipelineConfig,
) -> Result<TransformedCohort, TransformError> {
    let panel = resolve_panel(&assembled.measurements, config)?;

    let mut by_name: AHashMap<String, Vec<Option<f64>>> = assembled
        .measurements
        .into_iter()
        .map(|column| (column.name, column.values))
        .collect();

    let mut log_levels = Vec::with_capacity(panel.len());
    let mut non_positive = 0usize;
    for antigen in panel.ids() {
        let raw = by_name
            .remove(antigen)
            .ok_or_else(|| TransformError::AntigenColumnMissing(antigen.clone()))?;
        let logged = log10_column(&raw);
        non_positive += raw
            .iter()
            .zip(&logged)
            .filter(|(r, l)| r.is_some() && l.is_none())
            .count();
        log_levels.push(logged);
    }
    if non_positive > 0 {
        log::info!("{non_positive} non-positive measurements set to missing before imputation");
    }

    let participants = assembled
        .participants
        .into_iter()
        .map(|mut participant| {
            participant.lifetime_exposure = lifetime_exposure(&participant);
            participant
        })
        .collect();

    Ok(TransformedCohort {
        participants,
        panel,
        log_levels,
    })
}
