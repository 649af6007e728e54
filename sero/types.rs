//! Shared data structures passed between the pipeline stages.
//!
//! Missing values are `Option<f64>` throughout. Nothing downstream of the input
//! readers ever encodes "not measured" as NaN, zero, or any other sentinel.

use ndarray::{Array2, ArrayView1};

/// One participant of the analysis cohort with every derived covariate.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub age_days: Option<f64>,
    pub age_years: Option<f64>,
    pub age_months: Option<f64>,
    /// Continuous infection marker, used both as covariate and as status proxy.
    pub infection_marker: Option<f64>,
    pub force_of_infection: Option<f64>,
    pub sqrt_force_of_infection: Option<f64>,
    /// `age_years * force_of_infection`; missing when either operand is missing.
    pub lifetime_exposure: Option<f64>,
}

/// A raw epidemiology row as read from disk, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct EpidemiologyRecord {
    pub id: String,
    pub age_days: Option<f64>,
    pub age_years: Option<f64>,
    pub infection_marker: Option<f64>,
    pub category: Option<String>,
}

/// A force-of-infection row keyed by participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRecord {
    pub id: String,
    pub force_of_infection: Option<f64>,
    pub sqrt_force_of_infection: Option<f64>,
}

/// The antibody table in column-major form. Row `i` of every column belongs to
/// `participant_ids[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AntibodyTable {
    pub participant_ids: Vec<String>,
    pub columns: Vec<MeasurementColumn>,
}

/// One named measurement column, aligned with a participant order held elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// The fixed, ordered set of antigen identifiers analysed in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntigenPanel {
    ids: Vec<String>,
}

impl AntigenPanel {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn contains(&self, antigen: &str) -> bool {
        self.ids.iter().any(|id| id == antigen)
    }
}

/// Output of stage 1: the joined, filtered cohort with raw antibody columns.
#[derive(Debug, Clone)]
pub struct AssembledCohort {
    pub participants: Vec<Participant>,
    /// Every antibody column of the input table, rows aligned with `participants`.
    pub measurements: Vec<MeasurementColumn>,
}

/// Output of stage 2: the antigen panel and its log10 levels.
#[derive(Debug, Clone)]
pub struct TransformedCohort {
    pub participants: Vec<Participant>,
    pub panel: AntigenPanel,
    /// One entry per antigen in panel order, rows aligned with `participants`.
    pub log_levels: Vec<Vec<Option<f64>>>,
}

/// The persisted artifact: participants with their log10, cutoff-imputed
/// antibody levels. `levels` has shape `[participants, antigens]`.
#[derive(Debug, Clone)]
pub struct CohortTable {
    pub participants: Vec<Participant>,
    pub panel: AntigenPanel,
    pub levels: Array2<f64>,
}

impl CohortTable {
    pub fn n_participants(&self) -> usize {
        self.participants.len()
    }

    pub fn antigen_levels(&self, antigen_index: usize) -> ArrayView1<'_, f64> {
        self.levels.column(antigen_index)
    }

    pub fn age_months(&self) -> Vec<Option<f64>> {
        self.participants.iter().map(|p| p.age_months).collect()
    }

    pub fn sqrt_force_of_infection(&self) -> Vec<Option<f64>> {
        self.participants
            .iter()
            .map(|p| p.sqrt_force_of_infection)
            .collect()
    }

    pub fn infection_marker(&self) -> Vec<Option<f64>> {
        self.participants
            .iter()
            .map(|p| p.infection_marker)
            .collect()
    }
}
