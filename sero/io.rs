//! # Table Input and Output
//!
//! The three input tables are read with the polars CSV reader and converted into
//! the typed records of `types`. The only persisted artifact, the cohort table,
//! is written back out with polars and can be read again into an equivalent
//! in-memory `CohortTable`.
//!
//! - Nullable by construction: empty fields and `NA` become `None`. A column
//!   whose values cannot be read as numbers is a user-input error, not a
//!   missing value.
//! - Identifiers are read as text whatever their inferred type, so numeric
//!   participant codes survive unchanged.

use crate::config::PipelineConfig;
use crate::types::{
    AntibodyTable, AntigenPanel, CohortTable, EpidemiologyRecord, ExposureRecord,
    MeasurementColumn, Participant,
};
use ahash::AHashSet;
use ndarray::Array2;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Column names of the persisted cohort table besides the participant id and antigens.
pub const AGE_DAYS_FIELD: &str = "age_days";
pub const AGE_YEARS_FIELD: &str = "age_years";
pub const AGE_MONTHS_FIELD: &str = "age_months";
pub const INFECTION_MARKER_FIELD: &str = "infection_marker";
pub const FORCE_OF_INFECTION_FIELD: &str = "force_of_infection";
pub const SQRT_FORCE_OF_INFECTION_FIELD: &str = "sqrt_force_of_infection";
pub const LIFETIME_EXPOSURE_FIELD: &str = "lifetime_exposure";

const COVARIATE_FIELDS: [&str; 7] = [
    AGE_DAYS_FIELD,
    AGE_YEARS_FIELD,
    AGE_MONTHS_FIELD,
    INFECTION_MARKER_FIELD,
    FORCE_OF_INFECTION_FIELD,
    SQRT_FORCE_OF_INFECTION_FIELD,
    LIFETIME_EXPOSURE_FIELD,
];

/// Strings read as missing values in every input column.
const NULL_MARKERS: [&str; 2] = ["NA", "NaN"];

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to read table header: {0}")]
    HeaderError(#[from] csv::Error),
    #[error("The required column '{column}' was not found in '{table}'. Please check spelling and case.")]
    ColumnNotFound { table: String, column: String },
    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Participant identifier column '{0}' contains missing values.")]
    MissingParticipantId(String),
    #[error("Participant identifier '{id}' appears more than once in '{table}'.")]
    DuplicateParticipant { table: String, id: String },
    #[error("Cohort table '{0}' has no antigen columns.")]
    NoAntigenColumns(String),
}

/// Reads the header row only, so identifier columns can be pinned to text
/// before polars infers their type.
fn read_header(path: &Path, delimiter: u8) -> Result<Vec<String>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

/// Reads a delimited text file into a DataFrame with missing-value markers
/// applied. Columns named in `text_columns` are read as strings whatever their
/// content, so codes such as `007` are not parsed as integers.
pub fn read_frame(
    path: &Path,
    delimiter: u8,
    text_columns: &[&str],
) -> Result<DataFrame, TableError> {
    log::debug!("Reading table from '{}'", path.display());
    let header = read_header(path, delimiter)?;
    let mut pinned = Schema::with_capacity(text_columns.len());
    for name in header.iter().filter(|name| text_columns.contains(&name.as_str())) {
        pinned.with_column(name.as_str().into(), DataType::String);
    }

    let null_values = NullValues::AllColumns(NULL_MARKERS.iter().map(|m| (*m).into()).collect());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_schema_overwrite(Some(Arc::new(pinned)))
                .with_parse_options(
                    CsvParseOptions::default()
                        .with_separator(delimiter)
                        .with_null_values(Some(null_values)),
                ),
        )
        .finish()?;
    log::info!(
        "Loaded '{}': {} rows, {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

fn table_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

fn require_column<'a>(
    df: &'a DataFrame,
    table: &str,
    name: &str,
) -> Result<&'a Column, TableError> {
    if !has_column(df, name) {
        return Err(TableError::ColumnNotFound {
            table: table.to_string(),
            column: name.to_string(),
        });
    }
    Ok(df.column(name)?)
}

/// Extracts a nullable numeric column. Values that are present in the file but
/// cannot be parsed as numbers are rejected rather than silently nulled.
fn extract_optional_f64(
    df: &DataFrame,
    table: &str,
    name: &str,
) -> Result<Vec<Option<f64>>, TableError> {
    let column = require_column(df, table, name)?;
    let casted = column.cast(&DataType::Float64)?;
    if casted.null_count() > column.null_count() {
        return Err(TableError::ColumnWrongType {
            column_name: name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        });
    }
    let values = casted
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect();
    Ok(values)
}

fn extract_optional_text(
    df: &DataFrame,
    table: &str,
    name: &str,
) -> Result<Vec<Option<String>>, TableError> {
    let column = require_column(df, table, name)?;
    let casted = column.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

/// Participant identifiers must be present and unique within a table.
fn extract_participant_ids(
    df: &DataFrame,
    table: &str,
    name: &str,
) -> Result<Vec<String>, TableError> {
    let raw = extract_optional_text(df, table, name)?;
    let mut seen = AHashSet::with_capacity(raw.len());
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let id = match value {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => return Err(TableError::MissingParticipantId(name.to_string())),
        };
        if !seen.insert(id.clone()) {
            return Err(TableError::DuplicateParticipant {
                table: table.to_string(),
                id,
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Loads the epidemiology table.
pub fn load_epidemiology(
    path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<EpidemiologyRecord>, TableError> {
    let columns = &config.columns;
    let df = read_frame(
        path,
        config.delimiter_byte(),
        &[columns.participant_id.as_str(), config.cohort.column.as_str()],
    )?;
    let table = table_label(path);

    let ids = extract_participant_ids(&df, &table, &columns.participant_id)?;
    let age_days = extract_optional_f64(&df, &table, &columns.age_days)?;
    let age_years = match &columns.age_years {
        Some(name) => extract_optional_f64(&df, &table, name)?,
        None => vec![None; ids.len()],
    };
    let markers = extract_optional_f64(&df, &table, &columns.infection_marker)?;
    let categories = extract_optional_text(&df, &table, &config.cohort.column)?;

    let records = ids
        .into_iter()
        .zip(age_days)
        .zip(age_years)
        .zip(markers)
        .zip(categories)
        .map(
            |((((id, age_days), age_years), infection_marker), category)| EpidemiologyRecord {
                id,
                age_days,
                age_years,
                infection_marker,
                category,
            },
        )
        .collect();
    Ok(records)
}

/// Loads the force-of-infection table. The square-root column is optional in
/// the file; when absent it is derived from the force of infection.
pub fn load_exposure(
    path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<ExposureRecord>, TableError> {
    let columns = &config.columns;
    let df = read_frame(path, config.delimiter_byte(), &[columns.participant_id.as_str()])?;
    let table = table_label(path);

    let ids = extract_participant_ids(&df, &table, &columns.participant_id)?;
    let foi = extract_optional_f64(&df, &table, &columns.force_of_infection)?;
    let sqrt_foi = if has_column(&df, &columns.sqrt_force_of_infection) {
        extract_optional_f64(&df, &table, &columns.sqrt_force_of_infection)?
    } else {
        log::info!(
            "Column '{}' not present in '{}'; deriving it from '{}'",
            columns.sqrt_force_of_infection,
            table,
            columns.force_of_infection
        );
        foi.iter()
            .map(|value| value.filter(|v| *v >= 0.0).map(f64::sqrt))
            .collect()
    };

    let records = ids
        .into_iter()
        .zip(foi)
        .zip(sqrt_foi)
        .map(|((id, force_of_infection), sqrt_force_of_infection)| ExposureRecord {
            id,
            force_of_infection,
            sqrt_force_of_infection,
        })
        .collect();
    Ok(records)
}

/// Loads the antibody table. Every column other than the participant id is
/// returned; choosing the antigen panel from them is the transformation stage's job.
pub fn load_antibody(path: &Path, config: &PipelineConfig) -> Result<AntibodyTable, TableError> {
    let id_column = &config.columns.participant_id;
    let df = read_frame(path, config.delimiter_byte(), &[id_column.as_str()])?;
    let table = table_label(path);

    let participant_ids = extract_participant_ids(&df, &table, id_column)?;
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != id_column)
        .collect();

    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let values = extract_optional_f64(&df, &table, &name)?;
        columns.push(MeasurementColumn { name, values });
    }

    Ok(AntibodyTable {
        participant_ids,
        columns,
    })
}

/// Writes the cohort table as comma-separated text. Missing covariates are
/// written as empty fields.
pub fn write_cohort_table(
    path: &Path,
    table: &CohortTable,
    id_column: &str,
) -> Result<(), TableError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let participants = &table.participants;
    let covariate = |field: fn(&Participant) -> Option<f64>| -> Vec<Option<f64>> {
        participants.iter().map(field).collect()
    };

    let mut columns: Vec<Column> = Vec::with_capacity(1 + COVARIATE_FIELDS.len() + table.panel.len());
    columns.push(Column::new(
        id_column.into(),
        participants.iter().map(|p| p.id.clone()).collect::<Vec<String>>(),
    ));
    columns.push(Column::new(AGE_DAYS_FIELD.into(), covariate(|p| p.age_days)));
    columns.push(Column::new(AGE_YEARS_FIELD.into(), covariate(|p| p.age_years)));
    columns.push(Column::new(AGE_MONTHS_FIELD.into(), covariate(|p| p.age_months)));
    columns.push(Column::new(
        INFECTION_MARKER_FIELD.into(),
        covariate(|p| p.infection_marker),
    ));
    columns.push(Column::new(
        FORCE_OF_INFECTION_FIELD.into(),
        covariate(|p| p.force_of_infection),
    ));
    columns.push(Column::new(
        SQRT_FORCE_OF_INFECTION_FIELD.into(),
        covariate(|p| p.sqrt_force_of_infection),
    ));
    columns.push(Column::new(
        LIFETIME_EXPOSURE_FIELD.into(),
        covariate(|p| p.lifetime_exposure),
    ));

    for (index, antigen) in table.panel.ids().iter().enumerate() {
        let levels: Vec<f64> = table.antigen_levels(index).to_vec();
        columns.push(Column::new(antigen.as_str().into(), levels));
    }

    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    log::info!(
        "Wrote cohort table with {} participants and {} antigens to '{}'",
        table.n_participants(),
        table.panel.len(),
        path.display()
    );
    Ok(())
}

/// Reads a cohort table written by `write_cohort_table`. Every column after the
/// fixed covariates is an antigen, in file order.
pub fn read_cohort_table(path: &Path, id_column: &str) -> Result<CohortTable, TableError> {
    let df = read_frame(path, b',', &[id_column])?;
    let table = table_label(path);

    let ids = extract_participant_ids(&df, &table, id_column)?;
    let mut covariates = Vec::with_capacity(COVARIATE_FIELDS.len());
    for field in COVARIATE_FIELDS {
        covariates.push(extract_optional_f64(&df, &table, field)?);
    }

    let participants: Vec<Participant> = ids
        .into_iter()
        .enumerate()
        .map(|(row, id)| Participant {
            id,
            age_days: covariates[0][row],
            age_years: covariates[1][row],
            age_months: covariates[2][row],
            infection_marker: covariates[3][row],
            force_of_infection: covariates[4][row],
            sqrt_force_of_infection: covariates[5][row],
            lifetime_exposure: covariates[6][row],
        })
        .collect();

    let antigen_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != id_column && !COVARIATE_FIELDS.contains(&name.as_str()))
        .collect();
    if antigen_names.is_empty() {
        return Err(TableError::NoAntigenColumns(table));
    }

    let n_rows = participants.len();
    let mut levels = Array2::<f64>::zeros((n_rows, antigen_names.len()));
    for (index, name) in antigen_names.iter().enumerate() {
        let values = extract_optional_f64(&df, &table, name)?;
        for (row, value) in values.into_iter().enumerate() {
            levels[[row, index]] = value.ok_or_else(|| TableError::ColumnWrongType {
                column_name: name.clone(),
                expected_type: "f64 (complete, imputed)",
                found_type: "column with missing values".to_string(),
            })?;
        }
    }

    Ok(CohortTable {
        participants,
        panel: AntigenPanel::new(antigen_names),
        levels,
    })
}
