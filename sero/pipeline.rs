//! # The Seroreactivity & Association Pipeline
//!
//! Conducts the four stages in order and owns the output directory layout.
//! Control flow is strictly linear: assembly, transformation, cutoff and
//! classification, association testing. Any integrity fault returns an error
//! before a single output file is written.

use crate::assemble::{AssemblyError, assemble};
use crate::associate::{AssociationReport, run_association_battery};
use crate::config::{ConfigError, PipelineConfig};
use crate::cutoff::{Classification, CutoffError, classify_cohort};
use crate::io::{self, TableError};
use crate::report::{self, ReportInputs};
use crate::transform::{TransformError, transform};
use crate::types::{AntibodyTable, CohortTable, EpidemiologyRecord, ExposureRecord};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COHORT_TABLE_FILE: &str = "cohort_table.csv";
pub const ANTIGEN_SUMMARY_FILE: &str = "antigen_seroreactivity.tsv";
pub const PARTICIPANT_SUMMARY_FILE: &str = "participant_seroreactivity.tsv";
pub const ASSOCIATIONS_FILE: &str = "associations.tsv";
pub const REPORT_FILE: &str = "report.md";
pub const CONFIG_FILE: &str = "run_config.toml";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Input table error: {0}")]
    Table(#[from] TableError),
    #[error("Data integrity error during assembly: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("Data integrity error during transformation: {0}")]
    Transform(#[from] TransformError),
    #[error("Data integrity error during cutoff computation: {0}")]
    Cutoff(#[from] CutoffError),
    #[error("Failed to write summary table: {0}")]
    Summary(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths of the three input tables.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub epidemiology: PathBuf,
    pub antibody: PathBuf,
    pub exposure: PathBuf,
}

/// The three input tables after reading, before any stage has run.
#[derive(Debug, Clone)]
pub struct InputTables {
    pub epidemiology: Vec<EpidemiologyRecord>,
    pub exposure: Vec<ExposureRecord>,
    pub antibody: AntibodyTable,
}

/// The cohort table with everything derived from it.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub table: CohortTable,
    pub classification: Classification,
    pub associations: AssociationReport,
}

/// Where `write_outputs` put each artifact.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub cohort_table: PathBuf,
    pub antigen_summary: PathBuf,
    pub participant_summary: PathBuf,
    pub associations: PathBuf,
    pub report: PathBuf,
    pub config: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cohort_table: dir.join(COHORT_TABLE_FILE),
            antigen_summary: dir.join(ANTIGEN_SUMMARY_FILE),
            participant_summary: dir.join(PARTICIPANT_SUMMARY_FILE),
            associations: dir.join(ASSOCIATIONS_FILE),
            report: dir.join(REPORT_FILE),
            config: dir.join(CONFIG_FILE),
        }
    }
}

pub fn load_inputs(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
) -> Result<InputTables, PipelineError> {
    Ok(InputTables {
        epidemiology: io::load_epidemiology(&inputs.epidemiology, config)?,
        exposure: io::load_exposure(&inputs.exposure, config)?,
        antibody: io::load_antibody(&inputs.antibody, config)?,
    })
}

/// Stages 1 to 3: everything up to and including the persisted cohort table.
pub fn prepare(
    tables: &InputTables,
    config: &PipelineConfig,
) -> Result<(CohortTable, Classification), PipelineError> {
    config.validate()?;

    log::info!("Stage 1/4: assembling cohort");
    let assembled = assemble(&tables.epidemiology, &tables.exposure, &tables.antibody, config)?;

    log::info!("Stage 2/4: log10 transformation");
    let transformed = transform(assembled, config)?;

    log::info!("Stage 3/4: cutoffs and seroreactivity");
    let (table, classification) = classify_cohort(transformed)?;
    Ok((table, classification))
}

/// Runs all four stages on tables already in memory.
pub fn analyze(
    tables: &InputTables,
    config: &PipelineConfig,
) -> Result<PipelineOutcome, PipelineError> {
    let (table, classification) = prepare(tables, config)?;

    log::info!("Stage 4/4: association testing");
    let associations = run_association_battery(&table, &config.analysis);

    Ok(PipelineOutcome {
        table,
        classification,
        associations,
    })
}

/// Reads the inputs from disk and runs all four stages.
pub fn run(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
) -> Result<PipelineOutcome, PipelineError> {
    let tables = load_inputs(inputs, config)?;
    analyze(&tables, config)
}

/// Persists every artifact of a finished run into `out_dir`.
pub fn write_outputs(
    outcome: &PipelineOutcome,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<OutputPaths, PipelineError> {
    fs::create_dir_all(out_dir)?;
    let paths = OutputPaths::in_dir(out_dir);

    io::write_cohort_table(
        &paths.cohort_table,
        &outcome.table,
        &config.columns.participant_id,
    )?;
    report::tables::write_antigen_summary(
        &paths.antigen_summary,
        &outcome.classification.antigens,
    )?;
    report::tables::write_participant_summary(
        &paths.participant_summary,
        &outcome.classification.participants,
    )?;
    report::tables::write_associations(&paths.associations, &outcome.associations)?;

    let rendered = report::render_report(&ReportInputs {
        table: &outcome.table,
        classification: &outcome.classification,
        associations: &outcome.associations,
    });
    fs::write(&paths.report, rendered)?;
    config.save(&paths.config)?;

    log::info!("Wrote all outputs to '{}'", out_dir.display());
    Ok(paths)
}
