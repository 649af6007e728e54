//! # Pipeline Configuration
//!
//! Every constant the pipeline depends on lives here: input column names, the
//! cohort filter, unit conversion factors, the expected panel and cohort sizes,
//! and the statistical settings. The configuration is a plain serde struct that
//! round-trips through TOML, so a finished run can persist exactly what it used.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Days per month used to convert age-in-days to age-in-months.
pub const DEFAULT_DAYS_PER_MONTH: f64 = 30.42;
/// Days per year used when no age-in-years column is supplied.
pub const DEFAULT_DAYS_PER_YEAR: f64 = 365.25;
/// Size of the assayed antigen panel.
pub const DEFAULT_EXPECTED_ANTIGENS: usize = 342;
/// Size of the analysis cohort after filtering.
pub const DEFAULT_EXPECTED_PARTICIPANTS: usize = 183;
/// Adjusted p-value threshold used for the significance rollups.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Configuration value '{field}' is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Names of the columns read from the three input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnNames {
    /// Participant identifier shared by all three tables.
    pub participant_id: String,
    pub age_days: String,
    /// Age in years. When `None` it is derived from `age_days`.
    pub age_years: Option<String>,
    pub infection_marker: String,
    pub force_of_infection: String,
    /// Square-root transformed force of infection. When the column is absent
    /// from the exposure table the transform is computed.
    pub sqrt_force_of_infection: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            participant_id: "Pv.code".to_string(),
            age_days: "age_days".to_string(),
            age_years: None,
            infection_marker: "pvldr1".to_string(),
            force_of_infection: "molFOB".to_string(),
            sqrt_force_of_infection: "sqrt_molFOB".to_string(),
        }
    }
}

/// Categorical filter selecting the analysis cohort from the epidemiology table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CohortFilter {
    pub column: String,
    pub keep: String,
    /// When set, any category outside this list is an integrity fault.
    pub allowed_values: Option<Vec<String>>,
    /// Number of participants the filtered cohort must contain.
    pub expected_participants: usize,
}

impl Default for CohortFilter {
    fn default() -> Self {
        Self {
            column: "cohort".to_string(),
            keep: "KEEP".to_string(),
            allowed_values: None,
            expected_participants: DEFAULT_EXPECTED_PARTICIPANTS,
        }
    }
}

impl CohortFilter {
    pub fn keeps(&self, category: &str) -> bool {
        category == self.keep
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    /// Explicit antigen identifier set. When `None`, every antibody column that
    /// is neither the participant id nor excluded forms the panel.
    pub antigens: Option<Vec<String>>,
    /// Columns of the antibody table that are upstream artifacts, not antigens.
    pub excluded_columns: Vec<String>,
    /// Number of antigens the resolved panel must contain.
    pub expected_antigens: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            antigens: None,
            excluded_columns: Vec::new(),
            expected_antigens: DEFAULT_EXPECTED_ANTIGENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitConfig {
    pub days_per_month: f64,
    pub days_per_year: f64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            days_per_month: DEFAULT_DAYS_PER_MONTH,
            days_per_year: DEFAULT_DAYS_PER_YEAR,
        }
    }
}

/// How the infection-status test relates antibody level to the infection marker.
///
/// The marker is continuous, so "comparing antibody level against infection
/// status" has two readings. `Literal` runs a Welch two-sample test of the
/// antibody vector against the marker vector itself. `Grouped` first splits the
/// cohort into infected (`marker > threshold`) and uninfected participants and
/// compares antibody levels between those groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InfectionTest {
    #[default]
    Literal,
    Grouped { threshold: f64 },
}

impl InfectionTest {
    pub fn describe(&self) -> String {
        match self {
            InfectionTest::Literal => {
                "literal: Welch t-test of antibody level against the raw infection marker vector"
                    .to_string()
            }
            InfectionTest::Grouped { threshold } => format!(
                "grouped: Welch t-test of antibody level between marker > {threshold} and marker <= {threshold}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub significance_level: f64,
    pub infection_test: InfectionTest,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            infection_test: InfectionTest::default(),
        }
    }
}

/// The complete, self-describing configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Field separator of the three input tables.
    pub delimiter: char,
    pub columns: ColumnNames,
    pub cohort: CohortFilter,
    pub panel: PanelConfig,
    pub units: UnitConfig,
    pub analysis: AnalysisConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            columns: ColumnNames::default(),
            cohort: CohortFilter::default(),
            panel: PanelConfig::default(),
            units: UnitConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a TOML file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::InvalidValue {
                field: "delimiter",
                reason: format!("'{}' is not a single-byte character", self.delimiter),
            });
        }

        let required_names = [
            ("columns.participant_id", &self.columns.participant_id),
            ("columns.age_days", &self.columns.age_days),
            ("columns.infection_marker", &self.columns.infection_marker),
            ("columns.force_of_infection", &self.columns.force_of_infection),
            ("columns.sqrt_force_of_infection", &self.columns.sqrt_force_of_infection),
            ("cohort.column", &self.cohort.column),
        ];
        for (field, name) in required_names {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "column name must not be empty".to_string(),
                });
            }
        }

        if let Some(allowed) = &self.cohort.allowed_values {
            if !allowed.iter().any(|value| value == &self.cohort.keep) {
                return Err(ConfigError::InvalidValue {
                    field: "cohort.allowed_values",
                    reason: format!("keep value '{}' is not an allowed category", self.cohort.keep),
                });
            }
        }

        for (field, value) in [
            ("units.days_per_month", self.units.days_per_month),
            ("units.days_per_year", self.units.days_per_year),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("expected a positive finite number, found {value}"),
                });
            }
        }

        let alpha = self.analysis.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "analysis.significance_level",
                reason: format!("expected a value in (0, 1), found {alpha}"),
            });
        }

        if let InfectionTest::Grouped { threshold } = self.analysis.infection_test {
            if !threshold.is_finite() {
                return Err(ConfigError::InvalidValue {
                    field: "analysis.infection_test.threshold",
                    reason: format!("expected a finite threshold, found {threshold}"),
                });
            }
        }

        if self.cohort.expected_participants == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cohort.expected_participants",
                reason: "an empty cohort cannot be analysed".to_string(),
            });
        }
        if self.panel.expected_antigens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "panel.expected_antigens",
                reason: "an empty antigen panel cannot be analysed".to_string(),
            });
        }

        Ok(())
    }
}
