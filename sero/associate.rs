//! Stage 4: Association Testing.
//!
//! For every antigen, three independent tests relate the log10, cutoff-imputed
//! antibody level to a covariate:
//!
//! - Age: Spearman correlation with age in months.
//! - Exposure: Spearman correlation with square-root force of infection.
//! - Infection status: Welch t-test against the infection marker, in the mode
//!   chosen by `InfectionTest`.
//!
//! Each family of p-values is Bonferroni-adjusted on its own. Antigens are
//! tested in parallel; results are collected in panel order.

use crate::config::{AnalysisConfig, InfectionTest};
use crate::stats::{TestOutcome, bonferroni, complete_pairs, spearman_test, welch_t_test};
use crate::types::CohortTable;
use ndarray::ArrayView1;
use rayon::prelude::*;
use std::fmt;

/// One family of per-antigen tests sharing a multiplicity correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestFamily {
    Age,
    Exposure,
    InfectionStatus,
}

impl TestFamily {
    pub const ALL: [TestFamily; 3] = [
        TestFamily::Age,
        TestFamily::Exposure,
        TestFamily::InfectionStatus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TestFamily::Age => "age",
            TestFamily::Exposure => "exposure",
            TestFamily::InfectionStatus => "infection_status",
        }
    }

    /// Name of the statistic the family reports.
    pub fn statistic_name(self) -> &'static str {
        match self {
            TestFamily::Age | TestFamily::Exposure => "spearman_rho",
            TestFamily::InfectionStatus => "welch_t",
        }
    }
}

impl fmt::Display for TestFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of one test for one antigen.
#[derive(Debug, Clone, PartialEq)]
pub struct AntigenAssociation {
    pub antigen: String,
    pub family: TestFamily,
    pub outcome: TestOutcome,
    pub adjusted_p: Option<f64>,
}

impl AntigenAssociation {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.adjusted_p.is_some_and(|p| p < alpha)
    }
}

/// Panel-wide rollup of one test family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyRollup {
    pub family: TestFamily,
    /// Antigens with a defined statistic.
    pub n_tested: usize,
    pub n_undefined: usize,
    pub n_significant: usize,
    /// Significant antigens as a percentage of the whole panel.
    pub percent_significant: f64,
}

#[derive(Debug, Clone)]
pub struct AssociationReport {
    /// Family-major, panel order within each family.
    pub records: Vec<AntigenAssociation>,
    pub rollups: Vec<FamilyRollup>,
    pub infection_test: InfectionTest,
    pub significance_level: f64,
}

impl AssociationReport {
    pub fn family(&self, family: TestFamily) -> impl Iterator<Item = &AntigenAssociation> {
        self.records.iter().filter(move |r| r.family == family)
    }

    pub fn rollup(&self, family: TestFamily) -> Option<&FamilyRollup> {
        self.rollups.iter().find(|r| r.family == family)
    }
}

/// Covariates aligned with the cohort rows, shared by every antigen's tests.
struct Covariates {
    age_months: Vec<Option<f64>>,
    sqrt_foi: Vec<Option<f64>>,
    infection_marker: Vec<Option<f64>>,
}

fn correlate(covariate: &[Option<f64>], levels: ArrayView1<'_, f64>) -> TestOutcome {
    let (x, y) = complete_pairs(covariate.iter().copied(), levels.iter().map(|v| Some(*v)));
    spearman_test(&x, &y)
}

/// Infection-status test for one antigen under the configured reading.
pub fn infection_status_test(
    mode: InfectionTest,
    marker: &[Option<f64>],
    levels: ArrayView1<'_, f64>,
) -> TestOutcome {
    match mode {
        InfectionTest::Literal => {
            let antibody: Vec<f64> = levels.iter().copied().filter(|v| v.is_finite()).collect();
            let markers: Vec<f64> = marker
                .iter()
                .flatten()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            welch_t_test(&antibody, &markers)
        }
        InfectionTest::Grouped { threshold } => {
            let mut infected = Vec::new();
            let mut uninfected = Vec::new();
            for (status, level) in marker.iter().zip(levels.iter()) {
                match status {
                    Some(value) if value.is_finite() && *value > threshold => {
                        infected.push(*level)
                    }
                    Some(value) if value.is_finite() => uninfected.push(*level),
                    _ => {}
                }
            }
            welch_t_test(&infected, &uninfected)
        }
    }
}

fn rollup(
    family: TestFamily,
    records: &[AntigenAssociation],
    panel_size: usize,
    alpha: f64,
) -> FamilyRollup {
    let n_tested = records.iter().filter(|r| r.outcome.p_value().is_some()).count();
    let n_significant = records.iter().filter(|r| r.is_significant(alpha)).count();
    FamilyRollup {
        family,
        n_tested,
        n_undefined: records.len() - n_tested,
        n_significant,
        percent_significant: if panel_size == 0 {
            0.0
        } else {
            100.0 * n_significant as f64 / panel_size as f64
        },
    }
}

/// Runs the three test families over every antigen of the cohort table.
pub fn run_association_battery(table: &CohortTable, analysis: &AnalysisConfig) -> AssociationReport {
    let covariates = Covariates {
        age_months: table.age_months(),
        sqrt_foi: table.sqrt_force_of_infection(),
        infection_marker: table.infection_marker(),
    };
    if analysis.infection_test == InfectionTest::Literal {
        log::warn!(
            "Infection-status test compares antibody levels against the continuous marker vector itself; \
             results are reported as computed but should be confirmed against a binary grouping"
        );
    }

    let outcomes: Vec<[TestOutcome; 3]> = (0..table.panel.len())
        .into_par_iter()
        .map(|index| {
            let levels = table.antigen_levels(index);
            [
                correlate(&covariates.age_months, levels),
                correlate(&covariates.sqrt_foi, levels),
                infection_status_test(analysis.infection_test, &covariates.infection_marker, levels),
            ]
        })
        .collect();

    let mut records = Vec::with_capacity(outcomes.len() * TestFamily::ALL.len());
    let mut rollups = Vec::with_capacity(TestFamily::ALL.len());
    for (slot, family) in TestFamily::ALL.into_iter().enumerate() {
        let raw: Vec<Option<f64>> = outcomes.iter().map(|o| o[slot].p_value()).collect();
        let adjusted = bonferroni(&raw);

        let family_records: Vec<AntigenAssociation> = table
            .panel
            .ids()
            .iter()
            .zip(&outcomes)
            .zip(adjusted)
            .map(|((antigen, outcome), adjusted_p)| AntigenAssociation {
                antigen: antigen.clone(),
                family,
                outcome: outcome[slot],
                adjusted_p,
            })
            .collect();

        for record in &family_records {
            if let TestOutcome::Undefined(reason) = record.outcome {
                log::warn!(
                    "{family} test for antigen '{}' is undefined: {reason}",
                    record.antigen
                );
            }
        }

        let summary = rollup(
            family,
            &family_records,
            table.panel.len(),
            analysis.significance_level,
        );
        log::info!(
            "{family}: {}/{} antigens significant after Bonferroni ({:.1}%)",
            summary.n_significant,
            table.panel.len(),
            summary.percent_significant
        );
        rollups.push(summary);
        records.extend(family_records);
    }

    AssociationReport {
        records,
        rollups,
        infection_test: analysis.infection_test,
        significance_level: analysis.significance_level,
    }
}

/// Short human-readable note for an undefined outcome.
pub fn outcome_note(outcome: &TestOutcome) -> String {
    match outcome {
        TestOutcome::Defined(_) => String::new(),
        TestOutcome::Undefined(reason) => format!("undefined: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::DegenerateInput;
    use crate::types::{AntigenPanel, Participant};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn participant(id: usize, age_months: f64, sqrt_foi: Option<f64>, marker: f64) -> Participant {
        Participant {
            id: format!("P{id}"),
            age_days: Some(age_months * 30.42),
            age_years: None,
            age_months: Some(age_months),
            infection_marker: Some(marker),
            force_of_infection: sqrt_foi.map(|v| v * v),
            sqrt_force_of_infection: sqrt_foi,
            lifetime_exposure: None,
        }
    }

    fn cohort(levels: Array2<f64>, antigens: &[&str]) -> CohortTable {
        let participants = (0..levels.nrows())
            .map(|i| {
                let sqrt_foi = if i == 0 { None } else { Some(i as f64 * 0.1) };
                participant(i, 6.0 + i as f64, sqrt_foi, if i % 2 == 0 { 1.0 } else { 0.0 })
            })
            .collect();
        CohortTable {
            participants,
            panel: AntigenPanel::new(antigens.iter().map(|a| a.to_string()).collect()),
            levels,
        }
    }

    #[test]
    fn families_are_reported_in_panel_order_with_adjustment() {
        let levels = array![
            [0.1, 2.0, 0.5],
            [0.2, 1.8, 0.5],
            [0.3, 1.5, 0.5],
            [0.4, 1.1, 0.5],
            [0.5, 0.9, 0.5],
            [0.6, 0.2, 0.5],
        ];
        let table = cohort(levels, &["A1", "A2", "A3"]);
        let report = run_association_battery(&table, &AnalysisConfig::default());

        assert_eq!(report.records.len(), 9);
        let age: Vec<&AntigenAssociation> = report.family(TestFamily::Age).collect();
        assert_eq!(age[0].antigen, "A1");
        assert_abs_diff_eq!(age[0].outcome.statistic().unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(age[1].outcome.statistic().unwrap(), -1.0, epsilon = 1e-12);
        // The constant antigen is undefined and excluded from the family size.
        assert_eq!(
            age[2].outcome,
            TestOutcome::Undefined(DegenerateInput::ZeroVariance)
        );
        assert_eq!(age[2].adjusted_p, None);

        let rollup = report.rollup(TestFamily::Age).unwrap();
        assert_eq!(rollup.n_tested, 2);
        assert_eq!(rollup.n_undefined, 1);
        assert_eq!(rollup.n_significant, 2);
        assert_abs_diff_eq!(rollup.percent_significant, 200.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn exposure_test_uses_complete_pairs_only() {
        let levels = array![[5.0], [0.1], [0.2], [0.3], [0.4]];
        let table = cohort(levels, &["A1"]);
        let report = run_association_battery(&table, &AnalysisConfig::default());
        let exposure: Vec<&AntigenAssociation> = report.family(TestFamily::Exposure).collect();
        let TestOutcome::Defined(stat) = exposure[0].outcome else {
            panic!("expected a defined exposure statistic");
        };
        // Participant 0 has no exposure value, so its outlying level is ignored.
        assert_eq!(stat.n, 4);
        assert_abs_diff_eq!(stat.statistic, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn grouped_infection_test_splits_on_threshold() {
        let levels = array![[3.0], [1.0], [3.2], [1.1], [2.9], [0.9]];
        let table = cohort(levels.clone(), &["A1"]);
        let marker = table.infection_marker();

        let grouped = infection_status_test(
            InfectionTest::Grouped { threshold: 0.5 },
            &marker,
            levels.column(0),
        );
        let direct = welch_t_test(&[3.0, 3.2, 2.9], &[1.0, 1.1, 0.9]);
        assert_eq!(grouped, direct);
        assert!(grouped.statistic().unwrap() > 0.0);
    }

    #[test]
    fn literal_infection_test_compares_the_two_vectors() {
        let levels = array![[3.0], [1.0], [3.2], [1.1]];
        let table = cohort(levels.clone(), &["A1"]);
        let marker = table.infection_marker();
        let literal = infection_status_test(InfectionTest::Literal, &marker, levels.column(0));
        let direct = welch_t_test(&[3.0, 1.0, 3.2, 1.1], &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(literal, direct);
    }

    #[test]
    fn grouped_test_with_one_group_is_undefined() {
        let levels = array![[3.0], [1.0]];
        let marker = vec![Some(1.0), Some(2.0)];
        let outcome = infection_status_test(
            InfectionTest::Grouped { threshold: 0.0 },
            &marker,
            levels.column(0),
        );
        assert!(matches!(
            outcome,
            TestOutcome::Undefined(DegenerateInput::TooFewObservations { .. })
        ));
        assert_eq!(outcome_note(&outcome), "undefined: too few observations (0 < 2)");
    }
}
