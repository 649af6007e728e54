//! Tab-separated summary tables. Each row type mirrors one line of output, with
//! the antigen or participant identifier carried as an explicit key column.

use crate::associate::{AssociationReport, outcome_note};
use crate::cutoff::{AntigenSeroreactivity, ParticipantSeroreactivity};
use crate::stats::TestOutcome;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
struct AntigenRow<'a> {
    antigen: &'a str,
    cutoff: f64,
    n_observed: usize,
    n_seroreactive: usize,
    n_below: usize,
    proportion_seroreactive: f64,
}

#[derive(Debug, Serialize)]
struct ParticipantRow<'a> {
    participant_id: &'a str,
    n_reactive_antigens: usize,
    proportion_reactive: f64,
}

#[derive(Debug, Serialize)]
struct AssociationRow<'a> {
    antigen: &'a str,
    family: &'static str,
    statistic_name: &'static str,
    statistic: Option<f64>,
    p_value: Option<f64>,
    adjusted_p_value: Option<f64>,
    n: Option<usize>,
    significant: bool,
    note: String,
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>, csv::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = BufWriter::new(File::create(path)?);
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_writer(file))
}

pub fn write_antigen_summary(
    path: &Path,
    antigens: &[AntigenSeroreactivity],
) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    for antigen in antigens {
        writer.serialize(AntigenRow {
            antigen: &antigen.antigen,
            cutoff: antigen.cutoff,
            n_observed: antigen.n_observed,
            n_seroreactive: antigen.n_seroreactive,
            n_below: antigen.n_below,
            proportion_seroreactive: antigen.proportion,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_participant_summary(
    path: &Path,
    participants: &[ParticipantSeroreactivity],
) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    for participant in participants {
        writer.serialize(ParticipantRow {
            participant_id: &participant.participant_id,
            n_reactive_antigens: participant.n_reactive,
            proportion_reactive: participant.proportion,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the tidy association table: one row per antigen per test family.
pub fn write_associations(path: &Path, report: &AssociationReport) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    for record in &report.records {
        let defined = match record.outcome {
            TestOutcome::Defined(stat) => Some(stat),
            TestOutcome::Undefined(_) => None,
        };
        writer.serialize(AssociationRow {
            antigen: &record.antigen,
            family: record.family.label(),
            statistic_name: record.family.statistic_name(),
            statistic: defined.map(|s| s.statistic),
            p_value: defined.map(|s| s.p_value),
            adjusted_p_value: record.adjusted_p,
            n: defined.map(|s| s.n),
            significant: record.is_significant(report.significance_level),
            note: outcome_note(&record.outcome),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::associate::{AntigenAssociation, TestFamily};
    use crate::config::InfectionTest;
    use crate::stats::{DegenerateInput, TestStatistic};
    use tempfile::tempdir;

    #[test]
    fn association_table_marks_undefined_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("associations.tsv");
        let report = AssociationReport {
            records: vec![
                AntigenAssociation {
                    antigen: "AMA1".to_string(),
                    family: TestFamily::Age,
                    outcome: TestOutcome::Defined(TestStatistic {
                        statistic: 0.5,
                        p_value: 0.01,
                        n: 10,
                    }),
                    adjusted_p: Some(0.02),
                },
                AntigenAssociation {
                    antigen: "CSP".to_string(),
                    family: TestFamily::Age,
                    outcome: TestOutcome::Undefined(DegenerateInput::ZeroVariance),
                    adjusted_p: None,
                },
            ],
            rollups: Vec::new(),
            infection_test: InfectionTest::Literal,
            significance_level: 0.05,
        };

        write_associations(&path, &report).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "antigen\tfamily\tstatistic_name\tstatistic\tp_value\tadjusted_p_value\tn\tsignificant\tnote"
        );
        assert_eq!(lines[1], "AMA1\tage\tspearman_rho\t0.5\t0.01\t0.02\t10\ttrue\t");
        assert_eq!(
            lines[2],
            "CSP\tage\tspearman_rho\t\t\t\t\tfalse\tundefined: zero variance"
        );
    }

    #[test]
    fn antigen_summary_has_one_row_per_antigen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("antigen_seroreactivity.tsv");
        let antigens = vec![AntigenSeroreactivity {
            antigen: "AMA1".to_string(),
            cutoff: 0.5,
            n_observed: 4,
            n_seroreactive: 3,
            n_below: 1,
            proportion: 0.75,
        }];
        write_antigen_summary(&path, &antigens).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "antigen\tcutoff\tn_observed\tn_seroreactive\tn_below\tproportion_seroreactive\nAMA1\t0.5\t4\t3\t1\t0.75\n"
        );
    }
}
