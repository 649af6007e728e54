//! The human-readable run report.
//!
//! Rendering is deterministic: the same inputs always produce the same bytes,
//! so a report can be diffed between runs.

use super::chart::{RankedBar, render_ranked_bars};
use super::summary::Distribution;
use crate::associate::{AssociationReport, TestFamily};
use crate::config::InfectionTest;
use crate::cutoff::Classification;
use crate::types::CohortTable;
use itertools::Itertools;
use std::fmt::Write;

/// Number of rows shown in each ranked chart.
pub const CHART_ROWS: usize = 40;
/// Width in characters of a bar at proportion 1.
pub const CHART_WIDTH: usize = 40;

pub struct ReportInputs<'a> {
    pub table: &'a CohortTable,
    pub classification: &'a Classification,
    pub associations: &'a AssociationReport,
}

fn describe_distribution(summary: Option<Distribution>) -> String {
    match summary {
        Some(distribution) => distribution.to_string(),
        None => "no values".to_string(),
    }
}

pub fn render_report(inputs: &ReportInputs<'_>) -> String {
    let ReportInputs {
        table,
        classification,
        associations,
    } = inputs;
    let mut out = String::new();

    let _ = writeln!(out, "# Seroreactivity and association report\n");
    let _ = writeln!(
        out,
        "- Participants in the analysis cohort: {}",
        table.n_participants()
    );
    let _ = writeln!(out, "- Antigens in the panel: {}", table.panel.len());
    let _ = writeln!(
        out,
        "- Significance: Bonferroni-adjusted p < {}\n",
        associations.significance_level
    );

    let antigen_props: Vec<f64> = classification
        .antigens
        .iter()
        .map(|a| a.proportion)
        .collect();
    let participant_props: Vec<f64> = classification
        .participants
        .iter()
        .map(|p| p.proportion)
        .collect();
    let any_reactive = classification
        .antigens
        .iter()
        .filter(|a| a.n_seroreactive > 0)
        .count();

    let _ = writeln!(out, "## Seroreactivity\n");
    let _ = writeln!(
        out,
        "- Per-antigen proportion seroreactive: {}",
        describe_distribution(Distribution::from_values(&antigen_props))
    );
    let _ = writeln!(
        out,
        "- Per-participant proportion of the panel seroreactive: {}",
        describe_distribution(Distribution::from_values(&participant_props))
    );
    let _ = writeln!(
        out,
        "- Antigens with at least one seroreactive participant: {} of {}\n",
        any_reactive,
        table.panel.len()
    );

    let _ = writeln!(out, "## Associations\n");
    let _ = writeln!(
        out,
        "| Family | Statistic | Tested | Undefined | Significant | % of panel |"
    );
    let _ = writeln!(out, "|---|---|---|---|---|---|");
    for family in TestFamily::ALL {
        if let Some(rollup) = associations.rollup(family) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {:.1} |",
                family.label(),
                family.statistic_name(),
                rollup.n_tested,
                rollup.n_undefined,
                rollup.n_significant,
                rollup.percent_significant
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Infection-status test mode: {}.",
        associations.infection_test.describe()
    );
    if associations.infection_test == InfectionTest::Literal {
        let _ = writeln!(
            out,
            "The infection marker is continuous; this mode compares the antibody vector with the \
             marker vector rather than two participant groups. Treat these results as provisional \
             until the grouping is confirmed."
        );
    }
    let _ = writeln!(out);

    for family in TestFamily::ALL {
        let significant = associations
            .family(family)
            .filter(|r| r.is_significant(associations.significance_level))
            .map(|r| r.antigen.as_str())
            .join(", ");
        if !significant.is_empty() {
            let _ = writeln!(out, "Significant for {}: {}\n", family.label(), significant);
        }
    }

    let antigen_bars: Vec<RankedBar> = classification
        .antigens
        .iter()
        .map(|a| RankedBar {
            label: a.antigen.clone(),
            value: a.proportion,
        })
        .collect();
    let participant_bars: Vec<RankedBar> = classification
        .participants
        .iter()
        .map(|p| RankedBar {
            label: p.participant_id.clone(),
            value: p.proportion,
        })
        .collect();

    let _ = writeln!(out, "## Ranked seroreactivity\n");
    let _ = writeln!(out, "```text");
    out.push_str(&render_ranked_bars(
        "Proportion of participants seroreactive, by antigen",
        &antigen_bars,
        CHART_ROWS,
        CHART_WIDTH,
    ));
    let _ = writeln!(out, "```\n");
    let _ = writeln!(out, "```text");
    out.push_str(&render_ranked_bars(
        "Proportion of the panel seroreactive, by participant",
        &participant_bars,
        CHART_ROWS,
        CHART_WIDTH,
    ));
    let _ = writeln!(out, "```");

    out
}
