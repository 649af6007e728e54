//! Ranked horizontal bar charts rendered as plain text, suitable for a
//! Markdown code block or a terminal.

use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedBar {
    pub label: String,
    /// A proportion in [0, 1].
    pub value: f64,
}

/// Sorts bars by descending value (ties by label) and renders at most
/// `max_rows` of them, each scaled to `width` characters at a value of 1.
pub fn render_ranked_bars(
    title: &str,
    bars: &[RankedBar],
    max_rows: usize,
    width: usize,
) -> String {
    let mut ranked: Vec<&RankedBar> = bars.iter().collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.label.cmp(&b.label)));

    let shown = ranked.len().min(max_rows);
    let label_width = ranked[..shown]
        .iter()
        .map(|bar| bar.label.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    for bar in &ranked[..shown] {
        let clamped = bar.value.clamp(0.0, 1.0);
        let filled = (clamped * width as f64).round() as usize;
        let _ = writeln!(
            out,
            "{:<label_width$} |{:<width$}| {:.3}",
            bar.label,
            "#".repeat(filled),
            bar.value,
        );
    }
    if ranked.len() > shown {
        let _ = writeln!(out, "... {} more not shown", ranked.len() - shown);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(label: &str, value: f64) -> RankedBar {
        RankedBar {
            label: label.to_string(),
            value,
        }
    }

    #[test]
    fn bars_are_ranked_and_scaled() {
        let chart = render_ranked_bars(
            "Seroreactivity",
            &[bar("MSP1", 0.5), bar("AMA1", 1.0), bar("CSP", 0.0)],
            10,
            4,
        );
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], "Seroreactivity");
        assert_eq!(lines[1], "AMA1 |####| 1.000");
        assert_eq!(lines[2], "MSP1 |##  | 0.500");
        assert_eq!(lines[3], "CSP  |    | 0.000");
    }

    #[test]
    fn long_charts_are_truncated() {
        let bars: Vec<RankedBar> = (0..5).map(|i| bar(&format!("A{i}"), i as f64 / 10.0)).collect();
        let chart = render_ranked_bars("t", &bars, 2, 10);
        assert!(chart.contains("A4"));
        assert!(chart.contains("A3"));
        assert!(!chart.contains("A0 "));
        assert!(chart.ends_with("... 3 more not shown\n"));
    }
}
