//! Reporting surface: flat summary tables, ranked bar charts and the Markdown
//! run report. Nothing here computes a statistic; it only renders what the
//! pipeline stages produced.

pub mod chart;
pub mod markdown;
pub mod summary;
pub mod tables;

pub use chart::{RankedBar, render_ranked_bars};
pub use markdown::{ReportInputs, render_report};
pub use summary::Distribution;
