//! Human-readable run summaries and manifest status.

use std::fmt::Write;

use iscr_core::RunManifest;
use iscr_fetch::YearLink;

use crate::pipeline::RunReport;

pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run summary for {}", report.year);
    let _ = writeln!(out, "  discovered  {}", report.discovered);
    let _ = writeln!(out, "  skipped     {}", report.skipped);
    let _ = writeln!(out, "  classified  {}", report.classified);
    let _ = writeln!(out, "  failed      {}", report.failed.len());

    if !report.failed.is_empty() {
        let width = report
            .failed
            .iter()
            .map(|f| f.case_id.len())
            .max()
            .unwrap_or(0);
        let _ = writeln!(out, "\nFailed cases:");
        for f in &report.failed {
            let _ = writeln!(
                out,
                "  {:<width$}  {:<8}  {}",
                f.case_id,
                f.stage.as_str(),
                f.reason
            );
        }
    }

    if report.interrupted {
        let _ = writeln!(
            out,
            "\nRun interrupted: {} case(s) not started; re-run to resume.",
            report.not_started
        );
    }
    out
}

pub fn render_status(manifest: &RunManifest) -> String {
    let counts = manifest.counts();
    let mut out = String::new();
    let _ = writeln!(out, "Manifest for {}: {} cases", manifest.year, counts.total());
    for (label, n) in [
        ("pending", counts.pending),
        ("fetched", counts.fetched),
        ("extracted", counts.extracted),
        ("classified", counts.classified),
        ("failed", counts.failed),
    ] {
        let _ = writeln!(out, "  {label:<11} {n}");
    }

    let failures: Vec<_> = manifest.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailed cases:");
        for (case_id, failure) in failures {
            let _ = writeln!(out, "  {case_id}  {:<8}  {}", failure.stage.as_str(), failure.reason);
        }
    }
    out
}

pub fn render_years(years: &[YearLink]) -> String {
    let mut out = String::new();
    for y in years {
        let _ = writeln!(out, "{}  {}", y.year, y.url);
    }
    out
}
