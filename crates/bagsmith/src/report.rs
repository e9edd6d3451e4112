//! Report rendering.

use anyhow::Result;
use bagsmith_schema::{Severity, ValidationReport};
use std::fmt::Write;

/// Render a validation report as `json` or plain text.
pub fn render_report(report: &ValidationReport, bag: &str, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(report)?),
        _ => Ok(render_text(report, bag)),
    }
}

fn render_text(report: &ValidationReport, bag: &str) -> String {
    let mut out = String::new();
    let status = if report.cancelled {
        "CANCELLED"
    } else if report.passed {
        "PASSED"
    } else {
        "FAILED"
    };
    let _ = writeln!(out, "Bag: {bag}");
    let _ = writeln!(out, "Status: {status}");
    let _ = writeln!(
        out,
        "Errors: {}  Warnings: {}",
        report.error_count(),
        report.warning_count()
    );

    for (title, severity) in [("Errors", Severity::Error), ("Warnings", Severity::Warning)] {
        let findings: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect();
        if findings.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{title}:");
        for finding in findings {
            let location = if finding.path.is_empty() {
                String::new()
            } else {
                format!(" {}", finding.path)
            };
            let _ = writeln!(
                out,
                "  - {}{}: {}",
                finding.kind, location, finding.message
            );
        }
    }
    out
}
