//! Metrics derived from a finished report and the submitted source.

use super::types::{AnalysisReport, DerivedMetrics, Severity};
use crate::utils::count_lines;

/// Compute line counts, issue counts by severity, and the improvement rate.
pub fn derive_metrics(report: &AnalysisReport, source_code: &str) -> DerivedMetrics {
    let count_severity = |severity: Severity| {
        report
            .issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    };

    DerivedMetrics {
        lines_of_code: count_lines(source_code),
        non_empty_lines: source_code
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .count(),
        total_issues: report.issues.len(),
        high_severity_issues: count_severity(Severity::High),
        medium_severity_issues: count_severity(Severity::Medium),
        improvement_rate: report.metrics.score.clamp(0.0, 100.0),
    }
}
