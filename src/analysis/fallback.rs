//! Fixed reports returned when a model response cannot be used at all.
//!
//! The literal strings here are matched by downstream consumers and must not
//! change.

use std::collections::BTreeMap;

use super::types::{
    AnalysisReport, AnalysisSection, Category, CategoryScore, Issue, MetricsBlock, Severity,
};
use crate::utils::count_lines;

/// Report for a response that was empty after fence stripping.
pub fn empty_response() -> AnalysisReport {
    AnalysisReport {
        analysis: AnalysisSection {
            summary: "Analysis could not be completed due to empty response.".to_string(),
            strengths: vec!["Code structure is readable".to_string()],
            improvements: vec!["Try resubmitting with a different prompt".to_string()],
            categories: uniform_categories(CategoryScore::new(5, 0, 1)),
        },
        metrics: unavailable_metrics(),
        issues: vec![
            fixed_issue(
                1,
                "system",
                Severity::Low,
                "Analysis Unavailable",
                "The AI could not analyze this code properly.".to_string(),
                "Try resubmitting or breaking down the code into smaller segments.",
            ),
            fixed_issue(
                2,
                "general",
                Severity::Medium,
                "Code Review Recommended",
                "While automated analysis is unavailable, manual code review is recommended."
                    .to_string(),
                "Have a senior developer review this code for potential improvements.",
            ),
        ],
    }
}

/// Report for a response that could not be parsed as JSON.
pub fn parse_failure(error: &str) -> AnalysisReport {
    AnalysisReport {
        analysis: AnalysisSection {
            summary: "Analysis encountered JSON parsing issues.".to_string(),
            strengths: vec!["Code structure is present".to_string()],
            improvements: vec!["Try simplifying the code for better analysis".to_string()],
            categories: uniform_categories(CategoryScore::new(5, 0, 1)),
        },
        metrics: unavailable_metrics(),
        issues: vec![
            fixed_issue(
                1,
                "system",
                Severity::Low,
                "Analysis Error",
                format!("JSON parsing failed: {}", error),
                "Try resubmitting with simpler code",
            ),
            fixed_issue(
                2,
                "general",
                Severity::Medium,
                "Manual Review Needed",
                "Automated analysis encountered issues, but manual review can still provide value."
                    .to_string(),
                "Consider having a peer review this code for potential improvements.",
            ),
        ],
    }
}

/// Report for a response that parsed but has an unusable shape (e.g. a
/// top-level array).
pub fn processing_error(source_code: &str, detail: &str) -> AnalysisReport {
    let mut categories = BTreeMap::new();
    categories.insert(Category::Performance, CategoryScore::new(5, 1, 1));
    categories.insert(Category::Security, CategoryScore::new(5, 0, 1));
    categories.insert(Category::Maintainability, CategoryScore::new(5, 1, 1));
    categories.insert(Category::Style, CategoryScore::new(5, 0, 1));

    AnalysisReport {
        analysis: AnalysisSection {
            summary: format!(
                "Analysis failed for {} lines of code. Error: {}",
                count_lines(source_code),
                detail
            ),
            strengths: vec!["Code submitted for review".to_string()],
            improvements: vec!["Try resubmitting with a different format".to_string()],
            categories,
        },
        metrics: MetricsBlock {
            score: 50.0,
            complexity: 3.0,
            maintainability_index: 60.0,
            cyclomatic_complexity: 3,
            cognitive_complexity: 5,
            ..MetricsBlock::default()
        },
        issues: vec![fixed_issue(
            1,
            "system",
            Severity::Medium,
            "Analysis Processing Error",
            format!("Error: {}", detail),
            "Try resubmitting your code or simplifying complex sections.",
        )],
    }
}

fn uniform_categories(score: CategoryScore) -> BTreeMap<Category, CategoryScore> {
    Category::all().iter().map(|c| (*c, score)).collect()
}

fn unavailable_metrics() -> MetricsBlock {
    MetricsBlock {
        score: 50.0,
        complexity: 2.0,
        maintainability_index: 60.0,
        ..MetricsBlock::default()
    }
}

fn fixed_issue(
    id: u32,
    kind: &str,
    severity: Severity,
    title: &str,
    message: String,
    suggestion: &str,
) -> Issue {
    Issue {
        id,
        kind: kind.to_string(),
        severity,
        line: 1,
        column: 1,
        title: title.to_string(),
        message,
        suggestion: suggestion.to_string(),
        code_snippet: String::new(),
        fixed_code: String::new(),
    }
}
