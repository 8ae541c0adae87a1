//! Normalization of raw model output into an [`AnalysisReport`].
//!
//! The model is asked for JSON but may wrap it in a code fence, surround it
//! with prose, omit fields, or use the wrong types. [`normalize`] never fails:
//! unusable responses become one of the fixed reports in [`super::fallback`],
//! and everything else is coerced field by field into the canonical shape.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde_json::{Map, Value};

use super::fallback;
use super::types::{
    AnalysisReport, AnalysisSection, Category, CategoryScore, Issue, MetricsBlock, Severity,
};
use crate::utils::{extract_braced, strip_code_fence, truncate_chars};

const DEFAULT_SUMMARY: &str = "Code analysis completed";
const DEFAULT_STRENGTH: &str = "Code structure is present";
const DEFAULT_IMPROVEMENT: &str = "Consider adding more comments";

const DEFAULT_CATEGORY_SCORE: u8 = 6;

const DEFAULT_ISSUE_TYPE: &str = "general";
const DEFAULT_ISSUE_TITLE: &str = "Code Issue";
const DEFAULT_ISSUE_MESSAGE: &str = "Issue detected";
const DEFAULT_ISSUE_SUGGESTION: &str = "Review this code";

/// Turn a raw model response into a well-formed report.
pub fn normalize(raw_text: &str, source_code: &str) -> AnalysisReport {
    let content = strip_code_fence(raw_text);
    if content.is_empty() {
        warn!("Empty model response after cleanup");
        return fallback::empty_response();
    }

    let parsed = match serde_json::from_str::<Value>(content) {
        Ok(value) => value,
        Err(strict_err) => {
            debug!(
                "Strict JSON parse failed ({}); content (first 200 chars): {}",
                strict_err,
                truncate_chars(content, 200)
            );
            match extract_braced(content).and_then(|s| serde_json::from_str::<Value>(s).ok()) {
                Some(value) => value,
                None => {
                    warn!("Could not extract JSON from model response: {}", strict_err);
                    return fallback::parse_failure(&strict_err.to_string());
                }
            }
        }
    };

    match parsed {
        Value::Object(root) => repair(&root),
        other => {
            let detail = format!("expected a JSON object, got {}", value_kind(&other));
            warn!("Unusable model response: {}", detail);
            fallback::processing_error(source_code, &detail)
        }
    }
}

/// Coerce a parsed JSON object into the canonical report shape.
///
/// Running this over the serialized form of its own output returns the same
/// report.
pub fn repair(root: &Map<String, Value>) -> AnalysisReport {
    let analysis = root.get("analysis").and_then(Value::as_object);
    let metrics = root.get("metrics").and_then(Value::as_object);
    let raw_issues = root
        .get("issues")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let categories = repair_categories(analysis.and_then(|a| a.get("categories")));

    let mut issues: Vec<Issue> = raw_issues
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(idx, obj)| repair_issue(idx as u32 + 1, obj))
        .collect();

    if issues.is_empty() {
        issues = synthesize_category_issues(&categories);
    }

    AnalysisReport {
        analysis: AnalysisSection {
            summary: analysis
                .and_then(|a| a.get("summary"))
                .and_then(as_text)
                .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            strengths: analysis
                .and_then(|a| a.get("strengths"))
                .and_then(as_text_list)
                .unwrap_or_else(|| vec![DEFAULT_STRENGTH.to_string()]),
            improvements: analysis
                .and_then(|a| a.get("improvements"))
                .and_then(as_text_list)
                .unwrap_or_else(|| vec![DEFAULT_IMPROVEMENT.to_string()]),
            categories,
        },
        metrics: repair_metrics(metrics),
        issues,
    }
}

fn repair_categories(raw: Option<&Value>) -> BTreeMap<Category, CategoryScore> {
    let raw = raw.and_then(Value::as_object);

    Category::all()
        .iter()
        .map(|category| {
            let score = match raw.and_then(|m| m.get(category.name())) {
                Some(Value::String(assessment)) => score_from_assessment(assessment),
                Some(Value::Object(obj)) => CategoryScore::new(
                    obj.get("score")
                        .and_then(as_number)
                        .map(|n| n.round().clamp(0.0, 10.0) as u8)
                        .unwrap_or(DEFAULT_CATEGORY_SCORE),
                    obj.get("issues").and_then(as_count).unwrap_or(0),
                    obj.get("suggestions").and_then(as_count).unwrap_or(0),
                ),
                _ => CategoryScore::new(DEFAULT_CATEGORY_SCORE, 0, 0),
            };
            (*category, score)
        })
        .collect()
}

/// Map a free-text category assessment ("Good ...", "Fair ...", anything else)
/// onto a score.
fn score_from_assessment(assessment: &str) -> CategoryScore {
    let score = if assessment.starts_with("Good") {
        8
    } else if assessment.starts_with("Fair") {
        6
    } else {
        4
    };
    CategoryScore::new(score, 1, 1)
}

fn repair_metrics(raw: Option<&Map<String, Value>>) -> MetricsBlock {
    let defaults = MetricsBlock::default();
    let number = |key: &str, default: f64| {
        raw.and_then(|m| m.get(key))
            .and_then(as_number)
            .unwrap_or(default)
    };
    let count = |key: &str, default: u32| {
        raw.and_then(|m| m.get(key))
            .and_then(as_count)
            .unwrap_or(default)
    };

    MetricsBlock {
        score: number("score", defaults.score).clamp(0.0, 100.0),
        complexity: number("complexity", defaults.complexity).clamp(1.0, 10.0),
        maintainability_index: number("maintainability_index", defaults.maintainability_index)
            .clamp(0.0, 100.0),
        cyclomatic_complexity: count("cyclomatic_complexity", defaults.cyclomatic_complexity),
        cognitive_complexity: count("cognitive_complexity", defaults.cognitive_complexity),
        duplicated_lines: count("duplicated_lines", defaults.duplicated_lines),
        test_coverage: number("test_coverage", defaults.test_coverage),
    }
}

fn repair_issue(id: u32, obj: &Map<String, Value>) -> Issue {
    let text = |key: &str, default: &str| {
        obj.get(key)
            .and_then(as_text)
            .unwrap_or_else(|| default.to_string())
    };

    // column_number takes precedence when both aliases are present
    let column = obj
        .get("column_number")
        .and_then(as_count)
        .or_else(|| obj.get("column").and_then(as_count))
        .unwrap_or(1);

    Issue {
        id,
        kind: text("type", DEFAULT_ISSUE_TYPE),
        severity: obj
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse)
            .unwrap_or_default(),
        line: obj.get("line").and_then(as_count).unwrap_or(1),
        column,
        title: text("title", DEFAULT_ISSUE_TITLE),
        message: text("message", DEFAULT_ISSUE_MESSAGE),
        suggestion: text("suggestion", DEFAULT_ISSUE_SUGGESTION),
        code_snippet: text("code_snippet", ""),
        fixed_code: text("fixed_code", ""),
    }
}

/// One generic issue per category that reports problems, used when the model
/// gave category counts but no concrete issues.
fn synthesize_category_issues(categories: &BTreeMap<Category, CategoryScore>) -> Vec<Issue> {
    categories
        .iter()
        .filter(|(_, score)| score.issues > 0)
        .enumerate()
        .map(|(idx, (category, _))| Issue {
            id: idx as u32 + 1,
            kind: category.name().to_string(),
            severity: Severity::Medium,
            line: 1,
            column: 1,
            title: format!("{} area needs attention", category.title()),
            message: format!(
                "The {} aspect of this code could be improved based on analysis.",
                category
            ),
            suggestion: format!(
                "Review the code for {} best practices and optimization opportunities.",
                category
            ),
            code_snippet: String::new(),
            fixed_code: String::new(),
        })
        .collect()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Non-negative integer; fractional values are rounded, negatives clamp to 0.
fn as_count(value: &Value) -> Option<u32> {
    as_number(value).map(|n| n.round().clamp(0.0, u32::MAX as f64) as u32)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_text_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(as_text).collect()),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repair_value(value: Value) -> AnalysisReport {
        repair(value.as_object().unwrap())
    }

    #[test]
    fn fills_missing_sections() {
        let report = repair_value(json!({}));
        assert_eq!(report.analysis.summary, DEFAULT_SUMMARY);
        assert_eq!(report.analysis.strengths, vec![DEFAULT_STRENGTH]);
        assert_eq!(report.analysis.improvements, vec![DEFAULT_IMPROVEMENT]);
        assert_eq!(report.metrics, MetricsBlock::default());
        assert!(report.issues.is_empty());
        for score in report.analysis.categories.values() {
            assert_eq!(*score, CategoryScore::new(6, 0, 0));
        }
    }

    #[test]
    fn maps_string_categories() {
        let report = repair_value(json!({
            "analysis": {"categories": {
                "performance": "Good overall",
                "security": "Fair, some concerns",
                "style": "Poor naming"
            }}
        }));
        let cats = &report.analysis.categories;
        assert_eq!(cats[&Category::Performance], CategoryScore::new(8, 1, 1));
        assert_eq!(cats[&Category::Security], CategoryScore::new(6, 1, 1));
        assert_eq!(cats[&Category::Style], CategoryScore::new(4, 1, 1));
        assert_eq!(cats[&Category::Maintainability], CategoryScore::new(6, 0, 0));
    }

    #[test]
    fn clamps_metrics() {
        let report = repair_value(json!({
            "metrics": {"score": 150, "complexity": 0.2, "maintainability_index": -4, "duplicated_lines": -3}
        }));
        assert_eq!(report.metrics.score, 100.0);
        assert_eq!(report.metrics.complexity, 1.0);
        assert_eq!(report.metrics.maintainability_index, 0.0);
        assert_eq!(report.metrics.duplicated_lines, 0);
        assert_eq!(report.metrics.cyclomatic_complexity, 2);
    }

    #[test]
    fn accepts_numeric_strings() {
        let report = repair_value(json!({"metrics": {"score": "85.5", "complexity": "n/a"}}));
        assert_eq!(report.metrics.score, 85.5);
        assert_eq!(report.metrics.complexity, 2.0);
    }

    #[test]
    fn renumbers_and_drops_non_objects() {
        let report = repair_value(json!({
            "issues": ["junk", {"id": 99, "title": "A"}, 7, {"id": 3, "title": "B"}]
        }));
        let ids: Vec<_> = report.issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(report.issues[0].title, "A");
        assert_eq!(report.issues[1].title, "B");
    }

    #[test]
    fn fills_issue_defaults() {
        let report = repair_value(json!({"issues": [{}]}));
        let issue = &report.issues[0];
        assert_eq!(issue.kind, "general");
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.line, 1);
        assert_eq!(issue.column, 1);
        assert_eq!(issue.title, "Code Issue");
        assert_eq!(issue.message, "Issue detected");
        assert_eq!(issue.suggestion, "Review this code");
        assert_eq!(issue.code_snippet, "");
    }

    #[test]
    fn invalid_severity_becomes_medium() {
        let report = repair_value(json!({"issues": [{"severity": "critical"}, {"severity": "low"}]}));
        assert_eq!(report.issues[0].severity, Severity::Medium);
        assert_eq!(report.issues[1].severity, Severity::Low);
    }

    #[test]
    fn column_aliases_reconciled() {
        let report = repair_value(json!({"issues": [
            {"column": 4},
            {"column_number": "7"},
            {"column": 2, "column_number": 9}
        ]}));
        assert_eq!(report.issues[0].column, 4);
        assert_eq!(report.issues[1].column, 7);
        assert_eq!(report.issues[2].column, 9);
    }

    #[test]
    fn synthesizes_issues_from_categories() {
        let report = repair_value(json!({
            "analysis": {"categories": {
                "security": {"score": 3, "issues": 2, "suggestions": 1},
                "style": {"score": 7, "issues": 0, "suggestions": 1}
            }},
            "issues": []
        }));
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.title, "Security area needs attention");
        assert_eq!(issue.kind, "security");
        assert!(issue.message.contains("security"));
    }

    #[test]
    fn no_synthesis_when_real_issues_exist() {
        let report = repair_value(json!({
            "analysis": {"categories": {"security": {"score": 3, "issues": 2}}},
            "issues": [{"title": "Real"}]
        }));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].title, "Real");
    }

    #[test]
    fn non_object_top_level_uses_processing_fallback() {
        let report = normalize("[1, 2, 3]", "x = 1\ny = 2");
        assert_eq!(report.issues[0].title, "Analysis Processing Error");
        assert!(report.analysis.summary.starts_with("Analysis failed for 2 lines"));
    }

    #[test]
    fn extracts_json_from_prose() {
        let raw = r#"Sure! Here is the analysis: {"analysis": {"summary": "Fine"}} Hope it helps."#;
        let report = normalize(raw, "");
        assert_eq!(report.analysis.summary, "Fine");
    }
}
