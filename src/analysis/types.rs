//! Core types for code analysis reports.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// One of the four quality dimensions every report scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Performance,
    Security,
    Maintainability,
    Style,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Performance,
            Category::Security,
            Category::Maintainability,
            Category::Style,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Maintainability => "maintainability",
            Self::Style => "style",
        }
    }

    /// Name with the first letter upper-cased, used in synthesized issue titles.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Performance => "Performance",
            Self::Security => "Security",
            Self::Maintainability => "Maintainability",
            Self::Style => "Style",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Score for a single category (0-10) plus issue and suggestion counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u8,
    pub issues: u32,
    pub suggestions: u32,
}

impl CategoryScore {
    pub fn new(score: u8, issues: u32, suggestions: u32) -> Self {
        Self {
            score: score.min(10),
            issues,
            suggestions,
        }
    }
}

/// Numeric quality metrics reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsBlock {
    /// Overall score, 0-100.
    pub score: f64,
    /// Complexity, 1-10.
    pub complexity: f64,
    /// Maintainability index, 0-100.
    pub maintainability_index: f64,
    pub cyclomatic_complexity: u32,
    pub cognitive_complexity: u32,
    pub duplicated_lines: u32,
    pub test_coverage: f64,
}

impl Default for MetricsBlock {
    fn default() -> Self {
        Self {
            score: 70.0,
            complexity: 2.0,
            maintainability_index: 70.0,
            cyclomatic_complexity: 2,
            cognitive_complexity: 3,
            duplicated_lines: 0,
            test_coverage: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse one of the accepted literals. Anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding in the analyzed code.
///
/// Serializes the column twice, as `column` and `column_number`, since
/// consumers read either name.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub id: u32,
    pub kind: String,
    pub severity: Severity,
    pub line: u32,
    pub column: u32,
    pub title: String,
    pub message: String,
    pub suggestion: String,
    pub code_snippet: String,
    pub fixed_code: String,
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Issue", 11)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("type", &self.kind)?;
        s.serialize_field("severity", &self.severity)?;
        s.serialize_field("line", &self.line)?;
        s.serialize_field("column", &self.column)?;
        s.serialize_field("column_number", &self.column)?;
        s.serialize_field("title", &self.title)?;
        s.serialize_field("message", &self.message)?;
        s.serialize_field("suggestion", &self.suggestion)?;
        s.serialize_field("code_snippet", &self.code_snippet)?;
        s.serialize_field("fixed_code", &self.fixed_code)?;
        s.end()
    }
}

/// Narrative part of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSection {
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub categories: BTreeMap<Category, CategoryScore>,
}

/// Canonical analysis report. Every instance produced by the normalizer has
/// all four categories and a fully populated metrics block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub analysis: AnalysisSection,
    pub metrics: MetricsBlock,
    pub issues: Vec<Issue>,
}

impl AnalysisReport {
    pub fn to_value(&self) -> serde_json::Value {
        // Serialization of these types cannot fail: all map keys are strings.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Secondary metrics computed from a report and the submitted source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub lines_of_code: usize,
    pub non_empty_lines: usize,
    pub total_issues: usize,
    pub high_severity_issues: usize,
    pub medium_severity_issues: usize,
    pub improvement_rate: f64,
}
