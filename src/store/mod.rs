//! Persistence of submissions and their analysis results.

mod sqlite;

pub use sqlite::SqliteReviewStore;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisReport, Issue, MetricsBlock};

/// Maximum number of issues persisted per review.
pub const MAX_STORED_ISSUES: usize = 20;
/// Maximum stored issue title length, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown review: {0}")]
    UnknownReview(String),
}

/// Lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Rough progress percentage shown to clients polling for status.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Pending => 10,
            Self::InProgress => 50,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown review status: '{}'", s)),
        }
    }
}

/// Fields for a new review row.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub review_type: String,
    pub github_repo: Option<String>,
    pub github_path: Option<String>,
}

/// Status transition plus whichever summary numbers are known at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ReviewStatus,
    pub score: Option<f64>,
    pub lines_of_code: Option<usize>,
    pub issues_count: Option<usize>,
    pub suggestions_count: Option<usize>,
    pub improvement_rate: Option<f64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ReviewStatus) -> Self {
        Self {
            status,
            score: None,
            lines_of_code: None,
            issues_count: None,
            suggestions_count: None,
            improvement_rate: None,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(ReviewStatus::Failed)
        }
    }

    pub fn with_lines_of_code(mut self, lines: usize) -> Self {
        self.lines_of_code = Some(lines);
        self
    }
}

/// A row of the `reviews` table.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub review_type: String,
    pub status: ReviewStatus,
    pub score: Option<f64>,
    pub lines_of_code: Option<i64>,
    pub issues: Option<i64>,
    pub suggestions: Option<i64>,
    pub improvement_rate: Option<f64>,
    pub error_message: Option<String>,
    pub github_repo: Option<String>,
    pub github_path: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// A row of the `code_reviews` table: the submitted code and, once analysis
/// finishes, the full report.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRecord {
    pub id: String,
    pub review_id: String,
    pub user_id: String,
    pub language: String,
    pub code: String,
    pub results: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredAnalysis {
    pub review_id: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub categories: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMetrics {
    pub review_id: String,
    pub score: f64,
    pub complexity: f64,
    pub maintainability_index: f64,
    pub cyclomatic_complexity: f64,
    pub cognitive_complexity: f64,
    pub duplicated_lines: i64,
    pub test_coverage: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredIssue {
    pub id: i64,
    pub review_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub line: i64,
    pub column_number: i64,
    pub title: String,
    pub message: String,
    pub suggestion: String,
    pub code_snippet: String,
    pub fixed_code: String,
    pub created_at: String,
}

/// A review joined with everything stored for it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewDetails {
    #[serde(flatten)]
    pub review: ReviewRecord,
    pub code_data: Option<CodeRecord>,
    pub ai_analysis: Option<StoredAnalysis>,
    pub metrics: Option<StoredMetrics>,
    pub detailed_issues: Vec<StoredIssue>,
}

/// History entry: the review row plus its submitted code.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    #[serde(flatten)]
    pub review: ReviewRecord,
    pub code: String,
}

/// Storage operations used by the review pipeline and read paths.
pub trait ReviewStore: Send + Sync {
    /// Insert a pending review and return its generated id.
    fn create_review(&self, review: &NewReview) -> Result<String, StoreError>;

    /// Store submitted code for a review and return the code-review id.
    fn store_code(
        &self,
        review_id: &str,
        user_id: &str,
        language: &str,
        code: &str,
    ) -> Result<String, StoreError>;

    fn store_analysis(&self, review_id: &str, report: &AnalysisReport) -> Result<(), StoreError>;

    fn store_metrics(&self, review_id: &str, metrics: &MetricsBlock) -> Result<(), StoreError>;

    /// Store up to [`MAX_STORED_ISSUES`] issues. An empty slice is a no-op.
    fn store_issues(&self, review_id: &str, issues: &[Issue]) -> Result<(), StoreError>;

    /// Attach the full report to the review's code row.
    fn store_results(&self, review_id: &str, report: &AnalysisReport) -> Result<(), StoreError>;

    fn update_status(&self, review_id: &str, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Look up by review id or code-review id, scoped to `user_id`.
    fn find_review(&self, id: &str, user_id: &str) -> Result<Option<ReviewDetails>, StoreError>;

    /// All reviews of a user that have stored code, newest first.
    fn list_reviews(&self, user_id: &str) -> Result<Vec<ReviewSummary>, StoreError>;
}
