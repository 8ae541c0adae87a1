//! Review pipeline: submission, deferred analysis, and read paths.
//!
//! [`ReviewService::submit`] records a submission and returns immediately with
//! an [`AnalysisJob`]. The caller runs [`ReviewService::process`] for that job
//! off the request path; it owns its own error handling and status
//! transitions.

use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{derive_metrics, AnalysisReport, Analyzer};
use crate::llm::LlmError;
use crate::store::{
    NewReview, ReviewDetails, ReviewStatus, ReviewStore, ReviewSummary, StatusUpdate, StoreError,
};
use crate::utils::{count_lines, truncate_chars};

pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Review not found")]
    NotFound,
    #[error("{0}")]
    Invalid(String),
}

fn default_review_type() -> String {
    "general".to_string()
}

/// A code submission as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language: String,
    #[serde(rename = "reviewType", default = "default_review_type")]
    pub review_type: String,
    pub user_id: String,
    #[serde(default)]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub github_path: Option<String>,
}

impl SubmitRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        for (name, value) in [
            ("code", &self.code),
            ("title", &self.title),
            ("language", &self.language),
            ("user_id", &self.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::Invalid(format!("Field '{}' must not be empty", name)));
            }
        }
        Ok(())
    }
}

/// Acknowledgement returned to the submitter before analysis runs.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    /// Code-review id; clients navigate with this one.
    pub review_id: String,
    pub actual_review_id: String,
    pub status: ReviewStatus,
    pub message: String,
}

/// Deferred unit of work for one submission.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub review_id: String,
    pub code: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub review_id: String,
    pub status: ReviewStatus,
    pub progress: u8,
    pub created_at: String,
    pub completed_at: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

/// Paging and filters for a user's review history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub language: Option<String>,
    /// Compared against the status name; an unknown name matches nothing.
    #[serde(default)]
    pub status: Option<String>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            language: None,
            status: None,
        }
    }
}

impl HistoryQuery {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.page < 1 {
            return Err(ServiceError::Invalid("page must be at least 1".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(ServiceError::Invalid(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    analyzer: Arc<Analyzer>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>, analyzer: Analyzer) -> Self {
        Self {
            store,
            analyzer: Arc::new(analyzer),
        }
    }

    /// Record a submission and mark it in progress.
    ///
    /// The returned job must be handed to [`ReviewService::process`].
    pub fn submit(
        &self,
        request: SubmitRequest,
    ) -> Result<(SubmissionReceipt, AnalysisJob), ServiceError> {
        request.validate()?;

        let review_id = self.store.create_review(&NewReview {
            user_id: request.user_id.clone(),
            title: request.title,
            description: request.description,
            language: request.language.clone(),
            review_type: request.review_type,
            github_repo: request.github_repo,
            github_path: request.github_path,
        })?;
        let code_review_id =
            self.store
                .store_code(&review_id, &request.user_id, &request.language, &request.code)?;
        self.store.update_status(
            &review_id,
            &StatusUpdate::new(ReviewStatus::InProgress)
                .with_lines_of_code(count_lines(&request.code)),
        )?;
        info!("Accepted submission {} ({})", review_id, request.language);

        let receipt = SubmissionReceipt {
            review_id: code_review_id,
            actual_review_id: review_id.clone(),
            status: ReviewStatus::InProgress,
            message: "Code submitted successfully. Analysis in progress.".to_string(),
        };
        let job = AnalysisJob {
            review_id,
            code: request.code,
            language: request.language,
        };
        Ok((receipt, job))
    }

    /// Run the analysis for a submitted job and record the outcome.
    ///
    /// Never fails: an analysis error marks the review `failed`.
    pub fn process(&self, job: AnalysisJob) {
        info!("Starting analysis for review {}", job.review_id);
        match self.run_analysis(&job) {
            Ok(()) => info!("Analysis completed for review {}", job.review_id),
            Err(e) => {
                error!("Analysis failed for review {}: {}", job.review_id, e);
                if let Err(mark_err) = self
                    .store
                    .update_status(&job.review_id, &StatusUpdate::failed(e.to_string()))
                {
                    error!(
                        "Could not mark review {} as failed: {}",
                        job.review_id, mark_err
                    );
                }
            }
        }
    }

    fn run_analysis(&self, job: &AnalysisJob) -> Result<(), ServiceError> {
        let report = self.analyzer.analyze(&job.code, &job.language)?;
        info!(
            "Analysis summary for review {}: {}",
            job.review_id,
            truncate_chars(&report.analysis.summary, 100)
        );
        let derived = derive_metrics(&report, &job.code);

        self.persist_report(&job.review_id, &report);

        self.store.update_status(
            &job.review_id,
            &StatusUpdate {
                status: ReviewStatus::Completed,
                score: Some(report.metrics.score),
                lines_of_code: Some(derived.lines_of_code),
                issues_count: Some(derived.total_issues),
                suggestions_count: Some(report.analysis.improvements.len()),
                improvement_rate: Some(derived.improvement_rate),
                error_message: None,
            },
        )?;
        Ok(())
    }

    /// Write all parts of a report concurrently. Failures are logged; one
    /// failed write does not stop the others.
    fn persist_report(&self, review_id: &str, report: &AnalysisReport) {
        let store = self.store.as_ref();

        let outcomes = thread::scope(|s| {
            let handles = [
                ("analysis", s.spawn(|| store.store_analysis(review_id, report))),
                ("metrics", s.spawn(|| store.store_metrics(review_id, &report.metrics))),
                ("issues", s.spawn(|| store.store_issues(review_id, &report.issues))),
                ("results", s.spawn(|| store.store_results(review_id, report))),
            ];
            handles.map(|(part, handle)| (part, handle.join()))
        });

        for (part, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to store {} for review {}: {}", part, review_id, e),
                Err(_) => warn!("Storing {} for review {} panicked", part, review_id),
            }
        }
    }

    pub fn status(&self, id: &str, user_id: &str) -> Result<StatusReport, ServiceError> {
        let details = self.review(id, user_id)?;
        Ok(StatusReport {
            review_id: id.to_string(),
            status: details.review.status,
            progress: details.review.status.progress(),
            created_at: details.review.created_at,
            completed_at: details.review.completed_at,
        })
    }

    pub fn review(&self, id: &str, user_id: &str) -> Result<ReviewDetails, ServiceError> {
        self.store
            .find_review(id, user_id)?
            .ok_or(ServiceError::NotFound)
    }

    /// One page of a user's reviews, newest first, after filtering.
    pub fn history(
        &self,
        user_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<ReviewSummary>, ServiceError> {
        query.validate()?;

        let start = (query.page as usize - 1) * query.limit as usize;
        let page = self
            .store
            .list_reviews(user_id)?
            .into_iter()
            .filter(|r| {
                query
                    .language
                    .as_deref()
                    .map_or(true, |lang| r.review.language == lang)
            })
            .filter(|r| {
                query
                    .status
                    .as_deref()
                    .map_or(true, |status| r.review.status.as_str() == status)
            })
            .skip(start)
            .take(query.limit as usize)
            .collect();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::{FailingLlmClient, MockLlmClient};
    use crate::analysis::{Issue, MetricsBlock};
    use crate::store::SqliteReviewStore;

    /// SQLite store whose metrics write always fails.
    struct MetricsOutageStore(SqliteReviewStore);

    impl ReviewStore for MetricsOutageStore {
        fn create_review(&self, review: &NewReview) -> Result<String, StoreError> {
            self.0.create_review(review)
        }

        fn store_code(
            &self,
            review_id: &str,
            user_id: &str,
            language: &str,
            code: &str,
        ) -> Result<String, StoreError> {
            self.0.store_code(review_id, user_id, language, code)
        }

        fn store_analysis(
            &self,
            review_id: &str,
            report: &AnalysisReport,
        ) -> Result<(), StoreError> {
            self.0.store_analysis(review_id, report)
        }

        fn store_metrics(&self, review_id: &str, _metrics: &MetricsBlock) -> Result<(), StoreError> {
            Err(StoreError::UnknownReview(review_id.to_string()))
        }

        fn store_issues(&self, review_id: &str, issues: &[Issue]) -> Result<(), StoreError> {
            self.0.store_issues(review_id, issues)
        }

        fn store_results(
            &self,
            review_id: &str,
            report: &AnalysisReport,
        ) -> Result<(), StoreError> {
            self.0.store_results(review_id, report)
        }

        fn update_status(&self, review_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
            self.0.update_status(review_id, update)
        }

        fn find_review(
            &self,
            id: &str,
            user_id: &str,
        ) -> Result<Option<ReviewDetails>, StoreError> {
            self.0.find_review(id, user_id)
        }

        fn list_reviews(&self, user_id: &str) -> Result<Vec<ReviewSummary>, StoreError> {
            self.0.list_reviews(user_id)
        }
    }

    const RESPONSE: &str = r#"{"analysis": {"summary": "Tidy", "improvements": ["a", "b", "c"]},
        "metrics": {"score": 88},
        "issues": [{"severity": "high", "title": "SQL injection"}]}"#;

    fn service_with(client: Arc<dyn crate::llm::LlmClient>) -> ReviewService {
        let store = Arc::new(SqliteReviewStore::open_in_memory().unwrap());
        ReviewService::new(store, Analyzer::new(client))
    }

    fn request(user: &str, language: &str) -> SubmitRequest {
        SubmitRequest {
            code: "line one\nline two".to_string(),
            title: "Check this".to_string(),
            description: String::new(),
            language: language.to_string(),
            review_type: default_review_type(),
            user_id: user.to_string(),
            github_repo: None,
            github_path: None,
        }
    }

    #[test]
    fn submit_marks_in_progress() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        let (receipt, job) = service.submit(request("u1", "python")).unwrap();

        assert_eq!(receipt.status, ReviewStatus::InProgress);
        assert_eq!(receipt.actual_review_id, job.review_id);
        assert_ne!(receipt.review_id, receipt.actual_review_id);

        let status = service.status(&receipt.review_id, "u1").unwrap();
        assert_eq!(status.status, ReviewStatus::InProgress);
        assert_eq!(status.progress, 50);
        assert_eq!(status.review_id, receipt.review_id);
    }

    #[test]
    fn submit_rejects_blank_fields() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        let mut req = request("u1", "python");
        req.code = "   ".to_string();
        assert!(matches!(service.submit(req), Err(ServiceError::Invalid(_))));
    }

    #[test]
    fn process_completes_review() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        let (receipt, job) = service.submit(request("u1", "python")).unwrap();

        service.process(job);

        let details = service.review(&receipt.actual_review_id, "u1").unwrap();
        assert_eq!(details.review.status, ReviewStatus::Completed);
        assert_eq!(details.review.score, Some(88.0));
        assert_eq!(details.review.lines_of_code, Some(2));
        assert_eq!(details.review.issues, Some(1));
        assert_eq!(details.review.suggestions, Some(3));
        assert_eq!(details.review.improvement_rate, Some(88.0));
        assert!(details.review.completed_at.is_some());
        assert_eq!(details.ai_analysis.unwrap().summary, "Tidy");
        assert_eq!(details.detailed_issues[0].title, "SQL injection");
    }

    #[test]
    fn failed_write_does_not_block_completion() {
        let store = MetricsOutageStore(SqliteReviewStore::open_in_memory().unwrap());
        let service = ReviewService::new(
            Arc::new(store),
            Analyzer::new(Arc::new(MockLlmClient::new(RESPONSE))),
        );
        let (receipt, job) = service.submit(request("u1", "python")).unwrap();

        service.process(job);

        let details = service.review(&receipt.review_id, "u1").unwrap();
        assert_eq!(details.review.status, ReviewStatus::Completed);
        assert_eq!(details.review.score, Some(88.0));
        assert!(details.metrics.is_none());
        assert_eq!(details.ai_analysis.unwrap().summary, "Tidy");
        assert_eq!(details.detailed_issues.len(), 1);
        assert!(details.code_data.unwrap().results.is_some());
    }

    #[test]
    fn process_marks_failed_on_llm_error() {
        let service = service_with(Arc::new(FailingLlmClient::new("connection refused")));
        let (receipt, job) = service.submit(request("u1", "python")).unwrap();

        service.process(job);

        let details = service.review(&receipt.review_id, "u1").unwrap();
        assert_eq!(details.review.status, ReviewStatus::Failed);
        assert!(details
            .review
            .error_message
            .unwrap()
            .contains("connection refused"));
        assert_eq!(service.status(&receipt.review_id, "u1").unwrap().progress, 0);
    }

    #[test]
    fn unknown_review_is_not_found() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        assert!(matches!(
            service.status("missing", "u1"),
            Err(ServiceError::NotFound)
        ));
    }

    #[test]
    fn history_filters_and_pages() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        for language in ["python", "rust", "python", "python"] {
            service.submit(request("u1", language)).unwrap();
        }

        let all = service.history("u1", &HistoryQuery::default()).unwrap();
        assert_eq!(all.len(), 4);

        let python = HistoryQuery {
            language: Some("python".to_string()),
            limit: 2,
            ..HistoryQuery::default()
        };
        assert_eq!(service.history("u1", &python).unwrap().len(), 2);
        let second_page = HistoryQuery { page: 2, ..python };
        assert_eq!(service.history("u1", &second_page).unwrap().len(), 1);

        let completed = HistoryQuery {
            status: Some("completed".to_string()),
            ..HistoryQuery::default()
        };
        assert!(service.history("u1", &completed).unwrap().is_empty());

        let unknown = HistoryQuery {
            status: Some("done".to_string()),
            ..HistoryQuery::default()
        };
        assert!(service.history("u1", &unknown).unwrap().is_empty());
    }

    #[test]
    fn history_rejects_bad_paging() {
        let service = service_with(Arc::new(MockLlmClient::new(RESPONSE)));
        let zero_page = HistoryQuery {
            page: 0,
            ..HistoryQuery::default()
        };
        assert!(service.history("u1", &zero_page).is_err());
        let huge = HistoryQuery {
            limit: 51,
            ..HistoryQuery::default()
        };
        assert!(service.history("u1", &huge).is_err());
    }
}
