//! LLM-backed code analysis.
//!
//! The [`Analyzer`] sends a fixed prompt to an [`LlmClient`] and turns whatever
//! text comes back into a canonical [`AnalysisReport`] via [`normalize`].

pub mod fallback;
pub mod metrics;
pub mod normalize;
pub mod prompt;
pub mod types;

pub use metrics::derive_metrics;
pub use normalize::{normalize, repair};
pub use types::{
    AnalysisReport, AnalysisSection, Category, CategoryScore, DerivedMetrics, Issue,
    MetricsBlock, Severity,
};

use std::sync::Arc;

use log::{debug, info};

use crate::llm::{LlmClient, LlmError};
use crate::utils::truncate_chars;

/// Runs a single analysis round-trip against the model.
pub struct Analyzer {
    client: Arc<dyn LlmClient>,
}

impl Analyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Analyze `code` written in `language`.
    ///
    /// Only a failed model call is an error; any response text is normalized
    /// into a report.
    pub fn analyze(&self, code: &str, language: &str) -> Result<AnalysisReport, LlmError> {
        let prompt_text = prompt::build_analysis_prompt(language, code);
        let response = self.client.complete(&prompt_text)?;
        debug!("Raw model response: {}...", truncate_chars(response.trim(), 200));

        let report = normalize(&response, code);
        info!(
            "Analysis produced {} issues (score {:.0})",
            report.issues.len(),
            report.metrics.score
        );
        Ok(report)
    }
}
