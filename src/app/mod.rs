//! Command dispatch for the `alibot` binary.

use std::fs;
use std::sync::Arc;

use log::info;
use serde_json::json;

use crate::analysis::{derive_metrics, Analyzer};
use crate::cli::{AnalyzeArgs, Command, ServeArgs};
use crate::llm::{LlmConfig, LlmError};
use crate::server::{self, AppState};
use crate::service::ReviewService;
use crate::store::{SqliteReviewStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    User(String),
}

pub struct App {
    llm_config: LlmConfig,
}

impl App {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self { llm_config }
    }

    pub fn run(&self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Serve(args) => self.handle_serve(args),
            Command::Analyze(args) => self.handle_analyze(args),
        }
    }

    fn handle_serve(&self, args: ServeArgs) -> Result<(), AppError> {
        let client = self.llm_config.create_client()?;
        info!("Using LLM provider {}", self.llm_config.provider);

        let store = SqliteReviewStore::open(&args.db)?;
        info!("Database at {}", args.db.display());

        let service = ReviewService::new(Arc::new(store), Analyzer::new(client));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(server::run(args.bind, AppState::new(service)))?;
        Ok(())
    }

    fn handle_analyze(&self, args: AnalyzeArgs) -> Result<(), AppError> {
        let code = fs::read_to_string(&args.file)?;
        if code.trim().is_empty() {
            return Err(AppError::User(format!(
                "{} is empty; nothing to analyze",
                args.file.display()
            )));
        }
        let language = args.resolved_language();
        info!("Analyzing {} as {}", args.file.display(), language);

        let analyzer = Analyzer::new(self.llm_config.create_client()?);
        let report = analyzer.analyze(&code, &language)?;
        let derived = derive_metrics(&report, &code);

        let output = json!({
            "report": report,
            "derived_metrics": derived,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
