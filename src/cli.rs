use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Command line interface definition for alibot.
#[derive(Parser, Debug)]
#[command(name = "alibot")]
#[command(about = "LLM-backed code review service")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,

    #[command(flatten)]
    pub llm: LlmArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// LLM overrides; unset values fall back to the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct LlmArgs {
    /// LLM provider (groq, claude)
    #[arg(long = "llm-provider", global = true)]
    pub provider: Option<String>,

    /// Model name passed to the provider
    #[arg(long = "llm-model", global = true)]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API
    #[arg(long = "llm-base-url", global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Analyze a single file and print the normalized report
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "ALIBOT_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "ALIBOT_DB_PATH", default_value = "alibot.db")]
    pub db: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Source file to review
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Language of the source (default: guessed from the file extension)
    #[arg(short, long)]
    pub language: Option<String>,
}

impl AnalyzeArgs {
    pub fn resolved_language(&self) -> String {
        if let Some(ref language) = self.language {
            return language.clone();
        }
        let ext = self
            .file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "py" => "python",
            "rs" => "rust",
            "js" | "mjs" | "cjs" => "javascript",
            "ts" | "tsx" => "typescript",
            "go" => "go",
            "java" => "java",
            "c" | "h" => "c",
            "cpp" | "cc" | "hpp" => "cpp",
            "rb" => "ruby",
            _ => "text",
        }
        .to_string()
    }
}
