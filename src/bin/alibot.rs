use clap::Parser;
use log::LevelFilter;

use alibot::app::App;
use alibot::cli::Cli;
use alibot::llm::{LlmConfig, LlmProvider};

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity flags
    let log_level = if cli.quiet {
        LevelFilter::Error
    } else {
        match cli.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_target(false)
        .init();

    // Build LLM config from environment, then apply CLI overrides
    let provider = match cli.llm.provider.as_deref().map(str::parse::<LlmProvider>) {
        Some(Ok(p)) => Some(p),
        Some(Err(e)) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
        None => None,
    };
    let llm_config = LlmConfig::from_env().with_overrides(
        provider,
        cli.llm.model.clone(),
        cli.llm.base_url.clone(),
    );

    let app = App::new(llm_config);
    if let Err(err) = app.run(cli.command) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
