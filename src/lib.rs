pub mod analysis;
pub mod app;
pub mod cli;
pub mod llm;
pub mod server;
pub mod service;
pub mod store;
pub mod utils;
