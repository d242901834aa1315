pub mod dumps;
pub mod orchestrator;
pub mod types;
