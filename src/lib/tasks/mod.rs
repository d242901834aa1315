pub mod docker;
pub mod runner;
pub mod types;
