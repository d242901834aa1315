pub mod directory;
pub mod rancher;
pub mod types;
