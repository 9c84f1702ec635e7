pub mod aws;
pub mod collectors;
pub mod config;
pub mod cost;
pub mod formatter;
pub mod models;
pub mod orchestrator;
pub mod snapshot;
