pub mod config;
pub mod credential;
pub mod error;
pub mod metrics;
pub mod types;
