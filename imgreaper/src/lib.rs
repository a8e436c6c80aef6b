// Re-export modules needed for testing
pub mod api;
pub mod backends;
pub mod classify;
pub mod collaborators;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod schedule;
pub mod window;
pub mod worker;
