// src/lib.rs
pub mod config;
pub mod dot_snapshot;
pub mod errors;
pub mod notifications;
pub mod pairs;
pub mod pattern_driver;
pub mod scheduler;
pub mod stages;
pub mod store;
pub mod types;
