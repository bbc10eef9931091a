pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod scheduler;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;
