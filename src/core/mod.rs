//! Core utilities: configuration, errors, logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-exports for convenience
pub use config::Settings;
pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_startup_configuration};
pub use metrics::RoutingMetrics;
