pub mod config;
pub mod logging;
pub mod telemetry;
pub mod wait;

pub use config::Environment;
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
pub use wait::{wait_for_path, wait_for_resource};
