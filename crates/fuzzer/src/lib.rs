pub mod config;
pub mod coverage;
pub mod driver;
pub mod generator;
pub mod instrumentation;
pub mod logging;

pub use config::HarnessConfig;
pub use coverage::{CoverageConsumer, CoverageSummary, CoverageTracker};
pub use driver::{FuzzingDriver, RunSummary};
pub use generator::RandomGenerator;
pub use instrumentation::{InstrumentationConfig, InstrumentationError, TestSize};
