use crate::config::HarnessConfig;

pub fn setup_logging(config: &HarnessConfig) {
    common::setup_logging(config.environment);
}
