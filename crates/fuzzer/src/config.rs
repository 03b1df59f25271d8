use anyhow::{Result, bail};
use bridge::frame::coverage_frame_len;
use bridge::paths::{
    DEFAULT_COVERAGE_BUFFER_SIZE, DEFAULT_HANDSHAKE_DIR, DEFAULT_TEST_BUFFER_SIZE,
    INBOUND_FIFO_NAME, OUTBOUND_FIFO_NAME,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub use common::Environment;

use crate::instrumentation::TestSize;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub environment: Environment,
    pub handshake_dir: PathBuf,
    pub iterations: u64,
    pub tests_per_iteration: u32,
    /// Vectors per test; 0 picks a random count up to `max_inputs_per_test`.
    pub inputs_per_test: u64,
    pub max_inputs_per_test: u64,
    pub buffer_id: u32,
    pub input_size: usize,
    pub coverage_size: usize,
    /// The DUT reports a cleared bit for a covered signal.
    pub coverage_inverted: bool,
    pub test_buffer_size: usize,
    pub coverage_buffer_size: usize,
    pub poll_interval_ms: u64,
    pub seed: Option<u64>,
    pub instrumentation_config: Option<PathBuf>,
    pub word_size: usize,
    pub otel_endpoint: Option<String>,
}

impl HarnessConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key/value source. Unparseable values
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            environment: lookup("ENVIRONMENT")
                .map(|s| Environment::parse(&s))
                .unwrap_or(Environment::Development),
            handshake_dir: lookup("HANDSHAKE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HANDSHAKE_DIR)),
            iterations: parse_var(&lookup, "ITERATIONS").unwrap_or(1),
            tests_per_iteration: parse_var(&lookup, "TESTS_PER_ITERATION").unwrap_or(1),
            inputs_per_test: parse_var(&lookup, "INPUTS_PER_TEST").unwrap_or(1),
            max_inputs_per_test: parse_var(&lookup, "MAX_INPUTS_PER_TEST").unwrap_or(16),
            buffer_id: parse_var(&lookup, "BUFFER_ID").unwrap_or(0),
            input_size: parse_var(&lookup, "INPUT_SIZE").unwrap_or(16),
            coverage_size: parse_var(&lookup, "COVERAGE_SIZE").unwrap_or(8),
            coverage_inverted: parse_var(&lookup, "COVERAGE_INVERTED").unwrap_or(false),
            test_buffer_size: parse_var(&lookup, "TEST_BUFFER_SIZE")
                .unwrap_or(DEFAULT_TEST_BUFFER_SIZE),
            coverage_buffer_size: parse_var(&lookup, "COVERAGE_BUFFER_SIZE")
                .unwrap_or(DEFAULT_COVERAGE_BUFFER_SIZE),
            poll_interval_ms: parse_var(&lookup, "POLL_INTERVAL_MS").unwrap_or(500),
            seed: parse_var(&lookup, "SEED"),
            instrumentation_config: lookup("INSTRUMENTATION_CONFIG").map(PathBuf::from),
            word_size: parse_var(&lookup, "WORD_SIZE").unwrap_or(8),
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()),
        };

        Ok(config)
    }

    /// Take input and coverage sizes from the instrumentation pass instead of
    /// the environment.
    pub fn apply_test_size(&mut self, size: TestSize) {
        self.input_size = size.input;
        self.coverage_size = size.coverage;
    }

    /// Reject configurations the DUT runner could never agree with.
    pub fn validate(&self) -> Result<()> {
        if self.tests_per_iteration > u16::MAX as u32 {
            bail!(
                "TESTS_PER_ITERATION {} does not fit the 16-bit tests-left field",
                self.tests_per_iteration
            );
        }
        for (name, value) in [
            ("INPUT_SIZE", self.input_size),
            ("COVERAGE_SIZE", self.coverage_size),
            ("TEST_BUFFER_SIZE", self.test_buffer_size),
            ("COVERAGE_BUFFER_SIZE", self.coverage_buffer_size),
            ("WORD_SIZE", self.word_size),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if self.inputs_per_test == 0 && self.max_inputs_per_test == 0 {
            bail!("MAX_INPUTS_PER_TEST must be greater than zero for random input counts");
        }

        let Some(coverage_needed) =
            coverage_frame_len(self.tests_per_iteration as usize, self.coverage_size)
        else {
            bail!(
                "{} tests of {} coverage bytes overflow the coverage frame length",
                self.tests_per_iteration,
                self.coverage_size
            );
        };
        if coverage_needed > self.coverage_buffer_size {
            bail!(
                "{} tests of {} coverage bytes need {} bytes, coverage buffer holds {}",
                self.tests_per_iteration,
                self.coverage_size,
                coverage_needed,
                self.coverage_buffer_size
            );
        }
        Ok(())
    }

    /// Tests per request frame, as the header encodes it.
    pub fn tests_left(&self) -> Result<u16> {
        Ok(u16::try_from(self.tests_per_iteration)?)
    }

    pub fn inbound_fifo(&self) -> PathBuf {
        self.handshake_dir.join(INBOUND_FIFO_NAME)
    }

    pub fn outbound_fifo(&self) -> PathBuf {
        self.handshake_dir.join(OUTBOUND_FIFO_NAME)
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self::from_lookup(|_| None).unwrap()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> HarnessConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarnessConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_defaults_match_peer_conventions() {
        let config = HarnessConfig::test_default();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.handshake_dir, PathBuf::from("/tmp/fpga/0"));
        assert_eq!(config.inbound_fifo(), PathBuf::from("/tmp/fpga/0/tx.fifo"));
        assert_eq!(config.outbound_fifo(), PathBuf::from("/tmp/fpga/0/rx.fifo"));
        assert_eq!(config.iterations, 1);
        assert_eq!(config.tests_per_iteration, 1);
        assert_eq!(config.inputs_per_test, 1);
        assert_eq!(config.buffer_id, 0);
        assert_eq!(config.input_size, 16);
        assert!(!config.coverage_inverted);
        assert_eq!(config.test_buffer_size, 1_048_576);
        assert_eq!(config.coverage_buffer_size, 1_048_576);
        assert_eq!(config.seed, None);
        assert!(config.instrumentation_config.is_none());
        assert!(config.otel_endpoint.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = from_pairs(&[
            ("ENVIRONMENT", "production"),
            ("HANDSHAKE_DIR", "/run/dut/3"),
            ("ITERATIONS", "250"),
            ("TESTS_PER_ITERATION", "12"),
            ("INPUT_SIZE", "40"),
            ("COVERAGE_SIZE", "8"),
            ("COVERAGE_INVERTED", "true"),
            ("SEED", "1234"),
            ("OTEL_ENDPOINT", "http://collector:4317"),
        ]);

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.inbound_fifo(), PathBuf::from("/run/dut/3/tx.fifo"));
        assert_eq!(config.iterations, 250);
        assert_eq!(config.tests_left().unwrap(), 12);
        assert_eq!(config.input_size, 40);
        assert!(config.coverage_inverted);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.otel_endpoint.as_deref(), Some("http://collector:4317"));
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let config = from_pairs(&[("ITERATIONS", "many"), ("INPUT_SIZE", "-3")]);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.input_size, 16);
    }

    #[test]
    fn test_validate_rejects_oversized_test_count() {
        let config = from_pairs(&[("TESTS_PER_ITERATION", "70000")]);
        assert!(config.validate().is_err());
        assert!(config.tests_left().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        for key in ["INPUT_SIZE", "COVERAGE_SIZE", "TEST_BUFFER_SIZE", "WORD_SIZE"] {
            let config = from_pairs(&[(key, "0")]);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(key), "{}: {}", key, err);
        }
    }

    #[test]
    fn test_validate_rejects_coverage_that_cannot_fit() {
        let config = from_pairs(&[
            ("TESTS_PER_ITERATION", "100"),
            ("COVERAGE_SIZE", "64"),
            ("COVERAGE_BUFFER_SIZE", "1024"),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_coverage_size() {
        let max = usize::MAX.to_string();
        let config = from_pairs(&[("COVERAGE_SIZE", max.as_str())]);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overflow"), "{}", err);
    }

    #[test]
    fn test_apply_test_size_overrides_sizes() {
        let mut config = HarnessConfig::test_default();
        config.apply_test_size(TestSize {
            input: 40,
            coverage: 8,
        });
        assert_eq!(config.input_size, 40);
        assert_eq!(config.coverage_size, 8);
    }
}
