//! Fixed IPC locations and sizes shared with the DUT runner.
//!
//! The FIFO names are from the DUT runner's point of view: it transmits on
//! `tx.fifo` and receives on `rx.fifo`.

/// Directory the DUT runner provisions its handshake FIFOs in.
pub const DEFAULT_HANDSHAKE_DIR: &str = "/tmp/fpga/0";

/// FIFO the harness reads acknowledgments from.
pub const INBOUND_FIFO_NAME: &str = "tx.fifo";

/// FIFO the harness writes segment ids to.
pub const OUTBOUND_FIFO_NAME: &str = "rx.fifo";

/// Default test-input segment size (64 * 1024 * 16 = 1MB)
pub const DEFAULT_TEST_BUFFER_SIZE: usize = 64 * 1024 * 16;

/// Default coverage-output segment size (64 * 1024 * 16 = 1MB)
pub const DEFAULT_COVERAGE_BUFFER_SIZE: usize = 64 * 1024 * 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_dir_is_absolute() {
        assert!(DEFAULT_HANDSHAKE_DIR.starts_with('/'));
    }

    #[test]
    fn test_fifo_names_differ() {
        assert_ne!(INBOUND_FIFO_NAME, OUTBOUND_FIFO_NAME);
    }

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(DEFAULT_TEST_BUFFER_SIZE, 1_048_576);
        assert_eq!(DEFAULT_COVERAGE_BUFFER_SIZE, 1_048_576);
    }
}
