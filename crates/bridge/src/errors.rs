use crate::segment::SegmentRole;
use crate::session::SessionState;
use std::io;
use thiserror::Error;

/// Every variant is fatal to a fuzzing run: the shared memory handoff has no
/// way to resynchronize once either side has gone astray.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// The OS refused to allocate or open a segment or stream.
    #[error("Failed to {what}: {source}")]
    Resource {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("{role} segment overflow: {len} bytes at offset {offset} exceeds capacity {capacity}")]
    Overflow {
        role: SegmentRole,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Session is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
}

impl BridgeError {
    /// Wrap the calling thread's last OS error as a resource failure.
    pub(crate) fn last_os(what: impl Into<String>) -> Self {
        Self::Resource {
            what: what.into(),
            source: io::Error::last_os_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = BridgeError::IoError(io_err);
        assert_eq!(err.to_string(), "IO error: file not found");

        let err = BridgeError::Resource {
            what: "create test-input segment".to_string(),
            source: io::Error::new(io::ErrorKind::OutOfMemory, "no space"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create test-input segment: no space"
        );

        let err = BridgeError::Overflow {
            role: SegmentRole::CoverageOutput,
            offset: 1020,
            len: 8,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "coverage-output segment overflow: 8 bytes at offset 1020 exceeds capacity 1024"
        );

        let err = BridgeError::Protocol("bad magic".to_string());
        assert_eq!(err.to_string(), "Protocol violation: bad magic");

        let err = BridgeError::InvalidState {
            expected: SessionState::Awaiting,
            actual: SessionState::Building,
        };
        assert_eq!(err.to_string(), "Session is Building, expected Awaiting");
    }

    #[test]
    fn test_error_conversion_from_io_error() {
        fn returns_io_error() -> Result<(), io::Error> {
            Err(io::Error::other("pipe closed"))
        }

        fn uses_question_mark() -> Result<(), BridgeError> {
            returns_io_error()?;
            Ok(())
        }

        match uses_question_mark() {
            Err(BridgeError::IoError(e)) => assert_eq!(e.to_string(), "pipe closed"),
            other => panic!("Expected IoError variant, got {:?}", other),
        }
    }
}
