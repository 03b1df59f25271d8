//! Whole-frame helpers for the DUT runner side of the protocol.
//!
//! The harness writes request frames incrementally through
//! [`crate::TestSession`]; these functions cover the opposite direction, reading a
//! request back and writing a coverage frame, so a runner written in Rust (or
//! a test standing in for one) speaks the same layout.

use crate::errors::BridgeError;
use crate::header::{CYCLE_COUNT_SIZE, CoverageHeader, INPUTS_LEFT_SIZE, TestInputHeader};
use crate::segment::SharedSegment;

/// One test's worth of coverage feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRecord {
    /// Clock cycles the DUT ran for this test.
    pub cycles: u16,
    pub coverage: Vec<u8>,
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub header: TestInputHeader,
    /// Per test, the input vectors in the order they are applied.
    pub tests: Vec<Vec<Vec<u8>>>,
}

impl TestRequest {
    /// Read a request frame from the start of `segment`.
    ///
    /// `input_size` must match what the harness encoded with; it is not part
    /// of the frame.
    pub fn read_from(segment: &mut SharedSegment, input_size: usize) -> Result<Self, BridgeError> {
        let header = TestInputHeader::parse(&segment.read_array()?)?;

        let mut tests = Vec::with_capacity(header.tests_left as usize);
        for _ in 0..header.tests_left {
            let inputs_left = u64::from_be_bytes(segment.read_array::<INPUTS_LEFT_SIZE>()?);
            let mut inputs = Vec::new();
            for _ in 0..inputs_left {
                inputs.push(segment.read(input_size)?.to_vec());
            }
            tests.push(inputs);
        }

        Ok(Self { header, tests })
    }

    /// Vector count per test, in frame order.
    pub fn inputs_per_test(&self) -> Vec<usize> {
        self.tests.iter().map(Vec::len).collect()
    }
}

/// Write a complete coverage frame at the current write cursor.
///
/// Every record's coverage must be `coverage_size` bytes; the reader has no
/// other way to find record boundaries.
pub fn write_coverage_frame(
    segment: &mut SharedSegment,
    buffer_id: u32,
    coverage_size: usize,
    records: &[CoverageRecord],
) -> Result<(), BridgeError> {
    if let Some(bad) = records.iter().find(|r| r.coverage.len() != coverage_size) {
        return Err(BridgeError::Protocol(format!(
            "coverage record of {} bytes, frame uses {}",
            bad.coverage.len(),
            coverage_size
        )));
    }

    segment.write(&CoverageHeader { buffer_id }.to_bytes())?;
    for record in records {
        segment.write(&record.cycles.to_be_bytes())?;
        segment.write(&record.coverage)?;
    }
    Ok(())
}

/// Bytes a coverage frame with `tests` records of `coverage_size` occupies,
/// or `None` if that does not fit in a `usize`.
pub fn coverage_frame_len(tests: usize, coverage_size: usize) -> Option<usize> {
    coverage_size
        .checked_add(CYCLE_COUNT_SIZE)?
        .checked_mul(tests)?
        .checked_add(CoverageHeader::SIZE)
}
