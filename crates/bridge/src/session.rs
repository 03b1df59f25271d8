use crate::errors::BridgeError;
use crate::frame::CoverageRecord;
use crate::handshake::{HandshakeChannel, HandshakePair};
use crate::header::{CYCLE_COUNT_SIZE, CoverageHeader, TestInputHeader};
use crate::pool::SegmentPool;
use crate::segment::SharedSegment;

/// Source of test vectors for one request frame.
pub trait TestGenerator {
    /// How many input vectors the next test gets.
    fn inputs_left(&mut self) -> u64;

    /// Fill one input vector in place.
    fn fill_input(&mut self, input: &mut [u8]);
}

impl<G: TestGenerator + ?Sized> TestGenerator for &mut G {
    fn inputs_left(&mut self) -> u64 {
        (**self).inputs_left()
    }

    fn fill_input(&mut self, input: &mut [u8]) {
        (**self).fill_input(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Writing the request frame.
    Building,
    /// Request handed to the DUT runner, acknowledgment pending.
    Awaiting,
    /// Coverage frame handed back, ready to decode.
    Parsing,
}

/// One request/response exchange with the DUT runner.
///
/// Moves strictly forward: [`encode`] in `Building`, [`exchange`] in
/// `Awaiting`, [`decode`] in `Parsing`. Calling an operation out of turn is
/// an [`BridgeError::InvalidState`] and leaves the session where it was.
///
/// [`encode`]: TestSession::encode
/// [`exchange`]: TestSession::exchange
/// [`decode`]: TestSession::decode
#[derive(Debug)]
pub struct TestSession<'a> {
    input: &'a mut SharedSegment,
    coverage: &'a mut SharedSegment,
    state: SessionState,
    encoded: Option<TestInputHeader>,
}

impl<'a> TestSession<'a> {
    /// Start a session on the pooled segments, rewinding both.
    pub fn new(
        pool: &'a mut SegmentPool,
        input_capacity: usize,
        coverage_capacity: usize,
    ) -> Result<Self, BridgeError> {
        let (input, coverage) = pool.acquire_pair(input_capacity, coverage_capacity)?;
        Ok(Self::with_segments(input, coverage))
    }

    /// Start a session on segments the caller manages. Cursors are used as-is.
    pub fn with_segments(
        input: &'a mut SharedSegment,
        coverage: &'a mut SharedSegment,
    ) -> Self {
        Self {
            input,
            coverage,
            state: SessionState::Building,
            encoded: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Segment ids in handshake order.
    pub fn segment_ids(&self) -> HandshakePair {
        HandshakePair(self.input.identifier(), self.coverage.identifier())
    }

    /// Write the request frame: header, then for each of `tests_left` tests
    /// the generator's vector count and that many `input_size`-byte vectors.
    ///
    /// Only the segment capacity bounds the frame. Returns the number of
    /// vectors written.
    pub fn encode<G: TestGenerator>(
        &mut self,
        mut generator: G,
        tests_left: u16,
        buffer_id: u32,
        input_size: usize,
    ) -> Result<u64, BridgeError> {
        self.expect_state(SessionState::Building)?;

        let header = TestInputHeader {
            buffer_id,
            tests_left,
        };
        self.input.write(&header.to_bytes())?;

        let mut vectors = 0u64;
        for _ in 0..tests_left {
            let inputs_left = generator.inputs_left();
            self.input.write(&inputs_left.to_be_bytes())?;
            for _ in 0..inputs_left {
                generator.fill_input(self.input.write_slot(input_size)?);
            }
            vectors += inputs_left;
        }

        tracing::debug!(
            buffer_id,
            tests_left,
            vectors,
            frame_len = self.input.write_cursor(),
            "Encoded request frame"
        );

        self.encoded = Some(header);
        self.state = SessionState::Awaiting;
        Ok(vectors)
    }

    /// Hand both segments to the DUT runner and block until it hands them back.
    ///
    /// Blocks without a timeout; see [`HandshakeChannel::wait`]. The returned
    /// acknowledgment is opaque.
    pub fn exchange(
        &mut self,
        channel: &mut HandshakeChannel,
    ) -> Result<HandshakePair, BridgeError> {
        self.expect_state(SessionState::Awaiting)?;

        channel.notify(self.segment_ids())?;
        let ack = channel.wait()?;

        self.state = SessionState::Parsing;
        Ok(ack)
    }

    /// Validate the coverage header and return the records lazily.
    ///
    /// Asking for more tests than this session encoded is a protocol error:
    /// anything past the current frame would be stale bytes from an earlier
    /// iteration. The buffer id must echo the one encoded.
    pub fn decode(
        mut self,
        expected_tests_left: u16,
        coverage_size: usize,
    ) -> Result<CoverageRecords<'a>, BridgeError> {
        self.expect_state(SessionState::Parsing)?;

        let encoded = self.encoded.ok_or_else(|| {
            BridgeError::Protocol("decoding a session that never encoded".to_string())
        })?;
        if expected_tests_left > encoded.tests_left {
            return Err(BridgeError::Protocol(format!(
                "decoding {} tests but only {} were encoded",
                expected_tests_left, encoded.tests_left
            )));
        }

        let header = CoverageHeader::parse(&self.coverage.read_array()?)?;
        if header.buffer_id != encoded.buffer_id {
            return Err(BridgeError::Protocol(format!(
                "coverage for buffer {}, request was buffer {}",
                header.buffer_id, encoded.buffer_id
            )));
        }

        Ok(CoverageRecords {
            segment: self.coverage,
            remaining: expected_tests_left,
            coverage_size,
        })
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), BridgeError> {
        if self.state != expected {
            return Err(BridgeError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

/// Records of one coverage frame, read from shared memory on demand.
///
/// Yields at most the number of tests asked for and stops for good after the
/// first error.
#[derive(Debug)]
pub struct CoverageRecords<'a> {
    segment: &'a mut SharedSegment,
    remaining: u16,
    coverage_size: usize,
}

impl CoverageRecords<'_> {
    fn read_record(&mut self) -> Result<CoverageRecord, BridgeError> {
        let cycles = u16::from_be_bytes(self.segment.read_array::<CYCLE_COUNT_SIZE>()?);
        let coverage = self.segment.read(self.coverage_size)?.to_vec();
        Ok(CoverageRecord { cycles, coverage })
    }
}

impl Iterator for CoverageRecords<'_> {
    type Item = Result<CoverageRecord, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.read_record() {
            Ok(record) => {
                self.remaining -= 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

impl std::iter::FusedIterator for CoverageRecords<'_> {}
