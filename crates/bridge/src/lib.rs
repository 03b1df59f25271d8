//! Harness side of the DUT fuzzing bridge.
//!
//! Test vectors travel to the DUT runner through a SysV shared memory segment,
//! coverage travels back through a second one, and a pair of FIFOs carries the
//! 8-byte handshake that hands each segment back and forth.

pub mod errors;
pub mod frame;
pub mod handshake;
pub mod header;
pub mod paths;
pub mod pool;
pub mod segment;
pub mod session;

pub use errors::BridgeError;
pub use frame::{CoverageRecord, TestRequest, write_coverage_frame};
pub use handshake::{HandshakeChannel, HandshakePair};
pub use header::{CoverageHeader, TestInputHeader};
pub use pool::SegmentPool;
pub use segment::{SegmentRole, SharedSegment};
pub use session::{CoverageRecords, SessionState, TestGenerator, TestSession};
