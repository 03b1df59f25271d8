use crate::errors::BridgeError;

/// Frame headers written at offset 0 of each segment.
///
/// All multi-byte fields are big-endian regardless of host order.
///
/// Test-input frame:
///
/// | Offset | Size | Field                          |
/// |--------|------|--------------------------------|
/// | 0      | 4    | magic `0x19931993`             |
/// | 4      | 4    | buffer id                      |
/// | 8      | 2    | tests left                     |
/// | 10     | 6    | reserved, zero                 |
/// | 16     | ..   | per test: u64 inputs left, then inputs left * input size bytes |
///
/// Coverage-output frame:
///
/// | Offset | Size | Field                          |
/// |--------|------|--------------------------------|
/// | 0      | 4    | magic `0x73537353`             |
/// | 4      | 4    | buffer id                      |
/// | 8      | ..   | per test: u16 cycle count, then coverage size bytes |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestInputHeader {
    pub buffer_id: u32,
    pub tests_left: u16,
}

impl TestInputHeader {
    pub const MAGIC: u32 = 0x1993_1993;
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.buffer_id.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.tests_left.to_be_bytes());
        bytes
    }

    /// Parse a request header as the DUT runner sees it.
    pub fn parse(bytes: &[u8; Self::SIZE]) -> Result<Self, BridgeError> {
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != Self::MAGIC {
            return Err(BridgeError::Protocol(format!(
                "test-input magic {:#010x}, expected {:#010x}",
                magic,
                Self::MAGIC
            )));
        }
        if bytes[10..].iter().any(|&b| b != 0) {
            return Err(BridgeError::Protocol(
                "test-input reserved bytes are not zero".to_string(),
            ));
        }
        Ok(Self {
            buffer_id: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            tests_left: u16::from_be_bytes([bytes[8], bytes[9]]),
        })
    }
}

/// Width of the per-test vector count in a request frame.
pub const INPUTS_LEFT_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageHeader {
    pub buffer_id: u32,
}

impl CoverageHeader {
    pub const MAGIC: u32 = 0x7353_7353;
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.buffer_id.to_be_bytes());
        bytes
    }

    /// Fails on any magic other than [`CoverageHeader::MAGIC`]; the frame
    /// behind a bad magic is never interpreted.
    pub fn parse(bytes: &[u8; Self::SIZE]) -> Result<Self, BridgeError> {
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != Self::MAGIC {
            return Err(BridgeError::Protocol(format!(
                "coverage magic {:#010x}, expected {:#010x}",
                magic,
                Self::MAGIC
            )));
        }
        Ok(Self {
            buffer_id: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Width of the per-test cycle count in a coverage frame.
pub const CYCLE_COUNT_SIZE: usize = 2;
