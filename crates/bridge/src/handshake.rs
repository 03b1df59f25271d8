use crate::errors::BridgeError;
use crate::paths::{INBOUND_FIFO_NAME, OUTBOUND_FIFO_NAME};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// One handshake message: two 32-bit values in native byte order.
///
/// Harness to DUT it carries the (test-input, coverage-output) segment ids.
/// DUT to harness it is an acknowledgment whose values carry no meaning on
/// this side; its arrival is the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePair(pub u32, pub u32);

impl HandshakePair {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.0.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.1.to_ne_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(
            u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        )
    }
}

/// The two FIFOs the harness and the DUT runner rendezvous on.
///
/// Both FIFOs are created by the DUT runner. Opening a FIFO blocks until the
/// other end is opened too, so both sides must agree on an order: the DUT
/// transmit FIFO is opened first, then the DUT receive FIFO.
#[derive(Debug)]
pub struct HandshakeChannel {
    inbound: File,
    outbound: File,
    inbound_path: PathBuf,
    outbound_path: PathBuf,
}

impl HandshakeChannel {
    /// Open the harness end of the FIFOs found in `dir`.
    ///
    /// Reads acknowledgments from `tx.fifo` and writes segment ids to
    /// `rx.fifo`. Blocks until the DUT runner opens its ends.
    pub fn harness(dir: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let dir = dir.as_ref();
        let inbound_path = dir.join(INBOUND_FIFO_NAME);
        let outbound_path = dir.join(OUTBOUND_FIFO_NAME);

        let inbound = open_fifo(&inbound_path, false)?;
        let outbound = open_fifo(&outbound_path, true)?;

        tracing::info!(
            inbound = %inbound_path.display(),
            outbound = %outbound_path.display(),
            "Handshake channel open"
        );

        Ok(Self {
            inbound,
            outbound,
            inbound_path,
            outbound_path,
        })
    }

    /// Open the DUT runner end of the FIFOs found in `dir`.
    ///
    /// The mirror image of [`HandshakeChannel::harness`], for runners written
    /// in Rust and for exercising the harness without a simulator.
    pub fn dut(dir: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let dir = dir.as_ref();
        let inbound_path = dir.join(OUTBOUND_FIFO_NAME);
        let outbound_path = dir.join(INBOUND_FIFO_NAME);

        let outbound = open_fifo(&outbound_path, true)?;
        let inbound = open_fifo(&inbound_path, false)?;

        Ok(Self {
            inbound,
            outbound,
            inbound_path,
            outbound_path,
        })
    }

    /// Send one pair and push it through to the peer right away.
    ///
    /// The flush is part of the protocol: a pair sitting in a buffer leaves
    /// the peer blocked in its read and the harness blocked in [`wait`].
    ///
    /// [`wait`]: HandshakeChannel::wait
    pub fn notify(&mut self, pair: HandshakePair) -> Result<(), BridgeError> {
        self.outbound.write_all(&pair.to_bytes())?;
        self.outbound.flush()?;
        tracing::trace!(first = pair.0, second = pair.1, "Handshake sent");
        Ok(())
    }

    /// Block until the peer sends one pair.
    ///
    /// # Blocking
    ///
    /// There is no timeout. A peer that never answers keeps this call, and the
    /// whole harness, waiting forever; put a watchdog around the process if
    /// that matters. The peer closing its end is reported as a protocol error.
    pub fn wait(&mut self) -> Result<HandshakePair, BridgeError> {
        let mut bytes = [0u8; HandshakePair::SIZE];
        match self.inbound.read_exact(&mut bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(BridgeError::Protocol(format!(
                    "peer closed {} mid-handshake",
                    self.inbound_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let pair = HandshakePair::from_bytes(bytes);
        tracing::trace!(first = pair.0, second = pair.1, "Handshake received");
        Ok(pair)
    }

    pub fn inbound_path(&self) -> &Path {
        &self.inbound_path
    }

    pub fn outbound_path(&self) -> &Path {
        &self.outbound_path
    }

    /// Close both FIFOs. Must not race an outstanding [`HandshakeChannel::wait`].
    pub fn close(self) {
        tracing::debug!(
            inbound = %self.inbound_path.display(),
            outbound = %self.outbound_path.display(),
            "Closing handshake channel"
        );
    }
}

fn open_fifo(path: &Path, write: bool) -> Result<File, BridgeError> {
    OpenOptions::new()
        .read(!write)
        .write(write)
        .open(path)
        .map_err(|source| BridgeError::Resource {
            what: format!("open handshake fifo {}", path.display()),
            source,
        })
}
