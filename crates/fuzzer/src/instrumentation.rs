//! The TOML description the coverage instrumentation pass emits for a DUT.
//!
//! It tells the harness how wide the DUT's inputs are and which coverage
//! counters exist, which fixes the per-cycle input size and the coverage size
//! the DUT runner uses.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::value::Datetime;

#[derive(Error, Debug)]
pub enum InstrumentationError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid instrumentation config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Coverage point {name} has a {bits}-bit counter, only 1-bit counters are supported")]
    UnsupportedCounter { name: String, bits: i32 },

    #[error("Coverage point {name} is not paired with its inverted twin")]
    UnpairedCoverage { name: String },

    #[error("Cannot round test sizes to a word size of {0}")]
    InvalidWordSize(usize),

    #[error("{what} needs {bits} bits but only {bytes} bytes are allocated")]
    TooNarrow {
        what: &'static str,
        bits: usize,
        bytes: usize,
    },
}

/// Bytes per cycle of input and bytes of coverage per test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestSize {
    pub input: usize,
    pub coverage: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub filename: String,
    pub instrumented: String,
    pub module: String,
    pub timestamp: Datetime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoveragePoint {
    pub name: String,
    pub inverted: bool,
    /// Bit position in the coverage map, MSB of byte 0 first.
    pub index: i32,
    pub counterbits: i32,
    pub filename: String,
    pub line: i32,
    pub column: i32,
    pub human: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputField {
    pub name: String,
    pub width: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentationConfig {
    pub general: General,
    #[serde(default)]
    pub coverage: Vec<CoveragePoint>,
    #[serde(default)]
    pub input: Vec<InputField>,
}

impl InstrumentationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InstrumentationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| InstrumentationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, InstrumentationError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn input_bits(&self) -> usize {
        self.input.iter().map(|field| field.width as usize).sum()
    }

    pub fn coverage_bits(&self) -> usize {
        self.coverage
            .iter()
            .map(|point| point.counterbits.max(0) as usize)
            .sum()
    }

    /// Byte sizes rounded up to whole bytes, then to whole `word_size` words.
    pub fn test_size(&self, word_size: usize) -> Result<TestSize, InstrumentationError> {
        if word_size == 0 {
            return Err(InstrumentationError::InvalidWordSize(word_size));
        }
        let to_bytes = |bits: usize| {
            bits.div_ceil(8)
                .div_ceil(word_size)
                .checked_mul(word_size)
                .ok_or(InstrumentationError::InvalidWordSize(word_size))
        };
        Ok(TestSize {
            input: to_bytes(self.input_bits())?,
            coverage: to_bytes(self.coverage_bits())?,
        })
    }

    /// Check the assumptions the coverage accounting relies on.
    pub fn validate(&self, size: TestSize) -> Result<(), InstrumentationError> {
        if let Some(point) = self.coverage.iter().find(|p| p.counterbits != 1) {
            return Err(InstrumentationError::UnsupportedCounter {
                name: point.name.clone(),
                bits: point.counterbits,
            });
        }

        // Each point is immediately followed by its inverted twin.
        for pair in self.coverage.chunks(2) {
            match pair {
                [plain, twin] if !plain.inverted && twin.inverted && plain.name == twin.name => {}
                [plain, ..] => {
                    return Err(InstrumentationError::UnpairedCoverage {
                        name: plain.name.clone(),
                    });
                }
                [] => {}
            }
        }

        if self.input_bits() > size.input * 8 {
            return Err(InstrumentationError::TooNarrow {
                what: "Input",
                bits: self.input_bits(),
                bytes: size.input,
            });
        }
        if self.coverage_bits() > size.coverage * 8 {
            return Err(InstrumentationError::TooNarrow {
                what: "Coverage",
                bits: self.coverage_bits(),
                bytes: size.coverage,
            });
        }
        Ok(())
    }

    /// Coverage signals, counting each point and its inverted twin once.
    pub fn coverage_signal_count(&self) -> usize {
        self.coverage.iter().filter(|point| !point.inverted).count()
    }

    pub fn input_fields(&self) -> Vec<(String, u32)> {
        self.input
            .iter()
            .map(|field| (field.name.clone(), field.width))
            .collect()
    }
}
