use crate::instrumentation::InstrumentationConfig;
use anyhow::{Result, ensure};
use bridge::CoverageRecord;

/// Receives every coverage record the driver decodes, in order.
pub trait CoverageConsumer {
    /// `test` is the record's position within the iteration's frame.
    fn consume(&mut self, iteration: u64, test: usize, record: CoverageRecord) -> Result<()>;
}

/// Bit positions of one coverage signal and its inverted twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signal {
    plain: usize,
    twin: usize,
}

/// Totals at a point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverageSummary {
    pub records: u64,
    pub cycles: u64,
    /// Records that set at least one bit never seen before.
    pub novel_records: u64,
    pub covered_bits: u32,
    /// Signals seen in both polarities, out of the total, when the
    /// instrumentation layout is known.
    pub covered_signals: Option<(usize, usize)>,
}

/// Folds coverage maps into one cumulative map.
///
/// Bit `i` of a map lives in byte `i / 8`, MSB first. Some DUTs report an
/// inverted map where a cleared bit means covered; those are flipped before
/// merging so the cumulative map always uses set-means-covered.
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    map: Vec<u8>,
    inverted: bool,
    signals: Vec<Signal>,
    summary: CoverageSummary,
}

impl CoverageTracker {
    pub fn new(coverage_size: usize, inverted: bool) -> Self {
        Self {
            map: vec![0; coverage_size],
            inverted,
            signals: Vec::new(),
            summary: CoverageSummary::default(),
        }
    }

    /// Track per-signal coverage using the instrumentation layout.
    pub fn with_instrumentation(mut self, config: &InstrumentationConfig) -> Self {
        self.signals = config
            .coverage
            .iter()
            .filter(|point| !point.inverted && point.index >= 0)
            .map(|point| Signal {
                plain: point.index as usize,
                twin: point.index as usize + 1,
            })
            .collect();
        self
    }

    /// Merge one map; true if it covered anything new.
    pub fn merge(&mut self, coverage: &[u8]) -> Result<bool> {
        ensure!(
            coverage.len() == self.map.len(),
            "coverage map of {} bytes, tracker expects {}",
            coverage.len(),
            self.map.len()
        );

        let mut novel = false;
        for (acc, &byte) in self.map.iter_mut().zip(coverage) {
            let byte = if self.inverted { !byte } else { byte };
            novel |= byte & !*acc != 0;
            *acc |= byte;
        }
        Ok(novel)
    }

    pub fn is_covered(&self, bit: usize) -> bool {
        self.map
            .get(bit / 8)
            .is_some_and(|byte| byte >> (7 - bit % 8) & 1 == 1)
    }

    pub fn map(&self) -> &[u8] {
        &self.map
    }

    pub fn summary(&self) -> CoverageSummary {
        let covered_signals = (!self.signals.is_empty()).then(|| {
            let covered = self
                .signals
                .iter()
                .filter(|s| self.is_covered(s.plain) && self.is_covered(s.twin))
                .count();
            (covered, self.signals.len())
        });

        CoverageSummary {
            covered_bits: self.map.iter().map(|byte| byte.count_ones()).sum(),
            covered_signals,
            ..self.summary
        }
    }
}

impl CoverageConsumer for CoverageTracker {
    fn consume(&mut self, iteration: u64, test: usize, record: CoverageRecord) -> Result<()> {
        let novel = self.merge(&record.coverage)?;

        self.summary.records += 1;
        self.summary.cycles += record.cycles as u64;
        if novel {
            self.summary.novel_records += 1;
            tracing::debug!(iteration, test, cycles = record.cycles, "New coverage");
        }
        Ok(())
    }
}
