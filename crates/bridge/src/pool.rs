use crate::errors::BridgeError;
use crate::segment::{SegmentRole, SharedSegment};
use std::collections::HashMap;

/// Keeps one segment per role alive for the whole run.
///
/// The DUT runner may cache the mapping it builds for a segment id, so the
/// same OS segment is handed out on every iteration instead of a new one.
#[derive(Debug, Default)]
pub struct SegmentPool {
    segments: HashMap<SegmentRole, SharedSegment>,
}

impl SegmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the segment for `role` with both cursors rewound, creating it on
    /// first use.
    ///
    /// `capacity` only matters for the first call per role; later calls get
    /// the segment that already exists whatever capacity they ask for.
    pub fn acquire(
        &mut self,
        role: SegmentRole,
        capacity: usize,
    ) -> Result<&mut SharedSegment, BridgeError> {
        use std::collections::hash_map::Entry;

        match self.segments.entry(role) {
            Entry::Occupied(entry) => {
                let segment = entry.into_mut();
                if segment.capacity() != capacity {
                    tracing::warn!(
                        %role,
                        requested = capacity,
                        capacity = segment.capacity(),
                        "Ignoring capacity for existing segment"
                    );
                }
                segment.reset();
                Ok(segment)
            }
            Entry::Vacant(entry) => {
                let segment = SharedSegment::create(role, capacity)?;
                Ok(entry.insert(segment))
            }
        }
    }

    /// Acquire both segments one iteration needs, in one borrow.
    pub fn acquire_pair(
        &mut self,
        input_capacity: usize,
        coverage_capacity: usize,
    ) -> Result<(&mut SharedSegment, &mut SharedSegment), BridgeError> {
        self.acquire(SegmentRole::TestInput, input_capacity)?;
        self.acquire(SegmentRole::CoverageOutput, coverage_capacity)?;

        let mut input = None;
        let mut coverage = None;
        for (role, segment) in self.segments.iter_mut() {
            match role {
                SegmentRole::TestInput => input = Some(segment),
                SegmentRole::CoverageOutput => coverage = Some(segment),
            }
        }

        match (input, coverage) {
            (Some(input), Some(coverage)) => Ok((input, coverage)),
            _ => Err(BridgeError::Protocol(
                "segment pool lost a segment it just acquired".to_string(),
            )),
        }
    }

    pub fn get(&self, role: SegmentRole) -> Option<&SharedSegment> {
        self.segments.get(&role)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Remove every pooled segment from the system.
    ///
    /// Only call this once the run is over; the peer may still be mapping the
    /// segments mid-iteration. Every segment is released even if an earlier
    /// one fails; the first failure is returned.
    pub fn release_all(&mut self) -> Result<(), BridgeError> {
        let mut first_error = None;
        for (role, segment) in self.segments.drain() {
            if let Err(e) = segment.release() {
                tracing::error!(%role, error = %e, "Failed to release segment");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reuses_segment_and_resets_cursors() {
        let mut pool = SegmentPool::new();

        let first = pool.acquire(SegmentRole::TestInput, 1024).unwrap();
        let id = first.identifier();
        first.write(b"iteration one").unwrap();
        first.read(4).unwrap();
        assert_ne!(first.write_cursor(), 0);

        let second = pool.acquire(SegmentRole::TestInput, 1024).unwrap();
        assert_eq!(second.identifier(), id, "Same OS segment across iterations");
        assert_eq!(second.write_cursor(), 0);
        assert_eq!(second.read_cursor(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_original_capacity_wins() {
        let mut pool = SegmentPool::new();

        pool.acquire(SegmentRole::CoverageOutput, 2048).unwrap();
        let again = pool.acquire(SegmentRole::CoverageOutput, 4096).unwrap();
        assert_eq!(again.capacity(), 2048);
    }

    #[test]
    fn test_roles_get_distinct_segments() {
        let mut pool = SegmentPool::new();

        let (input, coverage) = pool.acquire_pair(1024, 512).unwrap();
        assert_ne!(input.identifier(), coverage.identifier());
        assert_eq!(input.role(), SegmentRole::TestInput);
        assert_eq!(coverage.role(), SegmentRole::CoverageOutput);
        assert_eq!(input.capacity(), 1024);
        assert_eq!(coverage.capacity(), 512);
    }

    #[test]
    fn test_acquire_pair_is_stable_across_calls() {
        let mut pool = SegmentPool::new();

        let (input, coverage) = pool.acquire_pair(1024, 1024).unwrap();
        let ids = (input.identifier(), coverage.identifier());
        input.write(&[1, 2, 3]).unwrap();

        let (input, coverage) = pool.acquire_pair(1024, 1024).unwrap();
        assert_eq!((input.identifier(), coverage.identifier()), ids);
        assert_eq!(input.write_cursor(), 0);
    }

    #[test]
    fn test_release_all_empties_pool() {
        let mut pool = SegmentPool::new();
        let id = pool
            .acquire(SegmentRole::TestInput, 1024)
            .unwrap()
            .identifier();

        pool.release_all().unwrap();
        assert!(pool.is_empty());
        assert!(SharedSegment::attach(SegmentRole::TestInput, id).is_err());
    }
}
