use crate::errors::BridgeError;
use std::fmt;
use std::ptr::{self, NonNull};

/// Logical purpose of a shared segment. Each role maps to exactly one live
/// segment per harness process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentRole {
    /// Request frames, written by the harness and read by the DUT runner.
    TestInput,
    /// Result frames, written by the DUT runner and read by the harness.
    CoverageOutput,
}

impl SegmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentRole::TestInput => "test-input",
            SegmentRole::CoverageOutput => "coverage-output",
        }
    }
}

impl fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SysV shared memory segment with a sequential write cursor and a
/// sequential read cursor.
///
/// SAFETY & OWNERSHIP:
///
/// The mapping is shared with another process that knows the segment id.
/// Nothing here arbitrates concurrent access: the harness writes during its
/// turn, hands the segment over through the handshake, and only touches it
/// again once the peer has acknowledged. Slices handed out by [`read`] and
/// [`write_slot`] are only valid to use during the caller's turn.
///
/// A segment created with [`create`] is removed from the system when released
/// or dropped. One obtained with [`attach`] is only detached.
///
/// [`read`]: SharedSegment::read
/// [`write_slot`]: SharedSegment::write_slot
/// [`create`]: SharedSegment::create
/// [`attach`]: SharedSegment::attach
pub struct SharedSegment {
    role: SegmentRole,
    id: libc::c_int,
    base: NonNull<u8>,
    capacity: usize,
    write_cursor: usize,
    read_cursor: usize,
    owned: bool,
    attached: bool,
}

unsafe impl Send for SharedSegment {}

impl SharedSegment {
    /// Allocate a fresh private segment of `capacity` bytes and map it.
    pub fn create(role: SegmentRole, capacity: usize) -> Result<Self, BridgeError> {
        let id = unsafe {
            libc::shmget(
                libc::IPC_PRIVATE,
                capacity,
                libc::IPC_CREAT | libc::IPC_EXCL | 0o600,
            )
        };
        if id < 0 {
            return Err(BridgeError::last_os(format!(
                "create {} segment of {} bytes",
                role, capacity
            )));
        }

        let base = match map(id) {
            Ok(base) => base,
            Err(e) => {
                unsafe {
                    libc::shmctl(id, libc::IPC_RMID, ptr::null_mut());
                }
                return Err(e);
            }
        };

        tracing::debug!(%role, segment_id = id, capacity, "Created shared segment");

        Ok(Self {
            role,
            id,
            base,
            capacity,
            write_cursor: 0,
            read_cursor: 0,
            owned: true,
            attached: true,
        })
    }

    /// Map an existing segment by the id another process handed over.
    ///
    /// The capacity is taken from the segment itself. Releasing an attached
    /// segment only unmaps it; the creator stays responsible for removal.
    pub fn attach(role: SegmentRole, id: u32) -> Result<Self, BridgeError> {
        let id = libc::c_int::try_from(id).map_err(|_| {
            BridgeError::Protocol(format!("segment id {} is not a valid SysV id", id))
        })?;

        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) } < 0 {
            return Err(BridgeError::last_os(format!("stat {} segment {}", role, id)));
        }
        let capacity = stat.shm_segsz as usize;
        let base = map(id)?;

        tracing::debug!(%role, segment_id = id, capacity, "Attached shared segment");

        Ok(Self {
            role,
            id,
            base,
            capacity,
            write_cursor: 0,
            read_cursor: 0,
            owned: false,
            attached: true,
        })
    }

    /// Append `bytes` at the write cursor.
    ///
    /// Fails without writing anything if the bytes would not fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.write_slot(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Claim the next `len` bytes for writing in place and advance the cursor.
    ///
    /// The slot holds whatever a previous iteration left there.
    pub fn write_slot(&mut self, len: usize) -> Result<&mut [u8], BridgeError> {
        let start = self.check_bounds(self.write_cursor, len)?;
        self.write_cursor += len;
        Ok(unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(start), len) })
    }

    /// Return the next `len` bytes at the read cursor and advance it.
    ///
    /// Never returns a short slice: a read past capacity is an overflow.
    pub fn read(&mut self, len: usize) -> Result<&[u8], BridgeError> {
        let start = self.check_bounds(self.read_cursor, len)?;
        self.read_cursor += len;
        Ok(unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(start), len) })
    }

    /// Fixed-size variant of [`SharedSegment::read`] for header fields.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BridgeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    /// Rewind both cursors without clearing the memory.
    pub fn reset(&mut self) {
        self.write_cursor = 0;
        self.read_cursor = 0;
    }

    /// Bytes written since the last reset.
    pub fn written(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.write_cursor) }
    }

    /// The id the OS assigned; this is what travels over the handshake.
    pub fn identifier(&self) -> u32 {
        self.id as u32
    }

    pub fn role(&self) -> SegmentRole {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Unmap the segment and, if this process created it, remove it.
    pub fn release(mut self) -> Result<(), BridgeError> {
        self.detach()
    }

    fn detach(&mut self) -> Result<(), BridgeError> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;

        let detached = unsafe { libc::shmdt(self.base.as_ptr() as *const libc::c_void) };
        if detached < 0 {
            return Err(BridgeError::last_os(format!(
                "detach {} segment {}",
                self.role, self.id
            )));
        }

        if self.owned && unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) } < 0 {
            return Err(BridgeError::last_os(format!(
                "remove {} segment {}",
                self.role, self.id
            )));
        }

        tracing::debug!(role = %self.role, segment_id = self.id, "Released shared segment");
        Ok(())
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<usize, BridgeError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(offset),
            _ => Err(BridgeError::Overflow {
                role: self.role,
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }
}

impl fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSegment")
            .field("role", &self.role)
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("write_cursor", &self.write_cursor)
            .field("read_cursor", &self.read_cursor)
            .field("owned", &self.owned)
            .finish()
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            tracing::warn!(error = %e, "Failed to release shared segment");
        }
    }
}

fn map(id: libc::c_int) -> Result<NonNull<u8>, BridgeError> {
    let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(BridgeError::last_os(format!("attach segment {}", id)));
    }
    NonNull::new(addr as *mut u8)
        .ok_or_else(|| BridgeError::Protocol(format!("segment {} mapped at null", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITY: usize = 4096;

    #[test]
    fn test_create_starts_with_zero_cursors() {
        let segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();

        assert_eq!(segment.capacity(), CAPACITY);
        assert_eq!(segment.write_cursor(), 0);
        assert_eq!(segment.read_cursor(), 0);
        assert!(segment.written().is_empty());
    }

    #[test]
    fn test_write_then_read_sequentially() {
        let mut segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();

        segment.write(b"hello ").unwrap();
        segment.write(b"world").unwrap();
        assert_eq!(segment.write_cursor(), 11);
        assert_eq!(segment.written(), b"hello world");

        assert_eq!(segment.read(6).unwrap(), b"hello ");
        assert_eq!(segment.read(5).unwrap(), b"world");
        assert_eq!(segment.read_cursor(), 11);
    }

    #[test]
    fn test_overflow_on_crossing_write_not_before() {
        let mut segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();

        segment.write(&[1u8; CAPACITY - 8]).unwrap();
        segment.write(&[2u8; 8]).unwrap();
        assert_eq!(segment.write_cursor(), CAPACITY, "Filling exactly is fine");

        match segment.write(&[3u8]) {
            Err(BridgeError::Overflow {
                role,
                offset,
                len,
                capacity,
            }) => {
                assert_eq!(role, SegmentRole::TestInput);
                assert_eq!(offset, CAPACITY);
                assert_eq!(len, 1);
                assert_eq!(capacity, CAPACITY);
            }
            other => panic!("Expected Overflow, got {:?}", other),
        }
        assert_eq!(segment.write_cursor(), CAPACITY, "Failed write must not move");
    }

    #[test]
    fn test_oversized_single_write_is_rejected_whole() {
        let mut segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();
        segment.write(&[7u8; 16]).unwrap();

        let result = segment.write(&vec![0u8; CAPACITY]);
        assert!(matches!(result, Err(BridgeError::Overflow { .. })));
        assert_eq!(segment.write_cursor(), 16);
    }

    #[test]
    fn test_read_never_clamps() {
        let mut segment = SharedSegment::create(SegmentRole::CoverageOutput, CAPACITY).unwrap();

        segment.read(CAPACITY - 2).unwrap();
        assert!(matches!(
            segment.read(4),
            Err(BridgeError::Overflow { offset, len: 4, .. }) if offset == CAPACITY - 2
        ));
        assert_eq!(segment.read(2).unwrap().len(), 2);
    }

    #[test]
    fn test_reset_rewinds_without_clearing() {
        let mut segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();
        segment.write(b"stale bytes").unwrap();
        segment.read(5).unwrap();

        segment.reset();
        assert_eq!(segment.write_cursor(), 0);
        assert_eq!(segment.read_cursor(), 0);
        assert_eq!(segment.read(11).unwrap(), b"stale bytes");
    }

    #[test]
    fn test_write_slot_fills_in_place() {
        let mut segment = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();

        segment.write_slot(4).unwrap().copy_from_slice(&[9, 8, 7, 6]);
        assert_eq!(segment.written(), &[9, 8, 7, 6]);
    }

    #[test]
    fn test_read_array() {
        let mut segment = SharedSegment::create(SegmentRole::CoverageOutput, CAPACITY).unwrap();
        segment.write(&0x7353_7353u32.to_be_bytes()).unwrap();

        let magic: [u8; 4] = segment.read_array().unwrap();
        assert_eq!(u32::from_be_bytes(magic), 0x7353_7353);
    }

    #[test]
    fn test_attach_sees_creator_writes() {
        let mut creator = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();
        creator.write(b"shared").unwrap();

        let mut peer = SharedSegment::attach(SegmentRole::TestInput, creator.identifier()).unwrap();
        assert_eq!(peer.capacity(), CAPACITY);
        assert_eq!(peer.read(6).unwrap(), b"shared");

        peer.write(b"SHARED").unwrap();
        assert_eq!(creator.written(), b"SHARED");
    }

    #[test]
    fn test_release_removes_owned_segment() {
        let segment = SharedSegment::create(SegmentRole::CoverageOutput, CAPACITY).unwrap();
        let id = segment.identifier();

        segment.release().unwrap();
        assert!(matches!(
            SharedSegment::attach(SegmentRole::CoverageOutput, id),
            Err(BridgeError::Resource { .. })
        ));
    }

    #[test]
    fn test_releasing_attachment_keeps_segment() {
        let creator = SharedSegment::create(SegmentRole::TestInput, CAPACITY).unwrap();

        let peer = SharedSegment::attach(SegmentRole::TestInput, creator.identifier()).unwrap();
        peer.release().unwrap();

        let again = SharedSegment::attach(SegmentRole::TestInput, creator.identifier());
        assert!(again.is_ok(), "Creator still owns the segment");
    }

    #[test]
    fn test_zero_capacity_is_a_resource_error() {
        assert!(matches!(
            SharedSegment::create(SegmentRole::TestInput, 0),
            Err(BridgeError::Resource { .. })
        ));
    }
}
