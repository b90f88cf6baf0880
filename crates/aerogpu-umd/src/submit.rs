//! Ring/fence submission: the driver side of `aerogpu_ring`.
//!
//! The driver owns `tail`, the device owns `head`. Each ring slot has a staging region in guest
//! memory holding that submission's command stream followed by its allocation table; a slot is
//! only reused once the device has moved `head` past it.

use core::mem::offset_of;
use std::collections::HashSet;

use aero_protocol::aerogpu::aerogpu_ring::{
    write_fence_page_le, AerogpuAllocEntry, AerogpuAllocTableHeader, AerogpuFencePage, AerogpuRingHeader,
    AerogpuSubmitDesc, AEROGPU_ALLOC_FLAG_READONLY, AEROGPU_ALLOC_TABLE_MAGIC, AEROGPU_SUBMIT_FLAG_NO_IRQ,
    AEROGPU_SUBMIT_FLAG_PRESENT,
};
use aero_protocol::aerogpu::aerogpu_pci::AEROGPU_ABI_VERSION_U32;
use bitflags::bitflags;
use tracing::{debug, warn};

use crate::error::{SubmitError, UmdError};
use crate::guest_memory::GuestMemory;

pub const RING_HEAD_OFFSET: u64 = offset_of!(AerogpuRingHeader, head) as u64;
pub const RING_TAIL_OFFSET: u64 = offset_of!(AerogpuRingHeader, tail) as u64;

/// Upper bound on allocation-table entries; keeps every encoded size within `u32`.
pub const MAX_ALLOC_ENTRIES: usize = 1 << 16;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SubmitFlags: u32 {
        const PRESENT = AEROGPU_SUBMIT_FLAG_PRESENT;
        const NO_IRQ = AEROGPU_SUBMIT_FLAG_NO_IRQ;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AllocFlags: u32 {
        const READONLY = AEROGPU_ALLOC_FLAG_READONLY;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocEntry {
    pub alloc_id: u32,
    pub flags: AllocFlags,
    pub gpa: u64,
    pub size_bytes: u64,
}

/// Guest allocations referenced by a submission, keyed by `alloc_id`.
#[derive(Debug, Clone, Default)]
pub struct AllocTableBuilder {
    entries: Vec<AllocEntry>,
    ids: HashSet<u32>,
}

impl AllocTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, alloc_id: u32, flags: AllocFlags, gpa: u64, size_bytes: u64) -> Result<(), UmdError> {
        if alloc_id == 0 {
            return Err(UmdError::invalid_arg("alloc_id 0 is reserved"));
        }
        if size_bytes == 0 {
            return Err(UmdError::invalid_arg(format!("allocation {alloc_id} has zero size")));
        }
        if gpa.checked_add(size_bytes).is_none() {
            return Err(UmdError::invalid_arg(format!(
                "allocation {alloc_id} overflows the address space (gpa 0x{gpa:x}, {size_bytes} bytes)"
            )));
        }
        if self.ids.contains(&alloc_id) {
            return Err(UmdError::invalid_arg(format!("allocation {alloc_id} already registered")));
        }
        if self.entries.len() >= MAX_ALLOC_ENTRIES {
            return Err(UmdError::invalid_arg("allocation table full"));
        }
        self.ids.insert(alloc_id);
        self.entries.push(AllocEntry {
            alloc_id,
            flags,
            gpa,
            size_bytes,
        });
        Ok(())
    }

    /// Returns whether `alloc_id` was present.
    pub fn remove(&mut self, alloc_id: u32) -> bool {
        if !self.ids.remove(&alloc_id) {
            return false;
        }
        self.entries.retain(|e| e.alloc_id != alloc_id);
        true
    }

    pub fn entries(&self) -> &[AllocEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encoded_size(&self) -> usize {
        AerogpuAllocTableHeader::SIZE_BYTES + self.entries.len() * AerogpuAllocEntry::SIZE_BYTES
    }

    /// Header followed by one 32-byte entry per allocation, in registration order.
    pub fn encode(&self) -> Vec<u8> {
        let size = self.encoded_size();
        let mut out = vec![0u8; size];

        let header = AerogpuAllocTableHeader {
            magic: AEROGPU_ALLOC_TABLE_MAGIC,
            abi_version: AEROGPU_ABI_VERSION_U32,
            // Bounded by MAX_ALLOC_ENTRIES.
            size_bytes: size as u32,
            entry_count: self.entries.len() as u32,
            entry_stride_bytes: AerogpuAllocEntry::SIZE_BYTES as u32,
            reserved0: 0,
        };
        let mut hdr_bytes = [0u8; AerogpuAllocTableHeader::SIZE_BYTES];
        header.write_to_le_bytes(&mut hdr_bytes);
        out[..AerogpuAllocTableHeader::SIZE_BYTES].copy_from_slice(&hdr_bytes);

        for (chunk, e) in out[AerogpuAllocTableHeader::SIZE_BYTES..]
            .chunks_exact_mut(AerogpuAllocEntry::SIZE_BYTES)
            .zip(&self.entries)
        {
            let entry = AerogpuAllocEntry {
                alloc_id: e.alloc_id,
                flags: e.flags.bits(),
                gpa: e.gpa,
                size_bytes: e.size_bytes,
                reserved0: 0,
            };
            let mut bytes = [0u8; AerogpuAllocEntry::SIZE_BYTES];
            entry.write_to_le_bytes(&mut bytes);
            chunk.copy_from_slice(&bytes);
        }
        out
    }
}

/// One finalized command stream on its way to the device.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub cmd: &'a [u8],
    pub alloc_table: Option<&'a [u8]>,
    pub flags: SubmitFlags,
    pub context_id: u32,
    pub engine_id: u32,
    pub signal_fence: u64,
}

/// Transport that carries finished streams to the device.
pub trait Submitter {
    /// Enqueue `submission`. On error nothing was enqueued.
    fn submit(&mut self, submission: &Submission<'_>) -> Result<(), SubmitError>;

    /// Latest completed fence the device has published, if the transport can observe it.
    fn poll_completed_fence(&mut self) -> Result<Option<u64>, SubmitError> {
        Ok(None)
    }
}

impl<S: Submitter + ?Sized> Submitter for Box<S> {
    fn submit(&mut self, submission: &Submission<'_>) -> Result<(), SubmitError> {
        (**self).submit(submission)
    }

    fn poll_completed_fence(&mut self) -> Result<Option<u64>, SubmitError> {
        (**self).poll_completed_fence()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceTracker {
    last_submitted: u64,
    last_completed: u64,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_submitted(&self) -> u64 {
        self.last_submitted
    }

    pub fn last_completed(&self) -> u64 {
        self.last_completed
    }

    /// Fence the next submission signals.
    pub fn next_fence(&self) -> u64 {
        self.last_submitted + 1
    }

    /// Record a successful submission of `fence`.
    pub fn mark_submitted(&mut self, fence: u64) {
        self.last_submitted = self.last_submitted.max(fence);
    }

    /// Fold in a completed fence reported by the device. Never moves backwards.
    pub fn observe_completed(&mut self, fence: u64) -> u64 {
        self.last_completed = self.last_completed.max(fence);
        self.last_completed
    }

    pub fn is_complete(&self, fence: u64) -> bool {
        fence <= self.last_completed
    }
}

/// Where the ring, its staging regions and the fence page live in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    pub ring_gpa: u64,
    /// Power of two.
    pub entry_count: u32,
    /// Base of `entry_count` staging regions of `staging_slot_bytes` each.
    pub staging_gpa: u64,
    pub staging_slot_bytes: u32,
    pub fence_page_gpa: Option<u64>,
}

impl RingLayout {
    pub fn ring_size_bytes(&self) -> u64 {
        AerogpuRingHeader::SIZE_BYTES as u64 + u64::from(self.entry_count) * AerogpuSubmitDesc::SIZE_BYTES as u64
    }

    pub fn desc_gpa(&self, slot: u32) -> u64 {
        self.ring_gpa + AerogpuRingHeader::SIZE_BYTES as u64 + u64::from(slot) * AerogpuSubmitDesc::SIZE_BYTES as u64
    }

    pub fn staging_slot_gpa(&self, slot: u32) -> u64 {
        self.staging_gpa + u64::from(slot) * u64::from(self.staging_slot_bytes)
    }
}

fn align_up_8(v: usize) -> usize {
    (v + 7) & !7
}

/// Producer side of the submission ring over guest memory.
#[derive(Debug)]
pub struct RingSubmitter<M: GuestMemory> {
    mem: M,
    layout: RingLayout,
    tail: u32,
}

impl<M: GuestMemory> RingSubmitter<M> {
    /// Write a fresh ring header (`head == tail == 0`) and, if configured, an initial fence page.
    pub fn init(mut mem: M, layout: RingLayout) -> Result<Self, SubmitError> {
        let header = AerogpuRingHeader::new(layout.entry_count);
        header.validate_prefix()?;
        let mut bytes = [0u8; AerogpuRingHeader::SIZE_BYTES];
        header.write_to_le_bytes(&mut bytes);
        mem.write(layout.ring_gpa, &bytes)?;

        if let Some(gpa) = layout.fence_page_gpa {
            let mut page = [0u8; AerogpuFencePage::SIZE_BYTES];
            write_fence_page_le(&mut page, 0)?;
            mem.write(gpa, &page)?;
        }

        debug!(
            ring_gpa = layout.ring_gpa,
            entry_count = layout.entry_count,
            "submission ring initialized"
        );
        Ok(Self { mem, layout, tail: 0 })
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn mem(&self) -> &M {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn into_inner(self) -> M {
        self.mem
    }

    pub fn tail(&self) -> u32 {
        self.tail
    }

    pub fn head(&self) -> Result<u32, SubmitError> {
        Ok(self.mem.read_u32(self.layout.ring_gpa + RING_HEAD_OFFSET)?)
    }

    /// Submissions the device has not consumed yet.
    pub fn pending(&self) -> Result<u32, SubmitError> {
        Ok(self.tail.wrapping_sub(self.head()?))
    }

    fn try_submit(&mut self, submission: &Submission<'_>) -> Result<(), SubmitError> {
        let entry_count = self.layout.entry_count;
        let head = self.head()?;
        if self.tail.wrapping_sub(head) >= entry_count {
            return Err(SubmitError::RingFull {
                head,
                tail: self.tail,
                entry_count,
            });
        }

        let alloc_table = submission.alloc_table.unwrap_or_default();
        let alloc_offset = align_up_8(submission.cmd.len());
        let total = alloc_offset + alloc_table.len();
        let capacity = self.layout.staging_slot_bytes as usize;
        if total > capacity {
            return Err(SubmitError::PayloadTooLarge {
                size_bytes: total,
                capacity,
            });
        }

        let slot = self.tail & (entry_count - 1);
        let staging = self.layout.staging_slot_gpa(slot);
        self.mem.write(staging, submission.cmd)?;
        let alloc_table_gpa = if alloc_table.is_empty() {
            0
        } else {
            let gpa = staging + alloc_offset as u64;
            self.mem.write(gpa, alloc_table)?;
            gpa
        };

        // Both sizes are bounded by `staging_slot_bytes`.
        let desc = AerogpuSubmitDesc {
            desc_size_bytes: AerogpuSubmitDesc::SIZE_BYTES as u32,
            flags: submission.flags.bits(),
            context_id: submission.context_id,
            engine_id: submission.engine_id,
            cmd_gpa: staging,
            cmd_size_bytes: submission.cmd.len() as u32,
            cmd_reserved0: 0,
            alloc_table_gpa,
            alloc_table_size_bytes: alloc_table.len() as u32,
            alloc_table_reserved0: 0,
            signal_fence: submission.signal_fence,
            reserved0: 0,
        };
        let mut bytes = [0u8; AerogpuSubmitDesc::SIZE_BYTES];
        desc.write_to_le_bytes(&mut bytes);
        self.mem.write(self.layout.desc_gpa(slot), &bytes)?;

        let new_tail = self.tail.wrapping_add(1);
        self.mem.write_u32(self.layout.ring_gpa + RING_TAIL_OFFSET, new_tail)?;
        self.tail = new_tail;

        debug!(
            slot,
            tail = new_tail,
            fence = submission.signal_fence,
            cmd_bytes = submission.cmd.len(),
            "submitted command stream"
        );
        Ok(())
    }
}

impl<M: GuestMemory> Submitter for RingSubmitter<M> {
    fn submit(&mut self, submission: &Submission<'_>) -> Result<(), SubmitError> {
        self.try_submit(submission).map_err(|err| {
            warn!(%err, fence = submission.signal_fence, "ring submission failed");
            err
        })
    }

    fn poll_completed_fence(&mut self) -> Result<Option<u64>, SubmitError> {
        let Some(gpa) = self.layout.fence_page_gpa else {
            return Ok(None);
        };
        let mut page = [0u8; AerogpuFencePage::SIZE_BYTES];
        self.mem.read(gpa, &mut page)?;
        let page = AerogpuFencePage::decode_from_le_bytes(&page)?;
        page.validate_prefix()?;
        Ok(Some(page.completed_fence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest_memory::VecGuestMemory;
    use aero_protocol::aerogpu::aerogpu_ring::AerogpuRingDecodeError;
    use pretty_assertions::assert_eq;

    fn layout(entry_count: u32) -> RingLayout {
        RingLayout {
            ring_gpa: 0x1000,
            entry_count,
            staging_gpa: 0x4000,
            staging_slot_bytes: 0x400,
            fence_page_gpa: Some(0x3000),
        }
    }

    #[test]
    fn fence_tracker_is_monotonic() {
        let mut f = FenceTracker::new();
        assert_eq!(f.next_fence(), 1);
        f.mark_submitted(1);
        f.mark_submitted(2);
        assert_eq!(f.next_fence(), 3);
        assert_eq!(f.observe_completed(2), 2);
        assert_eq!(f.observe_completed(1), 2);
        assert!(f.is_complete(2));
        assert!(!f.is_complete(3));
    }

    #[test]
    fn alloc_table_rejects_bad_entries() {
        let mut t = AllocTableBuilder::new();
        assert!(t.add(0, AllocFlags::empty(), 0x1000, 16).is_err());
        assert!(t.add(1, AllocFlags::empty(), 0x1000, 0).is_err());
        assert!(t.add(1, AllocFlags::empty(), u64::MAX - 4, 16).is_err());
        t.add(1, AllocFlags::READONLY, 0x1000, 16).unwrap();
        assert!(t.add(1, AllocFlags::empty(), 0x2000, 16).is_err());
        assert_eq!(t.len(), 1);
        assert!(t.remove(1));
        assert!(!t.remove(1));
        assert!(t.is_empty());
    }

    #[test]
    fn init_rejects_non_power_of_two_rings() {
        let err = RingSubmitter::init(VecGuestMemory::new(0x8000), layout(3)).unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Ring(AerogpuRingDecodeError::BadEntryCount { found: 3 })
        ));
    }

    #[test]
    fn oversized_payload_is_rejected_without_touching_tail() {
        let mut ring = RingSubmitter::init(VecGuestMemory::new(0x8000), layout(4)).unwrap();
        let cmd = vec![0u8; 0x401];
        let err = ring
            .submit(&Submission {
                cmd: &cmd,
                alloc_table: None,
                flags: SubmitFlags::empty(),
                context_id: 0,
                engine_id: 0,
                signal_fence: 1,
            })
            .unwrap_err();
        assert!(matches!(err, SubmitError::PayloadTooLarge { capacity: 0x400, .. }));
        assert_eq!(ring.tail(), 0);
    }

    #[test]
    fn fresh_fence_page_reads_zero() {
        let mut ring = RingSubmitter::init(VecGuestMemory::new(0x8000), layout(4)).unwrap();
        assert_eq!(ring.poll_completed_fence().unwrap(), Some(0));

        let mut no_page = layout(4);
        no_page.fence_page_gpa = None;
        let mut ring = RingSubmitter::init(VecGuestMemory::new(0x8000), no_page).unwrap();
        assert_eq!(ring.poll_completed_fence().unwrap(), None);
    }
}
