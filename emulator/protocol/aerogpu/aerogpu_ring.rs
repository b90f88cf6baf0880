//! AeroGPU submission ring, allocation table and fence page layouts.
//!
//! The ring lives in guest memory: a 64-byte [`AerogpuRingHeader`] followed by `entry_count`
//! slots of `entry_stride_bytes` each, every slot holding one [`AerogpuSubmitDesc`]. `head` is
//! advanced only by the device and `tail` only by the driver. Both are free-running `u32`
//! indices; the slot is `index & (entry_count - 1)`.

use super::aerogpu_pci::{parse_and_validate_abi_version_u32, AerogpuAbiError, AEROGPU_ABI_VERSION_U32};

pub const AEROGPU_RING_MAGIC: u32 = 0x474E_5241; // "ARNG" LE
pub const AEROGPU_ALLOC_TABLE_MAGIC: u32 = 0x434F_4C41; // "ALOC" LE
pub const AEROGPU_FENCE_PAGE_MAGIC: u32 = 0x434E_4546; // "FENC" LE

pub const AEROGPU_SUBMIT_FLAG_NONE: u32 = 0;
pub const AEROGPU_SUBMIT_FLAG_PRESENT: u32 = 1u32 << 0;
pub const AEROGPU_SUBMIT_FLAG_NO_IRQ: u32 = 1u32 << 1;

pub const AEROGPU_ALLOC_FLAG_NONE: u32 = 0;
pub const AEROGPU_ALLOC_FLAG_READONLY: u32 = 1u32 << 0;

pub const AEROGPU_ENGINE_0: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuRingDecodeError {
    BufferTooSmall,
    BadMagic { found: u32 },
    Abi(AerogpuAbiError),
    BadSizeField { found: u32 },
    BadEntryCount { found: u32 },
    BadStrideField { found: u32 },
}

impl From<AerogpuAbiError> for AerogpuRingDecodeError {
    fn from(value: AerogpuAbiError) -> Self {
        Self::Abi(value)
    }
}

fn le_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn le_u64(buf: &[u8], off: usize) -> u64 {
    u64::from(le_u32(buf, off)) | (u64::from(le_u32(buf, off + 4)) << 32)
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuRingHeader {
    pub magic: u32,
    pub abi_version: u32,
    pub size_bytes: u32,
    pub entry_count: u32,
    pub entry_stride_bytes: u32,
    pub flags: u32,
    pub head: u32,
    pub tail: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub reserved2: [u64; 3],
}

impl AerogpuRingHeader {
    pub const SIZE_BYTES: usize = 64;

    /// Header for a freshly initialized ring with `head == tail == 0`.
    pub fn new(entry_count: u32) -> Self {
        let entry_stride_bytes = AerogpuSubmitDesc::SIZE_BYTES as u32;
        Self {
            magic: AEROGPU_RING_MAGIC,
            abi_version: AEROGPU_ABI_VERSION_U32,
            size_bytes: (Self::SIZE_BYTES as u32).saturating_add(entry_count.saturating_mul(entry_stride_bytes)),
            entry_count,
            entry_stride_bytes,
            flags: 0,
            head: 0,
            tail: 0,
            reserved0: 0,
            reserved1: 0,
            reserved2: [0; 3],
        }
    }

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, AerogpuRingDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BufferTooSmall);
        }
        Ok(Self {
            magic: le_u32(buf, 0),
            abi_version: le_u32(buf, 4),
            size_bytes: le_u32(buf, 8),
            entry_count: le_u32(buf, 12),
            entry_stride_bytes: le_u32(buf, 16),
            flags: le_u32(buf, 20),
            head: le_u32(buf, 24),
            tail: le_u32(buf, 28),
            reserved0: le_u32(buf, 32),
            reserved1: le_u32(buf, 36),
            reserved2: [le_u64(buf, 40), le_u64(buf, 48), le_u64(buf, 56)],
        })
    }

    pub fn write_to_le_bytes(&self, out: &mut [u8; Self::SIZE_BYTES]) {
        put_u32(out, 0, self.magic);
        put_u32(out, 4, self.abi_version);
        put_u32(out, 8, self.size_bytes);
        put_u32(out, 12, self.entry_count);
        put_u32(out, 16, self.entry_stride_bytes);
        put_u32(out, 20, self.flags);
        put_u32(out, 24, self.head);
        put_u32(out, 28, self.tail);
        put_u32(out, 32, self.reserved0);
        put_u32(out, 36, self.reserved1);
        let reserved2 = self.reserved2;
        for (i, v) in reserved2.iter().enumerate() {
            put_u64(out, 40 + i * 8, *v);
        }
    }

    /// Validate the fields a consumer relies on before touching any slot.
    pub fn validate_prefix(&self) -> Result<(), AerogpuRingDecodeError> {
        if self.magic != AEROGPU_RING_MAGIC {
            return Err(AerogpuRingDecodeError::BadMagic { found: self.magic });
        }
        let _ = parse_and_validate_abi_version_u32(self.abi_version)?;

        let entry_count = self.entry_count;
        if entry_count == 0 || !entry_count.is_power_of_two() {
            return Err(AerogpuRingDecodeError::BadEntryCount { found: entry_count });
        }

        let stride = self.entry_stride_bytes;
        if (stride as usize) < AerogpuSubmitDesc::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BadStrideField { found: stride });
        }

        let required = Self::SIZE_BYTES as u64 + u64::from(entry_count) * u64::from(stride);
        if u64::from(self.size_bytes) < required {
            return Err(AerogpuRingDecodeError::BadSizeField {
                found: self.size_bytes,
            });
        }
        Ok(())
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuSubmitDesc {
    pub desc_size_bytes: u32,
    pub flags: u32,
    pub context_id: u32,
    pub engine_id: u32,
    pub cmd_gpa: u64,
    pub cmd_size_bytes: u32,
    pub cmd_reserved0: u32,
    pub alloc_table_gpa: u64,
    pub alloc_table_size_bytes: u32,
    pub alloc_table_reserved0: u32,
    pub signal_fence: u64,
    pub reserved0: u64,
}

impl AerogpuSubmitDesc {
    pub const SIZE_BYTES: usize = 64;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, AerogpuRingDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BufferTooSmall);
        }
        Ok(Self {
            desc_size_bytes: le_u32(buf, 0),
            flags: le_u32(buf, 4),
            context_id: le_u32(buf, 8),
            engine_id: le_u32(buf, 12),
            cmd_gpa: le_u64(buf, 16),
            cmd_size_bytes: le_u32(buf, 24),
            cmd_reserved0: le_u32(buf, 28),
            alloc_table_gpa: le_u64(buf, 32),
            alloc_table_size_bytes: le_u32(buf, 40),
            alloc_table_reserved0: le_u32(buf, 44),
            signal_fence: le_u64(buf, 48),
            reserved0: le_u64(buf, 56),
        })
    }

    pub fn write_to_le_bytes(&self, out: &mut [u8; Self::SIZE_BYTES]) {
        put_u32(out, 0, self.desc_size_bytes);
        put_u32(out, 4, self.flags);
        put_u32(out, 8, self.context_id);
        put_u32(out, 12, self.engine_id);
        put_u64(out, 16, self.cmd_gpa);
        put_u32(out, 24, self.cmd_size_bytes);
        put_u32(out, 28, self.cmd_reserved0);
        put_u64(out, 32, self.alloc_table_gpa);
        put_u32(out, 40, self.alloc_table_size_bytes);
        put_u32(out, 44, self.alloc_table_reserved0);
        put_u64(out, 48, self.signal_fence);
        put_u64(out, 56, self.reserved0);
    }

    /// Descriptors may grow; only a size below the v1 layout is rejected.
    pub fn validate_prefix(&self) -> Result<(), AerogpuRingDecodeError> {
        if (self.desc_size_bytes as usize) < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BadSizeField {
                found: self.desc_size_bytes,
            });
        }
        Ok(())
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuAllocTableHeader {
    pub magic: u32,
    pub abi_version: u32,
    pub size_bytes: u32,
    pub entry_count: u32,
    pub entry_stride_bytes: u32,
    pub reserved0: u32,
}

impl AerogpuAllocTableHeader {
    pub const SIZE_BYTES: usize = 24;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, AerogpuRingDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BufferTooSmall);
        }
        Ok(Self {
            magic: le_u32(buf, 0),
            abi_version: le_u32(buf, 4),
            size_bytes: le_u32(buf, 8),
            entry_count: le_u32(buf, 12),
            entry_stride_bytes: le_u32(buf, 16),
            reserved0: le_u32(buf, 20),
        })
    }

    pub fn write_to_le_bytes(&self, out: &mut [u8; Self::SIZE_BYTES]) {
        put_u32(out, 0, self.magic);
        put_u32(out, 4, self.abi_version);
        put_u32(out, 8, self.size_bytes);
        put_u32(out, 12, self.entry_count);
        put_u32(out, 16, self.entry_stride_bytes);
        put_u32(out, 20, self.reserved0);
    }

    pub fn validate_prefix(&self) -> Result<(), AerogpuRingDecodeError> {
        if self.magic != AEROGPU_ALLOC_TABLE_MAGIC {
            return Err(AerogpuRingDecodeError::BadMagic { found: self.magic });
        }
        let _ = parse_and_validate_abi_version_u32(self.abi_version)?;

        let stride = self.entry_stride_bytes;
        if (stride as usize) < AerogpuAllocEntry::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BadStrideField { found: stride });
        }

        let required = Self::SIZE_BYTES as u64 + u64::from(self.entry_count) * u64::from(stride);
        if u64::from(self.size_bytes) < required {
            return Err(AerogpuRingDecodeError::BadSizeField {
                found: self.size_bytes,
            });
        }
        Ok(())
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuAllocEntry {
    pub alloc_id: u32,
    pub flags: u32,
    pub gpa: u64,
    pub size_bytes: u64,
    pub reserved0: u64,
}

impl AerogpuAllocEntry {
    pub const SIZE_BYTES: usize = 32;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, AerogpuRingDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BufferTooSmall);
        }
        Ok(Self {
            alloc_id: le_u32(buf, 0),
            flags: le_u32(buf, 4),
            gpa: le_u64(buf, 8),
            size_bytes: le_u64(buf, 16),
            reserved0: le_u64(buf, 24),
        })
    }

    pub fn write_to_le_bytes(&self, out: &mut [u8; Self::SIZE_BYTES]) {
        put_u32(out, 0, self.alloc_id);
        put_u32(out, 4, self.flags);
        put_u64(out, 8, self.gpa);
        put_u64(out, 16, self.size_bytes);
        put_u64(out, 24, self.reserved0);
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuFencePage {
    pub magic: u32,
    pub abi_version: u32,
    pub completed_fence: u64,
    pub reserved0: [u64; 5],
}

impl AerogpuFencePage {
    pub const SIZE_BYTES: usize = 56;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, AerogpuRingDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(AerogpuRingDecodeError::BufferTooSmall);
        }
        let mut reserved0 = [0u64; 5];
        for (i, v) in reserved0.iter_mut().enumerate() {
            *v = le_u64(buf, 16 + i * 8);
        }
        Ok(Self {
            magic: le_u32(buf, 0),
            abi_version: le_u32(buf, 4),
            completed_fence: le_u64(buf, 8),
            reserved0,
        })
    }

    pub fn validate_prefix(&self) -> Result<(), AerogpuRingDecodeError> {
        if self.magic != AEROGPU_FENCE_PAGE_MAGIC {
            return Err(AerogpuRingDecodeError::BadMagic { found: self.magic });
        }
        let _ = parse_and_validate_abi_version_u32(self.abi_version)?;
        Ok(())
    }
}

/// Write a complete fence page (magic, ABI version, `completed_fence`, zeroed reserved words).
pub fn write_fence_page_le(buf: &mut [u8], completed_fence: u64) -> Result<(), AerogpuRingDecodeError> {
    if buf.len() < AerogpuFencePage::SIZE_BYTES {
        return Err(AerogpuRingDecodeError::BufferTooSmall);
    }
    buf[..AerogpuFencePage::SIZE_BYTES].fill(0);
    put_u32(buf, 0, AEROGPU_FENCE_PAGE_MAGIC);
    put_u32(buf, 4, AEROGPU_ABI_VERSION_U32);
    put_u64(buf, 8, completed_fence);
    Ok(())
}

/// Update only the `completed_fence` field of an existing fence page.
pub fn write_fence_page_completed_fence_le(buf: &mut [u8], completed_fence: u64) -> Result<(), AerogpuRingDecodeError> {
    if buf.len() < AerogpuFencePage::SIZE_BYTES {
        return Err(AerogpuRingDecodeError::BufferTooSmall);
    }
    put_u64(buf, 8, completed_fence);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn layouts_match_wire_sizes_and_offsets() {
        assert_eq!(size_of::<AerogpuRingHeader>(), AerogpuRingHeader::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuSubmitDesc>(), AerogpuSubmitDesc::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuAllocTableHeader>(), AerogpuAllocTableHeader::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuAllocEntry>(), AerogpuAllocEntry::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuFencePage>(), AerogpuFencePage::SIZE_BYTES);

        assert_eq!(offset_of!(AerogpuRingHeader, head), 24);
        assert_eq!(offset_of!(AerogpuRingHeader, tail), 28);
        assert_eq!(offset_of!(AerogpuRingHeader, reserved2), 40);

        assert_eq!(offset_of!(AerogpuSubmitDesc, cmd_gpa), 16);
        assert_eq!(offset_of!(AerogpuSubmitDesc, cmd_size_bytes), 24);
        assert_eq!(offset_of!(AerogpuSubmitDesc, alloc_table_gpa), 32);
        assert_eq!(offset_of!(AerogpuSubmitDesc, alloc_table_size_bytes), 40);
        assert_eq!(offset_of!(AerogpuSubmitDesc, signal_fence), 48);
        assert_eq!(offset_of!(AerogpuSubmitDesc, reserved0), 56);

        assert_eq!(offset_of!(AerogpuAllocEntry, gpa), 8);
        assert_eq!(offset_of!(AerogpuAllocEntry, size_bytes), 16);

        assert_eq!(offset_of!(AerogpuFencePage, completed_fence), 8);
    }

    #[test]
    fn new_ring_header_validates() {
        let hdr = AerogpuRingHeader::new(8);
        hdr.validate_prefix().unwrap();
        let size_bytes = hdr.size_bytes;
        assert_eq!(size_bytes, 64 + 8 * 64);
    }

    #[test]
    fn submit_desc_encode_decode_preserves_fields() {
        let desc = AerogpuSubmitDesc {
            desc_size_bytes: 64,
            flags: AEROGPU_SUBMIT_FLAG_PRESENT,
            context_id: 7,
            engine_id: AEROGPU_ENGINE_0,
            cmd_gpa: 0x1_0000_2000,
            cmd_size_bytes: 96,
            cmd_reserved0: 0,
            alloc_table_gpa: 0x3000,
            alloc_table_size_bytes: 56,
            alloc_table_reserved0: 0,
            signal_fence: 42,
            reserved0: 0,
        };
        let mut buf = [0u8; AerogpuSubmitDesc::SIZE_BYTES];
        desc.write_to_le_bytes(&mut buf);
        assert_eq!(&buf[48..56], &42u64.to_le_bytes());

        let decoded = AerogpuSubmitDesc::decode_from_le_bytes(&buf).unwrap();
        let cmd_gpa = decoded.cmd_gpa;
        let signal_fence = decoded.signal_fence;
        assert_eq!(cmd_gpa, 0x1_0000_2000);
        assert_eq!(signal_fence, 42);
    }

    #[test]
    fn fence_page_round_trip() {
        let mut page = [0xFFu8; AerogpuFencePage::SIZE_BYTES];
        write_fence_page_le(&mut page, 5).unwrap();
        let decoded = AerogpuFencePage::decode_from_le_bytes(&page).unwrap();
        decoded.validate_prefix().unwrap();
        let completed = decoded.completed_fence;
        assert_eq!(completed, 5);
        assert!(page[16..].iter().all(|&b| b == 0));
    }
}
