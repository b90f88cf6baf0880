use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMemoryError {
    OutOfBounds { gpa: u64, len: usize },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfBounds { gpa, len } => {
                write!(f, "guest memory access out of bounds (gpa=0x{gpa:x}, len={len})")
            }
        }
    }
}

impl std::error::Error for GuestMemoryError {}

/// Guest-physical memory shared with the device: the ring, the fence page and submission
/// staging buffers.
pub trait GuestMemory {
    fn read(&self, gpa: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
    fn write(&mut self, gpa: u64, src: &[u8]) -> Result<(), GuestMemoryError>;

    fn read_u32(&self, gpa: u64) -> Result<u32, GuestMemoryError> {
        let mut buf = [0u8; 4];
        self.read(gpa, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, gpa: u64, v: u32) -> Result<(), GuestMemoryError> {
        self.write(gpa, &v.to_le_bytes())
    }
}

/// A simple in-memory guest memory implementation backed by a single `Vec<u8>`.
///
/// The address space starts at GPA 0.
#[derive(Debug, Clone)]
pub struct VecGuestMemory {
    data: Vec<u8>,
}

impl VecGuestMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            data: vec![0u8; size_bytes],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, gpa: u64, len: usize) -> Result<core::ops::Range<usize>, GuestMemoryError> {
        let start: usize = gpa
            .try_into()
            .map_err(|_| GuestMemoryError::OutOfBounds { gpa, len })?;
        let end = start
            .checked_add(len)
            .ok_or(GuestMemoryError::OutOfBounds { gpa, len })?;
        if end > self.data.len() {
            return Err(GuestMemoryError::OutOfBounds { gpa, len });
        }
        Ok(start..end)
    }
}

impl GuestMemory for VecGuestMemory {
    fn read(&self, gpa: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(gpa, dst.len())?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, gpa: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(gpa, src.len())?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }
}
