//! AeroGPU ABI version encoding.
//!
//! Every versioned header (command stream, ring, allocation table, fence page) carries the same
//! `abi_version` word: `(major << 16) | minor`. Minor bumps are backwards compatible; a major
//! mismatch is a hard error.

pub const AEROGPU_ABI_MAJOR: u32 = 1;
pub const AEROGPU_ABI_MINOR: u32 = 4;
pub const AEROGPU_ABI_VERSION_U32: u32 = (AEROGPU_ABI_MAJOR << 16) | AEROGPU_ABI_MINOR;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AerogpuAbiVersion {
    pub major: u16,
    pub minor: u16,
}

impl AerogpuAbiVersion {
    pub const fn from_u32(v: u32) -> Self {
        Self {
            major: (v >> 16) as u16,
            minor: (v & 0xFFFF) as u16,
        }
    }

    pub const fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuAbiError {
    UnsupportedMajor { found: u16 },
}

impl core::fmt::Display for AerogpuAbiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AerogpuAbiError::UnsupportedMajor { found } => write!(
                f,
                "unsupported AeroGPU ABI major version {found} (expected {AEROGPU_ABI_MAJOR})"
            ),
        }
    }
}

impl std::error::Error for AerogpuAbiError {}

pub fn parse_and_validate_abi_version_u32(v: u32) -> Result<AerogpuAbiVersion, AerogpuAbiError> {
    let version = AerogpuAbiVersion::from_u32(v);
    if u32::from(version.major) != AEROGPU_ABI_MAJOR {
        return Err(AerogpuAbiError::UnsupportedMajor {
            found: version.major,
        });
    }
    Ok(version)
}
