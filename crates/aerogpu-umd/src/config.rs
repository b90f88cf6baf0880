use aero_protocol::aerogpu::aerogpu_ring::AEROGPU_ENGINE_0;
use aero_protocol::aerogpu::cmd_writer::{AerogpuCmdWriter, CmdWriterError};

use crate::rotate::RotationPolicy;
use crate::submit::RingLayout;

/// Backing for the device's command stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CmdBufferKind {
    #[default]
    Growable,
    /// A fixed DMA-style buffer. Appends past `capacity_bytes` fail with out-of-space.
    Fixed { capacity_bytes: usize },
}

impl CmdBufferKind {
    pub fn new_writer(self) -> Result<AerogpuCmdWriter, CmdWriterError> {
        match self {
            CmdBufferKind::Growable => Ok(AerogpuCmdWriter::new()),
            CmdBufferKind::Fixed { capacity_bytes } => AerogpuCmdWriter::new_fixed(capacity_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmdConfig {
    pub cmd_buffer: CmdBufferKind,
    /// Entry count of rings built through [`UmdConfig::ring_layout`]. Power of two.
    pub ring_entry_count: u32,
    pub context_id: u32,
    pub engine_id: u32,
    pub rotation_policy: RotationPolicy,
    pub present_scanout_id: u32,
}

impl Default for UmdConfig {
    fn default() -> Self {
        Self {
            cmd_buffer: CmdBufferKind::Growable,
            ring_entry_count: 64,
            context_id: 0,
            engine_id: AEROGPU_ENGINE_0,
            rotation_policy: RotationPolicy::Wrap,
            present_scanout_id: 0,
        }
    }
}

impl UmdConfig {
    /// Ring placement with `ring_entry_count` descriptors and as many staging slots.
    pub fn ring_layout(
        &self,
        ring_gpa: u64,
        staging_gpa: u64,
        staging_slot_bytes: u32,
        fence_page_gpa: Option<u64>,
    ) -> RingLayout {
        RingLayout {
            ring_gpa,
            entry_count: self.ring_entry_count,
            staging_gpa,
            staging_slot_bytes,
            fence_page_gpa,
        }
    }
}
