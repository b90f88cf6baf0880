//! Command stream builder for AeroGPU (`aerogpu_cmd`).
//!
//! The writer owns the stream header bookkeeping (magic, ABI version, final `size_bytes`) and
//! hands out zero-filled, 4-byte aligned packets. Storage is either growable (software bring-up,
//! tests) or fixed-capacity (a DMA buffer handed to the driver); append reports
//! [`CmdWriterError::OutOfSpace`] instead of overflowing a fixed buffer, and a failed append
//! leaves the stream untouched.

use core::fmt;
use core::mem::offset_of;

use super::aerogpu_cmd::{
    AerogpuBlendState, AerogpuCmdFlush, AerogpuCmdHdr, AerogpuCmdOpcode, AerogpuCmdPresent, AerogpuCmdSetBlendState,
    AerogpuCmdSetDepthStencilState, AerogpuCmdSetRasterizerState, AerogpuCmdSetRenderTargets, AerogpuCmdSetScissor,
    AerogpuCmdSetTexture, AerogpuCmdSetViewport, AerogpuCmdStreamFlags, AerogpuCmdStreamHeader,
    AerogpuDepthStencilState, AerogpuHandle, AerogpuRasterizerState, AerogpuShaderStage, AEROGPU_CMD_STREAM_MAGIC,
    AEROGPU_MAX_RENDER_TARGETS,
};
use super::aerogpu_pci::AEROGPU_ABI_VERSION_U32;

fn align_up(v: usize, a: usize) -> Option<usize> {
    debug_assert!(a.is_power_of_two());
    v.checked_add(a - 1).map(|v| v & !(a - 1))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmdWriterError {
    /// Not enough room left in a fixed-capacity buffer.
    OutOfSpace { needed: usize, remaining: usize },
    /// Packet or stream would not fit the `u32` size fields.
    TooLarge { size_bytes: usize },
    /// Fixed-capacity buffer cannot even hold the stream header.
    CapacityTooSmall { capacity: usize },
    TooManyRenderTargets { count: usize },
}

impl fmt::Display for CmdWriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdWriterError::OutOfSpace { needed, remaining } => {
                write!(f, "command buffer out of space (needed {needed} bytes, {remaining} remaining)")
            }
            CmdWriterError::TooLarge { size_bytes } => {
                write!(f, "command packet/stream too large for u32 size_bytes ({size_bytes} bytes)")
            }
            CmdWriterError::CapacityTooSmall { capacity } => write!(
                f,
                "fixed command buffer capacity {capacity} is smaller than the stream header ({} bytes)",
                AerogpuCmdStreamHeader::SIZE_BYTES
            ),
            CmdWriterError::TooManyRenderTargets { count } => {
                write!(f, "too many render targets ({count} > {AEROGPU_MAX_RENDER_TARGETS})")
            }
        }
    }
}

impl std::error::Error for CmdWriterError {}

/// Byte storage behind a command stream.
pub trait CmdBufferStorage {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
    /// `None` for growable storage.
    fn capacity_limit(&self) -> Option<usize>;
    /// Extend by `additional` zero bytes. Leaves the storage unchanged on failure.
    fn try_extend_zeroed(&mut self, additional: usize) -> Result<(), CmdWriterError>;
    fn truncate(&mut self, len: usize);

    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    fn remaining(&self) -> Option<usize> {
        self.capacity_limit().map(|cap| cap.saturating_sub(self.len()))
    }
}

#[derive(Debug, Default, Clone)]
pub struct GrowableBuffer {
    buf: Vec<u8>,
}

impl CmdBufferStorage for GrowableBuffer {
    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn capacity_limit(&self) -> Option<usize> {
        None
    }

    fn try_extend_zeroed(&mut self, additional: usize) -> Result<(), CmdWriterError> {
        let new_len = self
            .buf
            .len()
            .checked_add(additional)
            .ok_or(CmdWriterError::TooLarge { size_bytes: usize::MAX })?;
        self.buf.resize(new_len, 0);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }
}

/// Fixed-capacity storage. Bytes past `len` may hold stale data from an earlier stream; they are
/// zeroed as packets are reserved.
#[derive(Debug, Clone)]
pub struct FixedBuffer {
    storage: Box<[u8]>,
    len: usize,
}

impl FixedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_storage(vec![0u8; capacity].into_boxed_slice())
    }

    pub fn from_storage(storage: Box<[u8]>) -> Self {
        Self { storage, len: 0 }
    }

    pub fn into_storage(self) -> Box<[u8]> {
        self.storage
    }
}

impl CmdBufferStorage for FixedBuffer {
    fn bytes(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }

    fn capacity_limit(&self) -> Option<usize> {
        Some(self.storage.len())
    }

    fn try_extend_zeroed(&mut self, additional: usize) -> Result<(), CmdWriterError> {
        let remaining = self.storage.len() - self.len;
        if additional > remaining {
            return Err(CmdWriterError::OutOfSpace {
                needed: additional,
                remaining,
            });
        }
        let end = self.len + additional;
        self.storage[self.len..end].fill(0);
        self.len = end;
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

/// The two storage strategies, selected at construction.
#[derive(Debug, Clone)]
pub enum CmdBuffer {
    Growable(GrowableBuffer),
    Fixed(FixedBuffer),
}

impl CmdBufferStorage for CmdBuffer {
    fn bytes(&self) -> &[u8] {
        match self {
            CmdBuffer::Growable(b) => b.bytes(),
            CmdBuffer::Fixed(b) => b.bytes(),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            CmdBuffer::Growable(b) => b.bytes_mut(),
            CmdBuffer::Fixed(b) => b.bytes_mut(),
        }
    }

    fn capacity_limit(&self) -> Option<usize> {
        match self {
            CmdBuffer::Growable(b) => b.capacity_limit(),
            CmdBuffer::Fixed(b) => b.capacity_limit(),
        }
    }

    fn try_extend_zeroed(&mut self, additional: usize) -> Result<(), CmdWriterError> {
        match self {
            CmdBuffer::Growable(b) => b.try_extend_zeroed(additional),
            CmdBuffer::Fixed(b) => b.try_extend_zeroed(additional),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            CmdBuffer::Growable(b) => b.truncate(len),
            CmdBuffer::Fixed(b) => b.truncate(len),
        }
    }
}

/// Command stream builder for `aerogpu_cmd`.
#[derive(Debug, Clone)]
pub struct AerogpuCmdWriter {
    buf: CmdBuffer,
}

impl Default for AerogpuCmdWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl AerogpuCmdWriter {
    /// Growable writer.
    pub fn new() -> Self {
        let mut w = Self {
            buf: CmdBuffer::Growable(GrowableBuffer::default()),
        };
        w.reset();
        w
    }

    /// Fixed-capacity writer over `capacity` bytes.
    pub fn new_fixed(capacity: usize) -> Result<Self, CmdWriterError> {
        Self::with_buffer(CmdBuffer::Fixed(FixedBuffer::with_capacity(capacity)))
    }

    pub fn with_buffer(buf: CmdBuffer) -> Result<Self, CmdWriterError> {
        if let Some(capacity) = buf.capacity_limit() {
            if capacity < AerogpuCmdStreamHeader::SIZE_BYTES {
                return Err(CmdWriterError::CapacityTooSmall { capacity });
            }
        }
        let mut w = Self { buf };
        w.reset();
        Ok(w)
    }

    pub fn buffer(&self) -> &CmdBuffer {
        &self.buf
    }

    /// Drop every packet and rewrite the stream header.
    pub fn reset(&mut self) {
        self.buf.truncate(0);
        // Capacity was checked against the header size at construction.
        if self.buf.try_extend_zeroed(AerogpuCmdStreamHeader::SIZE_BYTES).is_err() {
            return;
        }

        self.write_u32_at(0, AEROGPU_CMD_STREAM_MAGIC);
        self.write_u32_at(4, AEROGPU_ABI_VERSION_U32);
        self.write_u32_at(8, AerogpuCmdStreamHeader::SIZE_BYTES as u32);
        self.write_u32_at(12, AerogpuCmdStreamFlags::None as u32);
    }

    /// Stamp the final `size_bytes` and return the stream bytes.
    pub fn finalize(&mut self) -> &[u8] {
        // `append_raw` keeps the total length within u32.
        let len = self.buf.len() as u32;
        self.write_u32_at(8, len);
        self.buf.bytes()
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.finalize().to_vec()
    }

    /// No packets past the stream header.
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= AerogpuCmdStreamHeader::SIZE_BYTES
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> Option<usize> {
        self.buf.remaining()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.bytes()
    }

    /// Current end of stream, for [`Self::rollback`].
    pub fn mark(&self) -> usize {
        self.buf.len()
    }

    /// Drop every packet appended after `mark`.
    pub fn rollback(&mut self, mark: usize) {
        self.buf.truncate(mark.max(AerogpuCmdStreamHeader::SIZE_BYTES));
    }

    fn write_u32_at(&mut self, offset: usize, v: u32) {
        self.buf.bytes_mut()[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_i32_at(&mut self, offset: usize, v: i32) {
        self.write_u32_at(offset, v as u32);
    }

    fn write_u8_at(&mut self, offset: usize, v: u8) {
        self.buf.bytes_mut()[offset] = v;
    }

    fn append_raw(&mut self, opcode: AerogpuCmdOpcode, cmd_size_bytes: usize) -> Result<usize, CmdWriterError> {
        let aligned_size = align_up(cmd_size_bytes.max(AerogpuCmdHdr::SIZE_BYTES), 4)
            .ok_or(CmdWriterError::TooLarge { size_bytes: cmd_size_bytes })?;
        let offset = self.buf.len();
        let new_len = offset
            .checked_add(aligned_size)
            .ok_or(CmdWriterError::TooLarge { size_bytes: aligned_size })?;
        if new_len > u32::MAX as usize {
            return Err(CmdWriterError::TooLarge { size_bytes: new_len });
        }

        self.buf.try_extend_zeroed(aligned_size)?;

        self.write_u32_at(offset, opcode as u32);
        self.write_u32_at(offset + 4, aligned_size as u32);
        Ok(offset)
    }

    /// Reserve a zeroed packet of `cmd_size_bytes` (rounded up to 4) and stamp its header.
    /// Returns the packet's offset in the stream.
    pub fn append_fixed(&mut self, opcode: AerogpuCmdOpcode, cmd_size_bytes: usize) -> Result<usize, CmdWriterError> {
        self.append_raw(opcode, cmd_size_bytes)
    }

    /// Like [`Self::append_fixed`], with `payload` copied right after the fixed part. Padding up
    /// to the 4-byte boundary stays zero.
    pub fn append_with_payload(
        &mut self,
        opcode: AerogpuCmdOpcode,
        cmd_size_bytes: usize,
        payload: &[u8],
    ) -> Result<usize, CmdWriterError> {
        let total = cmd_size_bytes
            .checked_add(payload.len())
            .ok_or(CmdWriterError::TooLarge { size_bytes: usize::MAX })?;
        let base = self.append_raw(opcode, total)?;
        let start = base + cmd_size_bytes;
        self.buf.bytes_mut()[start..start + payload.len()].copy_from_slice(payload);
        Ok(base)
    }

    pub fn nop(&mut self) -> Result<usize, CmdWriterError> {
        self.append_fixed(AerogpuCmdOpcode::Nop, AerogpuCmdHdr::SIZE_BYTES)
    }

    /// UTF-8 marker bytes follow the header.
    pub fn debug_marker(&mut self, marker: &str) -> Result<usize, CmdWriterError> {
        self.append_with_payload(AerogpuCmdOpcode::DebugMarker, AerogpuCmdHdr::SIZE_BYTES, marker.as_bytes())
    }

    /// `colors.len()` becomes `color_count`; unused slots are encoded as 0.
    pub fn set_render_targets(
        &mut self,
        colors: &[AerogpuHandle],
        depth_stencil: AerogpuHandle,
    ) -> Result<usize, CmdWriterError> {
        if colors.len() > AEROGPU_MAX_RENDER_TARGETS {
            return Err(CmdWriterError::TooManyRenderTargets { count: colors.len() });
        }
        let base = self.append_fixed(AerogpuCmdOpcode::SetRenderTargets, AerogpuCmdSetRenderTargets::SIZE_BYTES)?;
        self.write_u32_at(base + offset_of!(AerogpuCmdSetRenderTargets, color_count), colors.len() as u32);
        self.write_u32_at(base + offset_of!(AerogpuCmdSetRenderTargets, depth_stencil), depth_stencil);

        let colors_base = base + offset_of!(AerogpuCmdSetRenderTargets, colors);
        for (i, &h) in colors.iter().enumerate() {
            self.write_u32_at(colors_base + i * 4, h);
        }
        Ok(base)
    }

    pub fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(AerogpuCmdOpcode::SetViewport, AerogpuCmdSetViewport::SIZE_BYTES)?;
        self.write_u32_at(base + offset_of!(AerogpuCmdSetViewport, x_f32), x.to_bits());
        self.write_u32_at(base + offset_of!(AerogpuCmdSetViewport, y_f32), y.to_bits());
        self.write_u32_at(base + offset_of!(AerogpuCmdSetViewport, width_f32), width.to_bits());
        self.write_u32_at(base + offset_of!(AerogpuCmdSetViewport, height_f32), height.to_bits());
        self.write_u32_at(
            base + offset_of!(AerogpuCmdSetViewport, min_depth_f32),
            min_depth.to_bits(),
        );
        self.write_u32_at(
            base + offset_of!(AerogpuCmdSetViewport, max_depth_f32),
            max_depth.to_bits(),
        );
        Ok(base)
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(AerogpuCmdOpcode::SetScissor, AerogpuCmdSetScissor::SIZE_BYTES)?;
        self.write_i32_at(base + offset_of!(AerogpuCmdSetScissor, x), x);
        self.write_i32_at(base + offset_of!(AerogpuCmdSetScissor, y), y);
        self.write_i32_at(base + offset_of!(AerogpuCmdSetScissor, width), width);
        self.write_i32_at(base + offset_of!(AerogpuCmdSetScissor, height), height);
        Ok(base)
    }

    pub fn set_texture(
        &mut self,
        shader_stage: AerogpuShaderStage,
        slot: u32,
        texture: AerogpuHandle,
    ) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(AerogpuCmdOpcode::SetTexture, AerogpuCmdSetTexture::SIZE_BYTES)?;
        self.write_u32_at(base + offset_of!(AerogpuCmdSetTexture, shader_stage), shader_stage as u32);
        self.write_u32_at(base + offset_of!(AerogpuCmdSetTexture, slot), slot);
        self.write_u32_at(base + offset_of!(AerogpuCmdSetTexture, texture), texture);
        Ok(base)
    }

    pub fn set_blend_state(&mut self, state: &AerogpuBlendState) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(AerogpuCmdOpcode::SetBlendState, AerogpuCmdSetBlendState::SIZE_BYTES)?;
        let s = base + offset_of!(AerogpuCmdSetBlendState, state);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, enable), state.enable);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, src_factor), state.src_factor);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, dst_factor), state.dst_factor);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, blend_op), state.blend_op);
        self.write_u8_at(s + offset_of!(AerogpuBlendState, color_write_mask), state.color_write_mask);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, src_factor_alpha), state.src_factor_alpha);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, dst_factor_alpha), state.dst_factor_alpha);
        self.write_u32_at(s + offset_of!(AerogpuBlendState, blend_op_alpha), state.blend_op_alpha);
        let constant = state.blend_constant_rgba_f32;
        let constant_base = s + offset_of!(AerogpuBlendState, blend_constant_rgba_f32);
        for (i, bits) in constant.iter().enumerate() {
            self.write_u32_at(constant_base + i * 4, *bits);
        }
        self.write_u32_at(s + offset_of!(AerogpuBlendState, sample_mask), state.sample_mask);
        Ok(base)
    }

    pub fn set_depth_stencil_state(&mut self, state: &AerogpuDepthStencilState) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(
            AerogpuCmdOpcode::SetDepthStencilState,
            AerogpuCmdSetDepthStencilState::SIZE_BYTES,
        )?;
        let s = base + offset_of!(AerogpuCmdSetDepthStencilState, state);
        self.write_u32_at(s + offset_of!(AerogpuDepthStencilState, depth_enable), state.depth_enable);
        self.write_u32_at(
            s + offset_of!(AerogpuDepthStencilState, depth_write_enable),
            state.depth_write_enable,
        );
        self.write_u32_at(s + offset_of!(AerogpuDepthStencilState, depth_func), state.depth_func);
        self.write_u32_at(s + offset_of!(AerogpuDepthStencilState, stencil_enable), state.stencil_enable);
        self.write_u8_at(
            s + offset_of!(AerogpuDepthStencilState, stencil_read_mask),
            state.stencil_read_mask,
        );
        self.write_u8_at(
            s + offset_of!(AerogpuDepthStencilState, stencil_write_mask),
            state.stencil_write_mask,
        );
        Ok(base)
    }

    pub fn set_rasterizer_state(&mut self, state: &AerogpuRasterizerState) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(
            AerogpuCmdOpcode::SetRasterizerState,
            AerogpuCmdSetRasterizerState::SIZE_BYTES,
        )?;
        let s = base + offset_of!(AerogpuCmdSetRasterizerState, state);
        self.write_u32_at(s + offset_of!(AerogpuRasterizerState, fill_mode), state.fill_mode);
        self.write_u32_at(s + offset_of!(AerogpuRasterizerState, cull_mode), state.cull_mode);
        self.write_u32_at(s + offset_of!(AerogpuRasterizerState, front_ccw), state.front_ccw);
        self.write_u32_at(s + offset_of!(AerogpuRasterizerState, scissor_enable), state.scissor_enable);
        self.write_i32_at(s + offset_of!(AerogpuRasterizerState, depth_bias), state.depth_bias);
        self.write_u32_at(s + offset_of!(AerogpuRasterizerState, flags), state.flags);
        Ok(base)
    }

    pub fn present(&mut self, scanout_id: u32, flags: u32) -> Result<usize, CmdWriterError> {
        let base = self.append_fixed(AerogpuCmdOpcode::Present, AerogpuCmdPresent::SIZE_BYTES)?;
        self.write_u32_at(base + offset_of!(AerogpuCmdPresent, scanout_id), scanout_id);
        self.write_u32_at(base + offset_of!(AerogpuCmdPresent, flags), flags);
        Ok(base)
    }

    pub fn flush(&mut self) -> Result<usize, CmdWriterError> {
        self.append_fixed(AerogpuCmdOpcode::Flush, AerogpuCmdFlush::SIZE_BYTES)
    }
}
