//! AeroGPU command stream layouts.
//!
//! A command stream is a 24-byte [`AerogpuCmdStreamHeader`] followed by packets. Every packet
//! starts with an 8-byte [`AerogpuCmdHdr`] whose `size_bytes` covers the header itself and is a
//! multiple of 4. All fields are little-endian.

use super::aerogpu_pci::{parse_and_validate_abi_version_u32, AerogpuAbiError};

pub type AerogpuHandle = u32;

pub const AEROGPU_CMD_STREAM_MAGIC: u32 = 0x444D_4341; // "ACMD" LE

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuCmdStreamFlags {
    None = 0,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdStreamHeader {
    pub magic: u32,
    pub abi_version: u32,
    pub size_bytes: u32,
    pub flags: u32,
    pub reserved0: u32,
    pub reserved1: u32,
}

impl AerogpuCmdStreamHeader {
    pub const SIZE_BYTES: usize = 24;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdHdr {
    pub opcode: u32,
    pub size_bytes: u32,
}

impl AerogpuCmdHdr {
    pub const SIZE_BYTES: usize = 8;
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuCmdOpcode {
    Nop = 0,
    DebugMarker = 1,

    SetBlendState = 0x300,
    SetDepthStencilState = 0x301,
    SetRasterizerState = 0x302,

    SetRenderTargets = 0x400,
    SetViewport = 0x401,
    SetScissor = 0x402,

    SetTexture = 0x510,

    Present = 0x700,

    Flush = 0x720,
}

impl AerogpuCmdOpcode {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Nop),
            1 => Some(Self::DebugMarker),
            0x300 => Some(Self::SetBlendState),
            0x301 => Some(Self::SetDepthStencilState),
            0x302 => Some(Self::SetRasterizerState),
            0x400 => Some(Self::SetRenderTargets),
            0x401 => Some(Self::SetViewport),
            0x402 => Some(Self::SetScissor),
            0x510 => Some(Self::SetTexture),
            0x700 => Some(Self::Present),
            0x720 => Some(Self::Flush),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AerogpuShaderStage {
    Vertex = 0,
    Pixel = 1,
    Compute = 2,
    Geometry = 3,
}

impl AerogpuShaderStage {
    /// Every stage, in wire-value order.
    pub const ALL: [AerogpuShaderStage; 4] = [Self::Vertex, Self::Pixel, Self::Compute, Self::Geometry];

    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Vertex),
            1 => Some(Self::Pixel),
            2 => Some(Self::Compute),
            3 => Some(Self::Geometry),
            _ => None,
        }
    }
}

/* ------------------------------ Pipeline state ---------------------------- */

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuBlendFactor {
    Zero = 0,
    One = 1,
    SrcAlpha = 2,
    InvSrcAlpha = 3,
    DestAlpha = 4,
    InvDestAlpha = 5,
    Constant = 6,
    InvConstant = 7,
}

impl AerogpuBlendFactor {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Zero),
            1 => Some(Self::One),
            2 => Some(Self::SrcAlpha),
            3 => Some(Self::InvSrcAlpha),
            4 => Some(Self::DestAlpha),
            5 => Some(Self::InvDestAlpha),
            6 => Some(Self::Constant),
            7 => Some(Self::InvConstant),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuBlendOp {
    Add = 0,
    Subtract = 1,
    RevSubtract = 2,
    Min = 3,
    Max = 4,
}

impl AerogpuBlendOp {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Add),
            1 => Some(Self::Subtract),
            2 => Some(Self::RevSubtract),
            3 => Some(Self::Min),
            4 => Some(Self::Max),
            _ => None,
        }
    }
}

pub const AEROGPU_COLOR_WRITE_MASK_RED: u8 = 1 << 0;
pub const AEROGPU_COLOR_WRITE_MASK_GREEN: u8 = 1 << 1;
pub const AEROGPU_COLOR_WRITE_MASK_BLUE: u8 = 1 << 2;
pub const AEROGPU_COLOR_WRITE_MASK_ALPHA: u8 = 1 << 3;
pub const AEROGPU_COLOR_WRITE_MASK_ALL: u8 = 0xF;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuBlendState {
    pub enable: u32,
    pub src_factor: u32,
    pub dst_factor: u32,
    pub blend_op: u32,
    pub color_write_mask: u8,
    pub reserved0: [u8; 3],
    pub src_factor_alpha: u32,
    pub dst_factor_alpha: u32,
    pub blend_op_alpha: u32,
    pub blend_constant_rgba_f32: [u32; 4],
    pub sample_mask: u32,
}

impl AerogpuBlendState {
    pub const SIZE_BYTES: usize = 52;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetBlendState {
    pub hdr: AerogpuCmdHdr,
    pub state: AerogpuBlendState,
}

impl AerogpuCmdSetBlendState {
    pub const SIZE_BYTES: usize = 60;
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuCompareFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    Always = 7,
}

impl AerogpuCompareFunc {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Never),
            1 => Some(Self::Less),
            2 => Some(Self::Equal),
            3 => Some(Self::LessEqual),
            4 => Some(Self::Greater),
            5 => Some(Self::NotEqual),
            6 => Some(Self::GreaterEqual),
            7 => Some(Self::Always),
            _ => None,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuDepthStencilState {
    pub depth_enable: u32,
    pub depth_write_enable: u32,
    pub depth_func: u32,
    pub stencil_enable: u32,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub reserved0: [u8; 2],
}

impl AerogpuDepthStencilState {
    pub const SIZE_BYTES: usize = 20;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetDepthStencilState {
    pub hdr: AerogpuCmdHdr,
    pub state: AerogpuDepthStencilState,
}

impl AerogpuCmdSetDepthStencilState {
    pub const SIZE_BYTES: usize = 28;
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuFillMode {
    Solid = 0,
    Wireframe = 1,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuCullMode {
    None = 0,
    Front = 1,
    Back = 2,
}

pub const AEROGPU_RASTERIZER_FLAG_NONE: u32 = 0;
/// Depth clipping disabled (depth clamp).
pub const AEROGPU_RASTERIZER_FLAG_DEPTH_CLIP_DISABLE: u32 = 1u32 << 0;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuRasterizerState {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_ccw: u32,
    pub scissor_enable: u32,
    pub depth_bias: i32,
    pub flags: u32,
}

impl AerogpuRasterizerState {
    pub const SIZE_BYTES: usize = 24;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetRasterizerState {
    pub hdr: AerogpuCmdHdr,
    pub state: AerogpuRasterizerState,
}

impl AerogpuCmdSetRasterizerState {
    pub const SIZE_BYTES: usize = 32;
}

/* ------------------------- Render targets / state ------------------------- */

pub const AEROGPU_MAX_RENDER_TARGETS: usize = 8;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetRenderTargets {
    pub hdr: AerogpuCmdHdr,
    pub color_count: u32,
    pub depth_stencil: AerogpuHandle,
    pub colors: [AerogpuHandle; AEROGPU_MAX_RENDER_TARGETS],
}

impl AerogpuCmdSetRenderTargets {
    pub const SIZE_BYTES: usize = 48;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetViewport {
    pub hdr: AerogpuCmdHdr,
    pub x_f32: u32,
    pub y_f32: u32,
    pub width_f32: u32,
    pub height_f32: u32,
    pub min_depth_f32: u32,
    pub max_depth_f32: u32,
}

impl AerogpuCmdSetViewport {
    pub const SIZE_BYTES: usize = 32;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetScissor {
    pub hdr: AerogpuCmdHdr,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl AerogpuCmdSetScissor {
    pub const SIZE_BYTES: usize = 24;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdSetTexture {
    pub hdr: AerogpuCmdHdr,
    pub shader_stage: u32,
    pub slot: u32,
    pub texture: AerogpuHandle,
    pub reserved0: u32,
}

impl AerogpuCmdSetTexture {
    pub const SIZE_BYTES: usize = 24;
}

/* ------------------------------ Presentation ------------------------------ */

pub const AEROGPU_PRESENT_FLAG_NONE: u32 = 0;
pub const AEROGPU_PRESENT_FLAG_VSYNC: u32 = 1u32 << 0;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdPresent {
    pub hdr: AerogpuCmdHdr,
    pub scanout_id: u32,
    pub flags: u32,
}

impl AerogpuCmdPresent {
    pub const SIZE_BYTES: usize = 16;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AerogpuCmdFlush {
    pub hdr: AerogpuCmdHdr,
    pub reserved0: u32,
    pub reserved1: u32,
}

impl AerogpuCmdFlush {
    pub const SIZE_BYTES: usize = 16;
}

/* --------------------------------- Decoding ------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AerogpuCmdDecodeError {
    BufferTooSmall,
    BadMagic { found: u32 },
    Abi(AerogpuAbiError),
    BadSizeBytes { found: u32 },
    SizeNotAligned { found: u32 },
    PacketOverrunsStream {
        offset: u32,
        packet_size_bytes: u32,
        stream_size_bytes: u32,
    },
    UnexpectedOpcode {
        found: u32,
        expected: AerogpuCmdOpcode,
    },
    CountOverflow,
}

impl From<AerogpuAbiError> for AerogpuCmdDecodeError {
    fn from(value: AerogpuAbiError) -> Self {
        Self::Abi(value)
    }
}

fn le_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn le_i32(buf: &[u8], off: usize) -> i32 {
    le_u32(buf, off) as i32
}

pub fn decode_cmd_stream_header_le(buf: &[u8]) -> Result<AerogpuCmdStreamHeader, AerogpuCmdDecodeError> {
    if buf.len() < AerogpuCmdStreamHeader::SIZE_BYTES {
        return Err(AerogpuCmdDecodeError::BufferTooSmall);
    }

    let hdr = AerogpuCmdStreamHeader {
        magic: le_u32(buf, 0),
        abi_version: le_u32(buf, 4),
        size_bytes: le_u32(buf, 8),
        flags: le_u32(buf, 12),
        reserved0: le_u32(buf, 16),
        reserved1: le_u32(buf, 20),
    };

    validate_cmd_stream_header(&hdr)?;
    Ok(hdr)
}

pub fn validate_cmd_stream_header(hdr: &AerogpuCmdStreamHeader) -> Result<(), AerogpuCmdDecodeError> {
    if hdr.magic != AEROGPU_CMD_STREAM_MAGIC {
        return Err(AerogpuCmdDecodeError::BadMagic { found: hdr.magic });
    }

    let _ = parse_and_validate_abi_version_u32(hdr.abi_version)?;

    if hdr.size_bytes < AerogpuCmdStreamHeader::SIZE_BYTES as u32 {
        return Err(AerogpuCmdDecodeError::BadSizeBytes {
            found: hdr.size_bytes,
        });
    }

    Ok(())
}

pub fn decode_cmd_hdr_le(buf: &[u8]) -> Result<AerogpuCmdHdr, AerogpuCmdDecodeError> {
    if buf.len() < AerogpuCmdHdr::SIZE_BYTES {
        return Err(AerogpuCmdDecodeError::BufferTooSmall);
    }

    let opcode = le_u32(buf, 0);
    let size_bytes = le_u32(buf, 4);

    if size_bytes < AerogpuCmdHdr::SIZE_BYTES as u32 {
        return Err(AerogpuCmdDecodeError::BadSizeBytes { found: size_bytes });
    }
    if size_bytes % 4 != 0 {
        return Err(AerogpuCmdDecodeError::SizeNotAligned { found: size_bytes });
    }

    Ok(AerogpuCmdHdr { opcode, size_bytes })
}

/// One packet inside a stream. `offset` is the packet's byte offset from the start of the stream,
/// which is what ordering checks compare.
#[derive(Clone, Copy)]
pub struct AerogpuCmdPacket<'a> {
    pub offset: usize,
    pub hdr: AerogpuCmdHdr,
    pub opcode: Option<AerogpuCmdOpcode>,
    pub payload: &'a [u8],
}

pub struct AerogpuCmdStreamIter<'a> {
    header: AerogpuCmdStreamHeader,
    buf: &'a [u8],
    offset: usize,
    end: usize,
    done: bool,
}

impl<'a> AerogpuCmdStreamIter<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, AerogpuCmdDecodeError> {
        let header = decode_cmd_stream_header_le(buf)?;
        let end = header.size_bytes as usize;
        if buf.len() < end {
            return Err(AerogpuCmdDecodeError::BufferTooSmall);
        }

        Ok(Self {
            header,
            buf,
            offset: AerogpuCmdStreamHeader::SIZE_BYTES,
            end,
            done: false,
        })
    }

    pub fn header(&self) -> &AerogpuCmdStreamHeader {
        &self.header
    }
}

impl<'a> Iterator for AerogpuCmdStreamIter<'a> {
    type Item = Result<AerogpuCmdPacket<'a>, AerogpuCmdDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.end {
            return None;
        }

        let hdr_end = match self.offset.checked_add(AerogpuCmdHdr::SIZE_BYTES) {
            Some(end) => end,
            None => {
                self.done = true;
                return Some(Err(AerogpuCmdDecodeError::CountOverflow));
            }
        };
        if hdr_end > self.end {
            self.done = true;
            return Some(Err(AerogpuCmdDecodeError::BufferTooSmall));
        }

        let hdr = match decode_cmd_hdr_le(&self.buf[self.offset..self.end]) {
            Ok(hdr) => hdr,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let packet_end = match self.offset.checked_add(hdr.size_bytes as usize) {
            Some(end) => end,
            None => {
                self.done = true;
                return Some(Err(AerogpuCmdDecodeError::CountOverflow));
            }
        };
        if packet_end > self.end {
            self.done = true;
            return Some(Err(AerogpuCmdDecodeError::PacketOverrunsStream {
                offset: self.offset as u32,
                packet_size_bytes: hdr.size_bytes,
                stream_size_bytes: self.header.size_bytes,
            }));
        }

        let packet = AerogpuCmdPacket {
            offset: self.offset,
            hdr,
            opcode: AerogpuCmdOpcode::from_u32(hdr.opcode),
            payload: &self.buf[hdr_end..packet_end],
        };

        self.offset = packet_end;
        Some(Ok(packet))
    }
}

pub struct AerogpuCmdStreamView<'a> {
    pub header: AerogpuCmdStreamHeader,
    pub packets: Vec<AerogpuCmdPacket<'a>>,
}

impl<'a> AerogpuCmdStreamView<'a> {
    pub fn decode_from_le_bytes(buf: &'a [u8]) -> Result<Self, AerogpuCmdDecodeError> {
        let iter = AerogpuCmdStreamIter::new(buf)?;
        let header = *iter.header();
        let packets = iter.collect::<Result<Vec<_>, _>>()?;
        Ok(Self { header, packets })
    }

    /// Packets carrying `opcode`, in stream order.
    pub fn packets_with_opcode(&self, opcode: AerogpuCmdOpcode) -> impl Iterator<Item = &AerogpuCmdPacket<'a>> {
        self.packets.iter().filter(move |p| p.opcode == Some(opcode))
    }
}

impl<'a> AerogpuCmdPacket<'a> {
    fn expect(&self, expected: AerogpuCmdOpcode, packet_size_bytes: usize) -> Result<(), AerogpuCmdDecodeError> {
        if self.opcode != Some(expected) {
            return Err(AerogpuCmdDecodeError::UnexpectedOpcode {
                found: self.hdr.opcode,
                expected,
            });
        }
        if self.payload.len() + AerogpuCmdHdr::SIZE_BYTES < packet_size_bytes {
            return Err(AerogpuCmdDecodeError::BufferTooSmall);
        }
        Ok(())
    }

    pub fn decode_set_render_targets_le(&self) -> Result<AerogpuCmdSetRenderTargets, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::SetRenderTargets, AerogpuCmdSetRenderTargets::SIZE_BYTES)?;
        let p = self.payload;
        let mut colors = [0; AEROGPU_MAX_RENDER_TARGETS];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = le_u32(p, 8 + i * 4);
        }
        Ok(AerogpuCmdSetRenderTargets {
            hdr: self.hdr,
            color_count: le_u32(p, 0),
            depth_stencil: le_u32(p, 4),
            colors,
        })
    }

    pub fn decode_set_texture_le(&self) -> Result<AerogpuCmdSetTexture, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::SetTexture, AerogpuCmdSetTexture::SIZE_BYTES)?;
        let p = self.payload;
        Ok(AerogpuCmdSetTexture {
            hdr: self.hdr,
            shader_stage: le_u32(p, 0),
            slot: le_u32(p, 4),
            texture: le_u32(p, 8),
            reserved0: le_u32(p, 12),
        })
    }

    pub fn decode_set_viewport_le(&self) -> Result<AerogpuCmdSetViewport, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::SetViewport, AerogpuCmdSetViewport::SIZE_BYTES)?;
        let p = self.payload;
        Ok(AerogpuCmdSetViewport {
            hdr: self.hdr,
            x_f32: le_u32(p, 0),
            y_f32: le_u32(p, 4),
            width_f32: le_u32(p, 8),
            height_f32: le_u32(p, 12),
            min_depth_f32: le_u32(p, 16),
            max_depth_f32: le_u32(p, 20),
        })
    }

    pub fn decode_set_scissor_le(&self) -> Result<AerogpuCmdSetScissor, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::SetScissor, AerogpuCmdSetScissor::SIZE_BYTES)?;
        let p = self.payload;
        Ok(AerogpuCmdSetScissor {
            hdr: self.hdr,
            x: le_i32(p, 0),
            y: le_i32(p, 4),
            width: le_i32(p, 8),
            height: le_i32(p, 12),
        })
    }

    pub fn decode_set_blend_state_le(&self) -> Result<AerogpuCmdSetBlendState, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::SetBlendState, AerogpuCmdSetBlendState::SIZE_BYTES)?;
        let p = self.payload;
        let mut constant = [0u32; 4];
        for (i, c) in constant.iter_mut().enumerate() {
            *c = le_u32(p, 32 + i * 4);
        }
        Ok(AerogpuCmdSetBlendState {
            hdr: self.hdr,
            state: AerogpuBlendState {
                enable: le_u32(p, 0),
                src_factor: le_u32(p, 4),
                dst_factor: le_u32(p, 8),
                blend_op: le_u32(p, 12),
                color_write_mask: p[16],
                reserved0: [p[17], p[18], p[19]],
                src_factor_alpha: le_u32(p, 20),
                dst_factor_alpha: le_u32(p, 24),
                blend_op_alpha: le_u32(p, 28),
                blend_constant_rgba_f32: constant,
                sample_mask: le_u32(p, 48),
            },
        })
    }

    pub fn decode_set_depth_stencil_state_le(
        &self,
    ) -> Result<AerogpuCmdSetDepthStencilState, AerogpuCmdDecodeError> {
        self.expect(
            AerogpuCmdOpcode::SetDepthStencilState,
            AerogpuCmdSetDepthStencilState::SIZE_BYTES,
        )?;
        let p = self.payload;
        Ok(AerogpuCmdSetDepthStencilState {
            hdr: self.hdr,
            state: AerogpuDepthStencilState {
                depth_enable: le_u32(p, 0),
                depth_write_enable: le_u32(p, 4),
                depth_func: le_u32(p, 8),
                stencil_enable: le_u32(p, 12),
                stencil_read_mask: p[16],
                stencil_write_mask: p[17],
                reserved0: [p[18], p[19]],
            },
        })
    }

    pub fn decode_set_rasterizer_state_le(
        &self,
    ) -> Result<AerogpuCmdSetRasterizerState, AerogpuCmdDecodeError> {
        self.expect(
            AerogpuCmdOpcode::SetRasterizerState,
            AerogpuCmdSetRasterizerState::SIZE_BYTES,
        )?;
        let p = self.payload;
        Ok(AerogpuCmdSetRasterizerState {
            hdr: self.hdr,
            state: AerogpuRasterizerState {
                fill_mode: le_u32(p, 0),
                cull_mode: le_u32(p, 4),
                front_ccw: le_u32(p, 8),
                scissor_enable: le_u32(p, 12),
                depth_bias: le_i32(p, 16),
                flags: le_u32(p, 20),
            },
        })
    }

    pub fn decode_present_le(&self) -> Result<AerogpuCmdPresent, AerogpuCmdDecodeError> {
        self.expect(AerogpuCmdOpcode::Present, AerogpuCmdPresent::SIZE_BYTES)?;
        let p = self.payload;
        Ok(AerogpuCmdPresent {
            hdr: self.hdr,
            scanout_id: le_u32(p, 0),
            flags: le_u32(p, 4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn packed_layouts_have_wire_sizes() {
        assert_eq!(size_of::<AerogpuCmdStreamHeader>(), AerogpuCmdStreamHeader::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdHdr>(), AerogpuCmdHdr::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuBlendState>(), AerogpuBlendState::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdSetBlendState>(), AerogpuCmdSetBlendState::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuDepthStencilState>(), AerogpuDepthStencilState::SIZE_BYTES);
        assert_eq!(
            size_of::<AerogpuCmdSetDepthStencilState>(),
            AerogpuCmdSetDepthStencilState::SIZE_BYTES
        );
        assert_eq!(size_of::<AerogpuRasterizerState>(), AerogpuRasterizerState::SIZE_BYTES);
        assert_eq!(
            size_of::<AerogpuCmdSetRasterizerState>(),
            AerogpuCmdSetRasterizerState::SIZE_BYTES
        );
        assert_eq!(size_of::<AerogpuCmdSetRenderTargets>(), AerogpuCmdSetRenderTargets::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdSetViewport>(), AerogpuCmdSetViewport::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdSetScissor>(), AerogpuCmdSetScissor::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdSetTexture>(), AerogpuCmdSetTexture::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdPresent>(), AerogpuCmdPresent::SIZE_BYTES);
        assert_eq!(size_of::<AerogpuCmdFlush>(), AerogpuCmdFlush::SIZE_BYTES);
    }

    #[test]
    fn blend_state_field_offsets() {
        assert_eq!(offset_of!(AerogpuBlendState, color_write_mask), 16);
        assert_eq!(offset_of!(AerogpuBlendState, src_factor_alpha), 20);
        assert_eq!(offset_of!(AerogpuBlendState, blend_constant_rgba_f32), 32);
        assert_eq!(offset_of!(AerogpuBlendState, sample_mask), 48);
        assert_eq!(offset_of!(AerogpuCmdSetRenderTargets, colors), 16);
        assert_eq!(offset_of!(AerogpuCmdSetTexture, texture), 16);
    }

    #[test]
    fn opcode_round_trips_through_u32() {
        for op in [
            AerogpuCmdOpcode::Nop,
            AerogpuCmdOpcode::DebugMarker,
            AerogpuCmdOpcode::SetBlendState,
            AerogpuCmdOpcode::SetDepthStencilState,
            AerogpuCmdOpcode::SetRasterizerState,
            AerogpuCmdOpcode::SetRenderTargets,
            AerogpuCmdOpcode::SetViewport,
            AerogpuCmdOpcode::SetScissor,
            AerogpuCmdOpcode::SetTexture,
            AerogpuCmdOpcode::Present,
            AerogpuCmdOpcode::Flush,
        ] {
            assert_eq!(AerogpuCmdOpcode::from_u32(op as u32), Some(op));
        }
        assert_eq!(AerogpuCmdOpcode::from_u32(0xFFFF_FFFF), None);
    }

    #[test]
    fn decode_rejects_wrong_opcode() {
        let payload = [0u8; 16];
        let packet = AerogpuCmdPacket {
            offset: 24,
            hdr: AerogpuCmdHdr {
                opcode: AerogpuCmdOpcode::Flush as u32,
                size_bytes: 24,
            },
            opcode: Some(AerogpuCmdOpcode::Flush),
            payload: &payload,
        };
        assert!(matches!(
            packet.decode_set_texture_le(),
            Err(AerogpuCmdDecodeError::UnexpectedOpcode {
                found: 0x720,
                expected: AerogpuCmdOpcode::SetTexture
            })
        ));
    }

    #[test]
    fn decode_rejects_short_payload() {
        let payload = [0u8; 8];
        let packet = AerogpuCmdPacket {
            offset: 24,
            hdr: AerogpuCmdHdr {
                opcode: AerogpuCmdOpcode::SetTexture as u32,
                size_bytes: 16,
            },
            opcode: Some(AerogpuCmdOpcode::SetTexture),
            payload: &payload,
        };
        assert!(matches!(
            packet.decode_set_texture_le(),
            Err(AerogpuCmdDecodeError::BufferTooSmall)
        ));
    }
}
