//! Blend state.
//!
//! The protocol carries a single blend record for all render targets, so per-render-target
//! descriptors are only accepted when they agree.

use aero_protocol::aerogpu::aerogpu_cmd::{
    AerogpuBlendFactor, AerogpuBlendOp, AerogpuBlendState, AEROGPU_COLOR_WRITE_MASK_ALL,
};

use crate::error::UmdError;

pub const D3D_COLOR_WRITE_ENABLE_ALL: u8 = 0xF;
pub const DEFAULT_SAMPLE_MASK: u32 = 0xFFFF_FFFF;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum D3dBlend {
    Zero = 1,
    One = 2,
    SrcColor = 3,
    InvSrcColor = 4,
    SrcAlpha = 5,
    InvSrcAlpha = 6,
    DestAlpha = 7,
    InvDestAlpha = 8,
    DestColor = 9,
    InvDestColor = 10,
    SrcAlphaSat = 11,
    BlendFactor = 14,
    InvBlendFactor = 15,
    Src1Color = 16,
    InvSrc1Color = 17,
    Src1Alpha = 18,
    InvSrc1Alpha = 19,
}

impl D3dBlend {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Zero),
            2 => Some(Self::One),
            3 => Some(Self::SrcColor),
            4 => Some(Self::InvSrcColor),
            5 => Some(Self::SrcAlpha),
            6 => Some(Self::InvSrcAlpha),
            7 => Some(Self::DestAlpha),
            8 => Some(Self::InvDestAlpha),
            9 => Some(Self::DestColor),
            10 => Some(Self::InvDestColor),
            11 => Some(Self::SrcAlphaSat),
            14 => Some(Self::BlendFactor),
            15 => Some(Self::InvBlendFactor),
            16 => Some(Self::Src1Color),
            17 => Some(Self::InvSrc1Color),
            18 => Some(Self::Src1Alpha),
            19 => Some(Self::InvSrc1Alpha),
            _ => None,
        }
    }

    pub const fn is_dual_source(self) -> bool {
        matches!(
            self,
            Self::Src1Color | Self::InvSrc1Color | Self::Src1Alpha | Self::InvSrc1Alpha
        )
    }

    /// `None` for factors the protocol cannot express.
    pub const fn to_protocol(self) -> Option<AerogpuBlendFactor> {
        match self {
            Self::Zero => Some(AerogpuBlendFactor::Zero),
            Self::One => Some(AerogpuBlendFactor::One),
            Self::SrcAlpha => Some(AerogpuBlendFactor::SrcAlpha),
            Self::InvSrcAlpha => Some(AerogpuBlendFactor::InvSrcAlpha),
            Self::DestAlpha => Some(AerogpuBlendFactor::DestAlpha),
            Self::InvDestAlpha => Some(AerogpuBlendFactor::InvDestAlpha),
            Self::BlendFactor => Some(AerogpuBlendFactor::Constant),
            Self::InvBlendFactor => Some(AerogpuBlendFactor::InvConstant),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum D3dBlendOp {
    Add = 1,
    Subtract = 2,
    RevSubtract = 3,
    Min = 4,
    Max = 5,
}

impl D3dBlendOp {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Add),
            2 => Some(Self::Subtract),
            3 => Some(Self::RevSubtract),
            4 => Some(Self::Min),
            5 => Some(Self::Max),
            _ => None,
        }
    }

    pub const fn to_protocol(self) -> AerogpuBlendOp {
        match self {
            Self::Add => AerogpuBlendOp::Add,
            Self::Subtract => AerogpuBlendOp::Subtract,
            Self::RevSubtract => AerogpuBlendOp::RevSubtract,
            Self::Min => AerogpuBlendOp::Min,
            Self::Max => AerogpuBlendOp::Max,
        }
    }
}

/// Per-render-target blend descriptor, raw API values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub render_target_write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: D3dBlend::One as u32,
            dest_blend: D3dBlend::Zero as u32,
            blend_op: D3dBlendOp::Add as u32,
            src_blend_alpha: D3dBlend::One as u32,
            dest_blend_alpha: D3dBlend::Zero as u32,
            blend_op_alpha: D3dBlendOp::Add as u32,
            render_target_write_mask: D3D_COLOR_WRITE_ENABLE_ALL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub render_targets: Vec<RenderTargetBlendDesc>,
}

/// A validated blend state object, already in protocol vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendStateObject {
    pub enable: bool,
    pub src_factor: AerogpuBlendFactor,
    pub dst_factor: AerogpuBlendFactor,
    pub blend_op: AerogpuBlendOp,
    pub src_factor_alpha: AerogpuBlendFactor,
    pub dst_factor_alpha: AerogpuBlendFactor,
    pub blend_op_alpha: AerogpuBlendOp,
    pub color_write_mask: u8,
}

impl Default for BlendStateObject {
    fn default() -> Self {
        Self {
            enable: false,
            src_factor: AerogpuBlendFactor::One,
            dst_factor: AerogpuBlendFactor::Zero,
            blend_op: AerogpuBlendOp::Add,
            src_factor_alpha: AerogpuBlendFactor::One,
            dst_factor_alpha: AerogpuBlendFactor::Zero,
            blend_op_alpha: AerogpuBlendOp::Add,
            color_write_mask: AEROGPU_COLOR_WRITE_MASK_ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedRtBlend {
    enable: bool,
    src: D3dBlend,
    dst: D3dBlend,
    op: D3dBlendOp,
    src_alpha: D3dBlend,
    dst_alpha: D3dBlend,
    op_alpha: D3dBlendOp,
    write_mask: u8,
}

impl ParsedRtBlend {
    fn parse(index: usize, desc: &RenderTargetBlendDesc) -> Result<Self, UmdError> {
        let factor = |field: &str, v: u32| {
            D3dBlend::from_u32(v)
                .ok_or_else(|| UmdError::invalid_arg(format!("render target {index}: {field} {v} out of range")))
        };
        let op = |field: &str, v: u32| {
            D3dBlendOp::from_u32(v)
                .ok_or_else(|| UmdError::invalid_arg(format!("render target {index}: {field} {v} out of range")))
        };
        Ok(Self {
            enable: desc.blend_enable,
            src: factor("src_blend", desc.src_blend)?,
            dst: factor("dest_blend", desc.dest_blend)?,
            op: op("blend_op", desc.blend_op)?,
            src_alpha: factor("src_blend_alpha", desc.src_blend_alpha)?,
            dst_alpha: factor("dest_blend_alpha", desc.dest_blend_alpha)?,
            op_alpha: op("blend_op_alpha", desc.blend_op_alpha)?,
            write_mask: desc.render_target_write_mask,
        })
    }

    fn uses_dual_source(&self) -> bool {
        [self.src, self.dst, self.src_alpha, self.dst_alpha]
            .iter()
            .any(|f| f.is_dual_source())
    }

    /// Factor/op fields are inert, and so not compared, when both sides have blending disabled.
    fn same_effect(&self, other: &Self) -> bool {
        if self.enable != other.enable || self.write_mask != other.write_mask {
            return false;
        }
        if !self.enable {
            return true;
        }
        self == other
    }
}

/// Validate an API blend descriptor and fold its render targets into the single protocol
/// record.
pub fn convert_blend_desc(desc: &BlendDesc) -> Result<BlendStateObject, UmdError> {
    let parsed = desc
        .render_targets
        .iter()
        .enumerate()
        .map(|(i, rt)| ParsedRtBlend::parse(i, rt))
        .collect::<Result<Vec<_>, _>>()?;

    if desc.alpha_to_coverage_enable {
        return Err(UmdError::not_implemented("alpha-to-coverage"));
    }
    if let Some((i, rt)) = parsed
        .iter()
        .enumerate()
        .find(|(_, rt)| rt.write_mask & !D3D_COLOR_WRITE_ENABLE_ALL != 0)
    {
        return Err(UmdError::not_implemented(format!(
            "render target {i}: write mask 0x{:x} has bits outside RGBA",
            rt.write_mask
        )));
    }
    if let Some(i) = parsed.iter().position(|rt| rt.enable && rt.uses_dual_source()) {
        return Err(UmdError::not_implemented(format!(
            "render target {i}: dual-source blend factor"
        )));
    }

    let Some((first, rest)) = parsed.split_first() else {
        return Ok(BlendStateObject::default());
    };
    if let Some(i) = rest.iter().position(|rt| !first.same_effect(rt)) {
        return Err(UmdError::not_implemented(format!(
            "render target {} blend differs from render target 0",
            i + 1
        )));
    }

    let defaults = BlendStateObject::default();
    let map = |f: D3dBlend, fallback: AerogpuBlendFactor| -> Result<AerogpuBlendFactor, UmdError> {
        match f.to_protocol() {
            Some(p) => Ok(p),
            None if !first.enable => Ok(fallback),
            None => Err(UmdError::not_implemented(format!("blend factor {f:?}"))),
        }
    };

    Ok(BlendStateObject {
        enable: first.enable,
        src_factor: map(first.src, defaults.src_factor)?,
        dst_factor: map(first.dst, defaults.dst_factor)?,
        blend_op: first.op.to_protocol(),
        src_factor_alpha: map(first.src_alpha, defaults.src_factor_alpha)?,
        dst_factor_alpha: map(first.dst_alpha, defaults.dst_factor_alpha)?,
        blend_op_alpha: first.op_alpha.to_protocol(),
        color_write_mask: first.write_mask,
    })
}

/// Build the record for an output-merger blend bind.
///
/// `None` state binds the canonical default. `None` blend factor resets the constant to
/// (1, 1, 1, 1); a supplied factor is always encoded as given.
pub fn blend_record(state: Option<&BlendStateObject>, blend_factor: Option<[f32; 4]>, sample_mask: u32) -> AerogpuBlendState {
    let s = state.copied().unwrap_or_default();
    let constant = blend_factor.unwrap_or([1.0; 4]);
    AerogpuBlendState {
        enable: u32::from(s.enable),
        src_factor: s.src_factor as u32,
        dst_factor: s.dst_factor as u32,
        blend_op: s.blend_op as u32,
        color_write_mask: s.color_write_mask,
        reserved0: [0; 3],
        src_factor_alpha: s.src_factor_alpha as u32,
        dst_factor_alpha: s.dst_factor_alpha as u32,
        blend_op_alpha: s.blend_op_alpha as u32,
        blend_constant_rgba_f32: constant.map(f32::to_bits),
        sample_mask,
    }
}

pub fn default_blend_state() -> AerogpuBlendState {
    blend_record(None, None, DEFAULT_SAMPLE_MASK)
}
