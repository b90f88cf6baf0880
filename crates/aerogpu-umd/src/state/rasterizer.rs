use aero_protocol::aerogpu::aerogpu_cmd::{
    AerogpuCullMode, AerogpuFillMode, AerogpuRasterizerState, AEROGPU_RASTERIZER_FLAG_DEPTH_CLIP_DISABLE,
};
use bitflags::bitflags;

use crate::error::UmdError;

pub const D3D_FILL_WIREFRAME: u32 = 2;
pub const D3D_FILL_SOLID: u32 = 3;

pub const D3D_CULL_NONE: u32 = 1;
pub const D3D_CULL_FRONT: u32 = 2;
pub const D3D_CULL_BACK: u32 = 3;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RasterizerFlags: u32 {
        const DEPTH_CLIP_DISABLE = AEROGPU_RASTERIZER_FLAG_DEPTH_CLIP_DISABLE;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: D3D_FILL_SOLID,
            cull_mode: D3D_CULL_BACK,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_clip_enable: true,
            scissor_enable: false,
        }
    }
}

fn fill_mode(v: u32) -> Result<AerogpuFillMode, UmdError> {
    match v {
        D3D_FILL_WIREFRAME => Ok(AerogpuFillMode::Wireframe),
        D3D_FILL_SOLID => Ok(AerogpuFillMode::Solid),
        _ => Err(UmdError::invalid_arg(format!("fill mode {v} out of range"))),
    }
}

fn cull_mode(v: u32) -> Result<AerogpuCullMode, UmdError> {
    match v {
        D3D_CULL_NONE => Ok(AerogpuCullMode::None),
        D3D_CULL_FRONT => Ok(AerogpuCullMode::Front),
        D3D_CULL_BACK => Ok(AerogpuCullMode::Back),
        _ => Err(UmdError::invalid_arg(format!("cull mode {v} out of range"))),
    }
}

/// `None` yields solid fill, back-face culling, clockwise front faces, no scissor, no depth bias
/// and depth clipping on.
pub fn convert_rasterizer_desc(desc: Option<&RasterizerDesc>) -> Result<AerogpuRasterizerState, UmdError> {
    let desc = desc.copied().unwrap_or_default();
    let mut flags = RasterizerFlags::empty();
    flags.set(RasterizerFlags::DEPTH_CLIP_DISABLE, !desc.depth_clip_enable);

    Ok(AerogpuRasterizerState {
        fill_mode: fill_mode(desc.fill_mode)? as u32,
        cull_mode: cull_mode(desc.cull_mode)? as u32,
        front_ccw: u32::from(desc.front_counter_clockwise),
        scissor_enable: u32::from(desc.scissor_enable),
        depth_bias: desc.depth_bias,
        flags: flags.bits(),
    })
}

pub fn default_rasterizer_state() -> AerogpuRasterizerState {
    AerogpuRasterizerState {
        fill_mode: AerogpuFillMode::Solid as u32,
        cull_mode: AerogpuCullMode::Back as u32,
        front_ccw: 0,
        scissor_enable: 0,
        depth_bias: 0,
        flags: RasterizerFlags::empty().bits(),
    }
}
