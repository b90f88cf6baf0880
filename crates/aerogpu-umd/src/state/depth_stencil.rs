use aero_protocol::aerogpu::aerogpu_cmd::{AerogpuCompareFunc, AerogpuDepthStencilState};

use crate::error::UmdError;

pub const D3D_DEPTH_WRITE_MASK_ZERO: u32 = 0;
pub const D3D_DEPTH_WRITE_MASK_ALL: u32 = 1;

/// `D3D11_COMPARISON_NEVER` .. `D3D11_COMPARISON_ALWAYS`.
pub const D3D_COMPARISON_NEVER: u32 = 1;
pub const D3D_COMPARISON_LESS: u32 = 2;
pub const D3D_COMPARISON_ALWAYS: u32 = 8;

pub const D3D_DEFAULT_STENCIL_MASK: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: u32,
    pub depth_func: u32,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: D3D_DEPTH_WRITE_MASK_ALL,
            depth_func: D3D_COMPARISON_LESS,
            stencil_enable: false,
            stencil_read_mask: D3D_DEFAULT_STENCIL_MASK,
            stencil_write_mask: D3D_DEFAULT_STENCIL_MASK,
        }
    }
}

fn compare_func(v: u32) -> Result<AerogpuCompareFunc, UmdError> {
    v.checked_sub(D3D_COMPARISON_NEVER)
        .and_then(AerogpuCompareFunc::from_u32)
        .ok_or_else(|| UmdError::invalid_arg(format!("comparison func {v} out of range")))
}

/// With depth testing off the encoded depth write is always off as well.
pub fn convert_depth_stencil_desc(desc: Option<&DepthStencilDesc>) -> Result<AerogpuDepthStencilState, UmdError> {
    let desc = desc.copied().unwrap_or_default();
    let depth_write = match desc.depth_write_mask {
        D3D_DEPTH_WRITE_MASK_ZERO => false,
        D3D_DEPTH_WRITE_MASK_ALL => true,
        other => return Err(UmdError::invalid_arg(format!("depth write mask {other} out of range"))),
    };

    Ok(AerogpuDepthStencilState {
        depth_enable: u32::from(desc.depth_enable),
        depth_write_enable: u32::from(desc.depth_enable && depth_write),
        depth_func: compare_func(desc.depth_func)? as u32,
        stencil_enable: u32::from(desc.stencil_enable),
        stencil_read_mask: desc.stencil_read_mask,
        stencil_write_mask: desc.stencil_write_mask,
        reserved0: [0; 2],
    })
}

pub fn default_depth_stencil_state() -> AerogpuDepthStencilState {
    AerogpuDepthStencilState {
        depth_enable: 1,
        depth_write_enable: 1,
        depth_func: AerogpuCompareFunc::Less as u32,
        stencil_enable: 0,
        stencil_read_mask: D3D_DEFAULT_STENCIL_MASK,
        stencil_write_mask: D3D_DEFAULT_STENCIL_MASK,
        reserved0: [0; 2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_disabled_forces_write_off() {
        let rec = convert_depth_stencil_desc(Some(&DepthStencilDesc {
            depth_enable: false,
            depth_write_mask: D3D_DEPTH_WRITE_MASK_ALL,
            ..Default::default()
        }))
        .unwrap();
        let (enable, write) = (rec.depth_enable, rec.depth_write_enable);
        assert_eq!(enable, 0);
        assert_eq!(write, 0);
    }

    #[test]
    fn null_state_is_less_with_writes() {
        let rec = convert_depth_stencil_desc(None).unwrap();
        let (enable, write, func, stencil, rmask, wmask) = (
            rec.depth_enable,
            rec.depth_write_enable,
            rec.depth_func,
            rec.stencil_enable,
            rec.stencil_read_mask,
            rec.stencil_write_mask,
        );
        assert_eq!((enable, write, stencil), (1, 1, 0));
        assert_eq!(func, AerogpuCompareFunc::Less as u32);
        assert_eq!((rmask, wmask), (0xFF, 0xFF));
    }

    #[test]
    fn compare_funcs_shift_down_by_one() {
        for (api, proto) in [
            (D3D_COMPARISON_NEVER, AerogpuCompareFunc::Never),
            (D3D_COMPARISON_LESS, AerogpuCompareFunc::Less),
            (D3D_COMPARISON_ALWAYS, AerogpuCompareFunc::Always),
        ] {
            let rec = convert_depth_stencil_desc(Some(&DepthStencilDesc {
                depth_func: api,
                ..Default::default()
            }))
            .unwrap();
            let func = rec.depth_func;
            assert_eq!(func, proto as u32);
        }
    }

    #[test]
    fn out_of_range_values_are_invalid_args() {
        for desc in [
            DepthStencilDesc {
                depth_func: 0,
                ..Default::default()
            },
            DepthStencilDesc {
                depth_func: 9,
                ..Default::default()
            },
            DepthStencilDesc {
                depth_write_mask: 2,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                convert_depth_stencil_desc(Some(&desc)),
                Err(UmdError::InvalidArg(_))
            ));
        }
    }
}
