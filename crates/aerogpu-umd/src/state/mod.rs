//! Fixed-function state translation.
//!
//! Everything here is a pure function from a D3D10/11-style descriptor to an AeroGPU protocol
//! record. Malformed descriptors (out-of-range enumerations) are [`crate::UmdError::InvalidArg`];
//! legal but unrepresentable ones are [`crate::UmdError::NotImplemented`].

pub mod blend;
pub mod depth_stencil;
pub mod rasterizer;
pub mod viewport;

pub use blend::{
    blend_record, convert_blend_desc, default_blend_state, BlendDesc, BlendStateObject, RenderTargetBlendDesc,
};
pub use depth_stencil::{convert_depth_stencil_desc, default_depth_stencil_state, DepthStencilDesc};
pub use rasterizer::{convert_rasterizer_desc, default_rasterizer_state, RasterizerDesc, RasterizerFlags};
pub use viewport::{select_scissor, select_viewport, ScissorRect, Viewport};

/// A record to encode, plus the reason it only approximates the request.
#[derive(Debug, Clone, PartialEq)]
pub struct BestEffort<T> {
    pub record: T,
    pub not_implemented: Option<String>,
}

impl<T> BestEffort<T> {
    pub fn exact(record: T) -> Self {
        Self {
            record,
            not_implemented: None,
        }
    }

    pub fn approximate(record: T, reason: impl Into<String>) -> Self {
        Self {
            record,
            not_implemented: Some(reason.into()),
        }
    }
}
