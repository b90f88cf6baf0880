//! Guest-side AeroGPU command encoder.
//!
//! The [`Device`] takes D3D10/11-style pipeline calls, validates and translates fixed-function
//! state, tracks render-target / shader-resource bindings (inserting unbinds when a write target
//! and a read binding alias the same memory), encodes everything with
//! [`aero_protocol::aerogpu::cmd_writer::AerogpuCmdWriter`] and hands finished streams to a
//! [`Submitter`] (normally the [`RingSubmitter`] over guest memory).

pub mod bindings;
pub mod config;
pub mod device;
pub mod error;
pub mod guest_memory;
pub mod resource;
pub mod rotate;
pub mod state;
pub mod submit;

pub use config::{CmdBufferKind, UmdConfig};
pub use device::Device;
pub use error::{SubmitError, UmdError};
pub use guest_memory::{GuestMemory, GuestMemoryError, VecGuestMemory};
pub use resource::{
    DepthStencilView, RenderTargetView, ResourceArena, ResourceId, ResourceIdentity, ShaderResourceView,
};
pub use rotate::RotationPolicy;
pub use submit::{
    AllocFlags, AllocTableBuilder, FenceTracker, RingLayout, RingSubmitter, SubmitFlags, Submission, Submitter,
};
