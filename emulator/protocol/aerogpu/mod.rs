//! AeroGPU guest<->device ABI.
//!
//! - [`aerogpu_pci`]: ABI version encoding shared by every versioned header.
//! - [`aerogpu_cmd`]: command stream header, packet header and per-opcode layouts.
//! - [`aerogpu_ring`]: submission ring, allocation table and fence page layouts.
//! - [`cmd_writer`]: command stream builder over a growable or fixed-capacity buffer.

pub mod aerogpu_cmd;
pub mod aerogpu_pci;
pub mod aerogpu_ring;
pub mod cmd_writer;
