//! Wire-level protocol definitions shared by the AeroGPU guest driver and its tests.
//!
//! Everything here is plain data: packed little-endian layouts, constants and decoders. No
//! state tracking lives in this crate.

pub mod aerogpu;
