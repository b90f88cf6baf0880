#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use aero_protocol::aerogpu::aerogpu_cmd::{
    AerogpuCmdOpcode, AerogpuCmdSetRenderTargets, AerogpuCmdSetTexture, AerogpuCmdStreamView,
};
use aerogpu_umd::{Device, SubmitError, Submission, Submitter, UmdConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    RenderTargets {
        color_count: u32,
        colors: [u32; 8],
        depth_stencil: u32,
    },
    Texture {
        stage: u32,
        slot: u32,
        texture: u32,
    },
    Other(AerogpuCmdOpcode),
}

/// Submitter that keeps a copy of every submitted stream.
#[derive(Clone, Default)]
pub struct Recorder {
    pub streams: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Submitter for Recorder {
    fn submit(&mut self, submission: &Submission<'_>) -> Result<(), SubmitError> {
        self.streams.lock().unwrap().push(submission.cmd.to_vec());
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn device() -> (Device<Recorder>, Recorder) {
    device_with(UmdConfig::default())
}

pub fn device_with(config: UmdConfig) -> (Device<Recorder>, Recorder) {
    init_tracing();
    let recorder = Recorder::default();
    let dev = Device::new(config, recorder.clone()).unwrap();
    (dev, recorder)
}

pub fn decode(stream: &[u8]) -> Vec<Cmd> {
    let view = AerogpuCmdStreamView::decode_from_le_bytes(stream).unwrap();
    view.packets
        .iter()
        .map(|p| match p.opcode {
            Some(AerogpuCmdOpcode::SetRenderTargets) => {
                let c: AerogpuCmdSetRenderTargets = p.decode_set_render_targets_le().unwrap();
                Cmd::RenderTargets {
                    color_count: c.color_count,
                    colors: c.colors,
                    depth_stencil: c.depth_stencil,
                }
            }
            Some(AerogpuCmdOpcode::SetTexture) => {
                let c: AerogpuCmdSetTexture = p.decode_set_texture_le().unwrap();
                Cmd::Texture {
                    stage: c.shader_stage,
                    slot: c.slot,
                    texture: c.texture,
                }
            }
            Some(op) => Cmd::Other(op),
            None => panic!("unknown opcode 0x{:x}", { p.hdr.opcode }),
        })
        .collect()
}

/// Flush `dev` and decode the stream it produced.
pub fn flush_and_decode(dev: &Device<Recorder>, recorder: &Recorder) -> Vec<Cmd> {
    dev.flush().unwrap().expect("stream was not empty");
    let streams = recorder.streams.lock().unwrap();
    decode(streams.last().unwrap())
}

pub fn handle(dev: &Device<Recorder>, id: aerogpu_umd::ResourceId) -> u32 {
    dev.resource_identity(id).unwrap().handle
}
