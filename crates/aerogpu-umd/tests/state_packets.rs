mod common;

use aero_protocol::aerogpu::aerogpu_cmd::{
    AerogpuBlendFactor, AerogpuCmdOpcode, AerogpuCmdStreamView, AerogpuCompareFunc, AerogpuCullMode,
    AerogpuFillMode,
};
use aerogpu_umd::state::blend::{D3dBlend, DEFAULT_SAMPLE_MASK};
use aerogpu_umd::state::depth_stencil::D3D_DEPTH_WRITE_MASK_ALL;
use aerogpu_umd::state::rasterizer::{D3D_CULL_FRONT, D3D_FILL_WIREFRAME};
use aerogpu_umd::state::{BlendDesc, DepthStencilDesc, RasterizerDesc, RenderTargetBlendDesc, ScissorRect, Viewport};
use aerogpu_umd::UmdError;
use common::{device, Recorder};
use pretty_assertions::assert_eq;

fn last_stream(dev: &aerogpu_umd::Device<Recorder>, rec: &Recorder) -> Vec<u8> {
    dev.flush().unwrap().expect("stream was not empty");
    rec.streams.lock().unwrap().last().unwrap().clone()
}

fn viewport(x: f32, width: f32, height: f32) -> Viewport {
    Viewport {
        top_left_x: x,
        top_left_y: 0.0,
        width,
        height,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// (x, y, w, h, min, max) of the only SET_VIEWPORT in `stream`.
fn decoded_viewport(stream: &[u8]) -> [f32; 6] {
    let view = AerogpuCmdStreamView::decode_from_le_bytes(stream).unwrap();
    let p = view
        .packets_with_opcode(AerogpuCmdOpcode::SetViewport)
        .next()
        .unwrap()
        .decode_set_viewport_le()
        .unwrap();
    [p.x_f32, p.y_f32, p.width_f32, p.height_f32, p.min_depth_f32, p.max_depth_f32].map(f32::from_bits)
}

#[test]
fn distinct_viewports_report_not_implemented_but_encode_the_first() {
    let (dev, rec) = device();
    let err = dev
        .set_viewports(&[viewport(0.0, 640.0, 480.0), viewport(16.0, 320.0, 240.0)])
        .unwrap_err();
    assert!(err.is_not_implemented(), "{err}");
    assert_eq!(
        decoded_viewport(&last_stream(&dev, &rec)),
        [0.0, 0.0, 640.0, 480.0, 0.0, 1.0]
    );
}

#[test]
fn identical_or_placeholder_viewports_are_accepted() {
    let (dev, rec) = device();
    let vp = viewport(8.0, 640.0, 480.0);
    dev.set_viewports(&[vp, vp]).unwrap();
    assert_eq!(decoded_viewport(&last_stream(&dev, &rec)), [8.0, 0.0, 640.0, 480.0, 0.0, 1.0]);

    dev.set_viewports(&[vp, viewport(0.0, 0.0, 0.0)]).unwrap();
    assert_eq!(decoded_viewport(&last_stream(&dev, &rec)), [8.0, 0.0, 640.0, 480.0, 0.0, 1.0]);
}

#[test]
fn no_active_viewport_encodes_disabled_record() {
    let (dev, rec) = device();
    dev.set_viewports(&[]).unwrap();
    assert_eq!(decoded_viewport(&last_stream(&dev, &rec)), [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn scissor_rect_is_encoded_as_origin_and_extent() {
    let (dev, rec) = device();
    dev.set_scissor_rects(&[ScissorRect {
        left: 10,
        top: 20,
        right: 110,
        bottom: 70,
    }])
    .unwrap();
    let stream = last_stream(&dev, &rec);
    let view = AerogpuCmdStreamView::decode_from_le_bytes(&stream).unwrap();
    let s = view.packets[0].decode_set_scissor_le().unwrap();
    let (x, y, w, h) = (s.x, s.y, s.width, s.height);
    assert_eq!((x, y, w, h), (10, 20, 100, 50));

    // Inverted rectangles count as disabled, so only the first one survives, with zero extent.
    let inverted = ScissorRect {
        left: 10,
        top: 0,
        right: 5,
        bottom: 5,
    };
    dev.set_scissor_rects(&[inverted]).unwrap();
    let stream = last_stream(&dev, &rec);
    let view = AerogpuCmdStreamView::decode_from_le_bytes(&stream).unwrap();
    let s = view.packets[0].decode_set_scissor_le().unwrap();
    let (x, y, w, h) = (s.x, s.y, s.width, s.height);
    assert_eq!((x, y, w, h), (10, 0, 0, 0));
}

#[test]
fn active_entry_after_a_placeholder_is_encoded() {
    let (dev, rec) = device();
    dev.set_viewports(&[Viewport::default(), viewport(0.0, 640.0, 480.0)])
        .unwrap();
    assert_eq!(decoded_viewport(&last_stream(&dev, &rec)), [0.0, 0.0, 640.0, 480.0, 0.0, 1.0]);

    let rect = ScissorRect {
        left: 4,
        top: 4,
        right: 260,
        bottom: 132,
    };
    dev.set_scissor_rects(&[ScissorRect::default(), rect]).unwrap();
    let stream = last_stream(&dev, &rec);
    let view = AerogpuCmdStreamView::decode_from_le_bytes(&stream).unwrap();
    let s = view.packets[0].decode_set_scissor_le().unwrap();
    let (x, y, w, h) = (s.x, s.y, s.width, s.height);
    assert_eq!((x, y, w, h), (4, 4, 256, 128));
}

fn decoded_blend(stream: &[u8]) -> (u32, u32, u32, [f32; 4], u32) {
    let view = AerogpuCmdStreamView::decode_from_le_bytes(stream).unwrap();
    let cmd = view.packets[0].decode_set_blend_state_le().unwrap();
    let s = cmd.state;
    let constant = s.blend_constant_rgba_f32;
    (
        s.enable,
        s.src_factor,
        s.dst_factor,
        constant.map(f32::from_bits),
        s.sample_mask,
    )
}

#[test]
fn null_blend_state_and_factor_encode_defaults() {
    let (dev, rec) = device();
    dev.set_blend_state(None, None, DEFAULT_SAMPLE_MASK).unwrap();
    assert_eq!(
        decoded_blend(&last_stream(&dev, &rec)),
        (
            0,
            AerogpuBlendFactor::One as u32,
            AerogpuBlendFactor::Zero as u32,
            [1.0; 4],
            0xFFFF_FFFF
        )
    );
}

#[test]
fn supplied_blend_factor_is_encoded_exactly() {
    let (dev, rec) = device();
    let factor = [0.25, 0.5, 0.75, 0.125];
    dev.set_blend_state(None, Some(factor), 0x0F).unwrap();
    let (enable, _, _, constant, mask) = decoded_blend(&last_stream(&dev, &rec));
    assert_eq!(enable, 0);
    assert_eq!(constant, factor);
    assert_eq!(mask, 0x0F);
}

#[test]
fn bound_blend_state_is_copied_verbatim() {
    let (dev, rec) = device();
    let state = dev
        .create_blend_state(&BlendDesc {
            alpha_to_coverage_enable: false,
            render_targets: vec![RenderTargetBlendDesc {
                blend_enable: true,
                src_blend: D3dBlend::SrcAlpha as u32,
                dest_blend: D3dBlend::InvSrcAlpha as u32,
                ..Default::default()
            }],
        })
        .unwrap();
    dev.set_blend_state(Some(&state), None, DEFAULT_SAMPLE_MASK).unwrap();
    let (enable, src, dst, constant, _) = decoded_blend(&last_stream(&dev, &rec));
    assert_eq!(
        (enable, src, dst, constant),
        (
            1,
            AerogpuBlendFactor::SrcAlpha as u32,
            AerogpuBlendFactor::InvSrcAlpha as u32,
            [1.0; 4]
        )
    );
}

#[test]
fn mrt_blend_descriptors_must_agree_when_enabled() {
    let (dev, _rec) = device();
    let base = RenderTargetBlendDesc {
        blend_enable: true,
        src_blend: D3dBlend::SrcAlpha as u32,
        dest_blend: D3dBlend::InvSrcAlpha as u32,
        ..Default::default()
    };
    let other = RenderTargetBlendDesc {
        dest_blend: D3dBlend::One as u32,
        ..base
    };
    let err = dev
        .create_blend_state(&BlendDesc {
            alpha_to_coverage_enable: false,
            render_targets: vec![base, other],
        })
        .unwrap_err();
    assert!(err.is_not_implemented(), "{err}");

    let disabled = |rt: RenderTargetBlendDesc| RenderTargetBlendDesc {
        blend_enable: false,
        ..rt
    };
    dev.create_blend_state(&BlendDesc {
        alpha_to_coverage_enable: false,
        render_targets: vec![disabled(base), disabled(other)],
    })
    .unwrap();
}

#[test]
fn depth_disabled_never_encodes_depth_writes() {
    let (dev, rec) = device();
    let state = dev
        .create_depth_stencil_state(&DepthStencilDesc {
            depth_enable: false,
            depth_write_mask: D3D_DEPTH_WRITE_MASK_ALL,
            ..Default::default()
        })
        .unwrap();
    dev.set_depth_stencil_state(Some(&state)).unwrap();
    dev.set_depth_stencil_state(None).unwrap();

    let stream = last_stream(&dev, &rec);
    let view = AerogpuCmdStreamView::decode_from_le_bytes(&stream).unwrap();
    let explicit = view.packets[0].decode_set_depth_stencil_state_le().unwrap().state;
    let default = view.packets[1].decode_set_depth_stencil_state_le().unwrap().state;
    let (enable, write) = (explicit.depth_enable, explicit.depth_write_enable);
    assert_eq!((enable, write), (0, 0));
    let (enable, write, func) = (default.depth_enable, default.depth_write_enable, default.depth_func);
    assert_eq!((enable, write, func), (1, 1, AerogpuCompareFunc::Less as u32));
}

#[test]
fn rasterizer_state_round_trips_through_the_stream() {
    let (dev, rec) = device();
    let state = dev
        .create_rasterizer_state(&RasterizerDesc {
            fill_mode: D3D_FILL_WIREFRAME,
            cull_mode: D3D_CULL_FRONT,
            depth_clip_enable: false,
            ..Default::default()
        })
        .unwrap();
    dev.set_rasterizer_state(Some(&state)).unwrap();
    let stream = last_stream(&dev, &rec);
    let view = AerogpuCmdStreamView::decode_from_le_bytes(&stream).unwrap();
    let s = view.packets[0].decode_set_rasterizer_state_le().unwrap().state;
    let (fill, cull, flags) = (s.fill_mode, s.cull_mode, s.flags);
    assert_eq!(
        (fill, cull, flags),
        (AerogpuFillMode::Wireframe as u32, AerogpuCullMode::Front as u32, 1)
    );

    assert!(matches!(
        dev.create_rasterizer_state(&RasterizerDesc {
            fill_mode: 7,
            ..Default::default()
        }),
        Err(UmdError::InvalidArg(_))
    ));
}
