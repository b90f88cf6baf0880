mod common;

use aero_protocol::aerogpu::aerogpu_cmd::AerogpuShaderStage;
use aerogpu_umd::{ResourceIdentity, RotationPolicy, UmdConfig, UmdError};
use common::{device, device_with, flush_and_decode, handle, Cmd};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const PS: u32 = AerogpuShaderStage::Pixel as u32;

#[test]
fn rebinding_original_views_after_rotation_uses_new_handles() {
    let (dev, rec) = device();
    let ids: Vec<_> = (0..3).map(|i| dev.create_resource(100 + i).unwrap()).collect();
    let views: Vec<_> = ids
        .iter()
        .map(|&id| Some(dev.create_shader_resource_view(id).unwrap()))
        .collect();
    let prior: Vec<u32> = ids.iter().map(|&id| handle(&dev, id)).collect();

    dev.rotate_resource_identities(&ids).unwrap();
    dev.set_shader_resources(AerogpuShaderStage::Pixel, 0, &views).unwrap();

    let expected: Vec<Cmd> = [prior[1], prior[2], prior[0]]
        .into_iter()
        .zip(0..)
        .map(|(texture, slot)| Cmd::Texture {
            stage: PS,
            slot,
            texture,
        })
        .collect();
    assert_eq!(flush_and_decode(&dev, &rec), expected);
}

#[test]
fn rotation_reemits_bound_render_targets_and_textures() {
    let (dev, rec) = device();
    let a = dev.create_resource(0).unwrap();
    let b = dev.create_resource(0).unwrap();
    let c = dev.create_resource(0).unwrap();
    let rtv = dev.create_render_target_view(a).unwrap();
    let srv = dev.create_shader_resource_view(c).unwrap();
    dev.set_render_targets(&[Some(rtv)], None).unwrap();
    dev.set_shader_resources(AerogpuShaderStage::Pixel, 4, &[Some(srv)]).unwrap();
    dev.flush().unwrap();

    dev.rotate_resource_identities(&[a, b, c]).unwrap();
    assert_eq!(
        flush_and_decode(&dev, &rec),
        vec![
            Cmd::RenderTargets {
                color_count: 1,
                colors: [handle(&dev, a), 0, 0, 0, 0, 0, 0, 0],
                depth_stencil: 0,
            },
            Cmd::Texture {
                stage: PS,
                slot: 4,
                texture: handle(&dev, c),
            },
        ]
    );
}

#[test]
fn rotation_of_unbound_resources_emits_nothing() {
    let (dev, _rec) = device();
    let a = dev.create_resource(0).unwrap();
    let b = dev.create_resource(0).unwrap();
    dev.rotate_resource_identities(&[a, b]).unwrap();
    assert_eq!(dev.flush().unwrap(), None);
}

#[test]
fn malformed_rotations_are_rejected_without_changes() {
    let (dev, _rec) = device();
    let a = dev.create_resource(0).unwrap();
    let b = dev.create_resource(0).unwrap();
    let gone = dev.create_resource(0).unwrap();
    dev.destroy_resource(gone).unwrap();
    let before = (dev.resource_identity(a), dev.resource_identity(b));

    for ids in [vec![a], vec![a, a], vec![a, b, gone], vec![]] {
        assert!(matches!(
            dev.rotate_resource_identities(&ids),
            Err(UmdError::InvalidArg(_))
        ));
    }
    assert_eq!((dev.resource_identity(a), dev.resource_identity(b)), before);
}

fn policy() -> impl Strategy<Value = RotationPolicy> {
    prop_oneof![Just(RotationPolicy::Wrap), Just(RotationPolicy::KeepLast)]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    #[test]
    fn rotation_shifts_identities_and_applies_last_entry_policy(
        backing in prop::collection::vec(0u32..4, 2..8),
        policy in policy(),
    ) {
        let (dev, rec) = device_with(UmdConfig { rotation_policy: policy, ..UmdConfig::default() });
        let ids: Vec<_> = backing.iter().map(|&b| dev.create_resource(b).unwrap()).collect();
        let views: Vec<_> = ids
            .iter()
            .map(|&id| Some(dev.create_shader_resource_view(id).unwrap()))
            .collect();
        dev.set_shader_resources(AerogpuShaderStage::Pixel, 0, &views).unwrap();
        dev.flush().unwrap();

        let prior: Vec<ResourceIdentity> = ids.iter().map(|&id| dev.resource_identity(id).unwrap()).collect();
        dev.rotate_resource_identities(&ids).unwrap();
        let after: Vec<ResourceIdentity> = ids.iter().map(|&id| dev.resource_identity(id).unwrap()).collect();

        let n = ids.len();
        for i in 0..n - 1 {
            prop_assert_eq!(after[i], prior[i + 1]);
        }
        let expected_last = match policy {
            RotationPolicy::Wrap => prior[0],
            RotationPolicy::KeepLast => prior[n - 1],
        };
        prop_assert_eq!(after[n - 1], expected_last);

        // Every SRV slot is re-encoded with its resource's new handle.
        let cmds = flush_and_decode(&dev, &rec);
        let expected: Vec<Cmd> = after
            .iter()
            .zip(0..)
            .map(|(identity, slot)| Cmd::Texture { stage: PS, slot, texture: identity.handle })
            .collect();
        prop_assert_eq!(cmds, expected);
    }
}
