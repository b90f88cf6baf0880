//! Output-merger and shader-resource binding cache plus the read/write hazard tracker.
//!
//! A resource must never be bound as a render target (or depth-stencil target) while a shader
//! resource slot still reads it. Binds that would create that state first emit the unbinds that
//! resolve it. Each public operation appends its packets as one group: either all of them land
//! in the stream and the cache is updated, or the stream is rolled back and the cache is left
//! untouched.

use std::collections::BTreeMap;

use aero_protocol::aerogpu::aerogpu_cmd::{AerogpuHandle, AerogpuShaderStage, AEROGPU_MAX_RENDER_TARGETS};
use aero_protocol::aerogpu::cmd_writer::{AerogpuCmdWriter, CmdWriterError};
use tracing::{debug, warn};

use crate::error::UmdError;
use crate::resource::{ResourceArena, ResourceId};

/// Shader-resource slots per stage (`D3D11_COMMONSHADER_INPUT_RESOURCE_SLOT_COUNT`).
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTargetSet {
    pub colors: [Option<ResourceId>; AEROGPU_MAX_RENDER_TARGETS],
    /// Length of the last bind request, clamped. Empty slots below it are kept.
    pub color_count: usize,
    pub depth_stencil: Option<ResourceId>,
}

impl RenderTargetSet {
    pub fn new(colors: &[Option<ResourceId>], depth_stencil: Option<ResourceId>) -> Self {
        let color_count = colors.len().min(AEROGPU_MAX_RENDER_TARGETS);
        let mut set = Self {
            colors: [None; AEROGPU_MAX_RENDER_TARGETS],
            color_count,
            depth_stencil,
        };
        set.colors[..color_count].copy_from_slice(&colors[..color_count]);
        set
    }

    /// Every bound resource, colors first.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.colors[..self.color_count]
            .iter()
            .flatten()
            .copied()
            .chain(self.depth_stencil)
    }

    pub fn contains(&self, resource: ResourceId) -> bool {
        self.resources().any(|r| r == resource)
    }

    /// Clear every slot (color or depth) for which `pred` holds.
    fn clear_where(&mut self, mut pred: impl FnMut(ResourceId) -> bool) {
        for slot in &mut self.colors[..self.color_count] {
            if slot.is_some_and(&mut pred) {
                *slot = None;
            }
        }
        if self.depth_stencil.is_some_and(&mut pred) {
            self.depth_stencil = None;
        }
    }

    /// Resolve handles through `arena` and append one SET_RENDER_TARGETS.
    pub fn encode(&self, arena: &ResourceArena, w: &mut AerogpuCmdWriter) -> Result<usize, CmdWriterError> {
        let mut handles: [AerogpuHandle; AEROGPU_MAX_RENDER_TARGETS] = [0; AEROGPU_MAX_RENDER_TARGETS];
        for (h, slot) in handles.iter_mut().zip(&self.colors[..self.color_count]) {
            *h = slot.map_or(0, |id| arena.handle(id));
        }
        let depth = self.depth_stencil.map_or(0, |id| arena.handle(id));
        w.set_render_targets(&handles[..self.color_count], depth)
    }
}

/// Append a group of packets. On failure everything the group appended is rolled back.
fn append_group(
    w: &mut AerogpuCmdWriter,
    what: &str,
    f: impl FnOnce(&mut AerogpuCmdWriter) -> Result<(), CmdWriterError>,
) -> Result<(), UmdError> {
    let mark = w.mark();
    f(w).map_err(|err| {
        w.rollback(mark);
        warn!(%err, what, "command append failed; group rolled back");
        UmdError::from(err)
    })
}

#[derive(Debug, Default)]
pub struct PipelineBindings {
    render_targets: RenderTargetSet,
    shader_resources: BTreeMap<(AerogpuShaderStage, u32), ResourceId>,
}

impl PipelineBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_targets(&self) -> &RenderTargetSet {
        &self.render_targets
    }

    pub fn shader_resource(&self, stage: AerogpuShaderStage, slot: u32) -> Option<ResourceId> {
        self.shader_resources.get(&(stage, slot)).copied()
    }

    /// Bound shader resources in (stage, slot) order.
    pub fn shader_resources(&self) -> impl Iterator<Item = (AerogpuShaderStage, u32, ResourceId)> + '_ {
        self.shader_resources
            .iter()
            .map(|(&(stage, slot), &res)| (stage, slot, res))
    }

    /// Bind render targets and a depth-stencil target.
    ///
    /// Shader-resource slots reading anything that aliases the new targets are unbound first,
    /// in stage then slot order.
    pub fn set_render_targets(
        &mut self,
        arena: &ResourceArena,
        w: &mut AerogpuCmdWriter,
        colors: &[Option<ResourceId>],
        depth_stencil: Option<ResourceId>,
    ) -> Result<(), UmdError> {
        if colors.len() > AEROGPU_MAX_RENDER_TARGETS {
            debug!(
                requested = colors.len(),
                max = AEROGPU_MAX_RENDER_TARGETS,
                "clamping render target count"
            );
        }
        let new_set = RenderTargetSet::new(colors, depth_stencil);

        let hazards: Vec<(AerogpuShaderStage, u32)> = self
            .shader_resources
            .iter()
            .filter(|(_, &srv)| new_set.resources().any(|rt| arena.aliases(rt, srv)))
            .map(|(&key, _)| key)
            .collect();

        append_group(w, "set_render_targets", |w| {
            for &(stage, slot) in &hazards {
                w.set_texture(stage, slot, 0)?;
            }
            new_set.encode(arena, w)?;
            Ok(())
        })?;

        for key in &hazards {
            debug!(stage = ?key.0, slot = key.1, "unbound shader resource aliasing a render target");
            self.shader_resources.remove(key);
        }
        self.render_targets = new_set;
        Ok(())
    }

    /// Bind `views` to `[start_slot, start_slot + views.len())` of `stage`.
    ///
    /// Render-target and depth-stencil slots aliasing any newly bound resource are cleared first
    /// (one SET_RENDER_TARGETS with the updated set). Other slots keep their bindings.
    pub fn set_shader_resources(
        &mut self,
        arena: &ResourceArena,
        w: &mut AerogpuCmdWriter,
        stage: AerogpuShaderStage,
        start_slot: u32,
        views: &[Option<ResourceId>],
    ) -> Result<(), UmdError> {
        let end = u64::from(start_slot) + views.len() as u64;
        if end > u64::from(MAX_SHADER_RESOURCE_SLOTS) {
            return Err(UmdError::invalid_arg(format!(
                "shader resource range {start_slot}..{end} exceeds {MAX_SHADER_RESOURCE_SLOTS} slots"
            )));
        }

        let mut new_set = self.render_targets.clone();
        for &res in views.iter().flatten() {
            new_set.clear_where(|rt| arena.aliases(rt, res));
        }
        let rts_changed = new_set != self.render_targets;

        append_group(w, "set_shader_resources", |w| {
            if rts_changed {
                new_set.encode(arena, w)?;
            }
            for (slot, view) in (start_slot..).zip(views) {
                w.set_texture(stage, slot, view.map_or(0, |id| arena.handle(id)))?;
            }
            Ok(())
        })?;

        if rts_changed {
            debug!(?stage, start_slot, "unbound render targets aliasing a shader resource");
            self.render_targets = new_set;
        }
        for (slot, view) in (start_slot..).zip(views) {
            match view {
                Some(res) => self.shader_resources.insert((stage, slot), *res),
                None => self.shader_resources.remove(&(stage, slot)),
            };
        }
        Ok(())
    }

    /// Unbind every shader resource and every render target.
    pub fn clear(&mut self, arena: &ResourceArena, w: &mut AerogpuCmdWriter) -> Result<(), UmdError> {
        let empty = RenderTargetSet::default();
        append_group(w, "clear_state", |w| {
            for &(stage, slot) in self.shader_resources.keys() {
                w.set_texture(stage, slot, 0)?;
            }
            empty.encode(arena, w)?;
            Ok(())
        })?;
        self.shader_resources.clear();
        self.render_targets = empty;
        Ok(())
    }

    /// Drop every binding of `resource` itself (not its aliases), ahead of its destruction.
    pub fn unbind_resource(
        &mut self,
        arena: &ResourceArena,
        w: &mut AerogpuCmdWriter,
        resource: ResourceId,
    ) -> Result<(), UmdError> {
        let mut new_set = self.render_targets.clone();
        new_set.clear_where(|rt| rt == resource);
        let rts_changed = new_set != self.render_targets;
        let srv_slots: Vec<(AerogpuShaderStage, u32)> = self
            .shader_resources
            .iter()
            .filter(|(_, &res)| res == resource)
            .map(|(&key, _)| key)
            .collect();

        if !rts_changed && srv_slots.is_empty() {
            return Ok(());
        }

        append_group(w, "unbind_resource", |w| {
            if rts_changed {
                new_set.encode(arena, w)?;
            }
            for &(stage, slot) in &srv_slots {
                w.set_texture(stage, slot, 0)?;
            }
            Ok(())
        })?;

        self.render_targets = new_set;
        for key in &srv_slots {
            self.shader_resources.remove(key);
        }
        Ok(())
    }

    /// Re-encode bindings that reference any of `rotated`, so the device sees their new handles.
    ///
    /// Rotation can make a bound shader resource alias a bound render target. Such slots are
    /// unbound ahead of the render-target packet instead of being re-encoded.
    pub fn reemit_rotated(
        &mut self,
        arena: &ResourceArena,
        w: &mut AerogpuCmdWriter,
        rotated: &[ResourceId],
    ) -> Result<(), UmdError> {
        let rts_touched = rotated.iter().any(|&r| self.render_targets.contains(r));
        let hazards: Vec<(AerogpuShaderStage, u32)> = self
            .shader_resources
            .iter()
            .filter(|(_, &srv)| self.render_targets.resources().any(|rt| arena.aliases(rt, srv)))
            .map(|(&key, _)| key)
            .collect();

        append_group(w, "rotate_resource_identities", |w| {
            for &(stage, slot) in &hazards {
                w.set_texture(stage, slot, 0)?;
            }
            if rts_touched {
                self.render_targets.encode(arena, w)?;
            }
            for (stage, slot, res) in self.shader_resources() {
                if rotated.contains(&res) && !hazards.contains(&(stage, slot)) {
                    w.set_texture(stage, slot, arena.handle(res))?;
                }
            }
            Ok(())
        })?;

        for key in &hazards {
            debug!(stage = ?key.0, slot = key.1, "unbound shader resource aliasing a rotated render target");
            self.shader_resources.remove(key);
        }
        Ok(())
    }
}
