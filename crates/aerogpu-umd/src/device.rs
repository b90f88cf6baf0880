//! Per-device entry points.
//!
//! Every call takes the device lock for its whole duration, so packets from one call are never
//! interleaved with another's.

use std::sync::{Mutex, MutexGuard, PoisonError};

use aero_protocol::aerogpu::aerogpu_cmd::{
    AerogpuDepthStencilState, AerogpuRasterizerState, AerogpuShaderStage, AEROGPU_PRESENT_FLAG_NONE,
    AEROGPU_PRESENT_FLAG_VSYNC,
};
use aero_protocol::aerogpu::cmd_writer::{AerogpuCmdWriter, CmdWriterError};
use tracing::{debug, warn};

use crate::bindings::PipelineBindings;
use crate::config::UmdConfig;
use crate::error::UmdError;
use crate::resource::{
    DepthStencilView, RenderTargetView, ResourceArena, ResourceId, ResourceIdentity, ShaderResourceView,
};
use crate::state::{
    blend_record, convert_blend_desc, convert_depth_stencil_desc, convert_rasterizer_desc, default_blend_state,
    default_depth_stencil_state, default_rasterizer_state, select_scissor, select_viewport, BlendDesc,
    BlendStateObject, DepthStencilDesc, RasterizerDesc, ScissorRect, Viewport,
};
use crate::submit::{AllocFlags, AllocTableBuilder, FenceTracker, SubmitFlags, Submission, Submitter};

struct DeviceState<S> {
    config: UmdConfig,
    writer: AerogpuCmdWriter,
    arena: ResourceArena,
    bindings: PipelineBindings,
    allocations: AllocTableBuilder,
    fences: FenceTracker,
    submitter: S,
}

pub struct Device<S: Submitter> {
    inner: Mutex<DeviceState<S>>,
}

fn report_best_effort(what: &str, reason: Option<String>) -> Result<(), UmdError> {
    match reason {
        None => Ok(()),
        Some(reason) => {
            warn!(what, %reason, "encoded best-effort fallback");
            Err(UmdError::NotImplemented(reason))
        }
    }
}

fn warn_not_implemented<T>(what: &str, result: Result<T, UmdError>) -> Result<T, UmdError> {
    if let Err(err @ UmdError::NotImplemented(_)) = &result {
        warn!(what, %err, "unsupported state");
    }
    result
}

fn encode_default_states(w: &mut AerogpuCmdWriter) -> Result<(), CmdWriterError> {
    w.set_blend_state(&default_blend_state())?;
    w.set_depth_stencil_state(&default_depth_stencil_state())?;
    w.set_rasterizer_state(&default_rasterizer_state())?;
    let vp = Viewport::DISABLED;
    w.set_viewport(
        vp.top_left_x,
        vp.top_left_y,
        vp.width,
        vp.height,
        vp.min_depth,
        vp.max_depth,
    )?;
    w.set_scissor(0, 0, 0, 0)?;
    Ok(())
}

fn require_resource(arena: &ResourceArena, id: ResourceId) -> Result<(), UmdError> {
    if arena.contains(id) {
        Ok(())
    } else {
        Err(UmdError::invalid_arg(format!("view references destroyed resource {id:?}")))
    }
}

impl<S: Submitter> DeviceState<S> {
    /// Finalize and submit the current stream, then start a fresh one. `None` when there was
    /// nothing to submit.
    fn submit_stream(&mut self, flags: SubmitFlags) -> Result<Option<u64>, UmdError> {
        if self.writer.is_empty() {
            return Ok(None);
        }

        let fence = self.fences.next_fence();
        let alloc_table = (!self.allocations.is_empty()).then(|| self.allocations.encode());
        let cmd = self.writer.finalize();
        let cmd_bytes = cmd.len();
        let result = self.submitter.submit(&Submission {
            cmd,
            alloc_table: alloc_table.as_deref(),
            flags,
            context_id: self.config.context_id,
            engine_id: self.config.engine_id,
            signal_fence: fence,
        });
        self.writer.reset();

        match result {
            Ok(()) => {
                self.fences.mark_submitted(fence);
                debug!(fence, cmd_bytes, ?flags, "submitted");
                Ok(Some(fence))
            }
            Err(err) => {
                warn!(%err, fence, "submission failed; stream discarded");
                Err(err.into())
            }
        }
    }
}

impl<S: Submitter> Device<S> {
    pub fn new(config: UmdConfig, submitter: S) -> Result<Self, UmdError> {
        let writer = config.cmd_buffer.new_writer()?;
        Ok(Self {
            inner: Mutex::new(DeviceState {
                config,
                writer,
                arena: ResourceArena::new(),
                bindings: PipelineBindings::new(),
                allocations: AllocTableBuilder::new(),
                fences: FenceTracker::new(),
                submitter,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> UmdConfig {
        self.lock().config
    }

    /// Run `f` against the transport, under the device lock.
    pub fn with_submitter<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock().submitter)
    }

    /// Bytes of the stream being recorded, header included.
    pub fn pending_stream_len(&self) -> usize {
        self.lock().writer.len()
    }

    // Resources and views.

    pub fn create_resource(&self, backing_alloc_id: u32) -> Result<ResourceId, UmdError> {
        let id = self.lock().arena.create(backing_alloc_id)?;
        debug!(?id, backing_alloc_id, "created resource");
        Ok(id)
    }

    /// Unbinds the resource everywhere it is bound, then destroys it.
    pub fn destroy_resource(&self, id: ResourceId) -> Result<(), UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        require_resource(&st.arena, id)?;
        st.bindings.unbind_resource(&st.arena, &mut st.writer, id)?;
        st.arena.destroy(id)?;
        debug!(?id, "destroyed resource");
        Ok(())
    }

    pub fn resource_identity(&self, id: ResourceId) -> Option<ResourceIdentity> {
        self.lock().arena.get(id)
    }

    pub fn create_shader_resource_view(&self, resource: ResourceId) -> Result<ShaderResourceView, UmdError> {
        self.lock().arena.create_shader_resource_view(resource)
    }

    pub fn create_render_target_view(&self, resource: ResourceId) -> Result<RenderTargetView, UmdError> {
        self.lock().arena.create_render_target_view(resource)
    }

    pub fn create_depth_stencil_view(&self, resource: ResourceId) -> Result<DepthStencilView, UmdError> {
        self.lock().arena.create_depth_stencil_view(resource)
    }

    // Fixed-function state.

    pub fn create_blend_state(&self, desc: &BlendDesc) -> Result<BlendStateObject, UmdError> {
        warn_not_implemented("blend state", convert_blend_desc(desc))
    }

    pub fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<AerogpuRasterizerState, UmdError> {
        convert_rasterizer_desc(Some(desc))
    }

    pub fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<AerogpuDepthStencilState, UmdError> {
        convert_depth_stencil_desc(Some(desc))
    }

    /// `None` state binds the default; `None` blend factor resets the constant to (1, 1, 1, 1).
    pub fn set_blend_state(
        &self,
        state: Option<&BlendStateObject>,
        blend_factor: Option<[f32; 4]>,
        sample_mask: u32,
    ) -> Result<(), UmdError> {
        let record = blend_record(state, blend_factor, sample_mask);
        self.lock().writer.set_blend_state(&record)?;
        Ok(())
    }

    pub fn set_rasterizer_state(&self, state: Option<&AerogpuRasterizerState>) -> Result<(), UmdError> {
        let record = state.copied().unwrap_or_else(default_rasterizer_state);
        self.lock().writer.set_rasterizer_state(&record)?;
        Ok(())
    }

    pub fn set_depth_stencil_state(&self, state: Option<&AerogpuDepthStencilState>) -> Result<(), UmdError> {
        let record = state.copied().unwrap_or_else(default_depth_stencil_state);
        self.lock().writer.set_depth_stencil_state(&record)?;
        Ok(())
    }

    /// Encodes one viewport. Divergent active entries still encode the first active one and then
    /// report not-implemented.
    pub fn set_viewports(&self, viewports: &[Viewport]) -> Result<(), UmdError> {
        let choice = select_viewport(viewports);
        let vp = choice.record;
        self.lock().writer.set_viewport(
            vp.top_left_x,
            vp.top_left_y,
            vp.width,
            vp.height,
            vp.min_depth,
            vp.max_depth,
        )?;
        report_best_effort("viewports", choice.not_implemented)
    }

    pub fn set_scissor_rects(&self, rects: &[ScissorRect]) -> Result<(), UmdError> {
        let choice = select_scissor(rects);
        let r = choice.record;
        self.lock().writer.set_scissor(r.left, r.top, r.width(), r.height())?;
        report_best_effort("scissor rects", choice.not_implemented)
    }

    // Bindings.

    pub fn set_render_targets(
        &self,
        colors: &[Option<RenderTargetView>],
        depth_stencil: Option<DepthStencilView>,
    ) -> Result<(), UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let colors: Vec<Option<ResourceId>> = colors.iter().map(|v| v.map(|v| v.resource())).collect();
        let depth_stencil = depth_stencil.map(|v| v.resource());
        for &id in colors.iter().flatten().chain(depth_stencil.iter()) {
            require_resource(&st.arena, id)?;
        }
        st.bindings
            .set_render_targets(&st.arena, &mut st.writer, &colors, depth_stencil)
    }

    pub fn set_shader_resources(
        &self,
        stage: AerogpuShaderStage,
        start_slot: u32,
        views: &[Option<ShaderResourceView>],
    ) -> Result<(), UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let views: Vec<Option<ResourceId>> = views.iter().map(|v| v.map(|v| v.resource())).collect();
        for &id in views.iter().flatten() {
            require_resource(&st.arena, id)?;
        }
        st.bindings
            .set_shader_resources(&st.arena, &mut st.writer, stage, start_slot, &views)
    }

    pub fn render_target(&self, slot: usize) -> Option<ResourceId> {
        self.lock().bindings.render_targets().colors.get(slot).copied().flatten()
    }

    pub fn shader_resource(&self, stage: AerogpuShaderStage, slot: u32) -> Option<ResourceId> {
        self.lock().bindings.shader_resource(stage, slot)
    }

    /// Reset fixed-function state to defaults and unbind every render target and shader resource.
    pub fn clear_state(&self) -> Result<(), UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let mark = st.writer.mark();
        if let Err(err) = encode_default_states(&mut st.writer) {
            st.writer.rollback(mark);
            return Err(err.into());
        }
        if let Err(err) = st.bindings.clear(&st.arena, &mut st.writer) {
            st.writer.rollback(mark);
            return Err(err);
        }
        debug!("cleared device state");
        Ok(())
    }

    /// Rotate protocol identities among `resources` (see [`crate::rotate`]) and re-encode the
    /// bindings that reference them. Undone if the re-encode does not fit.
    pub fn rotate_resource_identities(&self, resources: &[ResourceId]) -> Result<(), UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let policy = st.config.rotation_policy;
        let prior = st.arena.rotate_identities(resources, policy)?;
        if let Err(err) = st.bindings.reemit_rotated(&st.arena, &mut st.writer, resources) {
            st.arena.restore(resources, &prior);
            return Err(err);
        }
        Ok(())
    }

    // Allocations.

    /// Include `alloc_id` in the allocation table of every following submission.
    pub fn register_allocation(&self, alloc_id: u32, flags: AllocFlags, gpa: u64, size_bytes: u64) -> Result<(), UmdError> {
        self.lock().allocations.add(alloc_id, flags, gpa, size_bytes)
    }

    pub fn unregister_allocation(&self, alloc_id: u32) -> bool {
        self.lock().allocations.remove(alloc_id)
    }

    // Submission and fences.

    /// Submit everything recorded so far. Returns the fence it signals, or `None` when nothing
    /// was recorded.
    pub fn flush(&self) -> Result<Option<u64>, UmdError> {
        self.lock().submit_stream(SubmitFlags::empty())
    }

    /// Append a PRESENT for the configured scanout and submit. Returns the submission's fence.
    pub fn present(&self, vsync: bool) -> Result<u64, UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let flags = if vsync {
            AEROGPU_PRESENT_FLAG_VSYNC
        } else {
            AEROGPU_PRESENT_FLAG_NONE
        };
        st.writer.present(st.config.present_scanout_id, flags)?;
        let fence = st.submit_stream(SubmitFlags::PRESENT)?;
        // The PRESENT packet makes the stream non-empty.
        Ok(fence.unwrap_or_else(|| st.fences.last_submitted()))
    }

    /// Fold in the device's latest completed fence and return "last completed".
    pub fn poll_completed_fence(&self) -> Result<u64, UmdError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        if let Some(fence) = st.submitter.poll_completed_fence()? {
            st.fences.observe_completed(fence);
        }
        Ok(st.fences.last_completed())
    }

    pub fn last_submitted_fence(&self) -> u64 {
        self.lock().fences.last_submitted()
    }

    pub fn last_completed_fence(&self) -> u64 {
        self.lock().fences.last_completed()
    }

    pub fn is_fence_complete(&self, fence: u64) -> bool {
        self.lock().fences.is_complete(fence)
    }
}
