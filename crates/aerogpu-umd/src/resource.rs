//! Resource arena and views.
//!
//! A [`ResourceId`] is the object identity of a resource and never changes. The protocol-visible
//! [`ResourceIdentity`] (handle + backing allocation) lives in the arena and can be rotated.
//! Views and binding tables only store `ResourceId`s, so every encode resolves the current handle.

use std::collections::HashSet;

use aero_protocol::aerogpu::aerogpu_cmd::AerogpuHandle;
use tracing::debug;

use crate::error::UmdError;
use crate::rotate::{rotated_identities, RotationPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub handle: AerogpuHandle,
    /// 0 when the resource does not share memory with any other resource.
    pub backing_alloc_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceView {
    resource: ResourceId,
}

impl ShaderResourceView {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetView {
    resource: ResourceId,
}

impl RenderTargetView {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilView {
    resource: ResourceId,
}

impl DepthStencilView {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

/// Slots are never reused, so a destroyed id stays invalid.
#[derive(Debug)]
pub struct ResourceArena {
    slots: Vec<Option<ResourceIdentity>>,
    next_handle: AerogpuHandle,
}

impl Default for ResourceArena {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_handle: 1,
        }
    }
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a resource with a fresh protocol handle.
    pub fn create(&mut self, backing_alloc_id: u32) -> Result<ResourceId, UmdError> {
        let index = u32::try_from(self.slots.len()).map_err(|_| UmdError::invalid_arg("resource arena exhausted"))?;
        let handle = self.next_handle;
        self.next_handle = handle
            .checked_add(1)
            .ok_or_else(|| UmdError::invalid_arg("resource handles exhausted"))?;
        self.slots.push(Some(ResourceIdentity {
            handle,
            backing_alloc_id,
        }));
        Ok(ResourceId(index))
    }

    pub fn destroy(&mut self, id: ResourceId) -> Result<ResourceIdentity, UmdError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or_else(|| UmdError::invalid_arg(format!("unknown resource {id:?}")))
    }

    pub fn get(&self, id: ResourceId) -> Option<ResourceIdentity> {
        self.slots.get(id.index()).copied().flatten()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.get(id).is_some()
    }

    fn require(&self, id: ResourceId) -> Result<ResourceIdentity, UmdError> {
        self.get(id)
            .ok_or_else(|| UmdError::invalid_arg(format!("unknown resource {id:?}")))
    }

    /// Current protocol handle, or 0 for an id that no longer exists.
    pub fn handle(&self, id: ResourceId) -> AerogpuHandle {
        self.get(id).map_or(0, |identity| identity.handle)
    }

    /// Same object, the same nonzero backing allocation, or the same nonzero handle.
    ///
    /// Handles are compared because `RotationPolicy::KeepLast` leaves two objects sharing one.
    pub fn aliases(&self, a: ResourceId, b: ResourceId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => {
                (a.backing_alloc_id != 0 && a.backing_alloc_id == b.backing_alloc_id)
                    || (a.handle != 0 && a.handle == b.handle)
            }
            _ => false,
        }
    }

    pub fn create_shader_resource_view(&self, resource: ResourceId) -> Result<ShaderResourceView, UmdError> {
        self.require(resource)?;
        Ok(ShaderResourceView { resource })
    }

    pub fn create_render_target_view(&self, resource: ResourceId) -> Result<RenderTargetView, UmdError> {
        self.require(resource)?;
        Ok(RenderTargetView { resource })
    }

    pub fn create_depth_stencil_view(&self, resource: ResourceId) -> Result<DepthStencilView, UmdError> {
        self.require(resource)?;
        Ok(DepthStencilView { resource })
    }

    /// Rotate identities among `ids` and return the prior identities (for [`Self::restore`]).
    pub fn rotate_identities(
        &mut self,
        ids: &[ResourceId],
        policy: RotationPolicy,
    ) -> Result<Vec<ResourceIdentity>, UmdError> {
        if ids.len() < 2 {
            return Err(UmdError::invalid_arg(format!(
                "rotation needs at least 2 resources (got {})",
                ids.len()
            )));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(UmdError::invalid_arg(format!("resource {id:?} listed twice in rotation")));
            }
        }
        let prior = ids.iter().map(|&id| self.require(id)).collect::<Result<Vec<_>, _>>()?;

        let next = rotated_identities(&prior, policy);
        for (&id, identity) in ids.iter().zip(next) {
            self.slots[id.index()] = Some(identity);
        }
        debug!(count = ids.len(), ?policy, "rotated resource identities");
        Ok(prior)
    }

    /// Put back identities returned by [`Self::rotate_identities`].
    pub fn restore(&mut self, ids: &[ResourceId], prior: &[ResourceIdentity]) {
        for (&id, &identity) in ids.iter().zip(prior) {
            if let Some(slot) = self.slots.get_mut(id.index()) {
                *slot = Some(identity);
            }
        }
    }
}
