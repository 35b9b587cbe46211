//! Receivers for resources handed back to the client after execution.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator::PhysicalId;
use crate::backend::{GpuResourceHandle, ViewHandle};
use crate::types::{ResourceDescriptor, ResourceState};

/// Physical resource committed back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedResource {
    /// Debug name of the virtual resource.
    pub name: String,
    /// Physical handle.
    pub handle: GpuResourceHandle,
    /// Resource descriptor.
    pub descriptor: ResourceDescriptor,
    /// State the resource is left in. The next user must start from it.
    pub state: ResourceState,
    /// Shader resource view, if the descriptor allows one.
    pub shader_resource_view: Option<ViewHandle>,
    /// Unordered access view, if the descriptor allows one.
    pub unordered_access_view: Option<ViewHandle>,
    /// Pool slot of a transient resource. The client returns it with
    /// [`TransientAllocator::release_exported`](crate::TransientAllocator::release_exported).
    pub physical: Option<PhysicalId>,
}

/// Shared slot the graph fills when execution completes.
///
/// Clones share the same slot, so the client keeps one clone and gives the
/// other to [`RenderGraph::export`](super::RenderGraph::export).
#[derive(Debug, Clone, Default)]
pub struct ExportReceiver {
    slot: Arc<Mutex<Option<ExportedResource>>>,
}

impl ExportReceiver {
    /// Create an empty receiver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the graph has written the resource.
    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Copy of the exported resource.
    pub fn get(&self) -> Option<ExportedResource> {
        self.slot.lock().clone()
    }

    /// Take the exported resource, leaving the receiver empty.
    pub fn take(&self) -> Option<ExportedResource> {
        self.slot.lock().take()
    }

    pub(crate) fn fill(&self, resource: ExportedResource) {
        *self.slot.lock() = Some(resource);
    }
}
