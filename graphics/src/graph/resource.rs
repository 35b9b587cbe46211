//! Virtual resources and their handles.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::{GpuResourceHandle, ViewDescriptor, ViewHandle};
use crate::types::{ResourceDescriptor, ResourceState};

use super::{ExportReceiver, PassHandle};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_graph_id() -> u32 {
    NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a virtual resource in a render graph.
///
/// Handles are only meaningful for the graph that created them; the graph id
/// they carry lets the graph reject handles coming from another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle {
    graph: u32,
    index: u32,
}

impl ResourceHandle {
    pub(crate) fn new(graph: u32, index: u32) -> Self {
        Self { graph, index }
    }

    /// Insertion index of the resource.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn graph_id(&self) -> u32 {
        self.graph
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

/// Typed handle to a virtual texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) ResourceHandle);

impl TextureHandle {
    /// Untyped handle.
    pub fn handle(&self) -> ResourceHandle {
        self.0
    }

    /// Insertion index of the resource.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Typed handle to a virtual buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) ResourceHandle);

impl BufferHandle {
    /// Untyped handle.
    pub fn handle(&self) -> ResourceHandle {
        self.0
    }

    /// Insertion index of the resource.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl From<TextureHandle> for ResourceHandle {
    fn from(handle: TextureHandle) -> Self {
        handle.0
    }
}

impl From<BufferHandle> for ResourceHandle {
    fn from(handle: BufferHandle) -> Self {
        handle.0
    }
}

/// Physical resource owned by the client and wrapped by the graph.
#[derive(Debug, Clone)]
pub(crate) struct ImportedPhysical {
    pub(crate) handle: GpuResourceHandle,
    pub(crate) initial_state: ResourceState,
    pub(crate) views: Vec<(ViewDescriptor, ViewHandle)>,
}

/// Export request recorded by [`RenderGraph::export`](super::RenderGraph::export).
#[derive(Debug, Clone)]
pub(crate) struct ExportRequest {
    pub(crate) final_state: ResourceState,
    pub(crate) receiver: ExportReceiver,
}

/// First and last surviving pass touching a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLifetime {
    /// Pass that first accesses the resource.
    pub first: PassHandle,
    /// Pass that last accesses the resource.
    pub last: PassHandle,
}

impl ResourceLifetime {
    /// Returns true if `pass` lies within the lifetime.
    pub fn contains(&self, pass: PassHandle) -> bool {
        self.first <= pass && pass <= self.last
    }

    /// Returns true if the two lifetimes share at least one pass.
    pub fn overlaps(&self, other: &ResourceLifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// A texture or buffer declared in a render graph.
#[derive(Debug)]
pub struct VirtualResource {
    pub(crate) handle: ResourceHandle,
    pub(crate) name: String,
    pub(crate) descriptor: ResourceDescriptor,
    pub(crate) imported: Option<ImportedPhysical>,
    pub(crate) export: Option<ExportRequest>,
    pub(crate) lifetime: Option<ResourceLifetime>,
    pub(crate) final_state: Option<ResourceState>,
}

impl VirtualResource {
    pub(crate) fn new(handle: ResourceHandle, name: String, descriptor: ResourceDescriptor) -> Self {
        Self {
            handle,
            name,
            descriptor,
            imported: None,
            export: None,
            lifetime: None,
            final_state: None,
        }
    }

    /// Handle of the resource.
    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immutable descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Returns true if the resource wraps a client-owned physical resource.
    pub fn is_imported(&self) -> bool {
        self.imported.is_some()
    }

    /// Returns true if the resource is handed back to the client after execution.
    pub fn is_exported(&self) -> bool {
        self.export.is_some()
    }

    /// Returns true if the physical comes from the transient pool.
    pub fn is_transient(&self) -> bool {
        self.imported.is_none()
    }

    /// Physical handle of an imported resource.
    pub fn imported_handle(&self) -> Option<GpuResourceHandle> {
        self.imported.as_ref().map(|imported| imported.handle)
    }

    /// State an imported resource is in when the graph starts.
    pub fn initial_state(&self) -> Option<ResourceState> {
        self.imported.as_ref().map(|imported| imported.initial_state)
    }

    /// State requested for an exported resource at the end of execution.
    pub fn export_state(&self) -> Option<ResourceState> {
        self.export.as_ref().map(|export| export.final_state)
    }

    /// Lifetime computed by the last compile, `None` if unused.
    pub fn lifetime(&self) -> Option<ResourceLifetime> {
        self.lifetime
    }

    /// First surviving pass accessing the resource.
    pub fn first_access(&self) -> Option<PassHandle> {
        self.lifetime.map(|lifetime| lifetime.first)
    }

    /// Last surviving pass accessing the resource.
    pub fn last_access(&self) -> Option<PassHandle> {
        self.lifetime.map(|lifetime| lifetime.last)
    }

    /// State the resource was left in by the last execution.
    pub fn final_state(&self) -> Option<ResourceState> {
        self.final_state
    }
}
