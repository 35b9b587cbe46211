//! GPU abstraction layer consumed by the render graph.
//!
//! The render graph never talks to a graphics API directly. It creates
//! physical resources through a [`Device`], records barriers, render passes
//! and client commands into a [`CommandContext`], and submits through a
//! [`CommandQueue`]. Any explicit API with resource states (D3D12, Vulkan,
//! Metal) can implement these traits.
//!
//! # Available Backends
//!
//! - `dummy` (default feature): records every command for inspection, used by
//!   tests, benchmarks and headless tooling.

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;
mod error;

use std::any::Any;
use std::fmt;

pub use error::BackendError;

use crate::graph::{LoadOp, StoreOp};
use crate::types::{BufferDescriptor, DeviceCapabilities, ResourceState, TextureDescriptor};

/// Opaque handle to a physical GPU resource owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuResourceHandle(pub u64);

impl GpuResourceHandle {
    /// Handle that refers to no resource.
    pub const NULL: Self = Self(0);

    /// Returns true if this is the null handle.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GpuResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpu#{}", self.0)
    }
}

/// Descriptor heap slot of a resource view.
///
/// Views hold no reference back to their resource; the physical resource
/// owns its views and they become stale once it returns to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    /// Descriptor heap the view lives in.
    pub heap: u32,
    /// Slot within the heap.
    pub slot: u32,
}

/// Kind of view to create for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Shader resource view.
    ShaderResource,
    /// Unordered access view.
    UnorderedAccess,
    /// Render target view.
    RenderTarget,
    /// Depth-stencil view.
    DepthStencil {
        /// Both planes are bound read-only.
        read_only: bool,
    },
}

/// Description of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDescriptor {
    /// View kind.
    pub kind: ViewKind,
    /// First mip level covered by the view.
    pub mip_level: u32,
    /// First array slice covered by the view.
    pub array_slice: u32,
}

impl ViewDescriptor {
    /// Whole-resource view of the given kind.
    pub fn new(kind: ViewKind) -> Self {
        Self {
            kind,
            mip_level: 0,
            array_slice: 0,
        }
    }

    /// View of a single mip and slice.
    pub fn subresource(kind: ViewKind, mip_level: u32, array_slice: u32) -> Self {
        Self {
            kind,
            mip_level,
            array_slice,
        }
    }
}

/// Hardware queue type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    /// Graphics queue, accepts every command.
    #[default]
    Graphics,
    /// Async compute queue.
    Compute,
    /// Copy queue.
    Copy,
}

/// Fence value signaled when a submission completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncPoint {
    /// Queue the fence belongs to.
    pub queue: QueueType,
    /// Fence value.
    pub value: u64,
}

/// Which half of a split barrier is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BarrierSplit {
    /// Regular, immediately completing barrier.
    #[default]
    None,
    /// Begin a transition that completes later.
    Begin,
    /// Complete a previously begun transition.
    End,
}

/// Color attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassColorAttachment {
    /// Physical texture.
    pub resource: GpuResourceHandle,
    /// Render target view.
    pub view: ViewHandle,
    /// Load operation.
    pub load_op: LoadOp,
    /// Store operation.
    pub store_op: StoreOp,
}

/// Depth-stencil attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDepthAttachment {
    /// Physical texture.
    pub resource: GpuResourceHandle,
    /// Depth-stencil view.
    pub view: ViewHandle,
    /// Depth plane load operation.
    pub depth_load_op: LoadOp,
    /// Depth plane store operation.
    pub depth_store_op: StoreOp,
    /// Stencil plane load operation.
    pub stencil_load_op: LoadOp,
    /// Stencil plane store operation.
    pub stencil_store_op: StoreOp,
    /// Both planes are read-only.
    pub read_only: bool,
}

/// Everything a backend needs to begin a render pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassInfo {
    /// Color attachments in slot order.
    pub color_attachments: Vec<RenderPassColorAttachment>,
    /// Optional depth-stencil attachment.
    pub depth_stencil: Option<RenderPassDepthAttachment>,
    /// Render area width.
    pub width: u32,
    /// Render area height.
    pub height: u32,
}

/// Factory for physical resources and command contexts.
pub trait Device: Send + Sync {
    /// Human readable backend name.
    fn name(&self) -> &'static str;

    /// Capability table used to validate resource descriptors.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a texture in `initial_state`.
    fn create_texture(
        &self,
        name: &str,
        descriptor: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResourceHandle, BackendError>;

    /// Create a buffer in `initial_state`.
    fn create_buffer(
        &self,
        name: &str,
        descriptor: &BufferDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResourceHandle, BackendError>;

    /// Create a view of `resource`.
    fn create_view(
        &self,
        resource: GpuResourceHandle,
        descriptor: &ViewDescriptor,
    ) -> Result<ViewHandle, BackendError>;

    /// Destroy a resource and every view created for it.
    fn destroy_resource(&self, resource: GpuResourceHandle);

    /// Allocate a command context recording for `queue`.
    fn allocate_command_context(&self, queue: QueueType) -> Box<dyn CommandContext>;
}

/// Records GPU commands.
///
/// Barriers are batched until [`CommandContext::flush_barriers`] is called.
pub trait CommandContext {
    /// Queue this context records for.
    fn queue_type(&self) -> QueueType;

    /// Queue a state transition of `resource`.
    fn insert_resource_barrier(
        &mut self,
        resource: GpuResourceHandle,
        before: ResourceState,
        after: ResourceState,
        split: BarrierSplit,
    );

    /// Queue a write-after-write barrier on an unordered access resource.
    fn insert_uav_barrier(&mut self, resource: GpuResourceHandle);

    /// Queue an aliasing barrier: memory of `before` is now used by `after`.
    fn insert_aliasing_barrier(&mut self, before: Option<GpuResourceHandle>, after: GpuResourceHandle);

    /// Submit every queued barrier to the command list.
    fn flush_barriers(&mut self);

    /// Begin a render pass.
    fn begin_render_pass(&mut self, info: &RenderPassInfo);

    /// End the current render pass.
    fn end_render_pass(&mut self);

    /// Open a named debug event region.
    fn begin_event(&mut self, name: &str);

    /// Close the innermost debug event region.
    fn end_event(&mut self);

    /// Bind a root constant buffer address.
    fn bind_root_cbv(&mut self, slot: u32, gpu_address: u64);

    /// Bind a table of views to a root slot.
    fn bind_resources(&mut self, slot: u32, views: &[ViewHandle]);

    /// Dispatch compute work.
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);

    /// Draw non-indexed primitives.
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Draw indexed primitives.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );

    /// Execute indirect commands read from `arguments`.
    fn execute_indirect(&mut self, arguments: GpuResourceHandle, offset: u64, max_count: u32);

    /// Copy a whole buffer.
    fn copy_buffer(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle);

    /// Copy a whole texture.
    fn copy_texture(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle);

    /// Access to the concrete context, used by queues to retrieve recorded work.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Submits recorded command contexts.
pub trait CommandQueue: Send + Sync {
    /// Queue type.
    fn queue_type(&self) -> QueueType;

    /// Close and submit everything recorded in `context`. The context is
    /// left empty and can record again.
    fn execute(&self, context: &mut dyn CommandContext) -> SyncPoint;

    /// Block until `sync_point` has been reached.
    fn wait(&self, sync_point: SyncPoint);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(GpuResourceHandle::NULL.is_null());
        assert!(!GpuResourceHandle(3).is_null());
        assert_eq!(GpuResourceHandle(3).to_string(), "gpu#3");
    }

    #[test]
    fn test_view_descriptor_keys() {
        let a = ViewDescriptor::new(ViewKind::RenderTarget);
        let b = ViewDescriptor::subresource(ViewKind::RenderTarget, 1, 0);
        assert_ne!(a, b);
        assert_eq!(a, ViewDescriptor::subresource(ViewKind::RenderTarget, 0, 0));
    }
}
