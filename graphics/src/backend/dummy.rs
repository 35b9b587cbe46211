//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. Resources are plain
//! counters, and every command recorded into a [`DummyCommandContext`] is
//! kept as a [`RecordedCommand`] so tests can inspect the exact barrier and
//! render pass stream the render graph produced.

use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{
    BufferDescriptor, DeviceCapabilities, ResourceDescriptor, ResourceState, TextureDescriptor,
};

use super::{
    BackendError, BarrierSplit, CommandContext, CommandQueue, Device, GpuResourceHandle,
    QueueType, RenderPassInfo, SyncPoint, ViewDescriptor, ViewHandle,
};

/// A resource created through [`DummyDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedResource {
    /// Handle returned to the caller.
    pub handle: GpuResourceHandle,
    /// Name passed at creation.
    pub name: String,
    /// Descriptor passed at creation.
    pub descriptor: ResourceDescriptor,
    /// State the resource was created in.
    pub initial_state: ResourceState,
}

/// Dummy device.
#[derive(Debug)]
pub struct DummyDevice {
    capabilities: DeviceCapabilities,
    next_handle: AtomicU64,
    next_view: AtomicU32,
    created: Mutex<Vec<CreatedResource>>,
    destroyed: Mutex<Vec<GpuResourceHandle>>,
    failing_names: Mutex<Vec<String>>,
}

impl DummyDevice {
    /// Create a device with default capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a device reporting `capabilities`.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            next_handle: AtomicU64::new(1),
            next_view: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            failing_names: Mutex::new(Vec::new()),
        }
    }

    /// Make every later creation of a resource called `name` fail.
    pub fn fail_creation_of(&self, name: impl Into<String>) {
        self.failing_names.lock().push(name.into());
    }

    /// Every resource created so far, in creation order.
    pub fn created_resources(&self) -> Vec<CreatedResource> {
        self.created.lock().clone()
    }

    /// Number of resources created so far.
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Handles destroyed so far.
    pub fn destroyed_resources(&self) -> Vec<GpuResourceHandle> {
        self.destroyed.lock().clone()
    }

    fn create(
        &self,
        name: &str,
        descriptor: ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResourceHandle, BackendError> {
        if self.failing_names.lock().iter().any(|n| n == name) {
            log::trace!("DummyDevice: injected creation failure for {name}");
            return Err(BackendError::OutOfMemory);
        }
        let handle = GpuResourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        log::trace!(
            "DummyDevice: creating {name} as {handle} ({}) in {initial_state}",
            descriptor.summary()
        );
        self.created.lock().push(CreatedResource {
            handle,
            name: name.to_string(),
            descriptor,
            initial_state,
        });
        Ok(handle)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn create_texture(
        &self,
        name: &str,
        descriptor: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResourceHandle, BackendError> {
        self.create(name, ResourceDescriptor::Texture(*descriptor), initial_state)
    }

    fn create_buffer(
        &self,
        name: &str,
        descriptor: &BufferDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResourceHandle, BackendError> {
        self.create(name, ResourceDescriptor::Buffer(*descriptor), initial_state)
    }

    fn create_view(
        &self,
        resource: GpuResourceHandle,
        descriptor: &ViewDescriptor,
    ) -> Result<ViewHandle, BackendError> {
        if resource.is_null() {
            return Err(BackendError::ViewCreationFailed(
                "cannot create a view of the null resource".into(),
            ));
        }
        let slot = self.next_view.fetch_add(1, Ordering::Relaxed);
        log::trace!("DummyDevice: view {:?} of {resource} in slot {slot}", descriptor.kind);
        Ok(ViewHandle { heap: 0, slot })
    }

    fn destroy_resource(&self, resource: GpuResourceHandle) {
        log::trace!("DummyDevice: destroying {resource}");
        self.destroyed.lock().push(resource);
    }

    fn allocate_command_context(&self, queue: QueueType) -> Box<dyn CommandContext> {
        Box::new(DummyCommandContext::new(queue))
    }
}

/// A command recorded by [`DummyCommandContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// State transition.
    Transition {
        resource: GpuResourceHandle,
        before: ResourceState,
        after: ResourceState,
        split: BarrierSplit,
    },
    /// UAV barrier.
    UavBarrier { resource: GpuResourceHandle },
    /// Aliasing barrier.
    AliasingBarrier {
        before: Option<GpuResourceHandle>,
        after: GpuResourceHandle,
    },
    /// Render pass begin.
    BeginRenderPass(RenderPassInfo),
    /// Render pass end.
    EndRenderPass,
    /// Debug event begin.
    BeginEvent(String),
    /// Debug event end.
    EndEvent,
    /// Root constant buffer binding.
    BindRootCbv { slot: u32, gpu_address: u64 },
    /// Descriptor table binding.
    BindResources { slot: u32, views: Vec<ViewHandle> },
    /// Compute dispatch.
    Dispatch { x: u32, y: u32, z: u32 },
    /// Non-indexed draw.
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    /// Indirect execution.
    ExecuteIndirect {
        arguments: GpuResourceHandle,
        offset: u64,
        max_count: u32,
    },
    /// Whole buffer copy.
    CopyBuffer {
        dst: GpuResourceHandle,
        src: GpuResourceHandle,
    },
    /// Whole texture copy.
    CopyTexture {
        dst: GpuResourceHandle,
        src: GpuResourceHandle,
    },
}

impl RecordedCommand {
    /// Returns true for any kind of barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(
            self,
            Self::Transition { .. } | Self::UavBarrier { .. } | Self::AliasingBarrier { .. }
        )
    }
}

/// Command context that records into memory.
#[derive(Debug, Default)]
pub struct DummyCommandContext {
    queue: QueueType,
    commands: Vec<RecordedCommand>,
    pending_barriers: Vec<RecordedCommand>,
}

impl DummyCommandContext {
    /// Create an empty context.
    pub fn new(queue: QueueType) -> Self {
        Self {
            queue,
            commands: Vec::new(),
            pending_barriers: Vec::new(),
        }
    }

    /// Flushed commands recorded so far.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Barriers queued but not yet flushed.
    pub fn pending_barriers(&self) -> &[RecordedCommand] {
        &self.pending_barriers
    }

    /// Flush and take every recorded command.
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        self.flush_barriers();
        std::mem::take(&mut self.commands)
    }

    fn push(&mut self, command: RecordedCommand) {
        // Any non-barrier work implicitly flushes queued barriers.
        self.flush_barriers();
        self.commands.push(command);
    }
}

impl CommandContext for DummyCommandContext {
    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn insert_resource_barrier(
        &mut self,
        resource: GpuResourceHandle,
        before: ResourceState,
        after: ResourceState,
        split: BarrierSplit,
    ) {
        log::trace!("DummyCommandContext: transition {resource} {before} -> {after} ({split:?})");
        self.pending_barriers.push(RecordedCommand::Transition {
            resource,
            before,
            after,
            split,
        });
    }

    fn insert_uav_barrier(&mut self, resource: GpuResourceHandle) {
        log::trace!("DummyCommandContext: UAV barrier {resource}");
        self.pending_barriers
            .push(RecordedCommand::UavBarrier { resource });
    }

    fn insert_aliasing_barrier(&mut self, before: Option<GpuResourceHandle>, after: GpuResourceHandle) {
        log::trace!("DummyCommandContext: aliasing barrier {before:?} -> {after}");
        self.pending_barriers
            .push(RecordedCommand::AliasingBarrier { before, after });
    }

    fn flush_barriers(&mut self) {
        self.commands.append(&mut self.pending_barriers);
    }

    fn begin_render_pass(&mut self, info: &RenderPassInfo) {
        self.push(RecordedCommand::BeginRenderPass(info.clone()));
    }

    fn end_render_pass(&mut self) {
        self.push(RecordedCommand::EndRenderPass);
    }

    fn begin_event(&mut self, name: &str) {
        self.push(RecordedCommand::BeginEvent(name.to_string()));
    }

    fn end_event(&mut self) {
        self.push(RecordedCommand::EndEvent);
    }

    fn bind_root_cbv(&mut self, slot: u32, gpu_address: u64) {
        self.push(RecordedCommand::BindRootCbv { slot, gpu_address });
    }

    fn bind_resources(&mut self, slot: u32, views: &[ViewHandle]) {
        self.push(RecordedCommand::BindResources {
            slot,
            views: views.to_vec(),
        });
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.push(RecordedCommand::Dispatch {
            x: groups_x,
            y: groups_y,
            z: groups_z,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _base_vertex: i32,
        _first_instance: u32,
    ) {
        self.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn execute_indirect(&mut self, arguments: GpuResourceHandle, offset: u64, max_count: u32) {
        self.push(RecordedCommand::ExecuteIndirect {
            arguments,
            offset,
            max_count,
        });
    }

    fn copy_buffer(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle) {
        self.push(RecordedCommand::CopyBuffer { dst, src });
    }

    fn copy_texture(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle) {
        self.push(RecordedCommand::CopyTexture { dst, src });
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Queue that keeps every submission for inspection.
#[derive(Debug, Default)]
pub struct DummyQueue {
    queue: QueueType,
    fence: AtomicU64,
    submissions: Mutex<Vec<Vec<RecordedCommand>>>,
}

impl DummyQueue {
    /// Create a queue of the given type.
    pub fn new(queue: QueueType) -> Self {
        Self {
            queue,
            fence: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every submitted command list, in submission order.
    pub fn submissions(&self) -> Vec<Vec<RecordedCommand>> {
        self.submissions.lock().clone()
    }

    /// Most recent submission, if any.
    pub fn last_submission(&self) -> Option<Vec<RecordedCommand>> {
        self.submissions.lock().last().cloned()
    }

    /// Last signaled fence value.
    pub fn completed_value(&self) -> u64 {
        self.fence.load(Ordering::Acquire)
    }
}

impl CommandQueue for DummyQueue {
    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn execute(&self, context: &mut dyn CommandContext) -> SyncPoint {
        context.flush_barriers();
        let commands = match context.as_any_mut().downcast_mut::<DummyCommandContext>() {
            Some(dummy) => dummy.take_commands(),
            None => {
                log::warn!("DummyQueue: submitted context is not a DummyCommandContext");
                Vec::new()
            }
        };
        log::trace!("DummyQueue: submitting {} commands", commands.len());
        self.submissions.lock().push(commands);
        let value = self.fence.fetch_add(1, Ordering::AcqRel) + 1;
        SyncPoint {
            queue: self.queue,
            value,
        }
    }

    fn wait(&self, sync_point: SyncPoint) {
        log::trace!("DummyQueue: waiting for fence {}", sync_point.value);
    }
}
