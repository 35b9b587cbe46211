//! Render graph infrastructure.
//!
//! The render graph is a frame-scoped, declarative description of GPU work.
//! Passes declare which virtual resources they read and write; the graph
//! compiler culls passes nobody consumes and computes resource lifetimes, and
//! the executor binds pooled physical resources, inserts state transitions
//! and runs each pass's record closure.
//!
//! # Lifecycle
//!
//! 1. Build: [`RenderGraph::create_texture`], [`RenderGraph::import_texture`],
//!    [`RenderGraph::add_pass`], [`RenderGraph::export`].
//! 2. [`RenderGraph::compile`]: culling, validation, lifetimes.
//! 3. [`RenderGraph::execute`]: allocation, barriers, recording, submission.
//! 4. [`RenderGraph::reset`] or drop.
//!
//! # Example
//!
//! ```ignore
//! use redlilium_graphics::{PassFlags, RenderGraph, ResourceState, TextureDescriptor};
//!
//! let mut graph = RenderGraph::for_device(device.as_ref());
//! let backbuffer = graph.import_texture("backbuffer", swapchain_image, desc, ResourceState::PRESENT)?;
//! let hdr = graph.create_texture("hdr", hdr_desc)?;
//!
//! graph
//!     .add_pass("scene", PassFlags::RASTER)
//!     .render_target(hdr, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0))
//!     .bind(|ctx, _| ctx.draw(3, 1, 0, 0));
//! graph
//!     .add_pass("tonemap", PassFlags::RASTER)
//!     .read(hdr)
//!     .render_target(backbuffer, LoadOp::DontCare)
//!     .bind(|ctx, _| ctx.draw(3, 1, 0, 0));
//! let presented = graph.export(backbuffer, ResourceState::PRESENT)?;
//!
//! graph.compile()?;
//! graph.execute(&allocator, queue.as_ref(), context.as_mut())?;
//! ```

mod blackboard;
mod event;
mod export;
mod pass;
mod pass_resources;
mod resource;
mod target;

use std::panic::Location;
use std::path::Path;

pub use blackboard::Blackboard;
pub use event::{Event, EventId};
pub use export::{ExportReceiver, ExportedResource};
pub use pass::{Pass, PassBuilder, PassFlags, PassHandle, RecordFn, ResourceAccess};
pub use pass_resources::{BoundResource, PassResources};
pub use resource::{BufferHandle, ResourceHandle, ResourceLifetime, TextureHandle, VirtualResource};
pub use target::{
    DepthStencilBinding, LoadOp, MAX_RENDER_TARGETS, RenderTargetBinding, StoreOp,
};

pub(crate) use event::{EventStack, transition as event_transition};
pub(crate) use resource::{ExportRequest, ImportedPhysical};

use crate::allocator::TransientAllocator;
use crate::backend::{CommandContext, CommandQueue, Device, GpuResourceHandle};
use crate::compiler::{self, CompiledGraph};
use crate::config::RenderGraphConfig;
use crate::debug::{self, DumpFiles};
use crate::error::RenderGraphError;
use crate::executor::{self, ExecutionReport};
use crate::profile_scope;
use crate::types::{
    BufferDescriptor, DeviceCapabilities, ResourceDescriptor, ResourceState, TextureDescriptor,
};

/// The render graph describes one frame's GPU work.
///
/// Build, compile and execute must happen on one thread. Several graphs may
/// be built and executed on different threads as long as they only share a
/// [`TransientAllocator`].
pub struct RenderGraph {
    pub(crate) id: u32,
    pub(crate) config: RenderGraphConfig,
    pub(crate) capabilities: DeviceCapabilities,
    pub(crate) resources: Vec<VirtualResource>,
    pub(crate) passes: Vec<Pass>,
    pub(crate) events: EventStack,
    pub(crate) blackboard: Blackboard,
    pub(crate) compiled: Option<CompiledGraph>,
    pub(crate) executed: bool,
}

impl RenderGraph {
    /// Create an empty graph validating against default capabilities.
    pub fn new() -> Self {
        Self {
            id: resource::next_graph_id(),
            config: RenderGraphConfig::default(),
            capabilities: DeviceCapabilities::default(),
            resources: Vec::new(),
            passes: Vec::new(),
            events: EventStack::default(),
            blackboard: Blackboard::new(),
            compiled: None,
            executed: false,
        }
    }

    /// Create an empty graph validating against `device`'s capabilities.
    pub fn for_device(device: &dyn Device) -> Self {
        Self::new().with_capabilities(device.capabilities())
    }

    /// Replace the capability table.
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RenderGraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    /// Capability table used for descriptor validation.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    // ------------------------------------------------------------------
    // Resource registry
    // ------------------------------------------------------------------

    fn register(&mut self, name: String, descriptor: ResourceDescriptor) -> ResourceHandle {
        self.compiled = None;
        let handle = ResourceHandle::new(self.id, self.resources.len() as u32);
        self.resources
            .push(VirtualResource::new(handle, name, descriptor));
        handle
    }

    fn validate_descriptor(
        &self,
        name: &str,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), RenderGraphError> {
        let result = match descriptor {
            ResourceDescriptor::Texture(desc) => self.capabilities.validate_texture(desc),
            ResourceDescriptor::Buffer(desc) => self.capabilities.validate_buffer(desc),
        };
        result.map_err(|reason| RenderGraphError::InvalidDescriptor {
            resource: name.to_string(),
            reason,
        })
    }

    /// Declare a transient texture.
    pub fn create_texture(
        &mut self,
        name: impl Into<String>,
        descriptor: TextureDescriptor,
    ) -> Result<TextureHandle, RenderGraphError> {
        let name = name.into();
        let descriptor = ResourceDescriptor::Texture(descriptor);
        self.validate_descriptor(&name, &descriptor)?;
        Ok(TextureHandle(self.register(name, descriptor)))
    }

    /// Declare a transient buffer.
    pub fn create_buffer(
        &mut self,
        name: impl Into<String>,
        descriptor: BufferDescriptor,
    ) -> Result<BufferHandle, RenderGraphError> {
        let name = name.into();
        let descriptor = ResourceDescriptor::Buffer(descriptor);
        self.validate_descriptor(&name, &descriptor)?;
        Ok(BufferHandle(self.register(name, descriptor)))
    }

    fn import(
        &mut self,
        name: String,
        physical: GpuResourceHandle,
        descriptor: ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<ResourceHandle, RenderGraphError> {
        if physical.is_null() {
            return Err(RenderGraphError::InvalidHandle {
                context: format!("imported resource '{name}' has a null physical handle"),
            });
        }
        if !initial_state.is_valid_combination() {
            return Err(RenderGraphError::InvalidDescriptor {
                resource: name,
                reason: format!("initial state {initial_state} is not a legal combination"),
            });
        }
        self.validate_descriptor(&name, &descriptor)?;
        let handle = self.register(name, descriptor);
        self.resources[handle.index()].imported = Some(ImportedPhysical {
            handle: physical,
            initial_state,
            views: Vec::new(),
        });
        Ok(handle)
    }

    /// Wrap a client-owned texture currently in `initial_state`.
    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        physical: GpuResourceHandle,
        descriptor: TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<TextureHandle, RenderGraphError> {
        self.import(name.into(), physical, descriptor.into(), initial_state)
            .map(TextureHandle)
    }

    /// Wrap a client-owned buffer currently in `initial_state`.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        physical: GpuResourceHandle,
        descriptor: BufferDescriptor,
        initial_state: ResourceState,
    ) -> Result<BufferHandle, RenderGraphError> {
        self.import(name.into(), physical, descriptor.into(), initial_state)
            .map(BufferHandle)
    }

    /// Hand `resource` back to the client after execution, left in
    /// `final_state`. Returns the receiver the graph fills.
    pub fn export(
        &mut self,
        resource: impl Into<ResourceHandle>,
        final_state: ResourceState,
    ) -> Result<ExportReceiver, RenderGraphError> {
        let receiver = ExportReceiver::new();
        self.export_into(resource, &receiver, final_state)?;
        Ok(receiver)
    }

    /// Like [`RenderGraph::export`] but fills a receiver the client already holds.
    pub fn export_into(
        &mut self,
        resource: impl Into<ResourceHandle>,
        receiver: &ExportReceiver,
        final_state: ResourceState,
    ) -> Result<(), RenderGraphError> {
        let resource = resource.into();
        if !self.owns(resource) {
            return Err(RenderGraphError::InvalidHandle {
                context: format!("export of {resource}, which belongs to another graph"),
            });
        }
        let entry = &mut self.resources[resource.index()];
        if !final_state.is_valid_combination() {
            return Err(RenderGraphError::InvalidDescriptor {
                resource: entry.name.clone(),
                reason: format!("final state {final_state} is not a legal combination"),
            });
        }
        if entry.export.is_some() {
            log::warn!("Resource '{}' exported twice, keeping the last request", entry.name);
        }
        entry.export = Some(ExportRequest {
            final_state,
            receiver: receiver.clone(),
        });
        self.compiled = None;
        Ok(())
    }

    /// Returns true if `resource` was created by this graph.
    pub(crate) fn owns(&self, resource: ResourceHandle) -> bool {
        resource.graph_id() == self.id && resource.index() < self.resources.len()
    }

    /// Look up a resource.
    pub fn resource(&self, resource: impl Into<ResourceHandle>) -> Option<&VirtualResource> {
        let resource = resource.into();
        if self.owns(resource) {
            self.resources.get(resource.index())
        } else {
            None
        }
    }

    /// Iterate every declared resource in creation order.
    pub fn resources(&self) -> impl Iterator<Item = &VirtualResource> {
        self.resources.iter()
    }

    /// Number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// State a resource was left in by the last execution.
    pub fn final_state(&self, resource: impl Into<ResourceHandle>) -> Option<ResourceState> {
        self.resource(resource).and_then(|r| r.final_state)
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    /// Add a pass and return its builder.
    #[track_caller]
    pub fn add_pass(&mut self, name: impl Into<String>, flags: PassFlags) -> PassBuilder<'_> {
        self.compiled = None;
        let handle = PassHandle::new(self.passes.len() as u32);
        self.passes.push(Pass::new(
            handle,
            name.into(),
            flags,
            Location::caller(),
            self.events.current_path(),
        ));
        PassBuilder::new(self, handle)
    }

    /// Make `dependent` depend on `dependency` without a shared resource.
    ///
    /// A live dependent keeps its dependency alive. The dependency must have
    /// been added first, otherwise compilation fails with
    /// [`RenderGraphError::CycleDetected`].
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        match self.passes.get_mut(dependent.index()) {
            Some(pass) => {
                if !pass.dependencies.contains(&dependency) {
                    pass.dependencies.push(dependency);
                }
                self.compiled = None;
            }
            None => log::warn!("add_dependency: unknown dependent pass {dependent}"),
        }
    }

    pub(crate) fn pass_mut_internal(&mut self, pass: PassHandle) -> &mut Pass {
        self.compiled = None;
        &mut self.passes[pass.index()]
    }

    /// Look up a pass.
    pub fn pass(&self, pass: PassHandle) -> Option<&Pass> {
        self.passes.get(pass.index())
    }

    /// All passes in insertion order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Open an event scope enclosing every pass added until the matching pop.
    #[track_caller]
    pub fn push_event(&mut self, name: impl Into<String>) -> EventId {
        self.events.push(name.into(), Location::caller())
    }

    /// Close the innermost event scope.
    pub fn pop_event(&mut self) -> Option<EventId> {
        let popped = self.events.pop();
        if popped.is_none() {
            log::warn!("pop_event called without an open event");
        }
        popped
    }

    /// Run `build` inside an event scope.
    #[track_caller]
    pub fn event_scope<R>(&mut self, name: impl Into<String>, build: impl FnOnce(&mut Self) -> R) -> R {
        self.push_event(name);
        let result = build(self);
        self.pop_event();
        result
    }

    /// Look up an event.
    pub fn event(&self, event: EventId) -> Option<&Event> {
        self.events.get(event)
    }

    // ------------------------------------------------------------------
    // Blackboard
    // ------------------------------------------------------------------

    /// Per-build side channel.
    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    /// Mutable per-build side channel.
    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    // ------------------------------------------------------------------
    // Compile / execute
    // ------------------------------------------------------------------

    /// Cull unused passes, validate declarations and compute lifetimes.
    ///
    /// Compiling an unchanged graph again yields the same result.
    pub fn compile(&mut self) -> Result<&CompiledGraph, RenderGraphError> {
        let compiled = self.compile_plan()?;
        Ok(&*self.compiled.insert(compiled))
    }

    fn compile_plan(&mut self) -> Result<CompiledGraph, RenderGraphError> {
        profile_scope!("RenderGraph::compile");

        if self.events.open_count() > 0 {
            log::warn!(
                "Compiling with {} event scope(s) still open",
                self.events.open_count()
            );
        }

        let compiled = compiler::compile(&self.passes, &self.resources)?;
        for pass in &mut self.passes {
            pass.culled = compiled.is_culled(pass.handle);
        }
        for resource in &mut self.resources {
            resource.lifetime = compiled.lifetime(resource.handle);
        }

        log::debug!(
            "Compiled render graph: {} of {} passes alive, {} resources",
            compiled.schedule().len(),
            self.passes.len(),
            self.resources.len()
        );
        Ok(compiled)
    }

    /// Result of the last successful compile.
    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Record and submit the graph, compiling first if needed.
    ///
    /// Record closures are consumed, so a graph executes once; call
    /// [`RenderGraph::reset`] before building the next frame.
    pub fn execute(
        &mut self,
        allocator: &TransientAllocator,
        queue: &dyn CommandQueue,
        context: &mut dyn CommandContext,
    ) -> Result<ExecutionReport, RenderGraphError> {
        if self.executed {
            return Err(RenderGraphError::AlreadyExecuted);
        }
        let compiled = match self.compiled.take() {
            Some(compiled) => compiled,
            None => self.compile_plan()?,
        };
        self.executed = true;
        let result = executor::execute(self, &compiled, allocator, queue, context);
        self.compiled = Some(compiled);
        result
    }

    /// Returns true once [`RenderGraph::execute`] has run.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Clear passes, resources, events and the blackboard for the next frame.
    pub fn reset(&mut self) {
        self.id = resource::next_graph_id();
        self.resources.clear();
        self.passes.clear();
        self.events.clear();
        self.blackboard.clear();
        self.compiled = None;
        self.executed = false;
    }

    // ------------------------------------------------------------------
    // Debugging
    // ------------------------------------------------------------------

    /// Write Mermaid and GraphViz HTML renderings next to `path`.
    pub fn dump_graph(&self, path: impl AsRef<Path>) -> std::io::Result<DumpFiles> {
        debug::dump_graph(self, path.as_ref())
    }

    /// Log the schedule, culled passes and lifetimes at debug level.
    pub fn log_execution_plan(&self) {
        debug::log_execution_plan(self);
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("id", &self.id)
            .field("resources", &self.resources.len())
            .field("passes", &self.passes.len())
            .field("compiled", &self.compiled.is_some())
            .field("executed", &self.executed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    fn color_desc() -> TextureDescriptor {
        TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::Rgba8Unorm,
            TextureUsage::UNORDERED_ACCESS | TextureUsage::SHADER_RESOURCE,
        )
    }

    #[test]
    fn test_render_graph_creation() {
        let graph = RenderGraph::new();
        assert!(graph.passes().is_empty());
        assert_eq!(graph.resource_count(), 0);
        assert!(graph.compiled().is_none());
    }

    #[test]
    fn test_create_texture_validates() {
        let mut graph = RenderGraph::new();
        let bad = TextureDescriptor::new_2d(0, 0, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        assert!(matches!(
            graph.create_texture("bad", bad),
            Err(RenderGraphError::InvalidDescriptor { .. })
        ));
        let good = graph.create_texture("good", color_desc()).unwrap();
        assert_eq!(graph.resource(good).map(|r| r.name()), Some("good"));
        assert!(graph.resource(good).unwrap().is_transient());
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let mut graph = RenderGraph::new();
        let a = graph.create_texture("temp", color_desc()).unwrap();
        let b = graph.create_texture("temp", color_desc()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_import_rejects_null_handle() {
        let mut graph = RenderGraph::new();
        let result = graph.import_texture(
            "backbuffer",
            GpuResourceHandle::NULL,
            color_desc(),
            ResourceState::PRESENT,
        );
        assert!(matches!(result, Err(RenderGraphError::InvalidHandle { .. })));
    }

    #[test]
    fn test_import_keeps_initial_state() {
        let mut graph = RenderGraph::new();
        let buffer = graph
            .import_buffer(
                "instances",
                GpuResourceHandle(42),
                BufferDescriptor::structured(64, 128),
                ResourceState::NON_PIXEL_SHADER_RESOURCE,
            )
            .unwrap();
        let resource = graph.resource(buffer).unwrap();
        assert!(resource.is_imported());
        assert_eq!(resource.imported_handle(), Some(GpuResourceHandle(42)));
        assert_eq!(
            resource.initial_state(),
            Some(ResourceState::NON_PIXEL_SHADER_RESOURCE)
        );
    }

    #[test]
    fn test_foreign_handle_rejected_by_export() {
        let mut first = RenderGraph::new();
        let mut second = RenderGraph::new();
        let texture = first.create_texture("a", color_desc()).unwrap();
        assert!(matches!(
            second.export(texture, ResourceState::COMMON),
            Err(RenderGraphError::InvalidHandle { .. })
        ));
        assert!(second.resource(texture).is_none());
    }

    #[test]
    fn test_builder_records_declarations() {
        let mut graph = RenderGraph::new();
        let a = graph.create_texture("a", color_desc()).unwrap();
        let args = graph
            .create_buffer(
                "args",
                BufferDescriptor::indirect_arguments(12, 1).with_usage(BufferUsage::UNORDERED_ACCESS),
            )
            .unwrap();
        let pass = graph
            .add_pass("p", PassFlags::COMPUTE)
            .read(a)
            .read_indirect_args(args)
            .finish();
        let declared: Vec<_> = graph.pass(pass).unwrap().declared_resources().collect();
        assert_eq!(declared, vec![a.handle(), args.handle()]);
        assert!(!graph.pass(pass).unwrap().has_record_fn());
    }

    #[test]
    fn test_events_attach_to_passes() {
        let mut graph = RenderGraph::new();
        let pass = graph.event_scope("Shadows", |graph| {
            graph.add_pass("cascade0", PassFlags::RASTER).finish()
        });
        let outside = graph.add_pass("post", PassFlags::COMPUTE).finish();
        let events = graph.pass(pass).unwrap().events().to_vec();
        assert_eq!(events.len(), 1);
        assert_eq!(graph.event(events[0]).map(|e| e.name()), Some("Shadows"));
        assert!(graph.pass(outside).unwrap().events().is_empty());
        assert!(graph.pop_event().is_none());
    }

    #[test]
    fn test_mutation_invalidates_compile() {
        let mut graph = RenderGraph::new();
        let a = graph.create_texture("a", color_desc()).unwrap();
        graph
            .add_pass("p", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .write(a)
            .finish();
        graph.compile().unwrap();
        assert!(graph.compiled().is_some());
        graph.add_pass("q", PassFlags::COMPUTE).read(a).finish();
        assert!(graph.compiled().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut graph = RenderGraph::new();
        let old = graph.create_texture("a", color_desc()).unwrap();
        graph.blackboard_mut().insert(5u32);
        graph.add_pass("p", PassFlags::COMPUTE).write(old).finish();
        graph.reset();
        assert_eq!(graph.resource_count(), 0);
        assert!(graph.passes().is_empty());
        assert!(graph.blackboard().is_empty());
        let new = graph.create_texture("a", color_desc()).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
    }
}
