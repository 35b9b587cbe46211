//! Pass declarations and the fluent pass builder.

use std::fmt;
use std::panic::Location;

use bitflags::bitflags;

use crate::backend::{CommandContext, QueueType};
use crate::types::ResourceState;

use super::{
    BufferHandle, DepthStencilBinding, EventId, LoadOp, PassResources, RenderGraph,
    RenderTargetBinding, ResourceHandle, TextureHandle,
};

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it. Handles order by insertion, which is
/// also the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Insertion index of the pass.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

bitflags! {
    /// Kind and scheduling flags of a pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PassFlags: u32 {
        /// Copy work; default read/write states are copy source/dest.
        const COPY = 1 << 0;
        /// Compute work; default read/write states are SRV/UAV.
        const COMPUTE = 1 << 1;
        /// Raster work; render targets are bound in a render pass.
        const RASTER = 1 << 2;
        /// The pass is never culled.
        const NEVER_CULL = 1 << 3;
        /// The executor does not open the render pass; the record closure
        /// does it through [`PassResources::render_pass`].
        const SKIP_AUTO_RENDER_PASS = 1 << 4;
        /// Raster pass without render targets.
        const NO_RENDER_PASS = 1 << 5;
    }
}

impl PassFlags {
    /// No flags.
    pub const NONE: Self = Self::empty();

    /// Queue the work of this pass belongs to.
    pub fn queue_type(&self) -> QueueType {
        if self.contains(Self::RASTER) {
            QueueType::Graphics
        } else if self.contains(Self::COMPUTE) {
            QueueType::Compute
        } else if self.contains(Self::COPY) {
            QueueType::Copy
        } else {
            QueueType::Graphics
        }
    }

    /// Returns true if the executor opens a render pass for this pass.
    pub fn opens_render_pass(&self) -> bool {
        self.contains(Self::RASTER)
            && !self.intersects(Self::NO_RENDER_PASS | Self::SKIP_AUTO_RENDER_PASS)
    }

    pub(crate) fn default_read_state(&self) -> ResourceState {
        if self.contains(Self::RASTER) {
            ResourceState::ALL_SHADER_RESOURCE
        } else if self.contains(Self::COMPUTE) {
            ResourceState::NON_PIXEL_SHADER_RESOURCE
        } else if self.contains(Self::COPY) {
            ResourceState::COPY_SOURCE
        } else {
            ResourceState::ALL_SHADER_RESOURCE
        }
    }

    pub(crate) fn default_write_state(&self) -> ResourceState {
        if self.contains(Self::COPY) && !self.intersects(Self::RASTER | Self::COMPUTE) {
            ResourceState::COPY_DEST
        } else {
            ResourceState::UNORDERED_ACCESS
        }
    }
}

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    /// Read only.
    Read,
    /// Write, replacing previous contents.
    Write,
    /// Read-modify-write.
    ReadWrite,
}

impl ResourceAccess {
    /// Returns true if previous contents are consumed.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns true if the resource is modified.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Combine two declarations on the same resource.
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::ReadWrite
        }
    }
}

/// A resource declaration as written by the client.
///
/// States left at their default are resolved at compile time from the pass
/// flags and render target bindings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AccessDeclaration {
    pub(crate) resource: ResourceHandle,
    pub(crate) access: ResourceAccess,
    pub(crate) read_state: ResourceState,
    pub(crate) default_read: bool,
    pub(crate) write_state: ResourceState,
    pub(crate) default_write: bool,
}

impl AccessDeclaration {
    fn new(resource: ResourceHandle) -> Self {
        Self {
            resource,
            access: ResourceAccess::Read,
            read_state: ResourceState::empty(),
            default_read: false,
            write_state: ResourceState::empty(),
            default_write: false,
        }
    }

    fn add_read(&mut self, state: Option<ResourceState>) {
        match state {
            Some(state) => self.read_state |= state,
            None => self.default_read = true,
        }
    }

    fn add_write(&mut self, state: Option<ResourceState>) {
        match state {
            Some(state) => self.write_state |= state,
            None => self.default_write = true,
        }
    }
}

/// Record closure of a pass.
pub type RecordFn = Box<dyn FnOnce(&mut dyn CommandContext, &PassResources<'_>)>;

/// A unit of GPU work with declared resource accesses.
pub struct Pass {
    pub(crate) handle: PassHandle,
    pub(crate) name: String,
    pub(crate) flags: PassFlags,
    pub(crate) location: &'static Location<'static>,
    pub(crate) declarations: Vec<AccessDeclaration>,
    pub(crate) render_targets: Vec<RenderTargetBinding>,
    pub(crate) depth_stencil: Option<DepthStencilBinding>,
    pub(crate) dependencies: Vec<PassHandle>,
    pub(crate) events: Vec<EventId>,
    pub(crate) record: Option<RecordFn>,
    pub(crate) culled: bool,
    pub(crate) foreign_handles: Vec<ResourceHandle>,
}

impl Pass {
    pub(crate) fn new(
        handle: PassHandle,
        name: String,
        flags: PassFlags,
        location: &'static Location<'static>,
        events: Vec<EventId>,
    ) -> Self {
        Self {
            handle,
            name,
            flags,
            location,
            declarations: Vec::new(),
            render_targets: Vec::new(),
            depth_stencil: None,
            dependencies: Vec::new(),
            events,
            record: None,
            culled: false,
            foreign_handles: Vec::new(),
        }
    }

    /// Handle of the pass.
    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    /// Pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass flags.
    pub fn flags(&self) -> PassFlags {
        self.flags
    }

    /// Source location where the pass was added.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Bound color targets.
    pub fn render_targets(&self) -> &[RenderTargetBinding] {
        &self.render_targets
    }

    /// Bound depth-stencil target.
    pub fn depth_stencil(&self) -> Option<&DepthStencilBinding> {
        self.depth_stencil.as_ref()
    }

    /// Explicit ordering dependencies.
    pub fn dependencies(&self) -> &[PassHandle] {
        &self.dependencies
    }

    /// Event scopes enclosing the pass, outermost first.
    pub fn events(&self) -> &[EventId] {
        &self.events
    }

    /// Resources named in read/write declarations (render targets excluded).
    pub fn declared_resources(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.declarations.iter().map(|decl| decl.resource)
    }

    /// Returns true if the last compile culled this pass.
    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// Returns true if a record closure is bound and not yet consumed.
    pub fn has_record_fn(&self) -> bool {
        self.record.is_some()
    }

    fn declare(&mut self, resource: ResourceHandle, access: ResourceAccess) -> &mut AccessDeclaration {
        let index = match self
            .declarations
            .iter()
            .position(|decl| decl.resource == resource)
        {
            Some(index) => {
                let decl = &mut self.declarations[index];
                decl.access = decl.access.merge(access);
                index
            }
            None => {
                let mut decl = AccessDeclaration::new(resource);
                decl.access = access;
                self.declarations.push(decl);
                self.declarations.len() - 1
            }
        };
        &mut self.declarations[index]
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("declarations", &self.declarations.len())
            .field("render_targets", &self.render_targets.len())
            .field("culled", &self.culled)
            .finish_non_exhaustive()
    }
}

/// Fluent builder returned by [`RenderGraph::add_pass`].
///
/// The pass already exists in the graph; the builder only adds declarations
/// to it. Dropping the builder without calling [`PassBuilder::bind`] leaves a
/// pass that only takes part in scheduling and barriers.
///
/// ```ignore
/// let lit = graph.create_texture("lit", desc)?;
/// graph
///     .add_pass("lighting", PassFlags::COMPUTE)
///     .read(gbuffer)
///     .write(lit)
///     .bind(move |ctx, resources| {
///         if let Some(srv) = resources.srv(gbuffer) {
///             ctx.bind_resources(0, &[srv]);
///         }
///         ctx.dispatch(240, 135, 1);
///     });
/// ```
pub struct PassBuilder<'g> {
    graph: &'g mut RenderGraph,
    pass: PassHandle,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(graph: &'g mut RenderGraph, pass: PassHandle) -> Self {
        Self { graph, pass }
    }

    /// Handle of the pass under construction.
    pub fn handle(&self) -> PassHandle {
        self.pass
    }

    fn pass_mut(&mut self) -> &mut Pass {
        self.graph.pass_mut_internal(self.pass)
    }

    fn accept(&mut self, resource: ResourceHandle) -> bool {
        if self.graph.owns(resource) {
            true
        } else {
            self.pass_mut().foreign_handles.push(resource);
            false
        }
    }

    fn declare_read(mut self, resource: ResourceHandle, state: Option<ResourceState>) -> Self {
        if self.accept(resource) {
            self.pass_mut()
                .declare(resource, ResourceAccess::Read)
                .add_read(state);
        }
        self
    }

    fn declare_write(
        mut self,
        resource: ResourceHandle,
        access: ResourceAccess,
        state: Option<ResourceState>,
    ) -> Self {
        if self.accept(resource) {
            let decl = self.pass_mut().declare(resource, access);
            decl.add_write(state);
        }
        self
    }

    /// Read a resource in the default state for this pass kind.
    pub fn read(self, resource: impl Into<ResourceHandle>) -> Self {
        self.declare_read(resource.into(), None)
    }

    /// Read a resource in an explicit state.
    pub fn read_as(self, resource: impl Into<ResourceHandle>, state: ResourceState) -> Self {
        self.declare_read(resource.into(), Some(state))
    }

    /// Read indirect draw or dispatch arguments from a buffer.
    pub fn read_indirect_args(self, buffer: BufferHandle) -> Self {
        self.declare_read(buffer.into(), Some(ResourceState::INDIRECT_ARGUMENT))
    }

    /// Write a resource, replacing its contents, in the default state.
    pub fn write(self, resource: impl Into<ResourceHandle>) -> Self {
        self.declare_write(resource.into(), ResourceAccess::Write, None)
    }

    /// Write a resource in an explicit state.
    pub fn write_as(self, resource: impl Into<ResourceHandle>, state: ResourceState) -> Self {
        self.declare_write(resource.into(), ResourceAccess::Write, Some(state))
    }

    /// Read and modify a resource in the default write state.
    pub fn read_write(self, resource: impl Into<ResourceHandle>) -> Self {
        self.declare_write(resource.into(), ResourceAccess::ReadWrite, None)
    }

    /// Read and modify a resource in an explicit state.
    pub fn read_write_as(self, resource: impl Into<ResourceHandle>, state: ResourceState) -> Self {
        self.declare_write(resource.into(), ResourceAccess::ReadWrite, Some(state))
    }

    /// Bind mip 0 / slice 0 of `texture` as the next color target.
    pub fn render_target(self, texture: TextureHandle, load_op: LoadOp) -> Self {
        self.render_target_with(RenderTargetBinding::new(texture, load_op))
    }

    /// Bind a fully specified color target.
    pub fn render_target_with(mut self, binding: RenderTargetBinding) -> Self {
        if self.accept(binding.texture.into()) {
            self.pass_mut().render_targets.push(binding);
        }
        self
    }

    /// Bind the depth-stencil target.
    pub fn depth_stencil(mut self, binding: DepthStencilBinding) -> Self {
        if self.accept(binding.texture.into()) {
            let pass = self.pass_mut();
            if pass.depth_stencil.is_some() {
                log::warn!("Pass '{}' replaces its depth-stencil binding", pass.name);
            }
            pass.depth_stencil = Some(binding);
        }
        self
    }

    /// Run after `dependency` and keep it alive while this pass is alive.
    pub fn depends_on(self, dependency: PassHandle) -> Self {
        self.graph.add_dependency(self.pass, dependency);
        self
    }

    /// Capture the record closure and finish the pass.
    pub fn bind<F>(mut self, record: F) -> PassHandle
    where
        F: FnOnce(&mut dyn CommandContext, &PassResources<'_>) + 'static,
    {
        self.pass_mut().record = Some(Box::new(record));
        self.pass
    }

    /// Finish the pass without a record closure.
    pub fn finish(self) -> PassHandle {
        self.pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        assert_eq!(
            PassFlags::COMPUTE.default_read_state(),
            ResourceState::NON_PIXEL_SHADER_RESOURCE
        );
        assert_eq!(
            PassFlags::RASTER.default_read_state(),
            ResourceState::ALL_SHADER_RESOURCE
        );
        assert_eq!(PassFlags::COPY.default_read_state(), ResourceState::COPY_SOURCE);
        assert_eq!(PassFlags::COPY.default_write_state(), ResourceState::COPY_DEST);
        assert_eq!(
            PassFlags::COMPUTE.default_write_state(),
            ResourceState::UNORDERED_ACCESS
        );
    }

    #[test]
    fn test_render_pass_flags() {
        assert!(PassFlags::RASTER.opens_render_pass());
        assert!(!(PassFlags::RASTER | PassFlags::NO_RENDER_PASS).opens_render_pass());
        assert!(!(PassFlags::RASTER | PassFlags::SKIP_AUTO_RENDER_PASS).opens_render_pass());
        assert!(!PassFlags::COMPUTE.opens_render_pass());
        assert_eq!(PassFlags::COMPUTE.queue_type(), QueueType::Compute);
        assert_eq!(PassFlags::NONE.queue_type(), QueueType::Graphics);
    }

    #[test]
    fn test_access_merge() {
        assert_eq!(
            ResourceAccess::Read.merge(ResourceAccess::Write),
            ResourceAccess::ReadWrite
        );
        assert_eq!(ResourceAccess::Read.merge(ResourceAccess::Read), ResourceAccess::Read);
        assert!(ResourceAccess::ReadWrite.is_read());
        assert!(ResourceAccess::ReadWrite.is_write());
        assert!(!ResourceAccess::Write.is_read());
    }

    #[test]
    fn test_declarations_coalesce() {
        let mut pass = Pass::new(
            PassHandle::new(0),
            "blur".into(),
            PassFlags::COMPUTE,
            Location::caller(),
            Vec::new(),
        );
        let resource = ResourceHandle::new(1, 0);
        pass.declare(resource, ResourceAccess::Read)
            .add_read(Some(ResourceState::PIXEL_SHADER_RESOURCE));
        pass.declare(resource, ResourceAccess::Read)
            .add_read(Some(ResourceState::NON_PIXEL_SHADER_RESOURCE));
        assert_eq!(pass.declarations.len(), 1);
        assert_eq!(
            pass.declarations[0].read_state,
            ResourceState::ALL_SHADER_RESOURCE
        );
        pass.declare(resource, ResourceAccess::Write).add_write(None);
        assert_eq!(pass.declarations[0].access, ResourceAccess::ReadWrite);
        assert!(pass.declarations[0].default_write);
    }

    #[test]
    fn test_builder_records_dependencies_once() {
        let mut graph = RenderGraph::new();
        let upload = graph.add_pass("upload", PassFlags::COPY).finish();
        let skin = graph.add_pass("skin", PassFlags::COMPUTE).finish();
        let draw = graph
            .add_pass("draw", PassFlags::RASTER)
            .depends_on(upload)
            .depends_on(skin)
            .depends_on(upload)
            .finish();

        let pass = graph.pass(draw).unwrap();
        assert_eq!(pass.dependencies(), &[upload, skin]);
        assert!(graph.pass(upload).unwrap().dependencies().is_empty());
    }
}
