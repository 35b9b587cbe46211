//! Render graph execution.
//!
//! Walks the compiled schedule once. For every surviving pass the executor
//!
//! 1. moves the event scope stack from the previous pass to this one,
//! 2. binds physical resources for transients first used here,
//! 3. records and flushes the barriers the pass needs,
//! 4. opens the render pass (unless the pass opts out),
//! 5. runs the record closure with the pass's [`PassResources`],
//! 6. returns transients last used here to the pool,
//! 7. optionally begins split transitions towards the next use.
//!
//! After the last pass exported resources are moved to their final states,
//! export receivers are filled and the command context is submitted.

use crate::allocator::{PhysicalId, TransientAllocator};
use crate::backend::{
    CommandContext, CommandQueue, GpuResourceHandle, RenderPassColorAttachment,
    RenderPassDepthAttachment, RenderPassInfo, SyncPoint, ViewDescriptor, ViewHandle, ViewKind,
};
use crate::barrier::{BarrierBatch, BarrierPlanner, BarrierStats};
use crate::compiler::{CompiledGraph, CompiledPass};
use crate::config::{ErrorPolicy, RenderGraphConfig};
use crate::error::RenderGraphError;
use crate::graph::{
    BoundResource, EventId, EventStack, ExportedResource, Pass, PassHandle, PassResources,
    RenderGraph, ResourceHandle, VirtualResource, event_transition,
};
use crate::types::ResourceState;
use crate::{profile_plot, profile_scope};

/// Summary of one [`RenderGraph::execute`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Fence signaled when the submitted work completes.
    pub sync_point: SyncPoint,
    /// Passes that ran, in execution order.
    pub executed_passes: Vec<PassHandle>,
    /// Passes skipped under [`ErrorPolicy::BestEffort`].
    pub skipped_passes: Vec<PassHandle>,
    /// Passes removed at compile time.
    pub culled_passes: Vec<PassHandle>,
    /// Barriers emitted.
    pub barriers: BarrierStats,
    /// Physical resources bound to transients.
    pub physicals_acquired: usize,
    /// Physical resources created for this execution.
    pub physicals_created: usize,
    /// Errors tolerated under [`ErrorPolicy::BestEffort`].
    pub errors: Vec<RenderGraphError>,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    handle: GpuResourceHandle,
    physical: Option<PhysicalId>,
}

struct Executor<'a> {
    allocator: &'a TransientAllocator,
    config: RenderGraphConfig,
    planner: BarrierPlanner,
    batch: BarrierBatch,
    bindings: Vec<Option<Binding>>,
    failed: Vec<bool>,
    open_events: Vec<EventId>,
    executed: Vec<PassHandle>,
    skipped: Vec<PassHandle>,
    errors: Vec<RenderGraphError>,
    acquired: usize,
    created: usize,
}

pub(crate) fn execute(
    graph: &mut RenderGraph,
    compiled: &CompiledGraph,
    allocator: &TransientAllocator,
    queue: &dyn CommandQueue,
    context: &mut dyn CommandContext,
) -> Result<ExecutionReport, RenderGraphError> {
    profile_scope!("RenderGraph::execute");

    allocator.begin_build();
    let mut executor = Executor::new(allocator, graph.config.clone(), graph.resources.len());
    if let Err(error) = executor.run(graph, compiled, context) {
        log::error!("Render graph execution aborted: {error}");
        executor.abort(&graph.resources, context);
        return Err(error);
    }

    let sync_point = queue.execute(context);
    profile_plot!("transient_physicals", allocator.stats().physical_resources);

    log::debug!(
        "Executed {} passes ({} skipped, {} culled), {} barriers",
        executor.executed.len(),
        executor.skipped.len(),
        compiled.passes().len() - compiled.pass_count(),
        executor.planner.stats().total()
    );

    Ok(ExecutionReport {
        sync_point,
        executed_passes: executor.executed,
        skipped_passes: executor.skipped,
        culled_passes: compiled.culled_passes(),
        barriers: executor.planner.stats(),
        physicals_acquired: executor.acquired,
        physicals_created: executor.created,
        errors: executor.errors,
    })
}

impl<'a> Executor<'a> {
    fn new(allocator: &'a TransientAllocator, config: RenderGraphConfig, resource_count: usize) -> Self {
        Self {
            allocator,
            config,
            planner: BarrierPlanner::new(resource_count),
            batch: BarrierBatch::new(),
            bindings: vec![None; resource_count],
            failed: vec![false; resource_count],
            open_events: Vec::new(),
            executed: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            acquired: 0,
            created: 0,
        }
    }

    fn run(
        &mut self,
        graph: &mut RenderGraph,
        compiled: &CompiledGraph,
        context: &mut dyn CommandContext,
    ) -> Result<(), RenderGraphError> {
        let RenderGraph {
            passes,
            resources,
            events,
            ..
        } = graph;

        for resource in resources.iter() {
            if let Some(imported) = &resource.imported {
                self.bindings[resource.handle.index()] = Some(Binding {
                    handle: imported.handle,
                    physical: None,
                });
                self.planner.track(resource.handle, imported.initial_state);
            }
        }

        let mut positions = vec![None; passes.len()];
        for (position, pass) in compiled.schedule().iter().enumerate() {
            positions[pass.index()] = Some(position);
        }

        for (position, &handle) in compiled.schedule().iter().enumerate() {
            let Some(compiled_pass) = compiled.pass(handle) else {
                continue;
            };
            let pass = &mut passes[handle.index()];
            self.sync_events(&pass.events, events, context);
            self.execute_pass(pass, compiled_pass, resources, context)?;
            if self.config.split_barriers {
                self.begin_splits(compiled_pass, &positions, position, context);
            }
        }

        self.finish(resources, context);
        Ok(())
    }

    /// Close and open debug events so exactly `target` is open.
    fn sync_events(&mut self, target: &[EventId], events: &EventStack, context: &mut dyn CommandContext) {
        let (close, open) = event_transition(&self.open_events, target);
        for _ in 0..close {
            context.end_event();
        }
        for id in open {
            let name = events.get(*id).map_or("<unknown>", |event| event.name());
            context.begin_event(name);
        }
        self.open_events = target.to_vec();
    }

    fn fail(&mut self, error: RenderGraphError) -> Result<(), RenderGraphError> {
        match self.config.error_policy {
            ErrorPolicy::Abort => Err(error),
            ErrorPolicy::BestEffort => {
                log::warn!("{error}; continuing");
                self.errors.push(error);
                Ok(())
            }
        }
    }

    fn flush(&mut self, context: &mut dyn CommandContext) {
        if self.batch.is_empty() {
            return;
        }
        let bindings = &self.bindings;
        self.batch.record(context, |resource| {
            bindings
                .get(resource.index())
                .copied()
                .flatten()
                .map_or(GpuResourceHandle::NULL, |binding| binding.handle)
        });
        context.flush_barriers();
        self.batch.clear();
    }

    fn execute_pass(
        &mut self,
        pass: &mut Pass,
        compiled: &CompiledPass,
        resources: &mut [VirtualResource],
        context: &mut dyn CommandContext,
    ) -> Result<(), RenderGraphError> {
        profile_scope!("execute_pass");

        for &resource in compiled.acquires() {
            let state = compiled
                .access(resource)
                .map_or(ResourceState::COMMON, |access| access.planned);
            self.acquire(resource, state, &resources[resource.index()])?;
        }

        if compiled
            .accesses()
            .iter()
            .any(|access| self.failed[access.resource.index()])
        {
            log::warn!(
                "Skipping pass '{}': a resource it uses could not be allocated",
                pass.name
            );
            self.skipped.push(pass.handle);
            self.release(compiled);
            return Ok(());
        }

        for access in compiled.accesses() {
            self.planner
                .require(access.resource, access.planned, &mut self.batch);
        }
        self.flush(context);

        let (render_pass, bound) = match self.prepare(pass, compiled, resources) {
            Ok(prepared) => prepared,
            Err(error) => {
                self.fail(error)?;
                self.skipped.push(pass.handle);
                self.release(compiled);
                return Ok(());
            }
        };

        let opens_render_pass = pass.flags.opens_render_pass() && render_pass.is_some();
        if opens_render_pass && let Some(info) = &render_pass {
            context.begin_render_pass(info);
        }

        let record = pass.record.take();
        let pass_resources = PassResources::new(
            &pass.name,
            bound,
            render_pass.as_ref(),
            self.config.validate_access,
        );
        if let Some(record) = record {
            record(context, &pass_resources);
        }
        if opens_render_pass {
            context.end_render_pass();
        }
        let violations = pass_resources.take_violations();
        self.executed.push(pass.handle);

        for violation in violations {
            let resource = resources
                .get(violation.index())
                .filter(|r| r.handle == violation)
                .map_or_else(|| violation.to_string(), |r| r.name.clone());
            log::error!(
                "Pass '{}' accessed '{}' without declaring it",
                pass.name,
                resource
            );
            self.fail(RenderGraphError::UndeclaredAccess {
                pass: pass.name.clone(),
                resource,
            })?;
        }

        self.release(compiled);
        Ok(())
    }

    fn acquire(
        &mut self,
        handle: ResourceHandle,
        state: ResourceState,
        resource: &VirtualResource,
    ) -> Result<(), RenderGraphError> {
        match self.allocator.acquire(&resource.name, &resource.descriptor, state) {
            Ok(acquisition) => {
                log::trace!(
                    "Bound '{}' to {} ({})",
                    resource.name,
                    acquisition.id,
                    acquisition.handle
                );
                self.bindings[handle.index()] = Some(Binding {
                    handle: acquisition.handle,
                    physical: Some(acquisition.id),
                });
                self.planner.track(handle, acquisition.state);
                if acquisition.aliased {
                    self.planner.aliasing(handle, &mut self.batch);
                }
                self.acquired += 1;
                if acquisition.created {
                    self.created += 1;
                }
                Ok(())
            }
            Err(source) => {
                log::error!(
                    "Failed to allocate '{}' ({}): {}",
                    resource.name,
                    resource.descriptor.summary(),
                    source
                );
                self.failed[handle.index()] = true;
                self.fail(RenderGraphError::AllocationFailed {
                    resource: resource.name.clone(),
                    descriptor: resource.descriptor.summary(),
                    source,
                })
            }
        }
    }

    /// Return transients whose last access is `compiled` to the pool.
    fn release(&mut self, compiled: &CompiledPass) {
        for &resource in compiled.releases() {
            let Some(binding) = self.bindings[resource.index()].as_mut() else {
                continue;
            };
            if let Some(id) = binding.physical.take() {
                let state = self.planner.state(resource).unwrap_or_default();
                self.allocator.release(id, state);
            }
        }
    }

    fn view(
        &self,
        resources: &mut [VirtualResource],
        handle: ResourceHandle,
        descriptor: ViewDescriptor,
    ) -> Result<ViewHandle, RenderGraphError> {
        let resource = &mut resources[handle.index()];
        let binding = self.bindings[handle.index()];
        let result = match (&mut resource.imported, binding.and_then(|b| b.physical)) {
            (Some(imported), _) => {
                let cached = imported
                    .views
                    .iter()
                    .find(|(desc, _)| *desc == descriptor)
                    .map(|(_, view)| *view);
                match cached {
                    Some(view) => Ok(view),
                    None => {
                        let created = self
                            .allocator
                            .device()
                            .create_view(imported.handle, &descriptor);
                        if let Ok(view) = created {
                            imported.views.push((descriptor, view));
                        }
                        created
                    }
                }
            }
            (None, Some(id)) => self.allocator.view(id, &descriptor),
            (None, None) => Err(crate::backend::BackendError::InvalidParameter(format!(
                "'{}' has no physical binding",
                resource.name
            ))),
        };
        result.map_err(|source| RenderGraphError::AllocationFailed {
            resource: resource.name.clone(),
            descriptor: format!("{:?} view of {}", descriptor.kind, resource.descriptor.summary()),
            source,
        })
    }

    /// Resolve views and the render pass of a pass about to run.
    fn prepare(
        &self,
        pass: &Pass,
        compiled: &CompiledPass,
        resources: &mut [VirtualResource],
    ) -> Result<(Option<RenderPassInfo>, Vec<BoundResource>), RenderGraphError> {
        let mut bound = Vec::with_capacity(compiled.accesses().len());
        for access in compiled.accesses() {
            let handle = access.resource;
            let Some(binding) = self.bindings[handle.index()] else {
                continue;
            };
            let descriptor = resources[handle.index()].descriptor;
            let state = self.planner.state(handle).unwrap_or(access.planned);

            let shader_resource_view =
                if state.needs_shader_resource_view() && descriptor.supports_shader_resource() {
                    Some(self.view(resources, handle, ViewDescriptor::new(ViewKind::ShaderResource))?)
                } else {
                    None
                };
            let unordered_access_view = if state.contains(ResourceState::UNORDERED_ACCESS) {
                Some(self.view(resources, handle, ViewDescriptor::new(ViewKind::UnorderedAccess))?)
            } else {
                None
            };

            bound.push(BoundResource {
                resource: handle,
                handle: binding.handle,
                descriptor,
                state,
                shader_resource_view,
                unordered_access_view,
            });
        }

        let render_pass = self.render_pass_info(pass, resources)?;
        Ok((render_pass, bound))
    }

    fn render_pass_info(
        &self,
        pass: &Pass,
        resources: &mut [VirtualResource],
    ) -> Result<Option<RenderPassInfo>, RenderGraphError> {
        if pass.render_targets.is_empty() && pass.depth_stencil.is_none() {
            return Ok(None);
        }

        let physical = |handle: ResourceHandle| {
            self.bindings[handle.index()].map_or(GpuResourceHandle::NULL, |b| b.handle)
        };

        let mut info = RenderPassInfo::default();
        let mut extent = None;

        for binding in &pass.render_targets {
            let handle = binding.texture.handle();
            let view = self.view(
                resources,
                handle,
                ViewDescriptor::subresource(
                    ViewKind::RenderTarget,
                    binding.mip_level,
                    binding.array_slice,
                ),
            )?;
            if extent.is_none()
                && let Some(desc) = resources[handle.index()].descriptor.as_texture()
            {
                extent = Some((
                    (desc.size.width >> binding.mip_level).max(1),
                    (desc.size.height >> binding.mip_level).max(1),
                ));
            }
            info.color_attachments.push(RenderPassColorAttachment {
                resource: physical(handle),
                view,
                load_op: binding.load_op,
                store_op: binding.store_op,
            });
        }

        if let Some(binding) = &pass.depth_stencil {
            let handle = binding.texture.handle();
            let view = self.view(
                resources,
                handle,
                ViewDescriptor::new(ViewKind::DepthStencil {
                    read_only: binding.read_only,
                }),
            )?;
            if extent.is_none()
                && let Some(desc) = resources[handle.index()].descriptor.as_texture()
            {
                extent = Some((desc.size.width, desc.size.height));
            }
            info.depth_stencil = Some(RenderPassDepthAttachment {
                resource: physical(handle),
                view,
                depth_load_op: binding.depth_load_op,
                depth_store_op: binding.depth_store_op,
                stencil_load_op: binding.stencil_load_op,
                stencil_store_op: binding.stencil_store_op,
                read_only: binding.read_only,
            });
        }

        if let Some((width, height)) = extent {
            info.width = width;
            info.height = height;
        }
        Ok(Some(info))
    }

    /// Begin transitions for resources idle for at least one pass.
    fn begin_splits(
        &mut self,
        compiled: &CompiledPass,
        positions: &[Option<usize>],
        position: usize,
        context: &mut dyn CommandContext,
    ) {
        for access in compiled.accesses() {
            let Some((next, next_state)) = access.next_use else {
                continue;
            };
            let Some(next_position) = positions.get(next.index()).copied().flatten() else {
                continue;
            };
            if next_position > position + 1 && !self.failed[access.resource.index()] {
                self.planner
                    .begin_split(access.resource, next_state, &mut self.batch);
            }
        }
        self.flush(context);
    }

    /// Final transitions, export receivers and final state bookkeeping.
    fn finish(&mut self, resources: &mut [VirtualResource], context: &mut dyn CommandContext) {
        for resource in resources.iter() {
            let Some(request) = &resource.export else {
                continue;
            };
            if self.failed[resource.handle.index()] {
                continue;
            }
            if self.bindings[resource.handle.index()].is_none() {
                log::warn!("Exported resource '{}' was never bound", resource.name);
                continue;
            }
            self.planner
                .finalize(resource.handle, request.final_state, &mut self.batch);
        }
        self.flush(context);
        self.sync_events(&[], &EventStack::default(), context);

        for index in 0..resources.len() {
            let handle = resources[index].handle;
            let Some(request) = resources[index].export.clone() else {
                continue;
            };
            let Some(binding) = self.bindings[index] else {
                continue;
            };
            if self.failed[index] {
                continue;
            }

            let descriptor = resources[index].descriptor;
            let shader_resource_view = if descriptor.supports_shader_resource() {
                self.export_view(resources, handle, ViewKind::ShaderResource)
            } else {
                None
            };
            let unordered_access_view = if descriptor.supports_unordered_access() {
                self.export_view(resources, handle, ViewKind::UnorderedAccess)
            } else {
                None
            };

            if let Some(id) = binding.physical {
                self.allocator.retain(id, request.final_state);
                if let Some(entry) = self.bindings[index].as_mut() {
                    entry.physical = None;
                }
            }

            request.receiver.fill(ExportedResource {
                name: resources[index].name.clone(),
                handle: binding.handle,
                descriptor,
                state: request.final_state,
                shader_resource_view,
                unordered_access_view,
                physical: binding.physical,
            });
        }

        for resource in resources.iter_mut() {
            resource.final_state = self.planner.state(resource.handle);
        }
    }

    fn export_view(
        &self,
        resources: &mut [VirtualResource],
        handle: ResourceHandle,
        kind: ViewKind,
    ) -> Option<ViewHandle> {
        match self.view(resources, handle, ViewDescriptor::new(kind)) {
            Ok(view) => Some(view),
            Err(error) => {
                log::warn!("Export view creation failed: {error}");
                None
            }
        }
    }

    /// Give every bound transient back to the pool and close open events.
    fn abort(&mut self, resources: &[VirtualResource], context: &mut dyn CommandContext) {
        for resource in resources {
            let index = resource.handle.index();
            let Some(binding) = self.bindings[index].as_mut() else {
                continue;
            };
            if let Some(id) = binding.physical.take() {
                let state = self.planner.state(resource.handle).unwrap_or_default();
                self.allocator.release(id, state);
            }
        }
        for _ in 0..self.open_events.len() {
            context.end_event();
        }
        self.open_events.clear();
    }
}
