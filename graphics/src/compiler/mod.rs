//! Render graph compilation.
//!
//! Turns the declared passes into an execution plan ([`CompiledGraph`]):
//!
//! 1. **Resolve** - every declaration becomes a concrete [`ResourceState`],
//!    merging defaults from the pass flags and render target bindings, and
//!    conflicting uses are rejected.
//! 2. **Validate** - explicit dependencies must point backwards in insertion
//!    order and exported resources need a producer.
//! 3. **Cull** - a reverse scan keeps only passes whose outputs are consumed,
//!    exported, written to imported resources, or marked
//!    [`PassFlags::NEVER_CULL`].
//! 4. **Lifetimes** - first and last surviving access per resource, plus the
//!    acquire/release points the executor uses for transient resources.
//!
//! Passes never reorder: the schedule is insertion order minus culled passes.
//! Compilation is a pure function of the declarations, so compiling an
//! unchanged graph twice gives equal results.

use crate::error::RenderGraphError;
use crate::graph::{
    MAX_RENDER_TARGETS, Pass, PassFlags, PassHandle, ResourceAccess, ResourceHandle,
    ResourceLifetime, VirtualResource,
};
use crate::profile_scope;
use crate::types::{BufferUsage, ResourceDescriptor, ResourceState, TextureUsage};

/// One resolved resource access of a compiled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAccess {
    /// Accessed resource.
    pub resource: ResourceHandle,
    /// Declared access kind.
    pub access: ResourceAccess,
    /// State the pass asked for.
    pub requested: ResourceState,
    /// State the resource is put in for this pass. Equal to `requested`
    /// unless neighbouring read-only accesses were merged into one state.
    pub planned: ResourceState,
    /// Next surviving pass touching the resource and the state it plans.
    pub next_use: Option<(PassHandle, ResourceState)>,
}

/// Per-pass compile result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPass {
    handle: PassHandle,
    culled: bool,
    accesses: Vec<ResolvedAccess>,
    acquires: Vec<ResourceHandle>,
    releases: Vec<ResourceHandle>,
}

impl CompiledPass {
    /// Handle of the pass.
    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    /// Returns true if the pass was culled.
    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// Resolved accesses, render target bindings included.
    pub fn accesses(&self) -> &[ResolvedAccess] {
        &self.accesses
    }

    /// Resolved access to `resource`, if the pass touches it.
    pub fn access(&self, resource: ResourceHandle) -> Option<&ResolvedAccess> {
        self.accesses.iter().find(|a| a.resource == resource)
    }

    /// Transient resources first used by this pass.
    pub fn acquires(&self) -> &[ResourceHandle] {
        &self.acquires
    }

    /// Transient resources last used by this pass.
    pub fn releases(&self) -> &[ResourceHandle] {
        &self.releases
    }
}

/// A compiled render graph ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    schedule: Vec<PassHandle>,
    passes: Vec<CompiledPass>,
    lifetimes: Vec<Option<ResourceLifetime>>,
}

impl CompiledGraph {
    /// Surviving passes in execution order.
    pub fn schedule(&self) -> &[PassHandle] {
        &self.schedule
    }

    /// Passes removed by culling, in insertion order.
    pub fn culled_passes(&self) -> Vec<PassHandle> {
        self.passes
            .iter()
            .filter(|p| p.culled)
            .map(|p| p.handle)
            .collect()
    }

    /// Returns true if `pass` was culled.
    pub fn is_culled(&self, pass: PassHandle) -> bool {
        self.passes.get(pass.index()).is_some_and(|p| p.culled)
    }

    /// Compile result of one pass.
    pub fn pass(&self, pass: PassHandle) -> Option<&CompiledPass> {
        self.passes.get(pass.index())
    }

    /// Compile results of every pass in insertion order.
    pub fn passes(&self) -> &[CompiledPass] {
        &self.passes
    }

    /// Lifetime of a resource over surviving passes.
    pub fn lifetime(&self, resource: ResourceHandle) -> Option<ResourceLifetime> {
        self.lifetimes.get(resource.index()).copied().flatten()
    }

    /// Planned state of a resource at its first surviving access.
    pub fn first_state(&self, resource: ResourceHandle) -> Option<ResourceState> {
        let lifetime = self.lifetime(resource)?;
        self.pass(lifetime.first)?
            .access(resource)
            .map(|access| access.planned)
    }

    /// Number of surviving passes.
    pub fn pass_count(&self) -> usize {
        self.schedule.len()
    }

    /// Returns true if every pass was culled.
    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }
}

/// Compile passes and resources into an execution plan.
///
/// # Errors
///
/// - [`RenderGraphError::InvalidHandle`] for handles from another graph or
///   unknown dependency handles.
/// - [`RenderGraphError::ConflictingPassAccess`] for illegal declarations.
/// - [`RenderGraphError::CycleDetected`] for dependencies on later passes.
/// - [`RenderGraphError::ExportWithoutProducer`] for exported transient
///   resources nobody writes.
pub(crate) fn compile(
    passes: &[Pass],
    resources: &[VirtualResource],
) -> Result<CompiledGraph, RenderGraphError> {
    profile_scope!("compile_render_graph");

    let mut resolved = passes
        .iter()
        .map(|pass| resolve_pass(pass, resources))
        .collect::<Result<Vec<_>, _>>()?;

    validate_dependencies(passes)?;
    validate_exports(&resolved, resources)?;

    let culled = cull(passes, &resolved, resources);
    let schedule: Vec<PassHandle> = passes
        .iter()
        .filter(|pass| !culled[pass.handle.index()])
        .map(|pass| pass.handle)
        .collect();

    plan_states(&schedule, &mut resolved, resources.len());
    let lifetimes = compute_lifetimes(&schedule, &resolved, resources);

    let mut compiled_passes: Vec<CompiledPass> = passes
        .iter()
        .zip(resolved)
        .map(|(pass, accesses)| CompiledPass {
            handle: pass.handle,
            culled: culled[pass.handle.index()],
            accesses,
            acquires: Vec::new(),
            releases: Vec::new(),
        })
        .collect();

    for (resource, lifetime) in resources.iter().zip(&lifetimes) {
        let Some(lifetime) = lifetime else { continue };
        if resource.is_imported() {
            continue;
        }
        compiled_passes[lifetime.first.index()]
            .acquires
            .push(resource.handle);
        if !resource.is_exported() {
            compiled_passes[lifetime.last.index()]
                .releases
                .push(resource.handle);
        }
    }

    for pass in passes.iter().filter(|p| culled[p.handle.index()]) {
        log::debug!("Culled pass '{}'", pass.name);
    }

    Ok(CompiledGraph {
        schedule,
        passes: compiled_passes,
        lifetimes,
    })
}

fn conflict(pass: &Pass, resource: &VirtualResource, reason: impl Into<String>) -> RenderGraphError {
    RenderGraphError::ConflictingPassAccess {
        pass: pass.name.clone(),
        resource: resource.name.clone(),
        reason: reason.into(),
    }
}

/// Resolve a pass's declarations and attachments into concrete accesses.
fn resolve_pass(
    pass: &Pass,
    resources: &[VirtualResource],
) -> Result<Vec<ResolvedAccess>, RenderGraphError> {
    if let Some(foreign) = pass.foreign_handles.first() {
        return Err(RenderGraphError::InvalidHandle {
            context: format!(
                "pass '{}' references {foreign}, which belongs to another graph",
                pass.name
            ),
        });
    }

    // (resource, state, access) of every attachment.
    let mut attachments: Vec<(ResourceHandle, ResourceState, ResourceAccess)> = Vec::new();

    let first_attachment = pass
        .render_targets
        .first()
        .map(|rt| rt.texture.handle())
        .or_else(|| pass.depth_stencil.as_ref().map(|ds| ds.texture.handle()));
    if let Some(first) = first_attachment {
        let resource = &resources[first.index()];
        if !pass.flags.contains(PassFlags::RASTER) {
            return Err(conflict(pass, resource, "attachments bound on a non-raster pass"));
        }
        if pass.flags.contains(PassFlags::NO_RENDER_PASS) {
            return Err(conflict(
                pass,
                resource,
                "attachments bound on a pass without a render pass",
            ));
        }
    }

    if pass.render_targets.len() > MAX_RENDER_TARGETS {
        let resource = &resources[pass.render_targets[MAX_RENDER_TARGETS].texture.index()];
        return Err(conflict(
            pass,
            resource,
            format!("more than {MAX_RENDER_TARGETS} render targets bound"),
        ));
    }

    for binding in &pass.render_targets {
        let handle = binding.texture.handle();
        let resource = &resources[handle.index()];
        let Some(desc) = resource.descriptor.as_texture() else {
            return Err(conflict(pass, resource, "buffer bound as render target"));
        };
        if !desc.usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(conflict(pass, resource, "texture lacks render target usage"));
        }
        if binding.mip_level >= desc.mip_level_count || binding.array_slice >= desc.array_layers()
        {
            return Err(conflict(
                pass,
                resource,
                format!(
                    "subresource mip {} slice {} out of range",
                    binding.mip_level, binding.array_slice
                ),
            ));
        }
        if attachments.iter().any(|(r, _, _)| *r == handle) {
            return Err(conflict(pass, resource, "bound to more than one attachment slot"));
        }
        let access = if binding.load_op.reads_contents() {
            ResourceAccess::ReadWrite
        } else {
            ResourceAccess::Write
        };
        attachments.push((handle, ResourceState::RENDER_TARGET, access));
    }

    if let Some(binding) = &pass.depth_stencil {
        let handle = binding.texture.handle();
        let resource = &resources[handle.index()];
        let Some(desc) = resource.descriptor.as_texture() else {
            return Err(conflict(pass, resource, "buffer bound as depth-stencil"));
        };
        if !desc.usage.contains(TextureUsage::DEPTH_STENCIL) {
            return Err(conflict(pass, resource, "texture lacks depth-stencil usage"));
        }
        if attachments.iter().any(|(r, _, _)| *r == handle) {
            return Err(conflict(pass, resource, "bound to more than one attachment slot"));
        }
        let (state, access) = if binding.read_only {
            (ResourceState::DEPTH_READ, ResourceAccess::Read)
        } else if binding.reads_contents() {
            (ResourceState::DEPTH_WRITE, ResourceAccess::ReadWrite)
        } else {
            (ResourceState::DEPTH_WRITE, ResourceAccess::Write)
        };
        attachments.push((handle, state, access));
    }

    let mut resolved = Vec::with_capacity(pass.declarations.len() + attachments.len());
    for decl in &pass.declarations {
        let resource = &resources[decl.resource.index()];
        let attachment = attachments.iter().find(|(r, _, _)| *r == decl.resource);

        let mut access = decl.access;
        let mut state = decl.read_state | decl.write_state;
        if decl.default_read {
            state |= pass.flags.default_read_state();
        }
        if decl.default_write {
            state |= match attachment {
                Some((_, attachment_state, _)) => *attachment_state,
                None => pass.flags.default_write_state(),
            };
        }

        if let Some((_, attachment_state, attachment_access)) = attachment {
            if decl.access.is_read() && attachment_state.is_write() {
                return Err(conflict(
                    pass,
                    resource,
                    format!("bound as {attachment_state} attachment and also read"),
                ));
            }
            state |= *attachment_state;
            access = access.merge(*attachment_access);
        }

        if state.is_empty() {
            return Err(conflict(pass, resource, "declared with the Common state"));
        }
        if !state.is_valid_combination() {
            return Err(conflict(
                pass,
                resource,
                format!("incompatible states {state}"),
            ));
        }
        if let Some(reason) = usage_conflict(&resource.descriptor, state) {
            return Err(conflict(pass, resource, reason));
        }

        resolved.push(ResolvedAccess {
            resource: decl.resource,
            access,
            requested: state,
            planned: state,
            next_use: None,
        });
    }

    for (handle, state, access) in attachments {
        if resolved.iter().any(|a| a.resource == handle) {
            continue;
        }
        resolved.push(ResolvedAccess {
            resource: handle,
            access,
            requested: state,
            planned: state,
            next_use: None,
        });
    }

    Ok(resolved)
}

/// Reason `state` cannot be used on a resource created with `descriptor`.
fn usage_conflict(descriptor: &ResourceDescriptor, state: ResourceState) -> Option<&'static str> {
    match descriptor {
        ResourceDescriptor::Texture(desc) => {
            if state.intersects(
                ResourceState::VERTEX_AND_CONSTANT_BUFFER
                    | ResourceState::INDEX_BUFFER
                    | ResourceState::INDIRECT_ARGUMENT
                    | ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
            ) {
                Some("buffer-only state requested on a texture")
            } else if state.contains(ResourceState::RENDER_TARGET)
                && !desc.usage.contains(TextureUsage::RENDER_TARGET)
            {
                Some("texture lacks render target usage")
            } else if state.intersects(ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ)
                && !desc.usage.contains(TextureUsage::DEPTH_STENCIL)
            {
                Some("texture lacks depth-stencil usage")
            } else if state.contains(ResourceState::UNORDERED_ACCESS)
                && !desc.usage.contains(TextureUsage::UNORDERED_ACCESS)
            {
                Some("texture lacks unordered access usage")
            } else if state.intersects(ResourceState::ALL_SHADER_RESOURCE)
                && !desc.usage.contains(TextureUsage::SHADER_RESOURCE)
            {
                Some("texture lacks shader resource usage")
            } else {
                None
            }
        }
        ResourceDescriptor::Buffer(desc) => {
            if state.intersects(
                ResourceState::RENDER_TARGET
                    | ResourceState::DEPTH_WRITE
                    | ResourceState::DEPTH_READ,
            ) {
                Some("attachment state requested on a buffer")
            } else if state.contains(ResourceState::UNORDERED_ACCESS)
                && !desc.usage.contains(BufferUsage::UNORDERED_ACCESS)
            {
                Some("buffer lacks unordered access usage")
            } else if state.contains(ResourceState::INDIRECT_ARGUMENT)
                && !desc.usage.contains(BufferUsage::INDIRECT_ARGUMENTS)
            {
                Some("buffer lacks indirect argument usage")
            } else if state.contains(ResourceState::RAYTRACING_ACCELERATION_STRUCTURE)
                && !desc.usage.contains(BufferUsage::ACCELERATION_STRUCTURE)
            {
                Some("buffer lacks acceleration structure usage")
            } else {
                None
            }
        }
    }
}

fn validate_dependencies(passes: &[Pass]) -> Result<(), RenderGraphError> {
    for pass in passes {
        for &dependency in &pass.dependencies {
            let Some(target) = passes.get(dependency.index()) else {
                return Err(RenderGraphError::InvalidHandle {
                    context: format!("pass '{}' depends on unknown pass {dependency}", pass.name),
                });
            };
            if dependency >= pass.handle {
                return Err(RenderGraphError::CycleDetected {
                    pass: pass.name.clone(),
                    dependency: target.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_exports(
    resolved: &[Vec<ResolvedAccess>],
    resources: &[VirtualResource],
) -> Result<(), RenderGraphError> {
    for resource in resources.iter().filter(|r| r.is_exported() && !r.is_imported()) {
        let written = resolved
            .iter()
            .flatten()
            .any(|a| a.resource == resource.handle && a.access.is_write());
        if !written {
            return Err(RenderGraphError::ExportWithoutProducer {
                resource: resource.name.clone(),
            });
        }
    }
    Ok(())
}

/// Reverse scan marking every pass nobody consumes as culled.
fn cull(passes: &[Pass], resolved: &[Vec<ResolvedAccess>], resources: &[VirtualResource]) -> Vec<bool> {
    let mut culled = vec![true; passes.len()];
    let mut needed = vec![false; resources.len()];
    let mut forced = vec![false; passes.len()];

    for pass in passes.iter().rev() {
        let index = pass.handle.index();
        let accesses = &resolved[index];

        let alive = pass.flags.contains(PassFlags::NEVER_CULL)
            || forced[index]
            || accesses.iter().any(|a| {
                let resource = &resources[a.resource.index()];
                a.access.is_write()
                    && (resource.is_imported() || resource.is_exported() || needed[a.resource.index()])
            });
        if !alive {
            continue;
        }

        culled[index] = false;
        for access in accesses {
            match access.access {
                ResourceAccess::Write => needed[access.resource.index()] = false,
                ResourceAccess::Read | ResourceAccess::ReadWrite => {
                    needed[access.resource.index()] = true
                }
            }
        }
        for dependency in &pass.dependencies {
            if let Some(flag) = forced.get_mut(dependency.index()) {
                *flag = true;
            }
        }
    }

    culled
}

/// Merge runs of consecutive read-only accesses into one planned state and
/// link every access to the next use of its resource.
fn plan_states(schedule: &[PassHandle], resolved: &mut [Vec<ResolvedAccess>], resource_count: usize) {
    // (pass index, access index) per resource in schedule order.
    let mut uses: Vec<Vec<(usize, usize)>> = vec![Vec::new(); resource_count];
    for pass in schedule {
        for (slot, access) in resolved[pass.index()].iter().enumerate() {
            uses[access.resource.index()].push((pass.index(), slot));
        }
    }

    for chain in &uses {
        let mut start = 0;
        while start < chain.len() {
            let (p, a) = chain[start];
            if !resolved[p][a].requested.is_read_only() {
                start += 1;
                continue;
            }
            let mut end = start;
            let mut merged = ResourceState::empty();
            while end < chain.len() {
                let (p, a) = chain[end];
                let requested = resolved[p][a].requested;
                if !requested.is_read_only() {
                    break;
                }
                merged |= requested;
                end += 1;
            }
            for &(p, a) in &chain[start..end] {
                resolved[p][a].planned = merged;
            }
            start = end;
        }

        for pair in chain.windows(2) {
            let (p, a) = pair[0];
            let (next_pass, next_slot) = pair[1];
            let next_state = resolved[next_pass][next_slot].planned;
            resolved[p][a].next_use = Some((PassHandle::new(next_pass as u32), next_state));
        }
    }
}

fn compute_lifetimes(
    schedule: &[PassHandle],
    resolved: &[Vec<ResolvedAccess>],
    resources: &[VirtualResource],
) -> Vec<Option<ResourceLifetime>> {
    let mut lifetimes: Vec<Option<ResourceLifetime>> = vec![None; resources.len()];
    for &pass in schedule {
        for access in &resolved[pass.index()] {
            let lifetime = lifetimes[access.resource.index()].get_or_insert(ResourceLifetime {
                first: pass,
                last: pass,
            });
            lifetime.last = pass;
        }
    }

    // Imported resources live before the graph and exported ones after it.
    if let (Some(&first), Some(&last)) = (schedule.first(), schedule.last()) {
        for (resource, lifetime) in resources.iter().zip(lifetimes.iter_mut()) {
            if let Some(lifetime) = lifetime {
                if resource.is_imported() {
                    lifetime.first = first;
                }
                if resource.is_exported() {
                    lifetime.last = last;
                }
            }
        }
    }

    lifetimes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderGraph;
    use crate::backend::GpuResourceHandle;
    use crate::graph::{DepthStencilBinding, LoadOp, StoreOp, TextureHandle};
    use crate::types::{BufferDescriptor, TextureDescriptor, TextureFormat};

    fn uav_texture(graph: &mut RenderGraph, name: &str) -> TextureHandle {
        graph
            .create_texture(
                name,
                TextureDescriptor::new_2d(
                    64,
                    64,
                    TextureFormat::Rgba16Float,
                    TextureUsage::UNORDERED_ACCESS
                        | TextureUsage::SHADER_RESOURCE
                        | TextureUsage::RENDER_TARGET,
                ),
            )
            .unwrap()
    }

    fn depth_texture(graph: &mut RenderGraph) -> TextureHandle {
        graph
            .create_texture(
                "depth",
                TextureDescriptor::new_2d(
                    64,
                    64,
                    TextureFormat::Depth32Float,
                    TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE,
                ),
            )
            .unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let mut graph = RenderGraph::new();
        let compiled = graph.compile().unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.culled_passes().is_empty());
    }

    #[test]
    fn test_unconsumed_pass_is_culled() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let b = uav_texture(&mut graph, "b");
        let out = graph
            .import_texture(
                "out",
                GpuResourceHandle(7),
                TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba16Float, TextureUsage::UNORDERED_ACCESS),
                ResourceState::COMMON,
            )
            .unwrap();
        let p0 = graph.add_pass("produce_a", PassFlags::COMPUTE).write(a).finish();
        let p1 = graph.add_pass("produce_b", PassFlags::COMPUTE).write(b).finish();
        let p2 = graph
            .add_pass("consume_a", PassFlags::COMPUTE)
            .read(a)
            .write(out)
            .finish();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.schedule(), &[p0, p2]);
        assert_eq!(compiled.culled_passes(), vec![p1]);
        assert!(graph.pass(p1).unwrap().is_culled());
        assert!(graph.resource(b).unwrap().lifetime().is_none());
    }

    #[test]
    fn test_culling_cascades_through_chains() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let b = uav_texture(&mut graph, "b");
        graph.add_pass("p0", PassFlags::COMPUTE).write(a).finish();
        graph.add_pass("p1", PassFlags::COMPUTE).read(a).write(b).finish();

        let compiled = graph.compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.culled_passes().len(), 2);
    }

    #[test]
    fn test_overwritten_value_culls_earlier_writer() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let first = graph.add_pass("first", PassFlags::COMPUTE).write(a).finish();
        let second = graph.add_pass("second", PassFlags::COMPUTE).write(a).finish();
        let reader = graph
            .add_pass("reader", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .read(a)
            .finish();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.schedule(), &[second, reader]);
        assert!(compiled.is_culled(first));
    }

    #[test]
    fn test_read_write_keeps_previous_writer() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let first = graph.add_pass("first", PassFlags::COMPUTE).write(a).finish();
        let accumulate = graph.add_pass("accumulate", PassFlags::COMPUTE).read_write(a).finish();
        let reader = graph
            .add_pass("reader", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .read(a)
            .finish();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.schedule(), &[first, accumulate, reader]);
    }

    #[test]
    fn test_dependency_keeps_pass_alive() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let upload = graph.add_pass("upload", PassFlags::COPY).finish();
        graph
            .add_pass("main", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .write(a)
            .depends_on(upload)
            .finish();

        let compiled = graph.compile().unwrap();
        assert!(!compiled.is_culled(upload));
    }

    #[test]
    fn test_forward_dependency_is_cycle() {
        let mut graph = RenderGraph::new();
        let first = graph.add_pass("first", PassFlags::COMPUTE).finish();
        let second = graph.add_pass("second", PassFlags::COMPUTE).finish();
        graph.add_dependency(first, second);

        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::CycleDetected { pass, dependency })
                if pass == "first" && dependency == "second"
        ));
    }

    #[test]
    fn test_unknown_dependency_is_invalid_handle() {
        let mut graph = RenderGraph::new();
        let first = graph.add_pass("first", PassFlags::COMPUTE).finish();
        graph.add_dependency(first, PassHandle::new(9));
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_export_without_producer() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "history");
        graph.export(a, ResourceState::ALL_SHADER_RESOURCE).unwrap();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ExportWithoutProducer { resource }) if resource == "history"
        ));
    }

    #[test]
    fn test_render_target_also_read_conflicts() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        graph
            .add_pass("feedback", PassFlags::RASTER)
            .read(a)
            .render_target(a, LoadOp::Load)
            .finish();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ConflictingPassAccess { .. })
        ));
    }

    #[test]
    fn test_render_target_on_compute_pass_conflicts() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        graph
            .add_pass("bad", PassFlags::COMPUTE)
            .render_target(a, LoadOp::DontCare)
            .finish();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ConflictingPassAccess { .. })
        ));
    }

    #[test]
    fn test_missing_usage_conflicts() {
        let mut graph = RenderGraph::new();
        let sampled = graph
            .create_texture(
                "sampled",
                TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE),
            )
            .unwrap();
        graph
            .add_pass("bad", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .write(sampled)
            .finish();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ConflictingPassAccess { reason, .. })
                if reason.contains("unordered access")
        ));
    }

    #[test]
    fn test_exclusive_state_combination_conflicts() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        graph
            .add_pass("bad", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .read(a)
            .write(a)
            .finish();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ConflictingPassAccess { .. })
        ));
    }

    #[test]
    fn test_explicit_common_state_conflicts() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        graph
            .add_pass("bad", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .read_as(a, ResourceState::COMMON)
            .finish();
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::ConflictingPassAccess { .. })
        ));
    }

    #[test]
    fn test_default_write_on_render_target_resolves_to_render_target() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let pass = graph
            .add_pass("draw", PassFlags::RASTER | PassFlags::NEVER_CULL)
            .write(a)
            .render_target(a, LoadOp::DontCare)
            .finish();
        let compiled = graph.compile().unwrap();
        let access = compiled.pass(pass).unwrap().access(a.handle()).copied().unwrap();
        assert_eq!(access.requested, ResourceState::RENDER_TARGET);
        assert_eq!(access.access, ResourceAccess::Write);
    }

    #[test]
    fn test_depth_bindings_resolve_states() {
        let mut graph = RenderGraph::new();
        let depth = depth_texture(&mut graph);
        let prepass = graph
            .add_pass("prepass", PassFlags::RASTER)
            .depth_stencil(DepthStencilBinding::new(depth, LoadOp::clear_depth(1.0), StoreOp::Store))
            .finish();
        let test = graph
            .add_pass("test", PassFlags::RASTER | PassFlags::NEVER_CULL)
            .read(depth)
            .depth_stencil(DepthStencilBinding::read_only(depth))
            .finish();

        let compiled = graph.compile().unwrap();
        let write = compiled.pass(prepass).unwrap().access(depth.handle()).copied().unwrap();
        assert_eq!(write.requested, ResourceState::DEPTH_WRITE);
        assert_eq!(write.access, ResourceAccess::Write);
        let read = compiled.pass(test).unwrap().access(depth.handle()).copied().unwrap();
        assert_eq!(
            read.requested,
            ResourceState::DEPTH_READ | ResourceState::ALL_SHADER_RESOURCE
        );
    }

    #[test]
    fn test_consecutive_reads_merge_planned_state() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let writer = graph.add_pass("writer", PassFlags::COMPUTE).write(a).finish();
        let compute = graph
            .add_pass("compute_read", PassFlags::COMPUTE | PassFlags::NEVER_CULL)
            .read(a)
            .finish();
        let pixel = graph
            .add_pass("pixel_read", PassFlags::NONE | PassFlags::NEVER_CULL)
            .read_as(a, ResourceState::PIXEL_SHADER_RESOURCE)
            .finish();

        let compiled = graph.compile().unwrap();
        let expected = ResourceState::NON_PIXEL_SHADER_RESOURCE | ResourceState::PIXEL_SHADER_RESOURCE;
        let first = compiled.pass(compute).unwrap().access(a.handle()).copied().unwrap();
        let second = compiled.pass(pixel).unwrap().access(a.handle()).copied().unwrap();
        assert_eq!(first.requested, ResourceState::NON_PIXEL_SHADER_RESOURCE);
        assert_eq!(first.planned, expected);
        assert_eq!(second.planned, expected);

        let write = compiled.pass(writer).unwrap().access(a.handle()).copied().unwrap();
        assert_eq!(write.next_use, Some((compute, expected)));
        assert_eq!(second.next_use, None);
    }

    #[test]
    fn test_lifetimes_and_release_points() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let exported = uav_texture(&mut graph, "exported");
        let p0 = graph.add_pass("p0", PassFlags::COMPUTE).write(a).finish();
        let p1 = graph
            .add_pass("p1", PassFlags::COMPUTE)
            .read(a)
            .write(exported)
            .finish();
        graph.export(exported, ResourceState::ALL_SHADER_RESOURCE).unwrap();

        let compiled = graph.compile().unwrap().clone();
        assert_eq!(
            compiled.lifetime(a.handle()),
            Some(ResourceLifetime { first: p0, last: p1 })
        );
        assert_eq!(compiled.pass(p0).unwrap().acquires(), &[a.handle()]);
        assert_eq!(compiled.pass(p1).unwrap().releases(), &[a.handle()]);
        assert_eq!(compiled.pass(p1).unwrap().acquires(), &[exported.handle()]);
        assert_eq!(compiled.first_state(a.handle()), Some(ResourceState::UNORDERED_ACCESS));
        assert_eq!(graph.resource(a).unwrap().first_access(), Some(p0));
    }

    #[test]
    fn test_imported_lifetime_spans_schedule() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        let buffer = graph
            .import_buffer(
                "readback",
                GpuResourceHandle(3),
                BufferDescriptor::new(256, BufferUsage::READBACK),
                ResourceState::COPY_DEST,
            )
            .unwrap();
        let p0 = graph.add_pass("p0", PassFlags::COMPUTE | PassFlags::NEVER_CULL).write(a).finish();
        let p1 = graph.add_pass("copy", PassFlags::COPY).read(a).write(buffer).finish();

        let compiled = graph.compile().unwrap();
        assert_eq!(
            compiled.lifetime(buffer.handle()),
            Some(ResourceLifetime { first: p0, last: p1 })
        );
        assert!(compiled.pass(p0).unwrap().acquires().iter().all(|r| *r != buffer.handle()));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let mut graph = RenderGraph::new();
        let a = uav_texture(&mut graph, "a");
        graph.add_pass("p0", PassFlags::COMPUTE).write(a).finish();
        graph.add_pass("p1", PassFlags::COMPUTE | PassFlags::NEVER_CULL).read(a).finish();
        let first = graph.compile().unwrap().clone();
        let second = graph.compile().unwrap().clone();
        assert_eq!(first, second);
    }
}
