//! Resolved view of a pass's resources handed to its record closure.

use std::cell::RefCell;

use crate::backend::{GpuResourceHandle, RenderPassInfo, ViewHandle};
use crate::error::RenderGraphError;
use crate::types::{ResourceDescriptor, ResourceState};

use super::ResourceHandle;

/// Physical binding of one declared resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundResource {
    /// Virtual resource.
    pub resource: ResourceHandle,
    /// Physical resource bound for this pass.
    pub handle: GpuResourceHandle,
    /// Descriptor of the resource.
    pub descriptor: ResourceDescriptor,
    /// State the resource is in while the pass runs.
    pub state: ResourceState,
    /// Shader resource view, present when the pass reads it through a shader.
    pub shader_resource_view: Option<ViewHandle>,
    /// Unordered access view, present when the pass accesses it as UAV.
    pub unordered_access_view: Option<ViewHandle>,
}

/// Resources a pass declared, resolved to physical handles.
///
/// Looking up a resource the pass did not declare yields the null handle and,
/// when access validation is enabled, is reported as
/// [`RenderGraphError::UndeclaredAccess`] once the closure returns.
pub struct PassResources<'a> {
    pass_name: &'a str,
    bound: Vec<BoundResource>,
    render_pass: Option<&'a RenderPassInfo>,
    validate: bool,
    violations: RefCell<Vec<ResourceHandle>>,
}

impl<'a> PassResources<'a> {
    pub(crate) fn new(
        pass_name: &'a str,
        mut bound: Vec<BoundResource>,
        render_pass: Option<&'a RenderPassInfo>,
        validate: bool,
    ) -> Self {
        bound.sort_by_key(|b| b.resource);
        Self {
            pass_name,
            bound,
            render_pass,
            validate,
            violations: RefCell::new(Vec::new()),
        }
    }

    fn lookup(&self, resource: ResourceHandle) -> Option<&BoundResource> {
        match self.bound.binary_search_by_key(&resource, |b| b.resource) {
            Ok(index) => Some(&self.bound[index]),
            Err(_) => {
                if self.validate {
                    self.violations.borrow_mut().push(resource);
                }
                None
            }
        }
    }

    /// Name of the executing pass.
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// Physical handle of a declared resource, or [`GpuResourceHandle::NULL`].
    pub fn get(&self, resource: impl Into<ResourceHandle>) -> GpuResourceHandle {
        self.lookup(resource.into())
            .map_or(GpuResourceHandle::NULL, |b| b.handle)
    }

    /// Shader resource view of a declared resource.
    pub fn srv(&self, resource: impl Into<ResourceHandle>) -> Option<ViewHandle> {
        self.lookup(resource.into())
            .and_then(|b| b.shader_resource_view)
    }

    /// Unordered access view of a declared resource.
    pub fn uav(&self, resource: impl Into<ResourceHandle>) -> Option<ViewHandle> {
        self.lookup(resource.into())
            .and_then(|b| b.unordered_access_view)
    }

    /// State of a declared resource during this pass.
    pub fn state(&self, resource: impl Into<ResourceHandle>) -> Option<ResourceState> {
        self.lookup(resource.into()).map(|b| b.state)
    }

    /// Full binding of a declared resource, or an error naming the resource.
    pub fn try_get(
        &self,
        resource: impl Into<ResourceHandle>,
    ) -> Result<&BoundResource, RenderGraphError> {
        let resource = resource.into();
        self.bound
            .binary_search_by_key(&resource, |b| b.resource)
            .map(|index| &self.bound[index])
            .map_err(|_| RenderGraphError::UndeclaredAccess {
                pass: self.pass_name.to_string(),
                resource: resource.to_string(),
            })
    }

    /// Render pass prepared for this pass. Passes flagged
    /// [`PassFlags::SKIP_AUTO_RENDER_PASS`](super::PassFlags::SKIP_AUTO_RENDER_PASS)
    /// begin it themselves.
    pub fn render_pass(&self) -> Option<&RenderPassInfo> {
        self.render_pass
    }

    /// Every declared resource.
    pub fn iter(&self) -> impl Iterator<Item = &BoundResource> {
        self.bound.iter()
    }

    pub(crate) fn take_violations(&self) -> Vec<ResourceHandle> {
        std::mem::take(&mut *self.violations.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferDescriptor;

    fn bound(index: u32, handle: u64) -> BoundResource {
        BoundResource {
            resource: ResourceHandle::new(1, index),
            handle: GpuResourceHandle(handle),
            descriptor: BufferDescriptor::structured(4, 4).into(),
            state: ResourceState::NON_PIXEL_SHADER_RESOURCE,
            shader_resource_view: Some(ViewHandle { heap: 0, slot: index }),
            unordered_access_view: None,
        }
    }

    #[test]
    fn test_declared_lookup() {
        let resources = PassResources::new("p", vec![bound(2, 20), bound(0, 10)], None, true);
        assert_eq!(resources.get(ResourceHandle::new(1, 0)), GpuResourceHandle(10));
        assert_eq!(
            resources.srv(ResourceHandle::new(1, 2)),
            Some(ViewHandle { heap: 0, slot: 2 })
        );
        assert!(resources.uav(ResourceHandle::new(1, 2)).is_none());
        assert!(resources.take_violations().is_empty());
    }

    #[test]
    fn test_undeclared_lookup_is_recorded() {
        let resources = PassResources::new("p", vec![bound(0, 10)], None, true);
        assert!(resources.get(ResourceHandle::new(1, 5)).is_null());
        assert_eq!(resources.take_violations(), vec![ResourceHandle::new(1, 5)]);
        assert!(matches!(
            resources.try_get(ResourceHandle::new(1, 5)),
            Err(RenderGraphError::UndeclaredAccess { .. })
        ));
    }

    #[test]
    fn test_validation_disabled() {
        let resources = PassResources::new("p", Vec::new(), None, false);
        assert!(resources.get(ResourceHandle::new(1, 0)).is_null());
        assert!(resources.take_violations().is_empty());
    }
}
