//! Transient resource pool shared by render graphs.
//!
//! Physical resources are keyed by their full [`ResourceDescriptor`]: a
//! virtual resource can only reuse a physical resource created with an equal
//! descriptor. Free physical resources stay alive across builds and keep the
//! state they were released in, so the barrier planner can continue from it.
//!
//! The pool is internally synchronized; graphs built on different threads
//! may share one [`TransientAllocator`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BackendError, Device, GpuResourceHandle, ViewDescriptor, ViewHandle};
use crate::types::{ResourceDescriptor, ResourceState};

/// Stable index of a physical resource in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalId(u32);

impl PhysicalId {
    /// Slot index in the pool.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phys#{}", self.0)
    }
}

/// Ownership status of a pooled physical resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalStatus {
    /// Available for the next acquire with a matching descriptor.
    Free,
    /// Bound to a virtual resource of an executing graph.
    InUse,
    /// Exported to the client; not reused until released.
    Retained,
}

/// Result of [`TransientAllocator::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    /// Pool slot.
    pub id: PhysicalId,
    /// Physical handle.
    pub handle: GpuResourceHandle,
    /// State the physical resource is currently in.
    pub state: ResourceState,
    /// The memory was used by another virtual resource before.
    pub aliased: bool,
    /// The resource was created by this acquire.
    pub created: bool,
}

/// Pool counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Live physical resources.
    pub physical_resources: usize,
    /// Physical resources bound to a virtual resource.
    pub in_use: usize,
    /// Physical resources held by the client after export.
    pub retained: usize,
    /// Physical resources available for reuse.
    pub free: usize,
    /// Resources created over the pool's lifetime.
    pub created_total: u64,
    /// Acquires satisfied from the free lists.
    pub reused_total: u64,
    /// Resources destroyed by [`TransientAllocator::trim`].
    pub destroyed_total: u64,
}

#[derive(Debug)]
struct PhysicalResource {
    name: String,
    handle: GpuResourceHandle,
    descriptor: ResourceDescriptor,
    state: ResourceState,
    status: PhysicalStatus,
    views: Vec<(ViewDescriptor, ViewHandle)>,
    last_used_build: u64,
}

#[derive(Debug, Default)]
struct Pool {
    slots: Vec<Option<PhysicalResource>>,
    free: HashMap<ResourceDescriptor, VecDeque<PhysicalId>>,
    build: u64,
    created_total: u64,
    reused_total: u64,
    destroyed_total: u64,
}

impl Pool {
    fn slot_mut(&mut self, id: PhysicalId) -> Option<&mut PhysicalResource> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn push_free(&mut self, id: PhysicalId, descriptor: ResourceDescriptor) {
        self.free.entry(descriptor).or_default().push_back(id);
    }
}

/// Pool of physical transient resources.
pub struct TransientAllocator {
    device: Arc<dyn Device>,
    pool: Mutex<Pool>,
}

static_assertions::assert_impl_all!(TransientAllocator: Send, Sync);

impl TransientAllocator {
    /// Create an empty pool creating resources through `device`.
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            pool: Mutex::new(Pool::default()),
        }
    }

    /// Device the pool creates resources on.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Start a new build. Returns the build index used for idle tracking.
    pub fn begin_build(&self) -> u64 {
        let mut pool = self.pool.lock();
        pool.build += 1;
        log::trace!("Transient allocator: build {}", pool.build);
        pool.build
    }

    /// Bind a physical resource matching `descriptor`.
    ///
    /// A free resource with an equal descriptor is reused in whatever state
    /// it was released in; otherwise a new one is created in `initial_state`.
    pub fn acquire(
        &self,
        name: &str,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<Acquisition, BackendError> {
        let mut pool = self.pool.lock();
        let build = pool.build;

        let reused = pool.free.get_mut(descriptor).and_then(VecDeque::pop_front);
        if let Some(id) = reused {
            pool.reused_total += 1;
            if let Some(slot) = pool.slot_mut(id) {
                slot.status = PhysicalStatus::InUse;
                slot.last_used_build = build;
                log::trace!("Reusing {} ({}) for '{}'", id, slot.name, name);
                slot.name = name.to_string();
                return Ok(Acquisition {
                    id,
                    handle: slot.handle,
                    state: slot.state,
                    aliased: true,
                    created: false,
                });
            }
        }

        let handle = match descriptor {
            ResourceDescriptor::Texture(desc) => {
                self.device.create_texture(name, desc, initial_state)?
            }
            ResourceDescriptor::Buffer(desc) => {
                self.device.create_buffer(name, desc, initial_state)?
            }
        };

        let resource = PhysicalResource {
            name: name.to_string(),
            handle,
            descriptor: *descriptor,
            state: initial_state,
            status: PhysicalStatus::InUse,
            views: Vec::new(),
            last_used_build: build,
        };
        let id = match pool.slots.iter().position(Option::is_none) {
            Some(index) => {
                pool.slots[index] = Some(resource);
                PhysicalId(index as u32)
            }
            None => {
                pool.slots.push(Some(resource));
                PhysicalId(pool.slots.len() as u32 - 1)
            }
        };
        pool.created_total += 1;
        log::debug!("Created transient {} '{}' ({})", id, name, descriptor.summary());

        Ok(Acquisition {
            id,
            handle,
            state: initial_state,
            aliased: false,
            created: true,
        })
    }

    /// Return a resource to the free list, recording the state it is in.
    pub fn release(&self, id: PhysicalId, state: ResourceState) {
        let mut pool = self.pool.lock();
        let Some(slot) = pool.slot_mut(id) else {
            log::warn!("Releasing unknown physical resource {id}");
            return;
        };
        if slot.status != PhysicalStatus::InUse {
            log::warn!("Releasing {id} ({}) which is {:?}", slot.name, slot.status);
            return;
        }
        slot.status = PhysicalStatus::Free;
        slot.state = state;
        let descriptor = slot.descriptor;
        pool.push_free(id, descriptor);
    }

    /// Keep an exported resource out of the free lists until
    /// [`TransientAllocator::release_exported`].
    pub fn retain(&self, id: PhysicalId, state: ResourceState) {
        let mut pool = self.pool.lock();
        if let Some(slot) = pool.slot_mut(id) {
            slot.status = PhysicalStatus::Retained;
            slot.state = state;
        }
    }

    /// Give back an exported resource the client no longer needs.
    ///
    /// Returns false if `id` is not a retained resource.
    pub fn release_exported(&self, id: PhysicalId, state: ResourceState) -> bool {
        let mut pool = self.pool.lock();
        let Some(slot) = pool.slot_mut(id) else {
            return false;
        };
        if slot.status != PhysicalStatus::Retained {
            log::warn!("{id} ({}) is not an exported resource", slot.name);
            return false;
        }
        slot.status = PhysicalStatus::Free;
        slot.state = state;
        let descriptor = slot.descriptor;
        pool.push_free(id, descriptor);
        true
    }

    /// View of a pooled resource, created on first request and cached for
    /// the lifetime of the physical resource.
    pub fn view(&self, id: PhysicalId, descriptor: &ViewDescriptor) -> Result<ViewHandle, BackendError> {
        let mut pool = self.pool.lock();
        let Some(slot) = pool.slot_mut(id) else {
            return Err(BackendError::InvalidParameter(format!(
                "view requested for unknown physical resource {id}"
            )));
        };
        if let Some((_, view)) = slot.views.iter().find(|(desc, _)| desc == descriptor) {
            return Ok(*view);
        }
        let view = self.device.create_view(slot.handle, descriptor)?;
        slot.views.push((*descriptor, view));
        Ok(view)
    }

    /// Physical handle of a pooled resource.
    pub fn handle(&self, id: PhysicalId) -> Option<GpuResourceHandle> {
        self.pool.lock().slot_mut(id).map(|slot| slot.handle)
    }

    /// Tracked state of a pooled resource.
    pub fn state(&self, id: PhysicalId) -> Option<ResourceState> {
        self.pool.lock().slot_mut(id).map(|slot| slot.state)
    }

    /// Status of a pooled resource.
    pub fn status(&self, id: PhysicalId) -> Option<PhysicalStatus> {
        self.pool.lock().slot_mut(id).map(|slot| slot.status)
    }

    /// Destroy free resources unused for more than `max_idle_builds` builds.
    /// Returns the number of destroyed resources.
    pub fn trim(&self, max_idle_builds: u64) -> usize {
        let mut pool = self.pool.lock();
        let build = pool.build;
        let mut destroyed = Vec::new();

        for (index, entry) in pool.slots.iter_mut().enumerate() {
            let expired = entry.as_ref().is_some_and(|slot| {
                slot.status == PhysicalStatus::Free
                    && build.saturating_sub(slot.last_used_build) > max_idle_builds
            });
            if expired && let Some(slot) = entry.take() {
                destroyed.push((PhysicalId(index as u32), slot));
            }
        }

        for (id, slot) in &destroyed {
            if let Some(list) = pool.free.get_mut(&slot.descriptor) {
                list.retain(|free| free != id);
                if list.is_empty() {
                    pool.free.remove(&slot.descriptor);
                }
            }
            log::debug!("Destroying idle transient {} ({})", id, slot.name);
            self.device.destroy_resource(slot.handle);
        }

        pool.destroyed_total += destroyed.len() as u64;
        destroyed.len()
    }

    /// Pool counters.
    pub fn stats(&self) -> AllocatorStats {
        let pool = self.pool.lock();
        let mut stats = AllocatorStats {
            created_total: pool.created_total,
            reused_total: pool.reused_total,
            destroyed_total: pool.destroyed_total,
            ..Default::default()
        };
        for slot in pool.slots.iter().flatten() {
            stats.physical_resources += 1;
            match slot.status {
                PhysicalStatus::Free => stats.free += 1,
                PhysicalStatus::InUse => stats.in_use += 1,
                PhysicalStatus::Retained => stats.retained += 1,
            }
        }
        stats
    }

    /// Number of live physical resources created with `descriptor`.
    pub fn physical_count_for(&self, descriptor: &ResourceDescriptor) -> usize {
        self.pool
            .lock()
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.descriptor == *descriptor)
            .count()
    }
}

impl fmt::Debug for TransientAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientAllocator")
            .field("device", &self.device.name())
            .field("stats", &self.stats())
            .finish()
    }
}
