//! Resource state tracking and barrier generation.
//!
//! The executor walks the schedule and asks the [`BarrierPlanner`] to put
//! every accessed resource into the state its pass needs. The planner emits
//! the minimal barriers into a [`BarrierBatch`], which is recorded into the
//! command context as one flush before the pass runs.
//!
//! Transition rules:
//!
//! - Same state: nothing, except a UAV barrier between two unordered
//!   accesses so the second sees the first one's writes.
//! - Either side exclusive (a write state or the acceleration structure
//!   state): a full transition to the requested state.
//! - Both read-only: the resource moves to the union of both states, so
//!   readers that only need a subset of the current state cost nothing.

use crate::backend::{BarrierSplit, CommandContext, GpuResourceHandle};
use crate::graph::ResourceHandle;
use crate::types::ResourceState;

/// One barrier on a virtual resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Barrier {
    /// State transition. `before` never equals `after`.
    Transition {
        resource: ResourceHandle,
        before: ResourceState,
        after: ResourceState,
        split: BarrierSplit,
    },
    /// Orders two unordered-access uses of the same resource.
    Uav { resource: ResourceHandle },
    /// The physical memory behind `resource` was used by another resource.
    Aliasing { resource: ResourceHandle },
}

impl Barrier {
    /// Resource the barrier applies to.
    pub fn resource(&self) -> ResourceHandle {
        match *self {
            Self::Transition { resource, .. }
            | Self::Uav { resource }
            | Self::Aliasing { resource } => resource,
        }
    }
}

/// Barriers collected for one flush point.
///
/// Consecutive full transitions of one resource are folded into one; a fold
/// that ends where it started disappears.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BarrierBatch {
    barriers: Vec<Barrier>,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a barrier.
    pub fn push(&mut self, barrier: Barrier) {
        if let Barrier::Transition {
            resource,
            before,
            after,
            split: BarrierSplit::None,
        } = barrier
        {
            if before == after {
                return;
            }
            let existing = self.barriers.iter().position(|b| {
                matches!(b, Barrier::Transition { resource: r, split: BarrierSplit::None, .. } if *r == resource)
            });
            if let Some(index) = existing
                && let Barrier::Transition {
                    before: first_before,
                    ..
                } = self.barriers[index]
            {
                if first_before == after {
                    self.barriers.remove(index);
                } else {
                    self.barriers[index] = Barrier::Transition {
                        resource,
                        before: first_before,
                        after,
                        split: BarrierSplit::None,
                    };
                }
                return;
            }
        }
        self.barriers.push(barrier);
    }

    /// Barriers in the batch.
    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    /// Record every barrier into `context`, mapping virtual to physical
    /// handles with `resolve`. Resources resolving to the null handle are
    /// skipped. Does not flush.
    pub fn record<F>(&self, context: &mut dyn CommandContext, resolve: F)
    where
        F: Fn(ResourceHandle) -> GpuResourceHandle,
    {
        for barrier in &self.barriers {
            let physical = resolve(barrier.resource());
            if physical.is_null() {
                log::warn!("Skipping barrier on unbound resource {}", barrier.resource());
                continue;
            }
            match *barrier {
                Barrier::Transition {
                    before,
                    after,
                    split,
                    ..
                } => context.insert_resource_barrier(physical, before, after, split),
                Barrier::Uav { .. } => context.insert_uav_barrier(physical),
                Barrier::Aliasing { .. } => context.insert_aliasing_barrier(None, physical),
            }
        }
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.barriers.clear();
    }
}

/// Counters of barriers emitted by a planner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BarrierStats {
    /// Full transitions.
    pub transitions: u32,
    /// Split transitions begun.
    pub split_begins: u32,
    /// Split transitions ended.
    pub split_ends: u32,
    /// UAV barriers.
    pub uav_barriers: u32,
    /// Aliasing barriers.
    pub aliasing_barriers: u32,
}

impl BarrierStats {
    /// Total number of barriers.
    pub fn total(&self) -> u32 {
        self.transitions
            + self.split_begins
            + self.split_ends
            + self.uav_barriers
            + self.aliasing_barriers
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: ResourceState,
    split_target: Option<ResourceState>,
    /// Set once the graph has used the resource since it was tracked.
    accessed: bool,
}

/// Tracks the current state of every resource during one execution.
#[derive(Debug, Default)]
pub struct BarrierPlanner {
    tracked: Vec<Option<Tracked>>,
    stats: BarrierStats,
}

impl BarrierPlanner {
    /// Create a planner for a graph with `resource_count` resources.
    pub fn new(resource_count: usize) -> Self {
        Self {
            tracked: vec![None; resource_count],
            stats: BarrierStats::default(),
        }
    }

    fn slot(&mut self, resource: ResourceHandle) -> &mut Option<Tracked> {
        let index = resource.index();
        if index >= self.tracked.len() {
            self.tracked.resize(index + 1, None);
        }
        &mut self.tracked[index]
    }

    /// Start tracking `resource` in `state`, the state its physical
    /// resource is known to be in.
    pub fn track(&mut self, resource: ResourceHandle, state: ResourceState) {
        *self.slot(resource) = Some(Tracked {
            state,
            split_target: None,
            accessed: false,
        });
    }

    /// Current state of `resource`, if tracked.
    pub fn state(&self, resource: ResourceHandle) -> Option<ResourceState> {
        self.tracked
            .get(resource.index())
            .copied()
            .flatten()
            .map(|t| t.state)
    }

    /// Returns true if a split transition on `resource` is in flight.
    pub fn has_pending_split(&self, resource: ResourceHandle) -> bool {
        self.tracked
            .get(resource.index())
            .copied()
            .flatten()
            .is_some_and(|t| t.split_target.is_some())
    }

    /// Barrier statistics so far.
    pub fn stats(&self) -> BarrierStats {
        self.stats
    }

    /// State a resource in `current` ends up in when `desired` is requested.
    fn target_state(current: ResourceState, desired: ResourceState) -> ResourceState {
        if current.is_exclusive() || desired.is_exclusive() {
            desired
        } else {
            current | desired
        }
    }

    fn end_split(&mut self, resource: ResourceHandle, batch: &mut BarrierBatch) -> Option<ResourceState> {
        let tracked = self.slot(resource).as_mut()?;
        let target = tracked.split_target.take()?;
        let before = tracked.state;
        tracked.state = target;
        self.stats.split_ends += 1;
        batch.push(Barrier::Transition {
            resource,
            before,
            after: target,
            split: BarrierSplit::End,
        });
        Some(target)
    }

    fn transition(
        &mut self,
        resource: ResourceHandle,
        before: ResourceState,
        after: ResourceState,
        batch: &mut BarrierBatch,
    ) {
        if let Some(tracked) = self.slot(resource).as_mut() {
            tracked.state = after;
        }
        self.stats.transitions += 1;
        batch.push(Barrier::Transition {
            resource,
            before,
            after,
            split: BarrierSplit::None,
        });
    }

    /// Make sure `resource` is usable in `desired`, emitting barriers into
    /// `batch`. Untracked resources start tracking in `desired`.
    ///
    /// A UAV barrier is only emitted between two consecutive UAV uses inside
    /// the graph; the first use after [`BarrierPlanner::track`] needs none.
    pub fn require(&mut self, resource: ResourceHandle, desired: ResourceState, batch: &mut BarrierBatch) {
        let Some(current) = self.state(resource) else {
            log::warn!("Barrier planner: {resource} required before being tracked");
            self.track(resource, desired);
            self.mark_accessed(resource);
            return;
        };
        let accessed_before = self.mark_accessed(resource);

        let current = match self.end_split(resource, batch) {
            Some(after_split) if after_split == Self::target_state(current, desired) => return,
            Some(after_split) => after_split,
            None => current,
        };

        if current == desired {
            if accessed_before && desired.contains(ResourceState::UNORDERED_ACCESS) {
                self.stats.uav_barriers += 1;
                batch.push(Barrier::Uav { resource });
            }
            return;
        }

        let target = Self::target_state(current, desired);
        if target != current {
            self.transition(resource, current, target, batch);
        }
    }

    /// Flag `resource` as used by the graph, returning the previous flag.
    fn mark_accessed(&mut self, resource: ResourceHandle) -> bool {
        self.slot(resource)
            .as_mut()
            .is_some_and(|t| std::mem::replace(&mut t.accessed, true))
    }

    /// Begin a split transition towards the state `desired` will need.
    ///
    /// The matching end is emitted by the next [`BarrierPlanner::require`] or
    /// [`BarrierPlanner::finalize`] on the same resource. Returns true if a
    /// split was started.
    pub fn begin_split(&mut self, resource: ResourceHandle, desired: ResourceState, batch: &mut BarrierBatch) -> bool {
        let Some(tracked) = self.slot(resource).as_mut() else {
            return false;
        };
        if tracked.split_target.is_some() {
            return false;
        }
        let target = Self::target_state(tracked.state, desired);
        if target == tracked.state {
            return false;
        }
        let before = tracked.state;
        tracked.split_target = Some(target);
        self.stats.split_begins += 1;
        batch.push(Barrier::Transition {
            resource,
            before,
            after: target,
            split: BarrierSplit::Begin,
        });
        true
    }

    /// Leave `resource` in exactly `final_state`.
    pub fn finalize(&mut self, resource: ResourceHandle, final_state: ResourceState, batch: &mut BarrierBatch) {
        self.end_split(resource, batch);
        let Some(current) = self.state(resource) else {
            return;
        };
        if current != final_state {
            self.transition(resource, current, final_state, batch);
        }
    }

    /// Emit an aliasing barrier for a physical resource that was reused.
    pub fn aliasing(&mut self, resource: ResourceHandle, batch: &mut BarrierBatch) {
        self.stats.aliasing_barriers += 1;
        batch.push(Barrier::Aliasing { resource });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyCommandContext, RecordedCommand};

    fn handle(index: u32) -> ResourceHandle {
        ResourceHandle::new(u32::MAX, index)
    }

    fn transitions(batch: &BarrierBatch) -> Vec<(ResourceState, ResourceState, BarrierSplit)> {
        batch
            .barriers()
            .iter()
            .filter_map(|b| match *b {
                Barrier::Transition {
                    before,
                    after,
                    split,
                    ..
                } => Some((before, after, split)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_write_to_read_transitions() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::UNORDERED_ACCESS);
        planner.require(handle(0), ResourceState::NON_PIXEL_SHADER_RESOURCE, &mut batch);
        assert_eq!(
            transitions(&batch),
            vec![(
                ResourceState::UNORDERED_ACCESS,
                ResourceState::NON_PIXEL_SHADER_RESOURCE,
                BarrierSplit::None
            )]
        );
        assert_eq!(planner.state(handle(0)), Some(ResourceState::NON_PIXEL_SHADER_RESOURCE));
    }

    #[test]
    fn test_same_state_is_free() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::COPY_SOURCE);
        planner.require(handle(0), ResourceState::COPY_SOURCE, &mut batch);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_uav_after_uav_emits_uav_barrier() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::UNORDERED_ACCESS);
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        assert_eq!(batch.barriers(), &[Barrier::Uav { resource: handle(0) }]);
        assert_eq!(planner.stats().uav_barriers, 1);
    }

    #[test]
    fn test_first_uav_use_needs_no_barrier() {
        let mut planner = BarrierPlanner::new(2);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::UNORDERED_ACCESS);
        planner.track(handle(1), ResourceState::UNORDERED_ACCESS);
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        planner.require(handle(1), ResourceState::UNORDERED_ACCESS, &mut batch);
        assert!(batch.is_empty());
        assert_eq!(planner.stats().total(), 0);

        // Re-tracking, as for a reused physical, starts a fresh history.
        planner.track(handle(0), ResourceState::UNORDERED_ACCESS);
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_uav_after_transition_needs_no_uav_barrier() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::NON_PIXEL_SHADER_RESOURCE);
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        assert_eq!(planner.stats().transitions, 1);
        assert_eq!(planner.stats().uav_barriers, 0);

        batch.clear();
        planner.require(handle(0), ResourceState::UNORDERED_ACCESS, &mut batch);
        assert_eq!(batch.barriers(), &[Barrier::Uav { resource: handle(0) }]);
    }

    #[test]
    fn test_read_subset_is_free_and_superset_merges() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::ALL_SHADER_RESOURCE);
        planner.require(handle(0), ResourceState::PIXEL_SHADER_RESOURCE, &mut batch);
        assert!(batch.is_empty());

        planner.require(handle(0), ResourceState::COPY_SOURCE, &mut batch);
        assert_eq!(
            transitions(&batch),
            vec![(
                ResourceState::ALL_SHADER_RESOURCE,
                ResourceState::ALL_SHADER_RESOURCE | ResourceState::COPY_SOURCE,
                BarrierSplit::None
            )]
        );
    }

    #[test]
    fn test_split_transition_pairs() {
        let mut planner = BarrierPlanner::new(1);
        let mut begin = BarrierBatch::new();
        planner.track(handle(0), ResourceState::RENDER_TARGET);
        assert!(planner.begin_split(handle(0), ResourceState::PIXEL_SHADER_RESOURCE, &mut begin));
        assert!(planner.has_pending_split(handle(0)));
        assert_eq!(planner.state(handle(0)), Some(ResourceState::RENDER_TARGET));

        let mut end = BarrierBatch::new();
        planner.require(handle(0), ResourceState::PIXEL_SHADER_RESOURCE, &mut end);
        assert_eq!(
            transitions(&begin),
            vec![(
                ResourceState::RENDER_TARGET,
                ResourceState::PIXEL_SHADER_RESOURCE,
                BarrierSplit::Begin
            )]
        );
        assert_eq!(
            transitions(&end),
            vec![(
                ResourceState::RENDER_TARGET,
                ResourceState::PIXEL_SHADER_RESOURCE,
                BarrierSplit::End
            )]
        );
        assert!(!planner.has_pending_split(handle(0)));
        assert_eq!(planner.stats().split_begins, 1);
        assert_eq!(planner.stats().split_ends, 1);
    }

    #[test]
    fn test_finalize_exact_state() {
        let mut planner = BarrierPlanner::new(1);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::ALL_SHADER_RESOURCE);
        planner.finalize(handle(0), ResourceState::PRESENT, &mut batch);
        assert_eq!(
            transitions(&batch),
            vec![(
                ResourceState::ALL_SHADER_RESOURCE,
                ResourceState::PRESENT,
                BarrierSplit::None
            )]
        );
        batch.clear();
        planner.finalize(handle(0), ResourceState::PRESENT, &mut batch);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_folds_transitions() {
        let mut batch = BarrierBatch::new();
        batch.push(Barrier::Transition {
            resource: handle(0),
            before: ResourceState::COMMON,
            after: ResourceState::COPY_DEST,
            split: BarrierSplit::None,
        });
        batch.push(Barrier::Transition {
            resource: handle(0),
            before: ResourceState::COPY_DEST,
            after: ResourceState::COPY_SOURCE,
            split: BarrierSplit::None,
        });
        assert_eq!(
            transitions(&batch),
            vec![(ResourceState::COMMON, ResourceState::COPY_SOURCE, BarrierSplit::None)]
        );
        batch.push(Barrier::Transition {
            resource: handle(0),
            before: ResourceState::COPY_SOURCE,
            after: ResourceState::COMMON,
            split: BarrierSplit::None,
        });
        assert!(batch.is_empty());
    }

    #[test]
    fn test_record_into_context() {
        let mut planner = BarrierPlanner::new(2);
        let mut batch = BarrierBatch::new();
        planner.track(handle(0), ResourceState::COMMON);
        planner.track(handle(1), ResourceState::UNORDERED_ACCESS);
        planner.require(handle(0), ResourceState::COPY_DEST, &mut batch);
        planner.require(handle(1), ResourceState::UNORDERED_ACCESS, &mut batch);
        planner.require(handle(1), ResourceState::UNORDERED_ACCESS, &mut batch);
        planner.aliasing(handle(1), &mut batch);

        let mut context = DummyCommandContext::default();
        batch.record(&mut context, |r| GpuResourceHandle(r.index() as u64 + 10));
        context.flush_barriers();

        let commands = context.commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(
            commands[0],
            RecordedCommand::Transition {
                resource: GpuResourceHandle(10),
                before: ResourceState::COMMON,
                after: ResourceState::COPY_DEST,
                ..
            }
        ));
        assert!(matches!(
            commands[1],
            RecordedCommand::UavBarrier {
                resource: GpuResourceHandle(11)
            }
        ));
        assert!(matches!(
            commands[2],
            RecordedCommand::AliasingBarrier { .. }
        ));
    }
}
