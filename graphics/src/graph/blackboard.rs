//! Per-build typed side channel between passes.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

/// Heterogeneous map keyed by value type.
///
/// Passes publish small values (resource handles, parameters) during build so
/// later passes can pick them up without threading them through every call.
/// The blackboard is scoped to one [`RenderGraph`](super::RenderGraph) and
/// cleared with it.
#[derive(Default)]
pub struct Blackboard {
    /// Every value is stored under `TypeId::of` its own type. Only the typed
    /// methods below write to the map.
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl Blackboard {
    /// Create an empty blackboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value`, returning the previous value of the same type.
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow the value of type `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow the value of type `T`.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Copy out the value of type `T`.
    pub fn get_copied<T: Copy + 'static>(&self) -> Option<T> {
        self.get::<T>().copied()
    }

    /// Borrow the value of type `T`, inserting `T::default()` first if missing.
    pub fn get_or_default<T: Default + 'static>(&mut self) -> &mut T {
        let entry = self
            .entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()));
        // Keyed by `TypeId::of::<T>()`, so the stored box always holds a `T`.
        match entry.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("blackboard entry for {} has a foreign type", type_name::<T>()),
        }
    }

    /// Returns true if a value of type `T` was published.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Remove and return the value of type `T`.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Number of published values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was published.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("entries", &self.entries.len())
            .finish()
    }
}
