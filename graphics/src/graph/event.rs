//! Debug event scopes grouping passes in captures and profilers.

use std::panic::Location;

/// Identifier of an event within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u32);

impl EventId {
    /// Index of the event.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A named event scope.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    location: &'static Location<'static>,
    parent: Option<EventId>,
}

impl Event {
    /// Event name shown in tooling.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source location that opened the event.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Enclosing event.
    pub fn parent(&self) -> Option<EventId> {
        self.parent
    }
}

/// All events of a graph plus the currently open scope stack.
#[derive(Debug, Default)]
pub(crate) struct EventStack {
    events: Vec<Event>,
    open: Vec<EventId>,
}

impl EventStack {
    pub(crate) fn push(&mut self, name: String, location: &'static Location<'static>) -> EventId {
        let id = EventId(self.events.len() as u32);
        self.events.push(Event {
            name,
            location,
            parent: self.open.last().copied(),
        });
        self.open.push(id);
        id
    }

    pub(crate) fn pop(&mut self) -> Option<EventId> {
        self.open.pop()
    }

    /// Snapshot of the open scopes, outermost first.
    pub(crate) fn current_path(&self) -> Vec<EventId> {
        self.open.clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.len()
    }

    pub(crate) fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.index())
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.open.clear();
    }
}

/// Events to close and open when moving from one pass to the next.
///
/// Returns `(close_count, to_open)`; closing happens innermost first.
pub(crate) fn transition<'a>(from: &[EventId], to: &'a [EventId]) -> (usize, &'a [EventId]) {
    let shared = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    (from.len() - shared, &to[shared..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_events() {
        let mut stack = EventStack::default();
        let frame = stack.push("Frame".into(), Location::caller());
        let shadows = stack.push("Shadows".into(), Location::caller());
        assert_eq!(stack.current_path(), vec![frame, shadows]);
        assert_eq!(stack.get(shadows).and_then(|e| e.parent()), Some(frame));
        assert_eq!(stack.pop(), Some(shadows));
        assert_eq!(stack.open_count(), 1);
        assert_eq!(stack.get(frame).map(|e| e.name()), Some("Frame"));
    }

    #[test]
    fn test_transition_shares_prefix() {
        let a = EventId(0);
        let b = EventId(1);
        let c = EventId(2);
        let next = [a, c];
        let (close, open) = transition(&[a, b], &next);
        assert_eq!(close, 1);
        assert_eq!(open, &[c]);

        let next = [a];
        let (close, open) = transition(&[a], &next);
        assert_eq!(close, 0);
        assert!(open.is_empty());

        let (close, open) = transition(&[a, b], &[]);
        assert_eq!(close, 2);
        assert!(open.is_empty());
    }
}
