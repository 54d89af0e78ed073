//! Per-request staging area for events raised by aggregates.
//!
//! Entries are keyed by `"<EventKind>,<aggregate id>"`. Staging an aggregate
//! replaces its entry with the union of the already-staged events and the
//! aggregate's pending ones, so registering the same aggregate several times
//! in one request never accumulates an event twice. Draining returns events in
//! staging order.

use std::fmt;

use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::event::{DomainEvent, EventKind, IntegrationEvent};

/// Composite key of an accumulator entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmbientKey {
    /// Kind of events held under the key.
    pub kind: EventKind,
    /// Aggregate that raised them.
    pub aggregate_id: Uuid,
}

impl AmbientKey {
    /// Key for the domain events of `aggregate_id`.
    #[must_use]
    pub fn domain(aggregate_id: Uuid) -> Self {
        Self {
            kind: EventKind::Domain,
            aggregate_id,
        }
    }

    /// Key for the integration events of `aggregate_id`.
    #[must_use]
    pub fn integration(aggregate_id: Uuid) -> Self {
        Self {
            kind: EventKind::Integration,
            aggregate_id,
        }
    }
}

impl fmt::Display for AmbientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind.key_prefix(), self.aggregate_id)
    }
}

/// Events staged under one key.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSet {
    /// Domain events of one aggregate.
    Domain(Vec<DomainEvent>),
    /// Integration events of one aggregate.
    Integration(Vec<IntegrationEvent>),
}

impl EventSet {
    /// Number of events in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Domain(events) => events.len(),
            Self::Integration(events) => events.len(),
        }
    }

    /// Returns `true` when the set holds no event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Staging area for the events of every aggregate touched by one request.
#[derive(Debug, Default)]
pub struct EventAccumulator {
    entries: Vec<(AmbientKey, EventSet)>,
}

impl EventAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the aggregate's pending events into the accumulator.
    ///
    /// Returns the number of events that were not staged before.
    pub fn stage<A: AggregateRoot>(&mut self, aggregate: &mut A) -> usize {
        let aggregate_id = aggregate.aggregate_id();
        let pending = aggregate.take_pending_events();
        let mut added = 0;

        if !pending.domain.is_empty() {
            let key = AmbientKey::domain(aggregate_id);
            let mut merged = match self.remove(key) {
                Some(EventSet::Domain(existing)) => existing,
                _ => Vec::new(),
            };
            added += merge_unique(&mut merged, pending.domain, |e| e.event_id);
            self.entries.push((key, EventSet::Domain(merged)));
        }

        if !pending.integration.is_empty() {
            let key = AmbientKey::integration(aggregate_id);
            let mut merged = match self.remove(key) {
                Some(EventSet::Integration(existing)) => existing,
                _ => Vec::new(),
            };
            added += merge_unique(&mut merged, pending.integration, |e| e.event_id);
            self.entries.push((key, EventSet::Integration(merged)));
        }

        added
    }

    /// Removes and returns every staged domain event, in staging order.
    pub fn drain_domain_events(&mut self) -> Vec<DomainEvent> {
        self.drain_kind(EventKind::Domain)
            .into_iter()
            .flat_map(|set| match set {
                EventSet::Domain(events) => events,
                EventSet::Integration(_) => Vec::new(),
            })
            .collect()
    }

    /// Removes and returns every staged integration event, in staging order.
    pub fn drain_integration_events(&mut self) -> Vec<IntegrationEvent> {
        self.drain_kind(EventKind::Integration)
            .into_iter()
            .flat_map(|set| match set {
                EventSet::Integration(events) => events,
                EventSet::Domain(_) => Vec::new(),
            })
            .collect()
    }

    /// Number of staged events of `kind`.
    #[must_use]
    pub fn pending(&self, kind: EventKind) -> usize {
        self.entries
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, set)| set.len())
            .sum()
    }

    /// Returns the event set staged under `key`, if any.
    #[must_use]
    pub fn get(&self, key: AmbientKey) -> Option<&EventSet> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, set)| set)
    }

    /// Returns the staged keys in staging order.
    pub fn keys(&self) -> impl Iterator<Item = AmbientKey> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    /// Returns `true` when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every staged event.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn remove(&mut self, key: AmbientKey) -> Option<EventSet> {
        let position = self.entries.iter().position(|(existing, _)| *existing == key)?;
        Some(self.entries.remove(position).1)
    }

    fn drain_kind(&mut self, kind: EventKind) -> Vec<EventSet> {
        let (drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(key, _)| key.kind == kind);
        self.entries = kept;
        drained.into_iter().map(|(_, set)| set).collect()
    }
}

fn merge_unique<E>(target: &mut Vec<E>, fresh: Vec<E>, id: impl Fn(&E) -> Uuid) -> usize {
    let mut added = 0;
    for event in fresh {
        let event_id = id(&event);
        if !target.iter().any(|existing| id(existing) == event_id) {
            target.push(event);
            added += 1;
        }
    }
    added
}
