/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Keyed change events.
//!
//! An [`Events`] collection keeps the latest [`Event`] per resource key. It is
//! backed by a hash map, so iteration order carries no meaning; callers that
//! need a stable order (logging, tests) use [`Events::keys_sorted`].
//!
//! ## Merge Compatibility
//!
//! When two batches hold an event for the same key, the pair is merged only
//! when the result still describes what happened:
//!
//! | earlier | later  | merged |
//! |---------|--------|--------|
//! | X       | X      | X      |
//! | Insert  | Update | Insert |
//! | Update  | Label  | Label  |
//! | Label   | Update | Label  |
//!
//! Every other pair is rejected. This rules out anything that mixes `Remove`
//! with another kind, and an `Insert` following a `Label` or `Update`. The
//! merged event always carries the later item.

use std::collections::HashMap;
use std::fmt;
use tether_models::models::Resource;

/// The kind of change recorded for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Insert,
    Update,
    Remove,
    /// The labels of an agent changed.
    Label,
}

impl EventKind {
    /// Kind of the event resulting from `self` followed by `later`, or `None`
    /// when the two cannot be combined.
    pub fn merged_with(self, later: EventKind) -> Option<EventKind> {
        use EventKind::*;
        match (self, later) {
            (a, b) if a == b => Some(a),
            (Insert, Update) => Some(Insert),
            (Update, Label) | (Label, Update) => Some(Label),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Remove => "remove",
            EventKind::Label => "label",
        };
        write!(f, "{}", name)
    }
}

/// A single change to a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<T> {
    pub item: T,
    pub kind: EventKind,
}

/// The latest event per resource key.
#[derive(Debug, Clone, PartialEq)]
pub struct Events<T: Resource>(HashMap<String, Event<T>>);

impl<T: Resource> Default for Events<T> {
    fn default() -> Self {
        Events(HashMap::new())
    }
}

impl<T: Resource> Events<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event for `item`, replacing any earlier event for its key.
    pub fn include(&mut self, item: T, kind: EventKind) {
        let key = item.unique_key().to_string();
        self.0.insert(key, Event { item, kind });
    }

    /// True if the event stored for `key` has exactly `kind`.
    pub fn contains(&self, key: &str, kind: EventKind) -> bool {
        self.0.get(key).map(|e| e.kind == kind).unwrap_or(false)
    }

    /// True if any event is stored for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Event<T>> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates events in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Event<T>> {
        self.0.values()
    }

    pub fn keys_sorted(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// True if every key present in both collections holds a compatible pair.
    pub fn can_safely_merge(&self, other: &Events<T>) -> bool {
        other.0.iter().all(|(key, later)| match self.0.get(key) {
            Some(earlier) => earlier.kind.merged_with(later.kind).is_some(),
            None => true,
        })
    }

    /// Merges `other` into `self`.
    ///
    /// Returns false and leaves `self` untouched when the collections cannot
    /// be merged.
    pub fn merge(&mut self, other: &Events<T>) -> bool {
        if !self.can_safely_merge(other) {
            return false;
        }
        for (key, later) in &other.0 {
            let kind = match self.0.get(key) {
                Some(earlier) => earlier.kind.merged_with(later.kind).unwrap_or(later.kind),
                None => later.kind,
            };
            self.0.insert(
                key.clone(),
                Event {
                    item: later.item.clone(),
                    kind,
                },
            );
        }
        true
    }
}
