//! Change tracking for watch streams.
//!
//! The kube watcher reports objects as "applied" or "deleted" and re-lists
//! everything after each (re)connect. `ChangeTracker` remembers the last
//! delivered version of every object so that:
//! - an applied object is an Add when unseen and an Update when its
//!   resource version moved
//! - a re-list only yields what actually changed since the last delivery
//! - an object missing from a re-list yields a Delete with its last document
//!
//! A tracker seeded with the crawl snapshot makes the watch start exactly
//! where the crawl left off.

use super::Change;
use collector_client::ChangeKind;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct Tracked {
    version: Option<String>,
    object: Value,
}

/// Last known state of every object of one kind.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    known: HashMap<String, Tracked>,
    // Keys seen since the current re-list began
    relisted: Option<HashSet<String>>,
}

fn metadata_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get("metadata")?.get(field)?.as_str()
}

/// Identity of an object: its uid, or `namespace/name` when it has none.
pub fn object_key(object: &Value) -> Option<String> {
    if let Some(uid) = metadata_str(object, "uid") {
        return Some(uid.to_string());
    }
    let name = metadata_str(object, "name")?;
    Some(match metadata_str(object, "namespace") {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    })
}

fn resource_version(object: &Value) -> Option<String> {
    metadata_str(object, "resourceVersion").map(str::to_string)
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that already knows `items`, as delivered by a crawl.
    pub fn seeded(items: &[Value]) -> Self {
        let mut tracker = Self::new();
        for item in items {
            if let Some(key) = object_key(item) {
                tracker.remember(key, item.clone());
            }
        }
        tracker
    }

    /// Number of tracked objects.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    fn remember(&mut self, key: String, object: Value) {
        let tracked = Tracked {
            version: resource_version(&object),
            object,
        };
        self.known.insert(key, tracked);
    }

    /// A re-list is starting.
    pub fn restart(&mut self) {
        self.relisted = Some(HashSet::new());
    }

    /// An object reported by the current re-list.
    pub fn init_apply(&mut self, object: Value) -> Option<Change> {
        if let (Some(key), Some(seen)) = (object_key(&object), self.relisted.as_mut()) {
            seen.insert(key);
        }
        self.apply(object)
    }

    /// The current re-list is complete; everything it did not mention is gone.
    pub fn init_done(&mut self) -> Vec<Change> {
        let Some(seen) = self.relisted.take() else {
            return Vec::new();
        };
        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|key| self.known.remove(&key))
            .map(|tracked| Change::new(ChangeKind::Delete, tracked.object))
            .collect()
    }

    /// An object was created or modified.
    pub fn apply(&mut self, object: Value) -> Option<Change> {
        let Some(key) = object_key(&object) else {
            return Some(Change::new(ChangeKind::Add, object));
        };
        let version = resource_version(&object);
        let previous = self.known.get(&key).map(|t| t.version.clone());
        match previous {
            Some(previous) if version.is_some() && previous == version => None,
            Some(_) => {
                self.remember(key, object.clone());
                Some(Change::new(ChangeKind::Update, object))
            }
            None => {
                self.remember(key, object.clone());
                Some(Change::new(ChangeKind::Add, object))
            }
        }
    }

    /// An object was deleted.
    pub fn delete(&mut self, object: Value) -> Change {
        if let Some(key) = object_key(&object) {
            self.known.remove(&key);
        }
        Change::new(ChangeKind::Delete, object)
    }
}
