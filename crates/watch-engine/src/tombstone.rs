//! Converts raw watcher events into add/update/delete notifications.
//!
//! The kube watcher reports a relist (`Init` .. `InitApply`* .. `InitDone`)
//! instead of the deletions it missed while disconnected. The tracker keeps
//! the last known state of every object so that objects absent from a relist
//! can be reported as `FinalStateUnknown` deletions.
//!
//! Only type and identity metadata are kept per object (no payload, no
//! managed fields), so the tracker costs one `ObjectMeta` per object of the
//! kind on top of the reflector store. Tombstones therefore carry metadata
//! only; readers that need the payload use the cache.

use crate::reference::{DeletedObject, Notification};
use crate::stream::StreamEvent;
use kube::api::DynamicObject;
use kube_runtime::watcher;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-stream tracker of last known object states.
#[derive(Debug, Default)]
pub struct TombstoneTracker {
    known: HashMap<String, DynamicObject>,
    relist: Option<HashSet<String>>,
    hydrated: bool,
}

impl TombstoneTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first full list has completed
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Number of objects currently tracked
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// True when no object is tracked
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Translate one watcher event into zero or more stream events.
    pub fn observe(&mut self, event: watcher::Event<DynamicObject>) -> Vec<StreamEvent> {
        match event {
            watcher::Event::Init => {
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let (Some(seen), Some(key)) = (self.relist.as_mut(), object_key(&obj)) {
                    seen.insert(key);
                }
                vec![self.apply(obj)]
            }
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                if let Some(key) = object_key(&obj) {
                    self.known.remove(&key);
                }
                vec![StreamEvent::Notification(Notification::Deleted(DeletedObject::Live(obj)))]
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    fn apply(&mut self, obj: DynamicObject) -> StreamEvent {
        let Some(key) = object_key(&obj) else {
            // Untrackable; let the dispatcher report it as malformed
            return StreamEvent::Notification(Notification::Added(obj));
        };
        let notification = if self.known.insert(key, metadata_only(&obj)).is_some() {
            Notification::Updated(obj)
        } else {
            Notification::Added(obj)
        };
        StreamEvent::Notification(notification)
    }

    fn finish_relist(&mut self) -> Vec<StreamEvent> {
        let seen = self.relist.take().unwrap_or_default();
        let mut missing: Vec<String> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        missing.sort();

        let mut events = Vec::with_capacity(missing.len() + 1);
        for key in missing {
            let last_known = self.known.remove(&key);
            debug!("Object {} vanished during relist", key);
            events.push(StreamEvent::Notification(Notification::Deleted(
                DeletedObject::FinalStateUnknown { key, last_known },
            )));
        }
        if !self.hydrated {
            self.hydrated = true;
            events.push(StreamEvent::Hydrated);
        }
        events
    }
}

/// Copy of `obj` without its payload or managed fields
fn metadata_only(obj: &DynamicObject) -> DynamicObject {
    let mut metadata = obj.metadata.clone();
    metadata.managed_fields = None;
    DynamicObject {
        types: obj.types.clone(),
        metadata,
        data: Default::default(),
    }
}

/// Cache key in the `namespace/name` (or `name`) form.
pub fn object_key(obj: &DynamicObject) -> Option<String> {
    let name = obj.metadata.name.as_deref().filter(|n| !n.is_empty())?;
    Some(match obj.metadata.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    })
}
