//! Change notifications and their normalized form.
//!
//! Watch streams deliver add/update/delete notifications. Deletions come in
//! two shapes: the live object, or a "final state unknown" tombstone carrying
//! the last state the stream saw. Both normalize to the same
//! [`NormalizedReference`].

use crate::error::WatchError;
use kube::api::{DynamicObject, GroupVersionKind};

/// Normalized identity of the object a notification refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedReference {
    /// Kind of the object, when known
    pub kind: Option<GroupVersionKind>,
    /// Namespace (empty for cluster-scoped objects)
    pub namespace: String,
    /// Object name
    pub name: String,
    /// Object UID
    pub uid: Option<String>,
    /// Resource version the notification observed
    pub resource_version: Option<String>,
}

impl NormalizedReference {
    /// Extract a reference from an object.
    ///
    /// `kind` overrides the object's own type meta; watch streams know their
    /// kind even when the payload omits `apiVersion`/`kind`.
    pub fn from_object(obj: &DynamicObject, kind: Option<&GroupVersionKind>) -> Result<Self, WatchError> {
        let name = obj
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| WatchError::MalformedEvent("object has no name".to_string()))?;

        let kind = kind.cloned().or_else(|| {
            obj.types
                .as_ref()
                .and_then(|t| parse_gvk(&t.api_version, &t.kind))
        });

        Ok(Self {
            kind,
            namespace: obj.metadata.namespace.clone().unwrap_or_default(),
            name,
            uid: obj.metadata.uid.clone(),
            resource_version: obj.metadata.resource_version.clone(),
        })
    }

    /// `namespace/name`, or `name` for cluster-scoped objects
    pub fn namespaced_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

fn parse_gvk(api_version: &str, kind: &str) -> Option<GroupVersionKind> {
    if api_version.is_empty() || kind.is_empty() {
        return None;
    }
    let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
    Some(GroupVersionKind::gvk(group, version, kind))
}

/// Deleted object as delivered by a watch stream.
#[derive(Debug, Clone)]
pub enum DeletedObject {
    /// The deleted object itself
    Live(DynamicObject),
    /// The deletion was missed (e.g. during a disconnect); only the last
    /// known state is available, if any.
    FinalStateUnknown {
        /// Cache key (`namespace/name` or `name`)
        key: String,
        /// Last state seen before the deletion
        last_known: Option<DynamicObject>,
    },
}

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// First time the stream saw the object
    Added,
    /// Object changed (or was re-listed)
    Updated,
    /// Object went away
    Deleted,
}

/// Raw change notification from a watch stream.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Object added
    Added(DynamicObject),
    /// Object updated; only the new state is kept
    Updated(DynamicObject),
    /// Object deleted
    Deleted(DeletedObject),
}

impl Notification {
    /// Action this notification represents
    pub fn action(&self) -> ChangeAction {
        match self {
            Self::Added(_) => ChangeAction::Added,
            Self::Updated(_) => ChangeAction::Updated,
            Self::Deleted(_) => ChangeAction::Deleted,
        }
    }

    /// Unwrap the notification into a normalized reference.
    ///
    /// Live deletions and tombstones normalize identically. A tombstone
    /// without a last-known object cannot be normalized.
    pub fn normalize(&self, kind: Option<&GroupVersionKind>) -> Result<NormalizedReference, WatchError> {
        let obj = match self {
            Self::Added(obj) | Self::Updated(obj) | Self::Deleted(DeletedObject::Live(obj)) => obj,
            Self::Deleted(DeletedObject::FinalStateUnknown {
                last_known: Some(obj),
                ..
            }) => obj,
            Self::Deleted(DeletedObject::FinalStateUnknown { key, last_known: None }) => {
                return Err(WatchError::MalformedEvent(format!(
                    "tombstone for {key} carries no object"
                )));
            }
        };
        NormalizedReference::from_object(obj, kind)
    }
}
