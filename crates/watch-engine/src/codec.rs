//! Work-queue key codec.
//!
//! Routing is per object: every forwarded change is keyed by the changed
//! object's kind, namespace and name. Keys are opaque strings of the form
//!
//! ```text
//! obj:<len>:<group><len>:<version><len>:<kind><len>:<namespace><len>:<name>
//! ```
//!
//! Each field is length-prefixed (byte length), so no character is reserved
//! and a name containing `:` can never alias another object. Keys only live
//! for the lifetime of one process.

use crate::error::WatchError;
use crate::kind::gvk_string;
use crate::reference::NormalizedReference;
use kube::api::GroupVersionKind;
use std::fmt;

const PREFIX: &str = "obj:";
const FIELD_COUNT: usize = 5;

/// Opaque work-queue key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileKey(String);

impl ReconcileKey {
    /// Wrap a raw key (e.g. one read back from the work queue)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object identity routed through the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub gvk: GroupVersionKind,
    /// Namespace; empty for cluster-scoped objects
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a normalized reference; `None` when the kind is unknown
    pub fn from_reference(reference: &NormalizedReference) -> Option<Self> {
        let gvk = reference.kind.clone()?;
        Some(Self::new(gvk, reference.namespace.clone(), reference.name.clone()))
    }

    /// Encode into a work-queue key
    pub fn encode(&self) -> ReconcileKey {
        let fields = [
            self.gvk.group.as_str(),
            self.gvk.version.as_str(),
            self.gvk.kind.as_str(),
            self.namespace.as_str(),
            self.name.as_str(),
        ];
        let mut key = String::from(PREFIX);
        for field in fields {
            key.push_str(&field.len().to_string());
            key.push(':');
            key.push_str(field);
        }
        ReconcileKey(key)
    }

    /// Decode a work-queue key produced by [`ObjectKey::encode`].
    pub fn decode(key: &ReconcileKey) -> Result<Self, WatchError> {
        let raw = key.as_str();
        let mut rest = raw
            .strip_prefix(PREFIX)
            .ok_or_else(|| WatchError::malformed_key(raw, "missing object key prefix"))?;

        let mut fields = Vec::with_capacity(FIELD_COUNT);
        while !rest.is_empty() {
            if fields.len() == FIELD_COUNT {
                return Err(WatchError::malformed_key(raw, "trailing data after last field"));
            }
            let (len, tail) = rest
                .split_once(':')
                .ok_or_else(|| WatchError::malformed_key(raw, "missing field separator"))?;
            if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
                return Err(WatchError::malformed_key(raw, format!("invalid field length {len:?}")));
            }
            // Only the canonical length form decodes, so one object has one key
            if len.len() > 1 && len.starts_with('0') {
                return Err(WatchError::malformed_key(raw, format!("non-canonical field length {len:?}")));
            }
            let len: usize = len
                .parse()
                .map_err(|_| WatchError::malformed_key(raw, "field length out of range"))?;
            let field = tail
                .get(..len)
                .ok_or_else(|| WatchError::malformed_key(raw, "field shorter than its length"))?;
            fields.push(field);
            rest = &tail[len..];
        }

        let [group, version, kind, namespace, name] = fields.as_slice() else {
            return Err(WatchError::malformed_key(
                raw,
                format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
            ));
        };
        if version.is_empty() || kind.is_empty() || name.is_empty() {
            return Err(WatchError::malformed_key(raw, "version, kind and name must be non-empty"));
        }

        Ok(Self::new(GroupVersionKind::gvk(group, version, kind), *namespace, *name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", gvk_string(&self.gvk), self.name)
        } else {
            write!(f, "{} {}/{}", gvk_string(&self.gvk), self.namespace, self.name)
        }
    }
}
