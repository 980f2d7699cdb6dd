//! Resource kind identifiers and selectors
//!
//! A `ResourceSelector` is the source of truth for "what must be watched":
//! a resource kind plus optional namespace/name narrowing. Empty namespace or
//! name means "match any".

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifies a watchable resource type by API group, version and plural resource name.
///
/// The core API group is the empty string (e.g. `v1 configmaps`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKindIdentifier {
    /// API group (empty for the core group)
    #[serde(default)]
    pub group: String,

    /// API version (e.g. "v1")
    pub version: String,

    /// Plural resource name (e.g. "configmaps")
    pub resource: String,
}

impl ResourceKindIdentifier {
    /// Create an identifier for a resource in any API group
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Create an identifier for a resource in the core API group
    pub fn core(version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new("", version, resource)
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKindIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.resource, self.version)
        } else {
            write!(f, "{}.{}.{}", self.resource, self.version, self.group)
        }
    }
}

/// Declarative watch target: a resource kind, optionally narrowed to one
/// namespace and/or one exact object name.
///
/// A selector with only `name` set matches that name in every namespace.
/// This is rarely what you want for namespaced kinds, but it is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    /// Kind of the selected resources
    #[serde(flatten)]
    pub kind: ResourceKindIdentifier,

    /// Namespace narrowing (`None` matches any namespace)
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Exact object name (`None` matches any name)
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ResourceSelector {
    /// Create a selector; empty strings are treated as "match any".
    pub fn new(kind: ResourceKindIdentifier, namespace: Option<&str>, name: Option<&str>) -> Self {
        Self {
            kind,
            namespace: namespace.filter(|s| !s.is_empty()).map(str::to_string),
            name: name.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Selector matching every object of `kind`
    pub fn all(kind: ResourceKindIdentifier) -> Self {
        Self::new(kind, None, None)
    }

    /// True when neither namespace nor name narrow the selector
    pub fn is_wildcard(&self) -> bool {
        self.namespace.is_none() && self.name.is_none()
    }

    /// Whether an object with the given namespace and name is selected.
    ///
    /// Cluster-scoped objects have an empty namespace.
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        if let Some(ns) = &self.namespace {
            if ns != namespace {
                return false;
            }
        }
        if let Some(n) = &self.name {
            if n != name {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.kind,
            self.namespace.as_deref().unwrap_or("*"),
            self.name.as_deref().unwrap_or("*"),
        )
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configmaps() -> ResourceKindIdentifier {
        ResourceKindIdentifier::core("v1", "configmaps")
    }

    #[test]
    fn test_exact_selector_matches_only_namespace_and_name() {
        let selector = ResourceSelector::new(configmaps(), Some("kube-system"), Some("kube-root-ca.crt"));
        assert!(selector.matches("kube-system", "kube-root-ca.crt"));
        assert!(!selector.matches("kube-system", "other"));
        assert!(!selector.matches("default", "kube-root-ca.crt"));
    }

    #[test]
    fn test_wildcard_selector_matches_everything() {
        let selector = ResourceSelector::all(configmaps());
        assert!(selector.is_wildcard());
        assert!(selector.matches("kube-system", "anything"));
        assert!(selector.matches("", "cluster-scoped"));
    }

    #[test]
    fn test_namespace_only_selector() {
        let selector = ResourceSelector::new(configmaps(), Some("kube-system"), None);
        assert!(selector.matches("kube-system", "a"));
        assert!(selector.matches("kube-system", "b"));
        assert!(!selector.matches("default", "a"));
    }

    #[test]
    fn test_name_only_selector_spans_namespaces() {
        let selector = ResourceSelector::new(configmaps(), None, Some("shared"));
        assert!(selector.matches("a", "shared"));
        assert!(selector.matches("b", "shared"));
        assert!(!selector.matches("a", "other"));
    }

    #[test]
    fn test_empty_strings_mean_match_any() {
        let selector = ResourceSelector::new(configmaps(), Some(""), Some(""));
        assert!(selector.is_wildcard());
    }

    #[test]
    fn test_display() {
        assert_eq!(configmaps().to_string(), "configmaps.v1");
        assert_eq!(
            ResourceKindIdentifier::new("apps", "v1", "deployments").to_string(),
            "deployments.v1.apps"
        );
        let selector = ResourceSelector::new(
            ResourceKindIdentifier::core("v1", "nodes"),
            None,
            Some("kind-control-plane"),
        );
        assert_eq!(selector.to_string(), "nodes.v1 */kind-control-plane");
    }

    #[test]
    fn test_api_version() {
        assert_eq!(configmaps().api_version(), "v1");
        assert_eq!(
            ResourceKindIdentifier::new("apps", "v1", "deployments").api_version(),
            "apps/v1"
        );
    }
}
