//! Per-owner input resource lists.
//!
//! An `InputResourceSet` maps an owning entity name to the resources it
//! needs watched. The set is built once at startup (from a YAML document or
//! the built-in defaults) and passed explicitly to the watch initializer;
//! it is never mutated afterwards.

use crate::error::InputResourceError;
use crate::selector::{ResourceKindIdentifier, ResourceSelector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Resources declared by a single owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputResources {
    /// Exact resources (kind plus optional namespace/name)
    #[serde(default)]
    pub exact_resources: Vec<ResourceSelector>,
}

/// Owner name → declared input resources.
///
/// Backed by a `BTreeMap` so iteration (and therefore registration order)
/// is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InputResourceSet {
    owners: BTreeMap<String, InputResources>,
}

impl InputResourceSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the resources of an owner
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>, selectors: Vec<ResourceSelector>) -> Self {
        self.owners.insert(
            owner.into(),
            InputResources {
                exact_resources: selectors,
            },
        );
        self
    }

    /// Parse a YAML document of the form
    ///
    /// ```yaml
    /// cluster-authentication-operator:
    ///   exactResources:
    ///     - version: v1
    ///       resource: configmaps
    ///       namespace: kube-system
    ///       name: kube-root-ca.crt
    /// ```
    pub fn from_yaml_str(document: &str) -> Result<Self, InputResourceError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Read and parse a YAML file (see [`InputResourceSet::from_yaml_str`])
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, InputResourceError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| InputResourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&document)
    }

    /// Default input resources for the authentication operator.
    pub fn builtin() -> Self {
        let configmaps = ResourceKindIdentifier::core("v1", "configmaps");
        Self::new().with_owner(
            "cluster-authentication-operator",
            vec![
                ResourceSelector::new(configmaps.clone(), Some("kube-system"), Some("kube-root-ca.crt")),
                ResourceSelector::new(configmaps, Some("kube-system"), Some("kubeadm-config")),
                ResourceSelector::new(
                    ResourceKindIdentifier::core("v1", "secrets"),
                    Some("kube-system"),
                    Some("bootstrap-token-abcdef"),
                ),
                ResourceSelector::new(
                    ResourceKindIdentifier::core("v1", "nodes"),
                    None,
                    Some("kind-control-plane"),
                ),
            ],
        )
    }

    /// Owner names in deterministic order
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    /// Resources declared by `owner`
    pub fn resources(&self, owner: &str) -> Option<&InputResources> {
        self.owners.get(owner)
    }

    /// Every `(owner, selector)` pair, owners in order, selectors in declaration order
    pub fn iter_selectors(&self) -> impl Iterator<Item = (&str, &ResourceSelector)> {
        self.owners.iter().flat_map(|(owner, resources)| {
            resources
                .exact_resources
                .iter()
                .map(move |selector| (owner.as_str(), selector))
        })
    }

    /// Total number of selectors across all owners
    pub fn selector_count(&self) -> usize {
        self.owners.values().map(|r| r.exact_resources.len()).sum()
    }

    /// True when no owner declares any selector
    pub fn is_empty(&self) -> bool {
        self.selector_count() == 0
    }

    /// Reject selectors that can never be watched.
    ///
    /// Kind resolution happens later against the cluster; this only catches
    /// declarations that are structurally unusable.
    pub fn validate(&self) -> Result<(), InputResourceError> {
        if self.is_empty() {
            return Err(InputResourceError::Empty);
        }
        for (owner, selector) in self.iter_selectors() {
            let reason = if owner.is_empty() {
                Some("owner name is empty")
            } else if selector.kind.version.is_empty() {
                Some("version is empty")
            } else if selector.kind.resource.is_empty() {
                Some("resource is empty")
            } else if selector.kind.resource.contains('/') {
                Some("subresources cannot be watched")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(InputResourceError::Unsupported {
                    owner: owner.to_string(),
                    selector: selector.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_set() {
        let set = InputResourceSet::builtin();
        assert_eq!(set.owners().collect::<Vec<_>>(), vec!["cluster-authentication-operator"]);
        assert_eq!(set.selector_count(), 4);
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_str() {
        let document = r#"
cluster-authentication-operator:
  exactResources:
    - version: v1
      resource: configmaps
      namespace: kube-system
      name: kube-root-ca.crt
    - group: ""
      version: v1
      resource: nodes
      namespace: ""
      name: kind-control-plane
ingress-operator:
  exactResources:
    - group: apps
      version: v1
      resource: deployments
"#;
        let set = InputResourceSet::from_yaml_str(document).expect("valid document");

        let pairs: Vec<(String, String)> = set
            .iter_selectors()
            .map(|(owner, selector)| (owner.to_string(), selector.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "cluster-authentication-operator".to_string(),
                    "configmaps.v1 kube-system/kube-root-ca.crt".to_string()
                ),
                (
                    "cluster-authentication-operator".to_string(),
                    "nodes.v1 */kind-control-plane".to_string()
                ),
                ("ingress-operator".to_string(), "deployments.v1.apps */*".to_string()),
            ]
        );

        let node = &set
            .resources("cluster-authentication-operator")
            .expect("owner present")
            .exact_resources[1];
        assert_eq!(node.namespace, None);
    }

    #[test]
    fn test_from_yaml_str_rejects_garbage() {
        let err = InputResourceSet::from_yaml_str("owner: [1, 2").unwrap_err();
        assert!(matches!(err, InputResourceError::Parse(_)));
    }

    #[test]
    fn test_from_yaml_file_missing() {
        let err = InputResourceSet::from_yaml_file("/nonexistent/input-resources.yaml").unwrap_err();
        assert!(matches!(err, InputResourceError::Io { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_resource() {
        let set = InputResourceSet::new().with_owner(
            "op",
            vec![ResourceSelector::all(ResourceKindIdentifier::core("v1", ""))],
        );
        match set.validate() {
            Err(InputResourceError::Unsupported { owner, reason, .. }) => {
                assert_eq!(owner, "op");
                assert_eq!(reason, "resource is empty");
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_subresource() {
        let set = InputResourceSet::new().with_owner(
            "op",
            vec![ResourceSelector::all(ResourceKindIdentifier::core("v1", "pods/log"))],
        );
        assert!(matches!(
            set.validate(),
            Err(InputResourceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_empty_set() {
        let set = InputResourceSet::new();
        assert!(set.is_empty());
        assert_eq!(set.iter_selectors().count(), 0);
    }

    #[test]
    fn test_validate_rejects_empty_set() {
        assert!(matches!(InputResourceSet::new().validate(), Err(InputResourceError::Empty)));

        let no_selectors = InputResourceSet::new().with_owner("op", Vec::new());
        assert!(matches!(no_selectors.validate(), Err(InputResourceError::Empty)));
    }
}
