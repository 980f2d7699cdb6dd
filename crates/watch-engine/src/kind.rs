//! Kind resolution.
//!
//! A `KindResolver` maps a `ResourceKindIdentifier` (group/version/plural) to
//! a concrete, watchable kind. The resolved `ApiResource` doubles as the
//! dynamic type of `DynamicObject`, so "constructing an object of a runtime
//! kind" is an explicit factory call rather than a downcast.

use crate::error::WatchError;
use input_resources::ResourceKindIdentifier;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

/// A resource kind resolved against the cluster (or a static registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKind {
    /// Identifier the kind was resolved from
    pub id: ResourceKindIdentifier,
    /// Fully qualified group/version/kind
    pub gvk: GroupVersionKind,
    /// API resource used to build dynamic APIs and objects
    pub api_resource: ApiResource,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl ResolvedKind {
    /// Build a resolved kind from a discovered `ApiResource`
    pub fn new(id: ResourceKindIdentifier, api_resource: ApiResource, namespaced: bool) -> Self {
        let gvk = GroupVersionKind::gvk(&api_resource.group, &api_resource.version, &api_resource.kind);
        Self {
            id,
            gvk,
            api_resource,
            namespaced,
        }
    }

    /// Construct an empty object of this kind
    pub fn new_object(&self, name: &str) -> DynamicObject {
        DynamicObject::new(name, &self.api_resource)
    }
}

impl fmt::Display for ResolvedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&gvk_string(&self.gvk))
    }
}

/// Render a `GroupVersionKind` as `group/version, Kind=Kind` (`version, Kind=...` for core).
pub fn gvk_string(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}, Kind={}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind)
    }
}

/// Maps resource identifiers to watchable kinds.
pub trait KindResolver: Send + Sync {
    /// Resolve `id` to a concrete kind
    fn resolve(&self, id: &ResourceKindIdentifier) -> Result<ResolvedKind, WatchError>;
}

/// Resolver backed by a fixed table of typed factories.
///
/// Each entry is registered from a `k8s_openapi` type, so the kind, plural
/// and scope come from the type itself rather than from the cluster.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    kinds: HashMap<ResourceKindIdentifier, ResolvedKind>,
}

impl StaticResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver for the core kinds most input resources refer to
    pub fn builtin() -> Self {
        use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Secret, Service};

        Self::new()
            .register::<ConfigMap>()
            .register::<Secret>()
            .register::<Node>()
            .register::<Namespace>()
            .register::<Pod>()
            .register::<Service>()
    }

    /// Register the kind of `K`
    #[must_use]
    pub fn register<K>(mut self) -> Self
    where
        K: k8s_openapi::Resource,
        K::Scope: 'static,
    {
        let api_resource = ApiResource {
            group: K::GROUP.to_string(),
            version: K::VERSION.to_string(),
            api_version: K::API_VERSION.to_string(),
            kind: K::KIND.to_string(),
            plural: K::URL_PATH_SEGMENT.to_string(),
        };
        let namespaced = TypeId::of::<K::Scope>() == TypeId::of::<k8s_openapi::NamespaceResourceScope>();
        let id = ResourceKindIdentifier::new(K::GROUP, K::VERSION, K::URL_PATH_SEGMENT);
        self.kinds
            .insert(id.clone(), ResolvedKind::new(id, api_resource, namespaced));
        self
    }

    /// Register an already resolved kind (e.g. a custom resource)
    #[must_use]
    pub fn with_kind(mut self, kind: ResolvedKind) -> Self {
        self.kinds.insert(kind.id.clone(), kind);
        self
    }
}

impl KindResolver for StaticResolver {
    fn resolve(&self, id: &ResourceKindIdentifier) -> Result<ResolvedKind, WatchError> {
        self.kinds.get(id).cloned().ok_or_else(|| WatchError::UnknownKind {
            kind: id.to_string(),
            reason: "no matches for resource".to_string(),
        })
    }
}
