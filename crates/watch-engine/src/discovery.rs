//! Kind resolution from cluster API discovery.

use crate::error::WatchError;
use crate::kind::{KindResolver, ResolvedKind};
use input_resources::ResourceKindIdentifier;
use kube::Client;
use kube::discovery::{verbs, Discovery, Scope};
use std::collections::HashMap;
use tracing::{debug, info};

/// Resolver populated by a single run of the Kubernetes discovery API.
///
/// Discovery runs once in [`DiscoveryResolver::discover`]; every later
/// `resolve` is a map lookup. Holding a `DiscoveryResolver` therefore means
/// the API server has answered at least once, which is the readiness
/// dependency watch registration waits on.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResolver {
    kinds: HashMap<ResourceKindIdentifier, Discovered>,
}

#[derive(Debug, Clone)]
struct Discovered {
    kind: ResolvedKind,
    watchable: bool,
}

impl DiscoveryResolver {
    /// Run API discovery against the cluster
    pub async fn discover(client: Client) -> Result<Self, WatchError> {
        info!("Running API discovery");
        let discovery = Discovery::new(client).run().await?;

        let mut kinds = HashMap::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (ar, caps) in group.versioned_resources(version) {
                    // Subresources (pods/log, ...) are never watch targets
                    if ar.plural.contains('/') {
                        continue;
                    }
                    let id = ResourceKindIdentifier::new(&ar.group, &ar.version, &ar.plural);
                    let watchable = caps.supports_operation(verbs::WATCH);
                    let namespaced = caps.scope == Scope::Namespaced;
                    kinds.insert(
                        id.clone(),
                        Discovered {
                            kind: ResolvedKind::new(id, ar, namespaced),
                            watchable,
                        },
                    );
                }
            }
        }

        info!("API discovery found {} resource kinds", kinds.len());
        Ok(Self { kinds })
    }

    /// Number of discovered resource kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// True when discovery returned nothing
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl KindResolver for DiscoveryResolver {
    fn resolve(&self, id: &ResourceKindIdentifier) -> Result<ResolvedKind, WatchError> {
        let discovered = self.kinds.get(id).ok_or_else(|| WatchError::UnknownKind {
            kind: id.to_string(),
            reason: "no matches for resource".to_string(),
        })?;
        if !discovered.watchable {
            return Err(WatchError::UnknownKind {
                kind: id.to_string(),
                reason: "resource does not support watch".to_string(),
            });
        }
        debug!("Resolved {} to {}", id, discovered.kind);
        Ok(discovered.kind.clone())
    }
}
