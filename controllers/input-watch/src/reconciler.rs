//! Reconciliation logic.
//!
//! Placeholder business logic: every reconcile reads the changed object back
//! from the watch cache and logs what it observed, together with the owners
//! whose selectors cover it.

use crate::error::ControllerError;
use std::sync::Arc;
use tracing::{error, info};
use watch_engine::{ObjectCache, ObjectKey, ReconcileKey, WatchPlan};

/// What a reconcile observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Object is in the cache
    Found {
        /// Object UID
        uid: Option<String>,
        /// Cached resource version
        resource_version: Option<String>,
    },
    /// Object is gone (deleted, or never existed)
    NotFound,
}

/// Reconciles one work-queue key.
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync {
    /// Reconcile `key`. Errors are retried with backoff.
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Observation, ControllerError>;
}

/// Logs the cached state of every reconciled object.
#[derive(Debug, Clone)]
pub struct Reconciler {
    cache: ObjectCache,
    plan: Arc<WatchPlan>,
}

impl Reconciler {
    /// Create a reconciler reading from `cache`
    pub fn new(cache: ObjectCache, plan: Arc<WatchPlan>) -> Self {
        Self { cache, plan }
    }
}

#[async_trait::async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Observation, ControllerError> {
        let object = ObjectKey::decode(key).map_err(|e| {
            error!("Refusing to reconcile undecodable key {}: {}", key, e);
            ControllerError::Watch(e)
        })?;

        let owners = self
            .plan
            .owners_matching(&object.gvk, &object.namespace, &object.name);

        let Some(obj) = self.cache.get(&object.gvk, &object.namespace, &object.name) else {
            info!("resource not found: {} (owners: {:?})", object, owners);
            return Ok(Observation::NotFound);
        };

        let uid = obj.metadata.uid.clone();
        let resource_version = obj.metadata.resource_version.clone();
        info!(
            "resource from cache: {} uid={} resourceVersion={} (owners: {:?})",
            object,
            uid.as_deref().unwrap_or("<none>"),
            resource_version.as_deref().unwrap_or("<none>"),
            owners
        );
        Ok(Observation::Found { uid, resource_version })
    }
}
