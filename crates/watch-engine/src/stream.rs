//! Watch stream provider and object cache.
//!
//! `WatchStreamProvider` is the seam between the registry and the actual
//! watch transport. The kube implementation runs a `watcher` per kind,
//! reflects it into a local store (the read-back cache used by the
//! reconciler), and translates watcher events through a
//! [`TombstoneTracker`].

use crate::error::WatchError;
use crate::kind::{gvk_string, ResolvedKind};
use crate::reference::Notification;
use crate::tombstone::TombstoneTracker;
use futures::{Stream, StreamExt};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Item produced by a watch stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An add/update/delete notification
    Notification(Notification),
    /// The stream's initial backfill is complete
    Hydrated,
}

/// Boxed watch stream, one per registered kind.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, WatchError>> + Send>>;

/// Creates watch streams for resolved kinds.
pub trait WatchStreamProvider: Send + Sync {
    /// Open the watch stream for `kind`.
    ///
    /// Called at most once per distinct kind by the registry.
    fn stream(&self, kind: &ResolvedKind) -> Result<NotificationStream, WatchError>;
}

/// Read-back cache of watched objects, keyed by kind.
#[derive(Clone, Default)]
pub struct ObjectCache {
    stores: Arc<RwLock<HashMap<GroupVersionKind, (ApiResource, Store<DynamicObject>)>>>,
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the store backing `gvk`.
    ///
    /// Fails if a store is already attached; one kind has exactly one stream.
    pub fn attach(&self, gvk: GroupVersionKind, api_resource: ApiResource, store: Store<DynamicObject>) -> Result<(), WatchError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.contains_key(&gvk) {
            return Err(WatchError::StreamRegistration {
                kind: gvk_string(&gvk),
                reason: "a stream is already registered for this kind".to_string(),
            });
        }
        stores.insert(gvk, (api_resource, store));
        Ok(())
    }

    /// Look up an object. `None` means not found (or kind not watched).
    pub fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Arc<DynamicObject>> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        let (api_resource, store) = stores.get(gvk)?;
        let mut obj_ref = ObjectRef::<DynamicObject>::new_with(name, api_resource.clone());
        if !namespace.is_empty() {
            obj_ref = obj_ref.within(namespace);
        }
        store.get(&obj_ref)
    }

    /// Whether a store is attached for `gvk`
    pub fn contains(&self, gvk: &GroupVersionKind) -> bool {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(gvk)
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ObjectCache")
            .field("kinds", &stores.keys().map(gvk_string).collect::<Vec<_>>())
            .finish()
    }
}

/// Watch streams backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeWatchProvider {
    client: Client,
    config: watcher::Config,
    cache: ObjectCache,
}

impl KubeWatchProvider {
    /// Create a provider watching all namespaces with the default watcher config
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: watcher::Config::default(),
            cache: ObjectCache::new(),
        }
    }

    /// Override the watcher config (label/field selectors, page size, ...)
    #[must_use]
    pub fn with_config(mut self, config: watcher::Config) -> Self {
        self.config = config;
        self
    }

    /// Cache populated by the streams this provider opens
    pub fn cache(&self) -> ObjectCache {
        self.cache.clone()
    }
}

impl fmt::Debug for KubeWatchProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeWatchProvider")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl WatchStreamProvider for KubeWatchProvider {
    fn stream(&self, kind: &ResolvedKind) -> Result<NotificationStream, WatchError> {
        info!("Opening watch stream for {}", kind);

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource);
        let writer = reflector::store::Writer::<DynamicObject>::new(kind.api_resource.clone());
        self.cache
            .attach(kind.gvk.clone(), kind.api_resource.clone(), writer.as_reader())?;

        let mut tracker = TombstoneTracker::new();
        let stream = reflector::reflector(writer, watcher(api, self.config.clone()).default_backoff())
            .map(move |result| match result {
                Ok(event) => tracker.observe(event).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(WatchError::Stream(e.to_string()))],
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}
