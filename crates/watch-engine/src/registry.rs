//! Watch registry.
//!
//! Registration happens in two phases:
//!
//! 1. [`WatchRegistry::plan`] resolves every selector and deduplicates by
//!    resolved kind. N selectors become M <= N planned watches, each carrying
//!    the filters of every selector that resolved to it.
//! 2. [`WatchRegistry::register`] opens exactly one stream per planned watch
//!    and spawns a task pumping it into the [`Dispatcher`].
//!
//! Any resolution or stream registration failure aborts the whole set.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::WatchError;
use crate::filter::EventFilter;
use crate::kind::{gvk_string, KindResolver, ResolvedKind};
use crate::metrics;
use crate::stream::{NotificationStream, StreamEvent, WatchStreamProvider};
use futures::StreamExt;
use input_resources::InputResourceSet;
use kube::api::GroupVersionKind;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One distinct kind to watch, with every filter that targets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWatch {
    /// Resolved kind
    pub kind: ResolvedKind,
    /// Filters in selector declaration order
    pub filters: Vec<EventFilter>,
}

/// Deduplicated set of watches derived from the input resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchPlan {
    watches: Vec<PlannedWatch>,
}

impl WatchPlan {
    /// Planned watches in first-seen order
    pub fn watches(&self) -> &[PlannedWatch] {
        &self.watches
    }

    /// Number of distinct kinds
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether nothing is watched
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Planned watch for `gvk`
    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&PlannedWatch> {
        self.watches.iter().find(|w| &w.kind.gvk == gvk)
    }

    /// Per-kind filter table handed to the dispatcher
    pub fn filter_table(&self) -> HashMap<GroupVersionKind, Vec<EventFilter>> {
        self.watches
            .iter()
            .map(|w| (w.kind.gvk.clone(), w.filters.clone()))
            .collect()
    }

    /// Every owner with a selector matching the object, without duplicates
    pub fn owners_matching(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Vec<&str> {
        let mut owners: Vec<&str> = Vec::new();
        if let Some(watch) = self.get(gvk) {
            for filter in &watch.filters {
                if filter.selector().matches(namespace, name) && !owners.contains(&filter.owner()) {
                    owners.push(filter.owner());
                }
            }
        }
        owners
    }
}

/// Resolves selectors and registers one watch stream per distinct kind.
#[derive(Clone)]
pub struct WatchRegistry {
    resolver: Arc<dyn KindResolver>,
    provider: Arc<dyn WatchStreamProvider>,
}

impl WatchRegistry {
    /// Create a registry
    pub fn new(resolver: Arc<dyn KindResolver>, provider: Arc<dyn WatchStreamProvider>) -> Self {
        Self { resolver, provider }
    }

    /// Resolve and deduplicate every selector of `inputs`.
    ///
    /// Fails on the first selector whose kind cannot be resolved, naming the
    /// selector and its owner.
    pub fn plan(&self, inputs: &InputResourceSet) -> Result<WatchPlan, WatchError> {
        let mut registered: HashSet<GroupVersionKind> = HashSet::new();
        let mut watches: Vec<PlannedWatch> = Vec::new();

        for (owner, selector) in inputs.iter_selectors() {
            let kind = self
                .resolver
                .resolve(&selector.kind)
                .map_err(|e| WatchError::KindResolution {
                    owner: owner.to_string(),
                    selector: selector.to_string(),
                    reason: e.to_string(),
                })?;
            let filter = EventFilter::new(owner, selector.clone());

            if registered.insert(kind.gvk.clone()) {
                debug!("Planning watch for {} ({})", kind, selector);
                watches.push(PlannedWatch {
                    kind,
                    filters: vec![filter],
                });
            } else {
                info!("gvk {} already registered, reusing its watch for {}", kind, selector);
                metrics::increment_duplicate_selectors();
                if let Some(existing) = watches.iter_mut().find(|w| w.kind.gvk == kind.gvk) {
                    existing.filters.push(filter);
                }
            }
        }

        info!(
            "Planned {} watch streams for {} selectors",
            watches.len(),
            inputs.selector_count()
        );
        Ok(WatchPlan { watches })
    }

    /// Open one stream per planned watch and start pumping it into `dispatcher`.
    ///
    /// Checks `cancel` before each kind. On error, streams already started
    /// are aborted when the partial registration is dropped.
    pub fn register(
        &self,
        plan: &WatchPlan,
        dispatcher: &Dispatcher,
        cancel: &CancellationToken,
    ) -> Result<Registration, WatchError> {
        let mut registration = Registration::default();

        for watch in plan.watches() {
            if cancel.is_cancelled() {
                info!("Registration cancelled before {}", watch.kind);
                return Err(WatchError::Cancelled);
            }

            let stream = self.provider.stream(&watch.kind)?;
            let gvk = watch.kind.gvk.clone();
            let (hydrated_tx, hydrated_rx) = oneshot::channel();
            registration.tasks.spawn(pump(
                gvk.clone(),
                stream,
                dispatcher.clone(),
                hydrated_tx,
                cancel.clone(),
            ));
            registration.hydrated.push((gvk.clone(), hydrated_rx));
            registration.kinds.push(gvk);
            info!("Registered watch stream for {}", watch.kind);
        }

        metrics::set_registered_streams(registration.kinds.len());
        Ok(registration)
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry").finish_non_exhaustive()
    }
}

/// Running watch streams. Dropping it aborts every stream task.
#[derive(Debug, Default)]
pub struct Registration {
    kinds: Vec<GroupVersionKind>,
    hydrated: Vec<(GroupVersionKind, oneshot::Receiver<()>)>,
    tasks: JoinSet<()>,
}

impl Registration {
    /// Kinds with a running stream, in registration order
    pub fn kinds(&self) -> &[GroupVersionKind] {
        &self.kinds
    }

    /// Wait until every stream reported its backfill complete.
    ///
    /// Fails with `StreamClosed` if a stream ends first, `SyncTimeout` after
    /// `timeout`, and `Cancelled` if `cancel` fires. Only the first call
    /// waits; later calls return immediately.
    pub async fn wait_hydrated(&mut self, timeout: Duration, cancel: &CancellationToken) -> Result<(), WatchError> {
        let pending = std::mem::take(&mut self.hydrated);
        let all_hydrated = async move {
            for (gvk, hydrated) in pending {
                hydrated
                    .await
                    .map_err(|_| WatchError::StreamClosed(gvk_string(&gvk)))?;
                debug!("Cache for {} synced", gvk_string(&gvk));
            }
            Ok::<(), WatchError>(())
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WatchError::Cancelled),
            result = tokio::time::timeout(timeout, all_hydrated) => {
                result.unwrap_or_else(|_| Err(WatchError::SyncTimeout(timeout)))
            }
        }
    }

    /// Wait for every stream task to finish (after cancellation or channel close)
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("Watch stream task panicked: {}", e);
                }
            }
        }
    }
}

async fn pump(
    gvk: GroupVersionKind,
    mut stream: NotificationStream,
    dispatcher: Dispatcher,
    hydrated: oneshot::Sender<()>,
    cancel: CancellationToken,
) {
    let mut hydrated = Some(hydrated);
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            item = stream.next() => item,
        };

        match item {
            Some(Ok(StreamEvent::Notification(notification))) => {
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    outcome = dispatcher.handle(&gvk, notification) => outcome,
                };
                if outcome == DispatchOutcome::Closed {
                    info!("Event channel closed, stopping watch stream for {}", gvk_string(&gvk));
                    return;
                }
            }
            Some(Ok(StreamEvent::Hydrated)) => {
                if let Some(tx) = hydrated.take() {
                    debug!("Watch stream for {} hydrated", gvk_string(&gvk));
                    let _ = tx.send(());
                }
            }
            Some(Err(e)) => {
                warn!("Watch stream for {} reported an error: {}", gvk_string(&gvk), e);
                metrics::increment_stream_errors();
            }
            None => {
                warn!("Watch stream for {} ended", gvk_string(&gvk));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ChangeEvent;
    use crate::kind::StaticResolver;
    use crate::mock::MockWatchProvider;
    use crate::reference::Notification;
    use input_resources::{ResourceKindIdentifier, ResourceSelector};
    use kube::api::{ApiResource, DynamicObject};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn configmaps() -> ResourceKindIdentifier {
        ResourceKindIdentifier::core("v1", "configmaps")
    }

    fn configmap_gvk() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "ConfigMap")
    }

    fn configmap(namespace: &str, name: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk_with_plural(&configmap_gvk(), "configmaps");
        DynamicObject::new(name, &ar).within(namespace)
    }

    fn scenario_inputs() -> InputResourceSet {
        InputResourceSet::new().with_owner(
            "cluster-authentication-operator",
            vec![
                ResourceSelector::new(configmaps(), Some("kube-system"), Some("kube-root-ca.crt")),
                ResourceSelector::new(
                    ResourceKindIdentifier::core("v1", "secrets"),
                    Some("kube-system"),
                    Some("bootstrap-token-abcdef"),
                ),
                ResourceSelector::new(ResourceKindIdentifier::core("v1", "nodes"), None, Some("kind-control-plane")),
            ],
        )
    }

    fn registry(provider: &Arc<MockWatchProvider>) -> WatchRegistry {
        WatchRegistry::new(Arc::new(StaticResolver::builtin()), provider.clone())
    }

    fn dispatcher_for(plan: &WatchPlan, capacity: usize) -> (Dispatcher, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Dispatcher::new(tx, &plan.filter_table()), rx)
    }

    #[test]
    fn test_plan_deduplicates_by_kind() {
        let provider = Arc::new(MockWatchProvider::new());
        let inputs = InputResourceSet::builtin();
        let plan = registry(&provider).plan(&inputs).expect("plan");

        // Two configmap selectors, one secret, one node
        assert_eq!(plan.len(), 3);
        let configmap_watch = plan.get(&configmap_gvk()).expect("configmap watch");
        assert_eq!(configmap_watch.filters.len(), 2);
        assert_eq!(
            configmap_watch.filters[0].selector().name.as_deref(),
            Some("kube-root-ca.crt")
        );
        assert_eq!(configmap_watch.filters[1].selector().name.as_deref(), Some("kubeadm-config"));
    }

    #[test]
    fn test_plan_deduplicates_across_owners() {
        let provider = Arc::new(MockWatchProvider::new());
        let inputs = InputResourceSet::new()
            .with_owner("a", vec![ResourceSelector::all(configmaps())])
            .with_owner("b", vec![ResourceSelector::new(configmaps(), Some("ns"), None)]);
        let plan = registry(&provider).plan(&inputs).expect("plan");

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.owners_matching(&configmap_gvk(), "ns", "x"), vec!["a", "b"]);
        assert_eq!(plan.owners_matching(&configmap_gvk(), "other", "x"), vec!["a"]);
        assert!(plan
            .owners_matching(&GroupVersionKind::gvk("", "v1", "Secret"), "ns", "x")
            .is_empty());
    }

    #[test]
    fn test_unresolvable_selector_aborts_plan() {
        let provider = Arc::new(MockWatchProvider::new());
        let inputs = InputResourceSet::new().with_owner(
            "op",
            vec![
                ResourceSelector::all(configmaps()),
                ResourceSelector::all(ResourceKindIdentifier::new("example.com", "v1", "widgets")),
            ],
        );
        let err = registry(&provider).plan(&inputs).unwrap_err();
        match err {
            WatchError::KindResolution { owner, selector, .. } => {
                assert_eq!(owner, "op");
                assert!(selector.contains("widgets"), "selector named in error: {selector}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_scenario_registers_three_streams_and_filters() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let plan = registry.plan(&scenario_inputs()).expect("plan");
        let (dispatcher, mut rx) = dispatcher_for(&plan, 8);
        let cancel = CancellationToken::new();

        let mut registration = registry.register(&plan, &dispatcher, &cancel).expect("register");
        assert_eq!(provider.registrations().len(), 3);
        assert_eq!(registration.kinds().len(), 3);

        for watch in plan.watches() {
            provider.hydrate(&watch.kind.gvk);
        }
        registration
            .wait_hydrated(Duration::from_secs(5), &cancel)
            .await
            .expect("hydrated");

        provider.emit(&configmap_gvk(), Notification::Added(configmap("kube-system", "other")));
        provider.emit(
            &configmap_gvk(),
            Notification::Updated(configmap("kube-system", "kube-root-ca.crt")),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.reference.name, "kube-root-ca.crt");
        assert_eq!(event.owner, "cluster-authentication-operator");
        assert!(rx.try_recv().is_err(), "configmap `other` must not be forwarded");

        cancel.cancel();
        registration.join().await;
    }

    #[tokio::test]
    async fn test_duplicate_selectors_share_one_stream() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let plan = registry.plan(&InputResourceSet::builtin()).expect("plan");
        let (dispatcher, _rx) = dispatcher_for(&plan, 8);

        let registration = registry
            .register(&plan, &dispatcher, &CancellationToken::new())
            .expect("register");
        assert_eq!(provider.registration_count(&configmap_gvk()), 1);
        assert_eq!(registration.kinds().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_failure_is_fatal() {
        let provider = Arc::new(MockWatchProvider::new());
        provider.fail_on(GroupVersionKind::gvk("", "v1", "Secret"));
        let registry = registry(&provider);
        let plan = registry.plan(&scenario_inputs()).expect("plan");
        let (dispatcher, _rx) = dispatcher_for(&plan, 8);

        let err = registry
            .register(&plan, &dispatcher, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, WatchError::StreamRegistration { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_registration_opens_no_streams() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let plan = registry.plan(&scenario_inputs()).expect("plan");
        let (dispatcher, _rx) = dispatcher_for(&plan, 8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = registry.register(&plan, &dispatcher, &cancel).unwrap_err();
        assert!(matches!(err, WatchError::Cancelled));
        assert!(provider.registrations().is_empty());
    }

    #[tokio::test]
    async fn test_wait_hydrated_times_out() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let plan = registry.plan(&scenario_inputs()).expect("plan");
        let (dispatcher, _rx) = dispatcher_for(&plan, 8);
        let cancel = CancellationToken::new();
        let mut registration = registry.register(&plan, &dispatcher, &cancel).expect("register");

        // Only one of three streams hydrates
        provider.hydrate(&configmap_gvk());
        let err = registration
            .wait_hydrated(Duration::from_millis(50), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::SyncTimeout(_)));
    }

    #[tokio::test]
    async fn test_stream_closing_before_hydration_fails_sync() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let inputs = InputResourceSet::new().with_owner("op", vec![ResourceSelector::all(configmaps())]);
        let plan = registry.plan(&inputs).expect("plan");
        let (dispatcher, _rx) = dispatcher_for(&plan, 8);
        let cancel = CancellationToken::new();
        let mut registration = registry.register(&plan, &dispatcher, &cancel).expect("register");

        provider.close(&configmap_gvk());
        let err = registration
            .wait_hydrated(Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::StreamClosed(_)));
    }

    #[tokio::test]
    async fn test_stream_errors_do_not_stop_the_stream() {
        let provider = Arc::new(MockWatchProvider::new());
        let registry = registry(&provider);
        let inputs = InputResourceSet::new().with_owner("op", vec![ResourceSelector::all(configmaps())]);
        let plan = registry.plan(&inputs).expect("plan");
        let (dispatcher, mut rx) = dispatcher_for(&plan, 8);
        let cancel = CancellationToken::new();
        let _registration = registry.register(&plan, &dispatcher, &cancel).expect("register");

        provider.error(&configmap_gvk(), "connection reset");
        provider.emit(&configmap_gvk(), Notification::Added(configmap("ns", "after-error")));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.reference.name, "after-error");
    }
}
