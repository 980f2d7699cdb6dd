//! Event dispatcher.
//!
//! Fan-in point for every watch stream. Each notification is normalized,
//! checked against the filters registered for its kind, and forwarded at most
//! once onto the bounded event channel.

use crate::filter::EventFilter;
use crate::kind::gvk_string;
use crate::metrics;
use crate::reference::{ChangeAction, NormalizedReference, Notification};
use kube::api::GroupVersionKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Change forwarded to the reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Object that changed
    pub reference: NormalizedReference,
    /// Owner whose selector matched first
    pub owner: String,
    /// What happened to the object
    pub action: ChangeAction,
}

/// Result of dispatching one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to the event channel
    Forwarded,
    /// No filter of the kind matched
    Filtered,
    /// Kind has no filters at all
    NoFilters,
    /// Notification could not be normalized
    Malformed,
    /// Event channel receiver is gone
    Closed,
}

impl DispatchOutcome {
    /// Metric label for this outcome
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::Filtered => "filtered",
            Self::NoFilters => "no_filters",
            Self::Malformed => "malformed",
            Self::Closed => "closed",
        }
    }
}

/// Filters notifications per kind and forwards matches onto the event channel.
///
/// The filter table is copied in at construction and never mutated, so
/// clones can be handed to every stream task without locking.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    events: mpsc::Sender<ChangeEvent>,
    filters: Arc<HashMap<GroupVersionKind, Vec<EventFilter>>>,
}

impl Dispatcher {
    /// Create a dispatcher writing to `events`
    pub fn new(events: mpsc::Sender<ChangeEvent>, filters: &HashMap<GroupVersionKind, Vec<EventFilter>>) -> Self {
        Self {
            events,
            filters: Arc::new(filters.clone()),
        }
    }

    /// Filters registered for `kind`, in registration order
    pub fn filters_for(&self, kind: &GroupVersionKind) -> &[EventFilter] {
        self.filters.get(kind).map_or(&[], Vec::as_slice)
    }

    /// Handle one notification for `kind`.
    ///
    /// Waits for channel capacity when the channel is full; a slow consumer
    /// throttles the calling stream instead of dropping events. Never fails:
    /// malformed notifications are logged and dropped.
    pub async fn handle(&self, kind: &GroupVersionKind, notification: Notification) -> DispatchOutcome {
        let outcome = self.dispatch(kind, notification).await;
        metrics::record_event(outcome.as_str());
        outcome
    }

    async fn dispatch(&self, kind: &GroupVersionKind, notification: Notification) -> DispatchOutcome {
        let reference = match notification.normalize(Some(kind)) {
            Ok(reference) => reference,
            Err(e) => {
                error!("Dropping {} notification for {}: {}", action_name(notification.action()), gvk_string(kind), e);
                return DispatchOutcome::Malformed;
            }
        };

        let filters = self.filters_for(kind);
        if filters.is_empty() {
            warn!("No filters registered for {}, dropping {}", gvk_string(kind), reference.namespaced_name());
            return DispatchOutcome::NoFilters;
        }

        let Some(filter) = filters.iter().find(|f| f.matches(&reference)) else {
            return DispatchOutcome::Filtered;
        };

        debug!(
            "Forwarding {} {} {} for owner {}",
            action_name(notification.action()),
            gvk_string(kind),
            reference.namespaced_name(),
            filter.owner()
        );
        let event = ChangeEvent {
            reference,
            owner: filter.owner().to_string(),
            action: notification.action(),
        };
        match self.events.send(event).await {
            Ok(()) => DispatchOutcome::Forwarded,
            Err(_) => DispatchOutcome::Closed,
        }
    }
}

fn action_name(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Added => "add",
        ChangeAction::Updated => "update",
        ChangeAction::Deleted => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::DeletedObject;
    use input_resources::{ResourceKindIdentifier, ResourceSelector};
    use kube::api::{ApiResource, DynamicObject};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn configmap_gvk() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "ConfigMap")
    }

    fn configmap(namespace: &str, name: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk_with_plural(&configmap_gvk(), "configmaps");
        DynamicObject::new(name, &ar).within(namespace)
    }

    fn selector(namespace: Option<&str>, name: Option<&str>) -> ResourceSelector {
        ResourceSelector::new(ResourceKindIdentifier::core("v1", "configmaps"), namespace, name)
    }

    fn dispatcher(filters: Vec<EventFilter>, capacity: usize) -> (Dispatcher, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let mut table = HashMap::new();
        table.insert(configmap_gvk(), filters);
        (Dispatcher::new(tx, &table), rx)
    }

    #[tokio::test]
    async fn test_matching_object_is_forwarded() {
        let (dispatcher, mut rx) = dispatcher(
            vec![EventFilter::new("op", selector(Some("kube-system"), Some("kube-root-ca.crt")))],
            8,
        );

        let outcome = dispatcher
            .handle(&configmap_gvk(), Notification::Added(configmap("kube-system", "kube-root-ca.crt")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Forwarded);

        let event = rx.recv().await.expect("event forwarded");
        assert_eq!(event.owner, "op");
        assert_eq!(event.action, ChangeAction::Added);
        assert_eq!(event.reference.name, "kube-root-ca.crt");
        assert_eq!(event.reference.kind, Some(configmap_gvk()));
    }

    #[tokio::test]
    async fn test_non_matching_object_is_filtered() {
        let (dispatcher, mut rx) = dispatcher(
            vec![EventFilter::new("op", selector(Some("kube-system"), Some("kube-root-ca.crt")))],
            8,
        );
        let outcome = dispatcher
            .handle(&configmap_gvk(), Notification::Updated(configmap("kube-system", "other")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Filtered);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_kind_fails_closed() {
        let (dispatcher, mut rx) = dispatcher(vec![EventFilter::new("op", selector(None, None))], 8);
        let secret_gvk = GroupVersionKind::gvk("", "v1", "Secret");
        let outcome = dispatcher
            .handle(&secret_gvk, Notification::Added(configmap("kube-system", "x")))
            .await;
        assert_eq!(outcome, DispatchOutcome::NoFilters);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_filters_forward_once() {
        let (dispatcher, mut rx) = dispatcher(
            vec![
                EventFilter::new("first", selector(Some("kube-system"), None)),
                EventFilter::new("second", selector(None, Some("kube-root-ca.crt"))),
            ],
            8,
        );
        dispatcher
            .handle(&configmap_gvk(), Notification::Added(configmap("kube-system", "kube-root-ca.crt")))
            .await;

        let event = rx.recv().await.expect("event forwarded");
        assert_eq!(event.owner, "first");
        assert!(rx.try_recv().is_err(), "a change is forwarded at most once");
    }

    #[tokio::test]
    async fn test_wildcard_forwards_everything() {
        let (dispatcher, mut rx) = dispatcher(vec![EventFilter::new("op", selector(None, None))], 8);
        for (ns, name) in [("a", "one"), ("b", "two"), ("kube-system", "three")] {
            let outcome = dispatcher
                .handle(&configmap_gvk(), Notification::Added(configmap(ns, name)))
                .await;
            assert_eq!(outcome, DispatchOutcome::Forwarded);
        }
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.reference.name);
        }
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_malformed_tombstone_is_dropped() {
        let (dispatcher, mut rx) = dispatcher(vec![EventFilter::new("op", selector(None, None))], 8);
        let outcome = dispatcher
            .handle(
                &configmap_gvk(),
                Notification::Deleted(DeletedObject::FinalStateUnknown {
                    key: "kube-system/gone".to_string(),
                    last_known: None,
                }),
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Malformed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tombstone_delete_is_forwarded() {
        let (dispatcher, mut rx) = dispatcher(
            vec![EventFilter::new("op", selector(Some("kube-system"), Some("kube-root-ca.crt")))],
            8,
        );
        let outcome = dispatcher
            .handle(
                &configmap_gvk(),
                Notification::Deleted(DeletedObject::FinalStateUnknown {
                    key: "kube-system/kube-root-ca.crt".to_string(),
                    last_known: Some(configmap("kube-system", "kube-root-ca.crt")),
                }),
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Forwarded);
        let event = rx.recv().await.expect("event forwarded");
        assert_eq!(event.action, ChangeAction::Deleted);
    }

    #[tokio::test]
    async fn test_full_channel_blocks_then_delivers_in_order() {
        let (dispatcher, mut rx) = dispatcher(vec![EventFilter::new("op", selector(None, None))], 1);

        dispatcher
            .handle(&configmap_gvk(), Notification::Added(configmap("ns", "first")))
            .await;

        let blocked = dispatcher.clone();
        let mut pending = tokio::spawn(async move {
            blocked
                .handle(&configmap_gvk(), Notification::Added(configmap("ns", "second")))
                .await
        });

        // Channel is at capacity: the second send must not complete
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut pending).await.is_err(),
            "send should block while the channel is full"
        );

        assert_eq!(rx.recv().await.expect("first").reference.name, "first");
        let outcome = pending.await.expect("task completes");
        assert_eq!(outcome, DispatchOutcome::Forwarded);
        assert_eq!(rx.recv().await.expect("second").reference.name, "second");
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (dispatcher, rx) = dispatcher(vec![EventFilter::new("op", selector(None, None))], 1);
        drop(rx);
        let outcome = dispatcher
            .handle(&configmap_gvk(), Notification::Added(configmap("ns", "x")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Closed);
    }

    #[test]
    fn test_filters_are_copied_at_construction() {
        let (tx, _rx) = mpsc::channel(1);
        let mut table = HashMap::new();
        table.insert(configmap_gvk(), vec![EventFilter::new("op", selector(None, None))]);
        let dispatcher = Dispatcher::new(tx, &table);

        table.clear();
        assert_eq!(dispatcher.filters_for(&configmap_gvk()).len(), 1);
    }
}
