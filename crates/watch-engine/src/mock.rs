//! In-memory watch stream provider for tests.
//!
//! Each kind gets an unbounded channel; tests push notifications through
//! [`MockWatchProvider::emit`] and mark the backfill complete with
//! [`MockWatchProvider::hydrate`].

use crate::error::WatchError;
use crate::kind::{gvk_string, ResolvedKind};
use crate::reference::Notification;
use crate::stream::{NotificationStream, StreamEvent, WatchStreamProvider};
use kube::api::GroupVersionKind;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

type StreamItem = Result<StreamEvent, WatchError>;

#[derive(Debug)]
struct MockChannel {
    tx: Option<mpsc::UnboundedSender<StreamItem>>,
    rx: Option<mpsc::UnboundedReceiver<StreamItem>>,
}

impl MockChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }
}

/// Mock watch stream provider
#[derive(Debug, Default)]
pub struct MockWatchProvider {
    channels: Mutex<HashMap<GroupVersionKind, MockChannel>>,
    failing: Mutex<HashSet<GroupVersionKind>>,
    registrations: Mutex<Vec<GroupVersionKind>>,
}

impl MockWatchProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Make stream creation for `gvk` fail
    pub fn fail_on(&self, gvk: GroupVersionKind) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(gvk);
    }

    /// Sender feeding the stream of `gvk`. `None` once the stream was closed.
    pub fn sender(&self, gvk: &GroupVersionKind) -> Option<mpsc::UnboundedSender<StreamItem>> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.entry(gvk.clone()).or_insert_with(MockChannel::new).tx.clone()
    }

    /// Push a notification onto the stream of `gvk`
    pub fn emit(&self, gvk: &GroupVersionKind, notification: Notification) {
        self.send(gvk, Ok(StreamEvent::Notification(notification)));
    }

    /// Report the backfill of `gvk` complete
    pub fn hydrate(&self, gvk: &GroupVersionKind) {
        self.send(gvk, Ok(StreamEvent::Hydrated));
    }

    /// Push a transient stream error
    pub fn error(&self, gvk: &GroupVersionKind, message: &str) {
        self.send(gvk, Err(WatchError::Stream(message.to_string())));
    }

    /// End the stream of `gvk` once its buffered items are consumed
    pub fn close(&self, gvk: &GroupVersionKind) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.get_mut(gvk) {
            channel.tx = None;
        }
    }

    /// Kinds streams were opened for, in order
    pub fn registrations(&self) -> Vec<GroupVersionKind> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of streams opened for `gvk`
    pub fn registration_count(&self, gvk: &GroupVersionKind) -> usize {
        self.registrations()
            .iter()
            .filter(|registered| *registered == gvk)
            .count()
    }

    fn send(&self, gvk: &GroupVersionKind, item: StreamItem) {
        if let Some(tx) = self.sender(gvk) {
            // Receiver gone means the stream task ended; nothing left to feed
            let _ = tx.send(item);
        }
    }
}

impl WatchStreamProvider for MockWatchProvider {
    fn stream(&self, kind: &ResolvedKind) -> Result<NotificationStream, WatchError> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kind.gvk.clone());

        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind.gvk)
        {
            return Err(WatchError::StreamRegistration {
                kind: gvk_string(&kind.gvk),
                reason: "injected failure".to_string(),
            });
        }

        let rx = {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(kind.gvk.clone())
                .or_insert_with(MockChannel::new)
                .rx
                .take()
        };
        let rx = rx.ok_or_else(|| WatchError::StreamRegistration {
            kind: gvk_string(&kind.gvk),
            reason: "stream already opened".to_string(),
        })?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}
