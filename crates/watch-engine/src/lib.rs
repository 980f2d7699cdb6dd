//! Dynamic Watch Engine
//!
//! Turns a declarative set of resource selectors into deduplicated Kubernetes
//! watch streams and forwards the matching changes to a reconciliation loop.
//!
//! Data flow:
//!
//! ```text
//! selectors -> KindResolver -> WatchRegistry (dedup + register)
//!           -> watch streams -> Dispatcher (normalize + filter)
//!           -> bounded channel -> SynchronizedSource -> WorkQueue
//! ```
//!
//! - One watch stream is registered per distinct resolved kind, no matter how
//!   many selectors target it.
//! - The dispatcher forwards a change at most once (first matching filter
//!   wins) and blocks the producing stream when the event channel is full.
//! - The host waits on [`SynchronizedSource::wait_for_sync`] before it starts
//!   reconciling, so it never observes a half-filled cache.

pub mod codec;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod initializer;
pub mod kind;
pub mod metrics;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod reference;
pub mod registry;
pub mod source;
pub mod stream;
pub mod sync;
pub mod tombstone;

pub use codec::{ObjectKey, ReconcileKey};
pub use discovery::DiscoveryResolver;
pub use dispatcher::{ChangeEvent, DispatchOutcome, Dispatcher};
pub use error::WatchError;
pub use filter::EventFilter;
pub use initializer::{InitializerOptions, InputResourceInitializer};
pub use kind::{KindResolver, ResolvedKind, StaticResolver};
pub use reference::{ChangeAction, DeletedObject, NormalizedReference, Notification};
pub use registry::{PlannedWatch, Registration, WatchPlan, WatchRegistry};
pub use source::{SynchronizedSource, WorkQueue};
pub use stream::{KubeWatchProvider, NotificationStream, ObjectCache, StreamEvent, WatchStreamProvider};
pub use sync::{sync_channel, SyncGate, SyncState, SyncedSignal};
pub use tombstone::TombstoneTracker;

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockWatchProvider;
