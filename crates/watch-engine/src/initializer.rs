//! Input resource initializer.
//!
//! Owns the startup sequence of the engine: validate inputs, plan watches,
//! register streams, wait for the backfill and finally open the sync gate.
//! Construction hands back the [`SynchronizedSource`] the host drains.

use crate::dispatcher::{ChangeEvent, Dispatcher};
use crate::error::WatchError;
use crate::kind::KindResolver;
use crate::metrics;
use crate::registry::{Registration, WatchPlan, WatchRegistry};
use crate::source::SynchronizedSource;
use crate::stream::WatchStreamProvider;
use crate::sync::{sync_channel, SyncGate};
use input_resources::InputResourceSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default capacity of the event channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time allowed for the initial backfill
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

/// Startup tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializerOptions {
    /// Capacity of the bounded event channel (at least 1)
    pub channel_capacity: usize,
    /// Time allowed for every stream to report its cache hydrated
    pub sync_timeout: Duration,
}

impl Default for InitializerOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Drives watch registration for a fixed input resource set.
#[derive(Debug)]
pub struct InputResourceInitializer {
    inputs: Arc<InputResourceSet>,
    registry: WatchRegistry,
    plan: Arc<WatchPlan>,
    dispatcher: Dispatcher,
    gate: SyncGate,
    options: InitializerOptions,
}

impl InputResourceInitializer {
    /// Validate `inputs` and resolve every selector.
    ///
    /// Kind resolution runs here, so an unsatisfiable selector fails before
    /// anything is registered.
    pub fn new(
        inputs: Arc<InputResourceSet>,
        resolver: Arc<dyn KindResolver>,
        provider: Arc<dyn WatchStreamProvider>,
        options: InitializerOptions,
    ) -> Result<(Self, SynchronizedSource), WatchError> {
        inputs.validate()?;

        let registry = WatchRegistry::new(resolver, provider);
        let plan = Arc::new(registry.plan(&inputs)?);

        let (tx, rx) = mpsc::channel::<ChangeEvent>(options.channel_capacity.max(1));
        let dispatcher = Dispatcher::new(tx, &plan.filter_table());
        let (gate, synced) = sync_channel();

        let initializer = Self {
            inputs,
            registry,
            plan,
            dispatcher,
            gate,
            options,
        };
        Ok((initializer, SynchronizedSource::new(rx, synced)))
    }

    /// The deduplicated watch plan
    pub fn plan(&self) -> Arc<WatchPlan> {
        self.plan.clone()
    }

    /// The input resources being watched
    pub fn inputs(&self) -> Arc<InputResourceSet> {
        self.inputs.clone()
    }

    /// Register every stream and wait for the initial backfill.
    ///
    /// Marks the caches synced on success. On failure the sync gate is
    /// dropped, so waiters observe the abort instead of hanging. The returned
    /// registration must be kept alive for the streams to keep running.
    pub async fn start(self, cancel: CancellationToken) -> Result<Registration, WatchError> {
        let Self {
            registry,
            plan,
            dispatcher,
            gate,
            options,
            ..
        } = self;

        info!(
            "Starting input resource initializer: {} watch streams, channel capacity {}",
            plan.len(),
            options.channel_capacity
        );

        let mut registration = registry.register(&plan, &dispatcher, &cancel)?;
        // The dispatcher clones held by the stream tasks keep the channel open
        drop(dispatcher);

        if let Err(e) = registration.wait_hydrated(options.sync_timeout, &cancel).await {
            error!("Caches failed to sync: {}", e);
            return Err(e);
        }

        gate.mark_synced();
        metrics::set_caches_synced(true);
        info!("Caches synced for {} watch streams", registration.kinds().len());
        Ok(registration)
    }
}
