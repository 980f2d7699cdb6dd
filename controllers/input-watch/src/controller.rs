//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the watch engine
//! to the work queue and the reconciler:
//!
//! - the synchronized source drains watch events into the work queue
//! - the initializer registers the watch streams and waits for the backfill
//! - the reconcile worker starts only once the caches are synced
//! - ctrl-c cancels everything through one `CancellationToken`

use crate::backoff::{FibonacciBackoff, KeyBackoff};
use crate::config::{ControllerConfig, ResolverMode};
use crate::error::ControllerError;
use crate::metrics;
use crate::queue::DedupQueue;
use crate::reconciler::{Reconcile, Reconciler};
use crate::server::{start_server, ServerState};
use input_resources::InputResourceSet;
use kube::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use watch_engine::{
    DiscoveryResolver, InitializerOptions, InputResourceInitializer, KindResolver, KubeWatchProvider,
    StaticResolver, SynchronizedSource, WatchError,
};

/// Main controller for input resource watching.
pub struct Controller {
    config: ControllerConfig,
    initializer: InputResourceInitializer,
    source: SynchronizedSource,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Loads the input resources, connects to the API server and resolves
    /// every selector. The API server is reachable and discovery has
    /// completed before any watch is registered.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Input Watch Controller");

        let inputs = match &config.input_resources_file {
            Some(path) => {
                info!("Loading input resources from {}", path.display());
                InputResourceSet::from_yaml_file(path)?
            }
            None => {
                info!("No INPUT_RESOURCES_FILE set, using built-in input resources");
                InputResourceSet::builtin()
            }
        };
        for owner in inputs.owners() {
            info!("  Owner {}:", owner);
            for selector in inputs.resources(owner).map(|r| r.exact_resources.as_slice()).unwrap_or_default() {
                info!("    {}", selector);
            }
        }

        // Create Kubernetes client
        let client = Client::try_default().await?;

        let resolver: Arc<dyn KindResolver> = match config.kind_resolver {
            ResolverMode::Discovery => {
                let resolver = DiscoveryResolver::discover(client.clone()).await?;
                info!("Discovered {} watchable resource kinds", resolver.len());
                Arc::new(resolver)
            }
            ResolverMode::Static => Arc::new(StaticResolver::builtin()),
        };

        let provider = KubeWatchProvider::new(client);
        let cache = provider.cache();

        let options = InitializerOptions {
            channel_capacity: config.event_channel_capacity,
            sync_timeout: config.cache_sync_timeout,
        };
        let (initializer, source) =
            InputResourceInitializer::new(Arc::new(inputs), resolver, Arc::new(provider), options)?;
        let reconciler = Arc::new(Reconciler::new(cache, initializer.plan()));

        Ok(Self {
            config,
            initializer,
            source,
            reconciler,
        })
    }

    /// Run until ctrl-c or until a startup/background failure.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Input Watch Controller running");
        let Self {
            config,
            initializer,
            source,
            reconciler,
        } = self;

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received ctrl-c, shutting down");
                }
                cancel.cancel();
            });
        }

        if let Some(port) = config.metrics_port {
            let state = Arc::new(ServerState {
                synced: source.synced(),
            });
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = start_server(port, state, cancel).await {
                    error!("HTTP server error: {}", e);
                }
            });
        }

        let backoff = Arc::new(KeyBackoff::new(FibonacciBackoff::new(
            config.backoff_min,
            config.backoff_max,
        )));
        run_pipeline(
            initializer,
            source,
            reconciler,
            Arc::new(DedupQueue::new()),
            backoff,
            cancel,
        )
        .await
    }
}

/// Start the engine and the reconcile worker, then wait for shutdown.
pub(crate) async fn run_pipeline(
    initializer: InputResourceInitializer,
    source: SynchronizedSource,
    reconciler: Arc<dyn Reconcile>,
    queue: Arc<DedupQueue>,
    backoff: Arc<KeyBackoff>,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    let synced = source.synced();

    // The source must drain the channel while the backfill runs
    let mut source_task = tokio::spawn(source.start(queue.clone(), cancel.clone()));
    let init_task = tokio::spawn(initializer.start(cancel.clone()));

    if let Err(e) = synced.wait(&cancel).await {
        info!("Caches did not sync: {}", e);
        cancel.cancel();
        let startup = init_task
            .await
            .map_err(|e| ControllerError::Task(format!("initializer panicked: {e}")))?;
        if !source_task.is_finished() {
            let _ = source_task.await;
        }
        return match startup {
            Ok(_) | Err(WatchError::Cancelled) => {
                info!("Shutdown requested before caches synced");
                Ok(())
            }
            Err(err) => {
                error!("Startup failed: {}", err);
                Err(err.into())
            }
        };
    }

    let registration = init_task
        .await
        .map_err(|e| ControllerError::Task(format!("initializer panicked: {e}")))??;
    info!("Caches synced, starting reconcile worker");
    let mut worker = tokio::spawn(worker_loop(queue.clone(), reconciler, backoff));

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!("Shutdown requested");
            Ok(())
        }
        result = &mut source_task => match result {
            Ok(Ok(())) => Err(ControllerError::Task("synchronized source stopped".to_string())),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(ControllerError::Task(format!("synchronized source panicked: {e}"))),
        },
        result = &mut worker => Err(ControllerError::Task(match result {
            Ok(()) => "reconcile worker stopped".to_string(),
            Err(e) => format!("reconcile worker panicked: {e}"),
        })),
    };

    cancel.cancel();
    queue.shutdown();
    wait_unfinished(source_task).await;
    wait_unfinished(worker).await;
    registration.join().await;
    info!("Input Watch Controller stopped");
    outcome
}

/// Reconcile keys until the queue shuts down.
pub(crate) async fn worker_loop(queue: Arc<DedupQueue>, reconciler: Arc<dyn Reconcile>, backoff: Arc<KeyBackoff>) {
    while let Some(key) = queue.next().await {
        let started = Instant::now();
        let result = reconciler.reconcile(&key).await;
        metrics::record_reconcile(result.is_ok(), started.elapsed().as_secs_f64());

        match result {
            Ok(_) => backoff.reset(&key),
            Err(ControllerError::Watch(e @ WatchError::MalformedKey { .. })) => {
                // Retrying cannot fix the key
                error!("Dropping key {}: {}", key, e);
                backoff.reset(&key);
            }
            Err(e) => {
                let delay = backoff.next_delay(&key);
                warn!(
                    "Reconcile of {} failed (attempt {}): {}, retrying in {:?}",
                    key,
                    backoff.failures(&key),
                    e,
                    delay
                );
                queue.add_after(key.clone(), delay);
            }
        }

        queue.done(&key);
        metrics::set_queue_depth(queue.len());
    }
    info!("Reconcile worker stopped");
}

async fn wait_unfinished<T>(handle: JoinHandle<T>) {
    if !handle.is_finished() {
        let _ = handle.await;
    }
}
