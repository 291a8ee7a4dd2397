//! Resource Synchronizer
//!
//! Mirrors one resource type into a [`MetricsStore`] with a list-then-watch
//! loop:
//!
//! ```text
//! Created → Listing → Watching ⇄ Resyncing
//!              ▲          │
//!              └─ error ──┘            (cancel) → Stopped
//! ```
//!
//! Failures never end the loop. Only cancellation does.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{ResourceEvent, ResourceIdentity, ResourceSource};
use crate::metrics::MetricsStore;
use crate::sync::backoff::Backoff;
use crate::telemetry::ExporterMetrics;

/// Resource version used when a list did not report one.
const ANY_RESOURCE_VERSION: &str = "0";

/// Settings shared by all synchronizers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Periodic full relist; zero disables it
    pub resync_period: Duration,

    /// First delay after a failed list or watch
    pub initial_backoff: Duration,

    /// Upper bound for the failure delay
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_period: Duration::ZERO,
            initial_backoff: Duration::from_millis(800),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Lifecycle state of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Created,
    Listing,
    Watching,
    Resyncing,
    Stopped,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Created => "created",
            SyncState::Listing => "listing",
            SyncState::Watching => "watching",
            SyncState::Resyncing => "resyncing",
            SyncState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Keeps one per-resource store in step with the cluster.
pub struct ResourceSynchronizer {
    series: String,
    identity: ResourceIdentity,
    source: Arc<dyn ResourceSource>,
    store: Arc<MetricsStore>,
    config: SyncConfig,
    telemetry: ExporterMetrics,
    state: watch::Sender<SyncState>,
}

/// Outcome of one watch attempt.
enum WatchEnd {
    Cancelled,
    Resync,
    Relist,
}

impl ResourceSynchronizer {
    pub fn new(
        series: impl Into<String>,
        identity: ResourceIdentity,
        source: Arc<dyn ResourceSource>,
        store: Arc<MetricsStore>,
        config: SyncConfig,
        telemetry: ExporterMetrics,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Created);
        Self {
            series: series.into(),
            identity,
            source,
            store,
            config,
            telemetry,
            state,
        }
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    /// Run the loop on its own task, stopped by `cancel`.
    pub fn spawn(self, cancel: CancellationToken) -> SynchronizerHandle {
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run(cancel.clone()));
        SynchronizerHandle {
            cancel,
            state,
            task,
        }
    }

    fn set_state(&self, state: SyncState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Synchronizer state changed");
        }
    }

    /// Telemetry while the synchronizer is live. Once cancelled its series
    /// may already be forgotten and must not be recreated.
    fn telemetry(&self, cancel: &CancellationToken) -> Option<&ExporterMetrics> {
        (!cancel.is_cancelled()).then_some(&self.telemetry)
    }

    /// Sleep for `delay`. Returns false if cancelled first.
    async fn wait(cancel: &CancellationToken, delay: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Run until `cancel` fires.
    #[instrument(skip_all, fields(series = %self.series, resource = %self.identity))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting resource synchronizer");
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut next_state = SyncState::Listing;

        loop {
            self.set_state(next_state);
            next_state = SyncState::Listing;

            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                listed = self.source.list(&self.identity) => listed,
            };

            let list = match listed {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, "Failed to list resources");
                    if let Some(telemetry) = self.telemetry(&cancel) {
                        telemetry.list_failed(&self.series);
                    }
                    if !Self::wait(&cancel, backoff.next_delay()).await {
                        break;
                    }
                    continue;
                }
            };

            self.store.replace(&list.items);
            backoff.reset();
            if let Some(telemetry) = self.telemetry(&cancel) {
                telemetry.record_event(&self.series, "list");
                telemetry.set_store_objects(&self.series, self.store.len());
            }
            debug!(objects = list.items.len(), "Listed resources");

            let resource_version = list
                .resource_version
                .filter(|rv| !rv.is_empty())
                .unwrap_or_else(|| ANY_RESOURCE_VERSION.to_string());

            match self.watch(&cancel, resource_version, &mut backoff).await {
                WatchEnd::Cancelled => break,
                WatchEnd::Resync => next_state = SyncState::Resyncing,
                WatchEnd::Relist => {}
            }
        }

        self.set_state(SyncState::Stopped);
        info!("Resource synchronizer stopped");
    }

    /// Watch from `resource_version` until cancelled, the resync period
    /// elapses, or the watch needs a relist.
    async fn watch(
        &self,
        cancel: &CancellationToken,
        mut resource_version: String,
        backoff: &mut Backoff,
    ) -> WatchEnd {
        let period = self.config.resync_period;
        let resync = async move {
            if period.is_zero() {
                pending::<()>().await
            } else {
                tokio::time::sleep(period).await
            }
        };
        tokio::pin!(resync);

        loop {
            self.set_state(SyncState::Watching);

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WatchEnd::Cancelled,
                _ = &mut resync => return WatchEnd::Resync,
                opened = self.source.watch(&self.identity, &resource_version) => opened,
            };

            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Failed to open watch");
                    if let Some(telemetry) = self.telemetry(cancel) {
                        telemetry.watch_failed(&self.series);
                    }
                    return if Self::wait(cancel, backoff.next_delay()).await {
                        WatchEnd::Relist
                    } else {
                        WatchEnd::Cancelled
                    };
                }
            };

            let mut received = 0usize;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return WatchEnd::Cancelled,
                    _ = &mut resync => return WatchEnd::Resync,
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(event)) => {
                        received += 1;
                        if let Some(rv) = event.resource_version() {
                            resource_version = rv.to_string();
                        }
                        self.apply(cancel, event);
                        backoff.reset();
                    }
                    Some(Err(e)) if e.requires_relist() => {
                        debug!(error = %e, "Watch expired, relisting");
                        return WatchEnd::Relist;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Watch stream failed");
                        if let Some(telemetry) = self.telemetry(cancel) {
                            telemetry.watch_failed(&self.series);
                        }
                        return if Self::wait(cancel, backoff.next_delay()).await {
                            WatchEnd::Relist
                        } else {
                            WatchEnd::Cancelled
                        };
                    }
                    None => {
                        debug!(%resource_version, "Watch stream closed, reopening");
                        // A stream that closes without delivering anything
                        // must not turn into a busy loop.
                        if received == 0 && !Self::wait(cancel, backoff.next_delay()).await {
                            return WatchEnd::Cancelled;
                        }
                        break;
                    }
                }
            }
        }
    }

    fn apply(&self, cancel: &CancellationToken, event: ResourceEvent) {
        let kind = event.kind();
        match event {
            ResourceEvent::Added(obj) | ResourceEvent::Modified(obj) => {
                debug!(object = %obj.key(), event = kind, "Applying watch event");
                self.store.update(&obj);
            }
            ResourceEvent::Deleted(obj) => {
                debug!(object = %obj.key(), event = kind, "Applying watch event");
                self.store.delete(&obj);
            }
            ResourceEvent::Bookmark { .. } => return,
        }
        if let Some(telemetry) = self.telemetry(cancel) {
            telemetry.record_event(&self.series, kind);
            telemetry.set_store_objects(&self.series, self.store.len());
        }
    }
}

/// Owner's side of a running synchronizer.
#[derive(Debug)]
pub struct SynchronizerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl SynchronizerHandle {
    /// The token that stops this synchronizer when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the loop to stop. It exits at its next await point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit. Does not stop it.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Synchronizer task failed");
        }
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

/// Wait until `rx` reports `state`. Returns false if the sender went away.
pub async fn wait_for_state(rx: &mut watch::Receiver<SyncState>, state: SyncState) -> bool {
    loop {
        if *rx.borrow_and_update() == state {
            return true;
        }
        if rx.changed().await.is_err() {
            return *rx.borrow() == state;
        }
    }
}
