//! Resource synchronizer.
//!
//! Sequences one run of the watcher:
//!
//! ```text
//! Starting -> CacheSyncing -> Crawling -> Watching -> Stopped
//!    (any phase) ------------------------------------> Failed
//! ```
//!
//! The crawl is strictly sequential in [`ResourceKind::ALL`] order, so each
//! kind's `INITIAL` event is delivered before its watch task exists. The
//! watch phase runs one task per kind under a single cancellation scope; the
//! first task to end abnormally cancels its siblings.

use crate::adapter::{ChangeStream, ClusterAdapter};
use crate::diagnostics::{Diagnostics, WatchNotifyError};
use crate::error::{CrawlFailure, SyncError};
use crate::events::{change_event, initial_event};
use crate::health::{HealthScope, HealthState};
use collector_client::{EventSender, ResourceKind};
use futures::{FutureExt, StreamExt};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Adapter subscription machinery is starting
    Starting,
    /// Waiting for the adapter's local mirror to catch up
    CacheSyncing,
    /// Sending one `INITIAL` event per kind
    Crawling,
    /// Forwarding changes; the only healthy phase
    Watching,
    /// Ended by cancellation
    Stopped,
    /// Ended by an error
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Starting => "starting",
            SyncPhase::CacheSyncing => "cache-syncing",
            SyncPhase::Crawling => "crawling",
            SyncPhase::Watching => "watching",
            SyncPhase::Stopped => "stopped",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(phase: SyncPhase) {
    info!(%phase, "Synchronizer phase");
}

/// Await `future` unless `shutdown` fires first.
async fn until_cancelled<F: Future>(
    shutdown: &CancellationToken,
    future: F,
) -> Result<F::Output, SyncError> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(SyncError::Cancelled),
        output = future => Ok(output),
    }
}

/// Mirrors cluster state to the collector.
pub struct Synchronizer {
    adapter: Arc<dyn ClusterAdapter>,
    sender: Arc<dyn EventSender>,
    cluster_name: Arc<str>,
    cache_sync_timeout: Duration,
    health: HealthState,
    diagnostics: Arc<Diagnostics>,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("cluster_name", &self.cluster_name)
            .field("cache_sync_timeout", &self.cache_sync_timeout)
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Creates an idle synchronizer. It is unhealthy until a run reaches `Watching`.
    pub fn new(
        adapter: Arc<dyn ClusterAdapter>,
        sender: Arc<dyn EventSender>,
        cluster_name: impl Into<String>,
        cache_sync_timeout: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let cluster_name: String = cluster_name.into();
        Self {
            adapter,
            sender,
            cluster_name: Arc::from(cluster_name),
            cache_sync_timeout,
            health: HealthState::new(),
            diagnostics,
        }
    }

    /// Whether a run has completed its crawl and is watching.
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Sink receiving steady-state forwarding failures.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Run until `shutdown` fires or a fatal error occurs, and return why it stopped.
    ///
    /// A run never ends on its own: cancellation in any phase yields
    /// [`SyncError::Cancelled`], anything else is the failure that ended it.
    /// Health is reset on every exit path.
    pub async fn run(&self, shutdown: CancellationToken) -> SyncError {
        let health = self.health.scope();
        // Everything started by this run stops when it returns
        let scope = shutdown.child_token();
        let _stop_on_exit = scope.clone().drop_guard();

        let Err(reason) = self.sync(&health, &scope).await;
        if let SyncError::Cancelled = reason {
            info!("Shutdown requested");
            enter(SyncPhase::Stopped);
        } else {
            error!(error = %reason, "Synchronization failed");
            enter(SyncPhase::Failed);
        }
        reason
    }

    async fn sync(
        &self,
        health: &HealthScope<'_>,
        scope: &CancellationToken,
    ) -> Result<Infallible, SyncError> {
        enter(SyncPhase::Starting);
        until_cancelled(scope, self.adapter.start(scope.clone()))
            .await?
            .map_err(SyncError::AdapterConnection)?;

        enter(SyncPhase::CacheSyncing);
        let synced = until_cancelled(
            scope,
            tokio::time::timeout(self.cache_sync_timeout, self.adapter.wait_for_cache_sync()),
        )
        .await?;
        match synced {
            Ok(Ok(())) => info!("Caches synced"),
            Ok(Err(e)) => return Err(SyncError::AdapterConnection(e)),
            Err(_elapsed) => return Err(SyncError::CacheSyncTimeout(self.cache_sync_timeout)),
        }

        enter(SyncPhase::Crawling);
        until_cancelled(scope, self.crawl()).await??;
        health.mark_healthy();

        enter(SyncPhase::Watching);
        Err(self.watch(scope).await)
    }

    async fn crawl(&self) -> Result<(), SyncError> {
        for kind in ResourceKind::ALL {
            self.crawl_kind(kind).await?;
        }
        info!(kinds = ResourceKind::ALL.len(), "Initial crawl complete");
        Ok(())
    }

    /// List every object of `kind` and forward them as one `INITIAL` event.
    pub(crate) async fn crawl_kind(&self, kind: ResourceKind) -> Result<(), SyncError> {
        let items = self.adapter.list(kind).await.map_err(|e| SyncError::Crawl {
            kind,
            source: CrawlFailure::List(e),
        })?;
        let count = items.len();

        let event = initial_event(&self.cluster_name, kind, items);
        self.sender.send(&event).await.map_err(|e| SyncError::Crawl {
            kind,
            source: CrawlFailure::Forward(e),
        })?;

        info!(%kind, items = count, "Initial state forwarded");
        Ok(())
    }

    /// Run one task per kind until `scope` is cancelled or a task fails.
    async fn watch(&self, scope: &CancellationToken) -> SyncError {
        let mut tasks = JoinSet::new();
        for kind in ResourceKind::ALL {
            let task = KindWatch {
                kind,
                changes: self.adapter.subscribe(kind),
                sender: Arc::clone(&self.sender),
                cluster_name: Arc::clone(&self.cluster_name),
                diagnostics: Arc::clone(&self.diagnostics),
                cancel: scope.clone(),
            };
            tasks.spawn(async move {
                AssertUnwindSafe(task.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_panic| {
                        Err(SyncError::WatchTerminated {
                            kind,
                            reason: "task panicked".to_string(),
                        })
                    })
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if failure.is_none() {
                        error!(error = %e, "Watch task ended abnormally, stopping all watches");
                        scope.cancel();
                        failure = Some(e);
                    }
                }
                // Panics are caught inside the task, so a join error means the runtime is shutting down
                Err(_cancelled) => scope.cancel(),
            }
        }
        failure.unwrap_or(SyncError::Cancelled)
    }
}

/// Watch loop of one kind.
struct KindWatch {
    kind: ResourceKind,
    changes: ChangeStream,
    sender: Arc<dyn EventSender>,
    cluster_name: Arc<str>,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
}

impl KindWatch {
    /// Forward every notification in order, one event each, until cancelled.
    ///
    /// Returns `Ok(())` when cancelled and an error when the subscription ends on its own.
    async fn run(mut self) -> Result<(), SyncError> {
        info!(kind = %self.kind, "Watching");
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.changes.next() => next,
            };

            match next {
                Some(Ok(change)) => {
                    let event = change_event(&self.cluster_name, self.kind, change);
                    let delivered = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        delivered = self.sender.send(&event) => delivered,
                    };
                    match delivered {
                        Ok(()) => debug!(kind = %self.kind, change = %event.change, "Change forwarded"),
                        Err(source) => self.diagnostics.report(&WatchNotifyError {
                            kind: self.kind,
                            change: event.change,
                            source,
                        }),
                    }
                }
                Some(Err(e)) => {
                    warn!(kind = %self.kind, error = %e, "Subscription error, waiting for it to resume");
                }
                None => {
                    return Err(SyncError::WatchTerminated {
                        kind: self.kind,
                        reason: "subscription closed".to_string(),
                    });
                }
            }
        }

        debug!(kind = %self.kind, "Watch stopped");
        Ok(())
    }
}
