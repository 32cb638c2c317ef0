//! Watcher-specific error types.
//!
//! This module defines the errors of the resource synchronizer that are not
//! covered by upstream library errors.

use collector_client::{CollectorError, ResourceKind};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a cluster adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The control plane could not be reached
    #[error("Control plane unreachable: {0}")]
    Unreachable(String),

    /// A kind's local mirror stopped before it finished syncing
    #[error("Cache for {0} can no longer sync")]
    CacheSync(ResourceKind),

    /// `list` was called before `start` created the kind's mirror
    #[error("Mirror for {0} has not been started")]
    NotStarted(ResourceKind),

    /// No binding exists for the kind
    #[error("Unsupported resource kind: {0}")]
    Unsupported(ResourceKind),

    /// Watch stream error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Object could not be converted to a JSON document
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which half of a crawl step failed.
#[derive(Debug, Error)]
pub enum CrawlFailure {
    #[error("list failed: {0}")]
    List(#[source] AdapterError),

    #[error("forward failed: {0}")]
    Forward(#[source] CollectorError),
}

/// Errors that end a synchronizer run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Subscription machinery could not be started
    #[error("Adapter connection failed: {0}")]
    AdapterConnection(#[source] AdapterError),

    /// Local mirror never caught up with the control plane
    #[error("Caches did not sync within {0:?}")]
    CacheSyncTimeout(Duration),

    /// Initial crawl of a kind failed
    #[error("Initial crawl of {kind} failed: {source}")]
    Crawl {
        kind: ResourceKind,
        #[source]
        source: CrawlFailure,
    },

    /// A per-kind watch task ended without being asked to
    #[error("{kind} watch terminated: {reason}")]
    WatchTerminated {
        kind: ResourceKind,
        reason: String,
    },

    /// Shutdown was requested
    #[error("Synchronization cancelled")]
    Cancelled,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank
    #[error("{0} environment variable is required")]
    Missing(String),

    /// A variable is set but cannot be parsed
    #[error("{key} is not a valid {expected}: {value}")]
    Invalid {
        key: String,
        expected: &'static str,
        value: String,
    },
}
