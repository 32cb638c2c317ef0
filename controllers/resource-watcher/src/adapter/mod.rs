//! Cluster API adapter.
//!
//! The synchronizer only talks to the cluster through [`ClusterAdapter`]:
//! - `start` / `wait_for_cache_sync`: subscription machinery and its readiness gate
//! - `list`: one-shot listing of every object of a kind
//! - `subscribe`: long-lived stream of changes for a kind
//!
//! `kubernetes` holds the production implementation; `tracker` turns raw watcher
//! events into add/update/delete notifications.

pub mod kubernetes;
pub mod tracker;

use crate::error::AdapterError;
use async_trait::async_trait;
use collector_client::{ChangeKind, ResourceKind};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub use kubernetes::KubeAdapter;

/// One change notification for an object.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Add, Update or Delete
    pub change: ChangeKind,
    /// The object document; the new value for updates, the last known value for deletes
    pub object: serde_json::Value,
}

impl Change {
    pub fn new(change: ChangeKind, object: serde_json::Value) -> Self {
        Self { change, object }
    }
}

/// Stream of changes for one kind.
///
/// `Err` items are transient; the adapter keeps the stream alive and resumes.
/// The stream ending means the subscription is gone for good.
pub type ChangeStream = BoxStream<'static, Result<Change, AdapterError>>;

/// Access to cluster state.
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait]
pub trait ClusterAdapter: Send + Sync {
    /// Start the subscription machinery. Runs in the background until `shutdown` fires.
    async fn start(&self, shutdown: CancellationToken) -> Result<(), AdapterError>;

    /// Resolve once the local mirror of every kind is caught up with the control plane.
    async fn wait_for_cache_sync(&self) -> Result<(), AdapterError>;

    /// List all objects of `kind` across the cluster.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<serde_json::Value>, AdapterError>;

    /// Subscribe to changes of `kind`.
    fn subscribe(&self, kind: ResourceKind) -> ChangeStream;
}
