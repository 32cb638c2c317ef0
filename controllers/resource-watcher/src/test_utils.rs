//! Test utilities for unit testing the synchronizer
//!
//! `MockAdapter` stands in for the Kubernetes API: list fixtures per kind,
//! injectable failures, and one push channel per kind feeding `subscribe`.

use crate::adapter::{Change, ChangeStream, ClusterAdapter};
use crate::error::AdapterError;
use async_trait::async_trait;
use collector_client::{ChangeKind, ResourceKind};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{StreamExt, stream};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type ChangeItem = Result<Change, AdapterError>;

#[derive(Debug, Default)]
struct MockState {
    lists: HashMap<ResourceKind, Vec<Value>>,
    failing_lists: HashSet<ResourceKind>,
    fail_start: bool,
    never_sync: bool,
    started: bool,
    listed: Vec<ResourceKind>,
    subscribed: Vec<ResourceKind>,
    feeds: HashMap<ResourceKind, UnboundedSender<ChangeItem>>,
    streams: HashMap<ResourceKind, UnboundedReceiver<ChangeItem>>,
}

/// In-memory cluster adapter
#[derive(Debug)]
pub struct MockAdapter {
    state: Mutex<MockState>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Create an adapter with empty lists and an open change feed for every kind
    pub fn new() -> Self {
        let mut state = MockState::default();
        for kind in ResourceKind::ALL {
            let (tx, rx) = mpsc::unbounded();
            state.feeds.insert(kind, tx);
            state.streams.insert(kind, rx);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Objects returned by `list(kind)`
    pub fn set_list(&self, kind: ResourceKind, items: Vec<Value>) {
        self.state().lists.insert(kind, items);
    }

    /// Make `list(kind)` fail
    pub fn fail_list(&self, kind: ResourceKind) {
        self.state().failing_lists.insert(kind);
    }

    /// Make `start` fail as if the control plane were down
    pub fn fail_start(&self) {
        self.state().fail_start = true;
    }

    /// Make `wait_for_cache_sync` never resolve
    pub fn never_sync(&self) {
        self.state().never_sync = true;
    }

    /// Queue a notification on the subscription of `kind`
    pub fn push(&self, kind: ResourceKind, item: ChangeItem) {
        if let Some(feed) = self.state().feeds.get(&kind) {
            let _ = feed.unbounded_send(item);
        }
    }

    /// End the subscription of `kind`
    pub fn close(&self, kind: ResourceKind) {
        self.state().feeds.remove(&kind);
    }

    pub fn started(&self) -> bool {
        self.state().started
    }

    /// Kinds passed to `list`, in call order
    pub fn listed(&self) -> Vec<ResourceKind> {
        self.state().listed.clone()
    }

    /// Kinds passed to `subscribe`, in call order
    pub fn subscribed(&self) -> Vec<ResourceKind> {
        self.state().subscribed.clone()
    }
}

#[async_trait]
impl ClusterAdapter for MockAdapter {
    async fn start(&self, _shutdown: CancellationToken) -> Result<(), AdapterError> {
        let mut state = self.state();
        if state.fail_start {
            return Err(AdapterError::Unreachable("connection refused".to_string()));
        }
        state.started = true;
        Ok(())
    }

    async fn wait_for_cache_sync(&self) -> Result<(), AdapterError> {
        let never = self.state().never_sync;
        if never {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, AdapterError> {
        let mut state = self.state();
        state.listed.push(kind);
        if state.failing_lists.contains(&kind) {
            return Err(AdapterError::Watch(format!("listing {kind} failed")));
        }
        Ok(state.lists.get(&kind).cloned().unwrap_or_default())
    }

    fn subscribe(&self, kind: ResourceKind) -> ChangeStream {
        let mut state = self.state();
        state.subscribed.push(kind);
        match state.streams.remove(&kind) {
            Some(rx) => rx.boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Minimal object document
pub fn object(name: &str, namespace: Option<&str>, version: &str) -> Value {
    let mut metadata = json!({
        "name": name,
        "uid": format!("uid-{name}"),
        "resourceVersion": version,
    });
    if let Some(ns) = namespace {
        metadata["namespace"] = json!(ns);
    }
    json!({ "metadata": metadata })
}

/// `count` distinct objects for `kind`
pub fn objects(kind: ResourceKind, count: usize) -> Vec<Value> {
    let namespace = kind.is_namespaced().then_some("default");
    (0..count)
        .map(|i| object(&format!("{kind}-{i}"), namespace, "1"))
        .collect()
}

pub fn change(change: ChangeKind, object: Value) -> ChangeItem {
    Ok(Change::new(change, object))
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
