//! Kubernetes implementation of the cluster adapter.
//!
//! Every supported kind is bound to its `k8s-openapi` type once, in
//! [`BINDINGS`]; the generic `mirror_objects` and `watch_objects` routines do
//! the work for all of them. All kinds are read across every namespace.
//!
//! The crawl lists from each kind's reflector store, so a kind's snapshot
//! costs no extra request against the API server once its cache is synced.

use super::tracker::ChangeTracker;
use super::{Change, ChangeStream, ClusterAdapter};
use crate::error::AdapterError;
use async_trait::async_trait;
use collector_client::ResourceKind;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt, stream};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, Resource};
use kube_runtime::reflector::Store;
use kube_runtime::{WatchStreamExt, reflector, watcher};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type ReadyFuture = BoxFuture<'static, Result<(), AdapterError>>;
/// Current contents of one kind's reflector store.
type Snapshot = Arc<dyn Fn() -> Result<Vec<Value>, AdapterError> + Send + Sync>;

/// A running reflector: when it is ready, and what it holds.
struct Mirror {
    ready: ReadyFuture,
    snapshot: Snapshot,
}

/// Object types the adapter can mirror, list and watch.
trait Watched:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> Watched for K where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Per-kind entry points, monomorphised for the kind's concrete type.
struct KindBinding {
    kind: ResourceKind,
    mirror: fn(Client, ResourceKind, CancellationToken) -> Mirror,
    watch: fn(Client, ResourceKind, ChangeTracker) -> ChangeStream,
}

macro_rules! bind {
    ($kind:expr, $ty:ty) => {
        KindBinding {
            kind: $kind,
            mirror: mirror_objects::<$ty>,
            watch: watch_objects::<$ty>,
        }
    };
}

/// One binding per kind, in crawl order.
static BINDINGS: [KindBinding; 9] = [
    bind!(ResourceKind::Node, Node),
    bind!(ResourceKind::Namespace, Namespace),
    bind!(ResourceKind::Ingress, Ingress),
    bind!(ResourceKind::Service, Service),
    bind!(ResourceKind::Deployment, Deployment),
    bind!(ResourceKind::StatefulSet, StatefulSet),
    bind!(ResourceKind::Pod, Pod),
    bind!(ResourceKind::ConfigMap, ConfigMap),
    bind!(ResourceKind::Secret, Secret),
];

fn binding(kind: ResourceKind) -> Result<&'static KindBinding, AdapterError> {
    BINDINGS
        .iter()
        .find(|b| b.kind == kind)
        .ok_or(AdapterError::Unsupported(kind))
}

fn to_document<K: Serialize>(object: &K) -> Result<Value, AdapterError> {
    Ok(serde_json::to_value(object)?)
}

fn snapshot_of<K: Watched>(reader: Store<K>) -> Snapshot {
    Arc::new(move || reader.state().iter().map(|obj| to_document(&**obj)).collect())
}

/// Start a reflector for `K`.
fn mirror_objects<K: Watched>(
    client: Client,
    kind: ResourceKind,
    shutdown: CancellationToken,
) -> Mirror {
    let (reader, writer) = reflector::store::<K>();
    let api: Api<K> = Api::all(client);
    let mirror = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .for_each(move |event| {
            if let Err(e) = event {
                warn!(%kind, error = %e, "Mirror watch error, retrying");
            }
            future::ready(())
        });

    tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => {}
            () = mirror => {}
        }
        debug!(%kind, "Mirror stopped");
    });

    let snapshot = snapshot_of(reader.clone());
    let ready = async move {
        reader
            .wait_until_ready()
            .await
            .map_err(|_dropped| AdapterError::CacheSync(kind))
    }
    .boxed();
    Mirror { ready, snapshot }
}

fn single(result: Result<Option<Change>, AdapterError>) -> Vec<Result<Change, AdapterError>> {
    result.transpose().into_iter().collect()
}

fn watch_objects<K: Watched>(
    client: Client,
    kind: ResourceKind,
    mut tracker: ChangeTracker,
) -> ChangeStream {
    let api: Api<K> = Api::all(client);
    debug!(%kind, known = tracker.len(), "Opening watch");
    watcher(api, watcher::Config::default())
        .default_backoff()
        .flat_map(move |event| {
            let changes = match event {
                Ok(watcher::Event::Init) => {
                    tracker.restart();
                    Vec::new()
                }
                Ok(watcher::Event::InitApply(obj)) => {
                    single(to_document(&obj).map(|doc| tracker.init_apply(doc)))
                }
                Ok(watcher::Event::InitDone) => tracker.init_done().into_iter().map(Ok).collect(),
                Ok(watcher::Event::Apply(obj)) => {
                    single(to_document(&obj).map(|doc| tracker.apply(doc)))
                }
                Ok(watcher::Event::Delete(obj)) => {
                    vec![to_document(&obj).map(|doc| tracker.delete(doc))]
                }
                Err(e) => vec![Err(AdapterError::Watch(e.to_string()))],
            };
            stream::iter(changes)
        })
        .boxed()
}

/// Cluster adapter backed by the Kubernetes API server.
pub struct KubeAdapter {
    client: Client,
    // Readiness of each kind's mirror, populated by `start`
    pending_sync: Mutex<Vec<(ResourceKind, ReadyFuture)>>,
    // Reflector store of each kind, populated by `start`
    snapshots: Mutex<HashMap<ResourceKind, Snapshot>>,
    // Objects delivered by the last crawl of each kind, handed to its watch
    crawled: Mutex<HashMap<ResourceKind, ChangeTracker>>,
}

impl std::fmt::Debug for KubeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAdapter").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl KubeAdapter {
    /// Creates an adapter on top of an existing client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pending_sync: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
            crawled: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an adapter from the in-cluster or kubeconfig environment.
    pub async fn try_default() -> Result<Self, AdapterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterAdapter for KubeAdapter {
    async fn start(&self, shutdown: CancellationToken) -> Result<(), AdapterError> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| AdapterError::Unreachable(e.to_string()))?;
        info!(version = %version.git_version, "Connected to Kubernetes API server");

        let mut pending = lock(&self.pending_sync);
        let mut snapshots = lock(&self.snapshots);
        for b in &BINDINGS {
            let mirror = (b.mirror)(self.client.clone(), b.kind, shutdown.clone());
            pending.push((b.kind, mirror.ready));
            snapshots.insert(b.kind, mirror.snapshot);
        }
        Ok(())
    }

    async fn wait_for_cache_sync(&self) -> Result<(), AdapterError> {
        let pending = std::mem::take(&mut *lock(&self.pending_sync));
        for (kind, ready) in pending {
            ready.await?;
            debug!(%kind, "Cache synced");
        }
        Ok(())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, AdapterError> {
        let snapshot = lock(&self.snapshots)
            .get(&kind)
            .cloned()
            .ok_or(AdapterError::NotStarted(kind))?;
        let items = snapshot()?;
        lock(&self.crawled).insert(kind, ChangeTracker::seeded(&items));
        Ok(items)
    }

    fn subscribe(&self, kind: ResourceKind) -> ChangeStream {
        let tracker = lock(&self.crawled).remove(&kind).unwrap_or_default();
        match binding(kind) {
            Ok(b) => (b.watch)(self.client.clone(), kind, tracker),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }
    }
}
