//! Collector API models
//!
//! These models match the JSON body accepted by `POST /api/v1/resources`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kubernetes resource kinds mirrored to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Node,
    Namespace,
    Ingress,
    Service,
    Deployment,
    StatefulSet,
    Pod,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    /// Every kind, in crawl order.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Node,
        ResourceKind::Namespace,
        ResourceKind::Ingress,
        ResourceKind::Service,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::Pod,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
    ];

    /// Wire name used in `resource_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Service => "service",
            ResourceKind::Deployment => "deployment",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::Pod => "pod",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
        }
    }

    /// Whether objects of this kind live inside a namespace.
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::Node | ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the resource(s) carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Full snapshot of a kind taken at startup
    Initial,
    Add,
    Update,
    Delete,
}

impl ChangeKind {
    /// Wire name used in `event_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Initial => "INITIAL",
            ChangeKind::Add => "ADD",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change delivered to the collector.
///
/// `payload` is an array of objects for [`ChangeKind::Initial`] and a single
/// object otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub cluster_name: String,
    #[serde(rename = "resource_type")]
    pub kind: ResourceKind,
    #[serde(rename = "event_type")]
    pub change: ChangeKind,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl ResourceEvent {
    /// Create an event stamped with the current time and no metadata.
    pub fn new(
        cluster_name: impl Into<String>,
        kind: ResourceKind,
        change: ChangeKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            kind,
            change,
            timestamp: Utc::now(),
            payload,
            metadata: None,
        }
    }

    /// Attach metadata; an empty map leaves the field unset.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }
}
