//! Construction of collector events from adapter output.

use crate::adapter::Change;
use collector_client::{ChangeKind, ResourceEvent, ResourceKind};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata fields copied from an object's `metadata` block.
const OBJECT_FIELDS: [(&str, &str); 4] = [
    ("name", "name"),
    ("namespace", "namespace"),
    ("uid", "uid"),
    ("resourceVersion", "resource_version"),
];

/// Snapshot event for every object of `kind`.
pub fn initial_event(cluster_name: &str, kind: ResourceKind, items: Vec<Value>) -> ResourceEvent {
    let mut metadata = HashMap::new();
    metadata.insert("item_count".to_string(), items.len().to_string());
    ResourceEvent::new(cluster_name, kind, ChangeKind::Initial, Value::Array(items))
        .with_metadata(metadata)
}

/// Incremental event for one change notification.
pub fn change_event(cluster_name: &str, kind: ResourceKind, change: Change) -> ResourceEvent {
    let metadata = object_metadata(&change.object);
    ResourceEvent::new(cluster_name, kind, change.change, change.object).with_metadata(metadata)
}

fn object_metadata(object: &Value) -> HashMap<String, String> {
    let Some(meta) = object.get("metadata") else {
        return HashMap::new();
    };
    OBJECT_FIELDS
        .iter()
        .filter_map(|(field, key)| {
            meta.get(*field)
                .and_then(Value::as_str)
                .map(|v| ((*key).to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_event_carries_whole_list() {
        let items = vec![json!({"metadata": {"name": "a"}}), json!({"metadata": {"name": "b"}})];
        let event = initial_event("prod", ResourceKind::Service, items.clone());

        assert_eq!(event.cluster_name, "prod");
        assert_eq!(event.kind, ResourceKind::Service);
        assert_eq!(event.change, ChangeKind::Initial);
        assert_eq!(event.payload, Value::Array(items));
        assert_eq!(event.metadata.unwrap()["item_count"], "2");
    }

    #[test]
    fn test_initial_event_for_empty_kind() {
        let event = initial_event("prod", ResourceKind::Secret, Vec::new());
        assert_eq!(event.payload, json!([]));
        assert_eq!(event.metadata.unwrap()["item_count"], "0");
    }

    #[test]
    fn test_change_event_metadata() {
        let object = json!({
            "metadata": {
                "name": "web-0",
                "namespace": "shop",
                "uid": "1234",
                "resourceVersion": "42",
                "labels": {"app": "web"}
            }
        });
        let event = change_event("prod", ResourceKind::Pod, Change::new(ChangeKind::Delete, object.clone()));

        assert_eq!(event.change, ChangeKind::Delete);
        assert_eq!(event.payload, object);
        let metadata = event.metadata.unwrap();
        assert_eq!(metadata["name"], "web-0");
        assert_eq!(metadata["namespace"], "shop");
        assert_eq!(metadata["uid"], "1234");
        assert_eq!(metadata["resource_version"], "42");
        assert_eq!(metadata.len(), 4);
    }

    #[test]
    fn test_change_event_without_metadata() {
        let event = change_event(
            "prod",
            ResourceKind::Node,
            Change::new(ChangeKind::Add, json!({"spec": {}})),
        );
        assert!(event.metadata.is_none());
    }
}
