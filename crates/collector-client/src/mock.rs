//! Mock EventSender for unit testing
//!
//! Records every event handed to it and can be configured to reject
//! deliveries, without requiring a running collector.

use crate::error::CollectorError;
use crate::models::{ResourceEvent, ResourceKind};
use crate::sender_trait::EventSender;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    attempts: Vec<ResourceEvent>,
    delivered: Vec<ResourceEvent>,
    // Status returned for every delivery of a kind
    failing_kinds: HashMap<ResourceKind, u16>,
    // Statuses consumed one per delivery of a kind, before `failing_kinds`
    queued_failures: HashMap<ResourceKind, VecDeque<u16>>,
}

/// Mock EventSender for testing
#[derive(Debug, Clone, Default)]
pub struct MockEventSender {
    state: Arc<Mutex<MockState>>,
}

impl MockEventSender {
    /// Create a new mock sender that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every delivery for `kind` with `status`
    pub fn fail_kind(&self, kind: ResourceKind, status: u16) {
        self.state().failing_kinds.insert(kind, status);
    }

    /// Reject only the next delivery for `kind` with `status`
    pub fn fail_once(&self, kind: ResourceKind, status: u16) {
        self.state()
            .queued_failures
            .entry(kind)
            .or_default()
            .push_back(status);
    }

    /// Every event handed to `send`, including rejected ones, in call order
    pub fn attempts(&self) -> Vec<ResourceEvent> {
        self.state().attempts.clone()
    }

    /// Events that were accepted, in call order
    pub fn delivered(&self) -> Vec<ResourceEvent> {
        self.state().delivered.clone()
    }

    /// Accepted events for one kind
    pub fn delivered_for(&self, kind: ResourceKind) -> Vec<ResourceEvent> {
        self.state()
            .delivered
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSender for MockEventSender {
    async fn send(&self, event: &ResourceEvent) -> Result<(), CollectorError> {
        let mut state = self.state();
        state.attempts.push(event.clone());

        let queued = state
            .queued_failures
            .get_mut(&event.kind)
            .and_then(VecDeque::pop_front);
        if let Some(status) = queued.or_else(|| state.failing_kinds.get(&event.kind).copied()) {
            return Err(CollectorError::Rejected {
                status,
                body: "mock rejection".to_string(),
            });
        }

        state.delivered.push(event.clone());
        Ok(())
    }
}
