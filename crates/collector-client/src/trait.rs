//! EventSender trait for mocking
//!
//! This trait abstracts the CollectorClient so the synchronizer can be unit
//! tested without a running collector.

use crate::error::CollectorError;
use crate::models::ResourceEvent;

/// Delivers resource events to the collector.
///
/// Implementations perform exactly one delivery attempt per call.
#[async_trait::async_trait]
pub trait EventSender: Send + Sync {
    /// Deliver a single event
    async fn send(&self, event: &ResourceEvent) -> Result<(), CollectorError>;
}
