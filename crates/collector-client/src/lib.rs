//! Skyflo Collector API Client
//!
//! Delivers Kubernetes resource events to the Skyflo collector.
//!
//! # Example
//!
//! ```no_run
//! use collector_client::{ChangeKind, CollectorClient, ResourceEvent, ResourceKind};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CollectorClient::new(
//!     "https://collector.skyflo.ai",
//!     "your-api-key",
//!     Duration::from_secs(30),
//! )?;
//!
//! let event = ResourceEvent::new(
//!     "prod-eu",
//!     ResourceKind::Pod,
//!     ChangeKind::Add,
//!     serde_json::json!({"metadata": {"name": "web-0"}}),
//! );
//! client.send(&event).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Each call to `send` is one HTTP request. There is no queueing, retry or
//! backoff; failures are returned to the caller.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod sender_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{CollectorClient, RESOURCES_PATH, USER_AGENT};
pub use error::CollectorError;
pub use models::*;
pub use sender_trait::EventSender;
#[cfg(feature = "test-util")]
pub use mock::MockEventSender;
