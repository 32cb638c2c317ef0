//! Reporting of steady-state forwarding failures.
//!
//! A failed delivery during the watch phase does not stop the kind's task.
//! Every such failure is logged and counted in a Prometheus registry, which
//! the probe server exposes on `/metrics`.

use collector_client::{ChangeKind, CollectorError, ResourceKind};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::warn;

/// Counter of watch notifications the collector did not accept.
pub const NOTIFY_FAILURES_METRIC: &str = "skyflo_watch_notify_failures_total";

/// Forwarding of one watch notification failed.
#[derive(Debug, Error)]
#[error("Failed to forward {kind} {change} event: {source}")]
pub struct WatchNotifyError {
    pub kind: ResourceKind,
    pub change: ChangeKind,
    #[source]
    pub source: CollectorError,
}

/// Always-consumed sink for [`WatchNotifyError`].
pub struct Diagnostics {
    registry: Registry,
    failures: IntCounterVec,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

impl Diagnostics {
    /// Create the sink with its own registry. Every kind starts at zero.
    pub fn new() -> Result<Self, prometheus::Error> {
        let failures = IntCounterVec::new(
            Opts::new(
                NOTIFY_FAILURES_METRIC,
                "Watch notifications that could not be forwarded to the collector",
            ),
            &["resource_type"],
        )?;
        let registry = Registry::new();
        registry.register(Box::new(failures.clone()))?;
        for kind in ResourceKind::ALL {
            let _ = failures.with_label_values(&[kind.as_str()]);
        }
        Ok(Self { registry, failures })
    }

    /// Record and log a failure.
    pub fn report(&self, error: &WatchNotifyError) {
        let counter = self.failures.with_label_values(&[error.kind.as_str()]);
        counter.inc();
        warn!(
            kind = %error.kind,
            change = %error.change,
            status = ?error.source.status(),
            failures = counter.get(),
            error = %error,
            "Watch notification was not delivered"
        );
    }

    /// Failures recorded for one kind.
    pub fn failures(&self, kind: ResourceKind) -> u64 {
        self.failures.with_label_values(&[kind.as_str()]).get()
    }

    /// Metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(kind: ResourceKind) -> WatchNotifyError {
        WatchNotifyError {
            kind,
            change: ChangeKind::Update,
            source: CollectorError::Rejected {
                status: 503,
                body: String::new(),
            },
        }
    }

    #[test]
    fn test_report_counts_per_kind() {
        let diagnostics = Diagnostics::new().unwrap();
        diagnostics.report(&rejected(ResourceKind::Pod));
        diagnostics.report(&rejected(ResourceKind::Pod));
        diagnostics.report(&rejected(ResourceKind::Secret));

        assert_eq!(diagnostics.failures(ResourceKind::Pod), 2);
        assert_eq!(diagnostics.failures(ResourceKind::Secret), 1);
        assert_eq!(diagnostics.failures(ResourceKind::Node), 0);
    }

    #[test]
    fn test_encode_exposes_every_kind() {
        let diagnostics = Diagnostics::new().unwrap();
        diagnostics.report(&rejected(ResourceKind::ConfigMap));

        let text = String::from_utf8(diagnostics.encode().unwrap()).unwrap();
        assert!(text.contains(&format!("# TYPE {NOTIFY_FAILURES_METRIC} counter")));
        assert!(text.contains(&format!("{NOTIFY_FAILURES_METRIC}{{resource_type=\"configmap\"}} 1")));
        assert!(text.contains(&format!("{NOTIFY_FAILURES_METRIC}{{resource_type=\"pod\"}} 0")));
        for kind in ResourceKind::ALL {
            assert!(text.contains(&format!("resource_type=\"{kind}\"")));
        }
    }

    #[test]
    fn test_sinks_do_not_share_counters() {
        let first = Diagnostics::new().unwrap();
        let second = Diagnostics::new().unwrap();
        first.report(&rejected(ResourceKind::Pod));
        assert_eq!(second.failures(ResourceKind::Pod), 0);
    }

    #[test]
    fn test_error_message_names_kind_and_change() {
        let message = rejected(ResourceKind::Deployment).to_string();
        assert!(message.contains("deployment"));
        assert!(message.contains("UPDATE"));
        assert!(message.contains("503"));
    }
}
