//! Health state of the synchronizer.
//!
//! The flag starts unhealthy, is raised only once the crawl has completed,
//! and is lowered again when the run that raised it ends, whatever the exit
//! path.

use std::sync::{Mutex, PoisonError};

/// Healthy/unhealthy flag guarded by a single mutex.
#[derive(Debug, Default)]
pub struct HealthState {
    healthy: Mutex<bool>,
}

impl HealthState {
    /// Create an unhealthy state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value. No side effects.
    pub fn is_healthy(&self) -> bool {
        *self.healthy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, healthy: bool) {
        *self.healthy.lock().unwrap_or_else(PoisonError::into_inner) = healthy;
    }

    /// Open a run scope. Dropping the returned guard marks the state unhealthy.
    pub fn scope(&self) -> HealthScope<'_> {
        HealthScope { state: self }
    }
}

/// Scope of one run; resets health on drop.
#[derive(Debug)]
pub struct HealthScope<'a> {
    state: &'a HealthState,
}

impl HealthScope<'_> {
    /// Mark the owning state healthy until this scope ends.
    pub fn mark_healthy(&self) {
        self.state.set(true);
    }
}

impl Drop for HealthScope<'_> {
    fn drop(&mut self) {
        self.state.set(false);
    }
}
