//! Remote backend health tracking
//!
//! The orchestrator never probes the network on the hot path: availability is
//! a read of the cached state below, refreshed by [`HealthMonitor`] on a fixed
//! interval. Writes are last-write-wins; staleness is bounded by the interval
//! and only affects backend preference, not correctness of a given call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::remote::RemoteAnalyzer;

/// What the last successful `/health` probe reported.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<f64>,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cached remote health: Unknown until the first probe completes, then
/// Healthy/Unhealthy. Unknown counts as unavailable for selection.
pub struct HealthState {
    healthy: AtomicBool,
    checked: AtomicBool,
    snapshot: RwLock<Option<HealthSnapshot>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(false),
            checked: AtomicBool::new(false),
            snapshot: RwLock::new(None),
        }
    }

    /// Fixed state for tests and wiring without a monitor.
    pub fn fixed(healthy: bool) -> Self {
        let state = Self::new();
        state.healthy.store(healthy, Ordering::Relaxed);
        state.checked.store(true, Ordering::Relaxed);
        state
    }

    pub fn is_healthy(&self) -> bool {
        self.checked.load(Ordering::Relaxed) && self.healthy.load(Ordering::Relaxed)
    }

    pub fn has_been_checked(&self) -> bool {
        self.checked.load(Ordering::Relaxed)
    }

    pub async fn mark_healthy(&self, snapshot: HealthSnapshot) {
        let was_healthy = self.is_healthy();
        self.healthy.store(true, Ordering::Relaxed);
        self.checked.store(true, Ordering::Relaxed);
        *self.snapshot.write().await = Some(snapshot);
        if !was_healthy {
            info!("Remote analyzer became healthy");
        }
        crate::metrics::REMOTE_HEALTHY.set(1);
    }

    pub async fn mark_unhealthy(&self, reason: String) {
        let was_healthy = self.is_healthy();
        self.healthy.store(false, Ordering::Relaxed);
        self.checked.store(true, Ordering::Relaxed);
        *self.snapshot.write().await = Some(HealthSnapshot {
            status: "unreachable".to_string(),
            version: None,
            uptime_secs: None,
            checked_at: Utc::now(),
            error: Some(reason.clone()),
        });
        if was_healthy {
            warn!(reason = %reason, "Remote analyzer became unhealthy");
        }
        crate::metrics::REMOTE_HEALTHY.set(0);
    }

    pub async fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.snapshot.read().await.clone()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic health-check task, independent of any in-flight analysis.
pub struct HealthMonitor;

impl HealthMonitor {
    /// Probe immediately, then on every interval tick until the task is
    /// aborted or the remote analyzer is dropped.
    pub fn spawn(remote: Arc<RemoteAnalyzer>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                debug!("Probing remote analyzer health");
                remote.probe_health().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_counts_as_unavailable() {
        let state = HealthState::new();
        assert!(!state.is_healthy());
        assert!(!state.has_been_checked());
        assert!(state.last_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_healthy_transition() {
        let state = HealthState::new();
        state
            .mark_healthy(HealthSnapshot {
                status: "healthy".to_string(),
                version: Some("2.1.0".to_string()),
                uptime_secs: Some(12.5),
                checked_at: Utc::now(),
                error: None,
            })
            .await;
        assert!(state.is_healthy());

        state.mark_unhealthy("connection refused".to_string()).await;
        assert!(!state.is_healthy());
        let snap = state.last_snapshot().await.unwrap();
        assert_eq!(snap.status, "unreachable");
        assert!(snap.error.is_some());
    }

    #[test]
    fn test_fixed_state() {
        assert!(HealthState::fixed(true).is_healthy());
        assert!(!HealthState::fixed(false).is_healthy());
    }
}
