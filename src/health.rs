//! Backend health monitoring
//!
//! Probes both endpoints concurrently and reduces the outcome to a
//! per-backend boolean map. The map is advisory display state: delivery
//! never consults it, and a probe failure can never take the relay down.

use crate::fallback::BackendManager;
use crate::settings::Backend;
use tracing::warn;

/// Reachability of both backends at one point in time. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthMap {
    pub primary: bool,
    pub secondary: bool,
}

impl HealthMap {
    pub fn get(&self, backend: Backend) -> bool {
        match backend {
            Backend::Primary => self.primary,
            Backend::Secondary => self.secondary,
        }
    }

    pub fn summary(&self) -> ConnectivitySummary {
        match (self.primary, self.secondary) {
            (true, true) => ConnectivitySummary::BothOnline,
            (true, false) => ConnectivitySummary::PrimaryOnly,
            (false, true) => ConnectivitySummary::SecondaryOnly,
            (false, false) => ConnectivitySummary::BothOffline,
        }
    }
}

/// Four-state connectivity reading shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySummary {
    BothOnline,
    PrimaryOnly,
    SecondaryOnly,
    BothOffline,
}

impl std::fmt::Display for ConnectivitySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConnectivitySummary::BothOnline => "Both backends are online",
            ConnectivitySummary::PrimaryOnly => "Primary backend online, secondary offline",
            ConnectivitySummary::SecondaryOnly => "Secondary backend online, primary offline",
            ConnectivitySummary::BothOffline => "Both backends are offline",
        };
        f.write_str(text)
    }
}

async fn probe(manager: &BackendManager, backend: Backend) -> bool {
    let api = match manager.api_for(backend) {
        Ok(api) => api,
        Err(e) => {
            warn!(backend = %backend, error = %e, "cannot build gateway for probe");
            return false;
        }
    };
    match api.health().await {
        Ok(probe) => probe.ok,
        Err(e) => {
            warn!(backend = %backend, error = %e, "health probe failed");
            false
        }
    }
}

/// Probe both backends at once. Each probe fails independently; the call
/// itself always returns a map.
pub async fn check_all(manager: &BackendManager) -> HealthMap {
    let (primary, secondary) = tokio::join!(
        probe(manager, Backend::Primary),
        probe(manager, Backend::Secondary),
    );
    HealthMap { primary, secondary }
}
