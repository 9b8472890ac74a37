//! Device SIM identities
//!
//! The host keeps its SIM subscriptions in a small JSON manifest
//! (`sims.json`, an array of SIM cards). The relay registers whatever the
//! manifest lists; when the manifest is missing or unreadable a single
//! placeholder identity stands in so events still carry a sim_id.

use crate::api::SimCard;
use crate::error::Result;
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

/// Placeholder identity used when no manifest is available.
pub fn fallback_sim() -> SimCard {
    SimCard {
        sim_id: format!("SIM-UNKNOWN-{}", Utc::now().timestamp_millis()),
        phone_number: "unknown".to_string(),
        carrier: None,
        is_active: true,
    }
}

fn read_manifest(path: &Path) -> Result<Vec<SimCard>> {
    let contents = std::fs::read_to_string(path)?;
    let sims = serde_json::from_str(&contents)?;
    Ok(sims)
}

/// Load the SIM manifest. Always returns at least one identity.
pub fn load_sims(path: &Path) -> Vec<SimCard> {
    match read_manifest(path) {
        Ok(sims) if !sims.is_empty() => {
            info!(count = sims.len(), "loaded SIM manifest");
            sims
        }
        Ok(_) => {
            warn!(path = %path.display(), "SIM manifest is empty, using fallback identity");
            vec![fallback_sim()]
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read SIM manifest, using fallback identity");
            vec![fallback_sim()]
        }
    }
}

/// The identity that stamps outgoing events: the first active SIM, or the
/// first SIM at all when none is marked active.
pub fn event_sim(sims: &[SimCard]) -> SimCard {
    sims.iter()
        .find(|sim| sim.is_active)
        .or_else(|| sims.first())
        .cloned()
        .unwrap_or_else(fallback_sim)
}
