//! Host-facing relay operations
//!
//! `RelayService` is what the host shell calls: it turns plain host data
//! (an SMS, a call record, the SIM manifest) into wire events and runs
//! them through the fallback executor. Delivery is best-effort and
//! at-most-once; a `None` result means both backends rejected the
//! operation and the event is gone.

use crate::api::{Ack, EventFilter, EventKind, RelayEvent, SimCard};
use crate::config::{Config, APP_VERSION};
use crate::device;
use crate::error::Result;
use crate::fallback::BackendManager;
use crate::health::{self, HealthMap};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Direction of a relayed call record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Incoming,
    Outgoing,
    Missed,
}

impl CallKind {
    pub fn parse(s: &str) -> Option<CallKind> {
        match s.trim().to_lowercase().as_str() {
            "incoming" => Some(CallKind::Incoming),
            "outgoing" => Some(CallKind::Outgoing),
            "missed" => Some(CallKind::Missed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Incoming => "incoming",
            CallKind::Outgoing => "outgoing",
            CallKind::Missed => "missed",
        }
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn device_info() -> serde_json::Value {
    json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Build the wire event for one SMS.
pub fn sms_event(
    sim_id: String,
    sender: &str,
    recipient: Option<&str>,
    body: &str,
    timestamp_ms: i64,
) -> RelayEvent {
    let mut metadata = serde_json::Map::new();
    metadata.insert("is_incoming".to_string(), json!(true));
    metadata.insert("app_version".to_string(), json!(APP_VERSION));
    metadata.insert("device_info".to_string(), device_info());

    RelayEvent {
        sim_id,
        kind: EventKind::Sms,
        from: sender.to_string(),
        to: recipient.map(str::to_string),
        message: body.to_string(),
        timestamp: crate::api::iso_timestamp(timestamp_ms),
        metadata: Some(metadata),
    }
}

/// Build the wire event for one call record. Outgoing calls report the
/// device as the caller and carry the dialed number in `recipient`.
pub fn call_event(
    sim_id: String,
    caller: &str,
    recipient: Option<&str>,
    kind: CallKind,
    duration_secs: u64,
    timestamp_ms: i64,
) -> RelayEvent {
    let mut metadata = serde_json::Map::new();
    metadata.insert("call_type".to_string(), json!(kind.as_str()));
    metadata.insert("duration_seconds".to_string(), json!(duration_secs));
    metadata.insert("app_version".to_string(), json!(APP_VERSION));
    metadata.insert("device_info".to_string(), device_info());

    RelayEvent {
        sim_id,
        kind: EventKind::Call,
        from: caller.to_string(),
        to: recipient.map(str::to_string),
        message: format!("Call - Duration: {}s, Type: {}", duration_secs, kind),
        timestamp: crate::api::iso_timestamp(timestamp_ms),
        metadata: Some(metadata),
    }
}

/// The relay operations the host shell drives
pub struct RelayService {
    config: Config,
    manager: Arc<BackendManager>,
}

impl RelayService {
    pub fn new(config: Config, manager: Arc<BackendManager>) -> Self {
        Self { config, manager }
    }

    pub fn manager(&self) -> &Arc<BackendManager> {
        &self.manager
    }

    fn event_sim(&self) -> SimCard {
        device::event_sim(&device::load_sims(&self.config.sims_file))
    }

    /// Relay one SMS. Returns the backend acknowledgement, or `None` when
    /// both backends failed.
    pub async fn send_sms(
        &self,
        sender: &str,
        recipient: Option<&str>,
        body: &str,
        timestamp_ms: i64,
    ) -> Option<Ack> {
        let sim = self.event_sim();
        let event = sms_event(sim.sim_id, sender, recipient, body, timestamp_ms);
        let ack = self
            .manager
            .execute_with_fallback("send_sms", |api| {
                let event = event.clone();
                async move { api.send_event(&event).await }
            })
            .await;
        if let Some(ref ack) = ack {
            info!(from = %event.from, message_id = ?ack.message_id, "SMS relayed");
        }
        ack
    }

    /// Relay one call record.
    pub async fn send_call(
        &self,
        caller: &str,
        recipient: Option<&str>,
        kind: CallKind,
        duration_secs: u64,
        timestamp_ms: i64,
    ) -> Option<Ack> {
        let sim = self.event_sim();
        let event = call_event(
            sim.sim_id,
            caller,
            recipient,
            kind,
            duration_secs,
            timestamp_ms,
        );
        let ack = self
            .manager
            .execute_with_fallback("send_call", |api| {
                let event = event.clone();
                async move { api.send_event(&event).await }
            })
            .await;
        if let Some(ref ack) = ack {
            info!(caller = %event.from, kind = %kind, message_id = ?ack.message_id, "call relayed");
        }
        ack
    }

    /// Register every SIM in the manifest. Returns how many made it to a
    /// backend along with the manifest size; failures are logged and
    /// skipped.
    pub async fn register_all_sims(&self) -> (usize, usize) {
        let sims = device::load_sims(&self.config.sims_file);
        let mut registered = 0;
        for sim in &sims {
            let ack = self
                .manager
                .execute_with_fallback("register_sim", |api| {
                    let sim = sim.clone();
                    async move { api.register_sim(&sim).await }
                })
                .await;
            match ack {
                Some(_) => {
                    debug!(sim_id = %sim.sim_id, "registered SIM");
                    registered += 1;
                }
                None => warn!(sim_id = %sim.sim_id, "SIM registration failed on both backends"),
            }
        }
        info!(registered, total = sims.len(), "SIM registration complete");
        (registered, sims.len())
    }

    /// Probe both backends.
    pub async fn check_connectivity(&self) -> HealthMap {
        health::check_all(&self.manager).await
    }

    /// Persist backend settings, then re-register SIMs and re-probe both
    /// backends. Runs the full sequence even when nothing changed. Empty
    /// URL values leave the stored URLs as they are; an unknown active
    /// name leaves the selection as it is.
    pub async fn save_settings(
        &self,
        primary_url: Option<&str>,
        secondary_url: Option<&str>,
        active: &str,
    ) -> Result<HealthMap> {
        let store = self.manager.store();
        if let Some(url) = primary_url {
            store.set_endpoint_url(crate::settings::Backend::Primary, url)?;
        }
        if let Some(url) = secondary_url {
            store.set_endpoint_url(crate::settings::Backend::Secondary, url)?;
        }
        store.set_active_backend(active)?;

        let (registered, _) = self.register_all_sims().await;
        let map = self.check_connectivity().await;
        info!(registered, summary = %map.summary(), "settings saved");
        Ok(map)
    }

    /// Fetch stored events through the fallback executor.
    pub async fn list_events(&self, filter: &EventFilter) -> Option<Vec<RelayEvent>> {
        self.manager
            .execute_with_fallback("list_events", |api| {
                let filter = filter.clone();
                async move { api.list_events(&filter).await }
            })
            .await
    }

    /// Fetch registered SIMs through the fallback executor.
    pub async fn list_sims(&self) -> Option<Vec<SimCard>> {
        self.manager
            .execute_with_fallback("list_sims", |api| async move { api.list_sims().await })
            .await
    }

    /// Flag a stored event as processed through the fallback executor.
    pub async fn mark_processed(&self, message_id: &str) -> Option<Ack> {
        self.manager
            .execute_with_fallback("mark_processed", |api| {
                let message_id = message_id.to_string();
                async move { api.mark_processed(&message_id).await }
            })
            .await
    }
}
