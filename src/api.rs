//! Backend wire models and the typed HTTP operation set
//!
//! Both backends expose the same REST surface under their base URL:
//! `health`, `api/messages` and `api/sim-cards`. A `BackendApi` is bound to
//! one base URL at construction and performs a single operation per call;
//! the fallback layer decides which endpoint gets bound.

use crate::error::{Error, Result};
use crate::settings::Backend;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Kind of relayed device event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sms,
    Call,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<EventKind> {
        match s.trim().to_lowercase().as_str() {
            "sms" => Some(EventKind::Sms),
            "call" => Some(EventKind::Call),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sms => "sms",
            EventKind::Call => "call",
        }
    }
}

/// One device event on its way to a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    pub sim_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub message: String,
    /// ISO-8601 UTC with millisecond precision, see [`iso_timestamp`]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_is_active() -> bool {
    true
}

/// A device SIM identity as registered with the backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimCard {
    pub sim_id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

/// Write acknowledgement returned by both backends
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub received: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Health body reported by a backend, parsed best-effort
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub service: String,
    /// Field name as emitted by both backends
    #[serde(default, rename = "mongodb")]
    pub dependency_status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Outcome of probing one endpoint. Reachability is decided by the HTTP
/// status alone; the body is informational.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub ok: bool,
    pub latency: Duration,
    pub report: Option<HealthReport>,
}

/// Query filter for listing stored events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub sim_id: Option<String>,
    pub kind: Option<EventKind>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

impl EventFilter {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(ref sim_id) = self.sim_id {
            query.push(("sim_id", sim_id.clone()));
        }
        if let Some(kind) = self.kind {
            query.push(("type", kind.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(skip) = self.skip {
            query.push(("skip", skip.to_string()));
        }
        query
    }
}

/// Format a unix-millisecond timestamp the way the backends expect it:
/// ISO-8601 UTC with millisecond precision.
pub fn iso_timestamp(millis: i64) -> String {
    let dt = Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// One backend's REST surface, bound to a base URL
pub struct BackendApi {
    backend: Backend,
    base_url: String,
    client: reqwest::Client,
}

impl BackendApi {
    pub fn new(backend: Backend, base_url: String, client: reqwest::Client) -> Self {
        Self {
            backend,
            base_url,
            client,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a relative path onto the base URL (which ends with a slash).
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx answer into a typed error, preserving the body.
    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn read_ack(&self, resp: reqwest::Response) -> Result<Ack> {
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.json::<Ack>().await?)
    }

    /// Probe the endpoint. Transport failures return an error; an HTTP
    /// response of any status counts as an answer.
    pub async fn health(&self) -> Result<HealthProbe> {
        let started = Instant::now();
        let resp = self.client.get(self.url("health")).send().await?;
        let latency = started.elapsed();
        let ok = resp.status().is_success();
        let report = if ok {
            resp.json::<HealthReport>().await.ok()
        } else {
            None
        };
        debug!(backend = %self.backend, ok, latency_ms = latency.as_millis() as u64, "health probe");
        Ok(HealthProbe {
            ok,
            latency,
            report,
        })
    }

    /// Deliver one event.
    pub async fn send_event(&self, event: &RelayEvent) -> Result<Ack> {
        let resp = self
            .client
            .post(self.url("api/messages"))
            .json(event)
            .send()
            .await?;
        self.read_ack(resp).await
    }

    /// Register a SIM identity. Safe to repeat; the backends upsert.
    pub async fn register_sim(&self, sim: &SimCard) -> Result<Ack> {
        let resp = self
            .client
            .post(self.url("api/sim-cards"))
            .json(sim)
            .send()
            .await?;
        self.read_ack(resp).await
    }

    /// Fetch stored events matching the filter.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<RelayEvent>> {
        let resp = self
            .client
            .get(self.url("api/messages"))
            .query(&filter.to_query())
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.json::<Vec<RelayEvent>>().await?)
    }

    /// Fetch the SIM identities the backend knows about.
    pub async fn list_sims(&self) -> Result<Vec<SimCard>> {
        let resp = self.client.get(self.url("api/sim-cards")).send().await?;
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.json::<Vec<SimCard>>().await?)
    }

    /// Flag a stored event as processed. Some backends answer with an empty
    /// body, so a 2xx alone is enough.
    pub async fn mark_processed(&self, message_id: &str) -> Result<Ack> {
        let resp = self
            .client
            .put(self.url(&format!("api/messages/{}/processed", message_id)))
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;
        let body = resp.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Ack {
            status: "ok".to_string(),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_wire_names() {
        let event = RelayEvent {
            sim_id: "SIM-1".to_string(),
            kind: EventKind::Sms,
            from: "+15550001".to_string(),
            to: None,
            message: "hello".to_string(),
            timestamp: iso_timestamp(1_700_000_000_000),
            metadata: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sms");
        assert_eq!(json["from"], "+15550001");
        assert!(json.get("to").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!(EventKind::parse("sms"), Some(EventKind::Sms));
        assert_eq!(EventKind::parse("CALL"), Some(EventKind::Call));
        assert_eq!(EventKind::parse("mms"), None);
    }

    #[test]
    fn test_sim_card_is_active_defaults_true() {
        let sim: SimCard =
            serde_json::from_str(r#"{"sim_id":"SIM-1","phone_number":"+15550001"}"#).unwrap();
        assert!(sim.is_active);
        assert_eq!(sim.carrier, None);
    }

    #[test]
    fn test_ack_parses_leniently() {
        let ack: Ack = serde_json::from_str(r#"{"status":"success","message_id":"abc"}"#).unwrap();
        assert_eq!(ack.status, "success");
        assert_eq!(ack.message_id.as_deref(), Some("abc"));
        assert_eq!(ack.error, None);

        let bare: Ack = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.status, "");
    }

    #[test]
    fn test_health_report_dependency_field() {
        let report: HealthReport =
            serde_json::from_str(r#"{"status":"healthy","service":"relay","mongodb":"connected"}"#)
                .unwrap();
        assert_eq!(report.dependency_status.as_deref(), Some("connected"));
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp(0);
        assert_eq!(ts, "1970-01-01T00:00:00.000Z");
        let ts = iso_timestamp(1_700_000_000_123);
        assert!(ts.ends_with(".123Z"));
    }

    #[test]
    fn test_event_filter_query() {
        let filter = EventFilter {
            sim_id: Some("SIM-1".to_string()),
            kind: Some(EventKind::Call),
            limit: Some(10),
            skip: None,
        };
        let query = filter.to_query();
        assert_eq!(
            query,
            vec![
                ("sim_id", "SIM-1".to_string()),
                ("type", "call".to_string()),
                ("limit", "10".to_string()),
            ]
        );
        assert!(EventFilter::default().to_query().is_empty());
    }
}
