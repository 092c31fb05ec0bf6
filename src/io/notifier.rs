//! Outbound occupancy notifications over HTTP
//!
//! Each event is POSTed as JSON to the status-tracking service:
//! `{"eventType":"enter","timestamp":"2024-03-01T02:00:00.000Z",
//!   "licensePlateNumber":"WXY1234","bayNumber":3,"stationId":"ST-001"}`

use crate::domain::types::OccupancyEvent;
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Errors raised while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("endpoint answered {status}")]
    Status { status: u16, reason: Option<String> },
}

/// Outcome of a delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub reason: Option<String>,
    pub latency_us: u64,
}

/// Delivers a single occupancy event to a remote endpoint
#[async_trait]
pub trait NotificationClient: Send + Sync {
    async fn send(&self, event: &OccupancyEvent) -> Result<DeliveryReceipt, NotifyError>;
}

/// Wire payload expected by the status-tracking service
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_type: String,
    pub timestamp: String,
    pub license_plate_number: String,
    pub bay_number: u32,
    pub station_id: String,
}

impl EventPayload {
    pub fn new(event: &OccupancyEvent, station_id: &str) -> Self {
        Self {
            event_type: event.kind.as_str().to_string(),
            timestamp: event.timestamp_iso(),
            license_plate_number: event.plate.clone(),
            bay_number: event.bay.0,
            station_id: station_id.to_string(),
        }
    }
}

pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
    station_id: String,
}

impl HttpNotifier {
    pub fn new(config: &Config) -> Result<Self, NotifyError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.notify_timeout_ms()))
            .build()
            .map_err(NotifyError::Client)?;

        Ok(Self {
            client,
            url: Self::join_url(config.notify_base_url(), config.notify_events_path()),
            access_token: config.notify_access_token().map(str::to_string),
            station_id: config.station_id().to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn join_url(base: &str, path: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl NotificationClient for HttpNotifier {
    async fn send(&self, event: &OccupancyEvent) -> Result<DeliveryReceipt, NotifyError> {
        let start = Instant::now();
        let payload = EventPayload::new(event, &self.station_id);

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.access_token {
            request = request.header("access_token", token);
        }

        let response = request.send().await.map_err(NotifyError::Transport)?;
        let status = response.status();
        let reason = status.canonical_reason().map(str::to_string);
        let latency_us = start.elapsed().as_micros() as u64;

        debug!(
            url = %self.url,
            status = %status.as_u16(),
            latency_us = %latency_us,
            "notification_response"
        );

        if !status.is_success() {
            return Err(NotifyError::Status { status: status.as_u16(), reason });
        }

        Ok(DeliveryReceipt { status: status.as_u16(), reason, latency_us })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BayId, Reading};
    use chrono::{DateTime, Utc};

    fn reading() -> Reading {
        Reading::new(
            "WXY1234",
            BayId(3),
            DateTime::<Utc>::from_timestamp_millis(1_709_258_400_000).unwrap(),
        )
    }

    #[test]
    fn test_payload_field_names() {
        let payload = EventPayload::new(&OccupancyEvent::enter(&reading()), "ST-001");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["eventType"], "enter");
        assert_eq!(json["timestamp"], "2024-03-01T02:00:00.000Z");
        assert_eq!(json["licensePlateNumber"], "WXY1234");
        assert_eq!(json["bayNumber"], 3);
        assert_eq!(json["stationId"], "ST-001");
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_exit_payload() {
        let payload = EventPayload::new(&OccupancyEvent::exit(&reading()), "ST-001");
        assert_eq!(payload.event_type, "exit");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            HttpNotifier::join_url("https://api.example.com/", "/api/cameras/license-plate-events"),
            "https://api.example.com/api/cameras/license-plate-events"
        );
        assert_eq!(HttpNotifier::join_url("http://h", "x"), "http://h/x");
    }

    #[test]
    fn test_new_from_default_config() {
        let notifier = HttpNotifier::new(&Config::default()).unwrap();
        assert_eq!(notifier.url(), "http://localhost:8080/api/cameras/license-plate-events");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config = Config::default().with_notify_base_url("http://127.0.0.1:1");
        let notifier = HttpNotifier::new(&config).unwrap();
        let result = notifier.send(&OccupancyEvent::enter(&reading())).await;
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }
}
