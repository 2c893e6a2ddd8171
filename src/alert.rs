// src/alert.rs
//
// Outbound alert transport. One request per confirmed event; every send is
// independent, and a failed send never feeds back into detection state.

use crate::types::DetectionEvent;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub detection_type: String,
    pub description: String,
    /// RFC 3339 wall-clock time of the event.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_data_url: Option<String>,
    pub camera_id: String,
}

impl AlertRequest {
    /// Event timestamps are session-relative; `session_start` anchors them to
    /// wall-clock time.
    pub fn from_event(
        event: &DetectionEvent,
        session_start: DateTime<Utc>,
        camera_id: &str,
        frame_data_url: Option<String>,
    ) -> Self {
        let offset = ChronoDuration::milliseconds((event.timestamp() * 1000.0).round() as i64);
        let at = session_start + offset;
        Self {
            detection_type: event.kind().as_str().to_string(),
            description: event.description().to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            frame_data_url,
            camera_id: camera_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u64,
    pub failed: u64,
}

pub struct AlertClient {
    http_client: reqwest::Client,
    server_url: String,
}

impl AlertClient {
    pub fn new(server_url: &str, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/send-alert", self.server_url)
    }

    pub async fn send(&self, request: &AlertRequest) -> Result<()> {
        let url = self.endpoint();
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach alert server at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            bail!("Alert server returned {}: {}", status, body);
        }

        info!(
            "📨 Alert sent: {} at {} ({})",
            request.detection_type, request.timestamp, request.camera_id
        );
        Ok(())
    }

    /// Send every alert, logging failures individually.
    pub async fn dispatch_all(&self, requests: &[AlertRequest]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for request in requests {
            match self.send(request).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    error!(
                        "📨 Alert for {} at {} failed: {:#}",
                        request.detection_type, request.timestamp, e
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectionKind;
    use chrono::TimeZone;

    #[test]
    fn test_request_anchors_session_time_to_wall_clock() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = DetectionEvent::new(DetectionKind::Fall, 2.5, 0.8, "possible fall detected");
        let request = AlertRequest::from_event(&event, start, "Webcam", None);

        assert_eq!(request.timestamp, "2024-05-01T12:00:02.500Z");
        assert_eq!(request.detection_type, "fall");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["detectionType"], "fall");
        assert_eq!(json["cameraId"], "Webcam");
        assert_eq!(json["description"], "possible fall detected");
        assert!(json.get("frameDataUrl").is_none());
    }

    #[test]
    fn test_frame_is_attached_when_available() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = DetectionEvent::new(DetectionKind::HandsRaised, 0.0, 0.9, "hands");
        let request = AlertRequest::from_event(
            &event,
            start,
            "lobby",
            Some("data:image/jpeg;base64,YWJj".to_string()),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["frameDataUrl"], "data:image/jpeg;base64,YWJj");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.000Z");
    }
}
