// src/classifier.rs
//
// External vision-language threat classifier.
//
// Runs beside the pose rules on its own fixed timer. The caller sends one
// representative frame plus the latest pose summary; a positive verdict is
// turned into a `vlm_detection` event and merged into the session timeline.
// Rate limiting lives in `ClassifierTimer`, not in the detection core.

use crate::detection::{compute_pose_metrics, DetectionConfig};
use crate::types::{DetectionEvent, DetectionKind, EventPayload, Keypoint};
use anyhow::{bail, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Per-person pose context sent along with the frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSummary {
    pub keypoints: Vec<Keypoint>,
    pub person_height: f32,
    pub center_y: f32,
    /// Joints above the confidence gate.
    pub keypoint_count: usize,
}

impl PoseSummary {
    /// `None` when the pose has too few confident joints for metrics.
    pub fn from_pose(pose: &[Keypoint], config: &DetectionConfig) -> Option<Self> {
        let metrics = compute_pose_metrics(
            pose,
            config.confidence_threshold,
            config.min_observed_joints,
        )?;
        Some(Self {
            keypoints: pose.to_vec(),
            person_height: metrics.height,
            center_y: metrics.center_y,
            keypoint_count: metrics.observed_joints,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierRequest {
    pub frame_data_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_data: Option<Vec<PoseSummary>>,
    /// Session seconds of the frame.
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatVerdict {
    pub threat_detected: bool,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub explanation: String,
}

impl ThreatVerdict {
    /// Positive verdicts become a `vlm_detection` event at the frame's
    /// timestamp; negative ones produce nothing.
    pub fn into_event(self, timestamp: f64) -> Option<DetectionEvent> {
        if !self.threat_detected {
            return None;
        }
        let description = if self.description.is_empty() {
            format!("threat detected: {}", self.category)
        } else {
            self.description
        };
        Some(
            DetectionEvent::new(
                DetectionKind::VlmDetection,
                timestamp,
                self.confidence,
                description,
            )
            .with_payload(EventPayload::Threat {
                category: self.category,
                explanation: self.explanation,
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    analysis: ThreatVerdict,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct VlmClient {
    http_client: reqwest::Client,
    server_url: String,
}

impl VlmClient {
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
        format!("{}/api/analyze-vlm", self.server_url)
    }

    pub async fn analyze(&self, request: &ClassifierRequest) -> Result<ThreatVerdict> {
        let url = self.endpoint();
        debug!(
            "🌐 Sending classifier request at {:.2}s ({} poses) to {}",
            request.timestamp,
            request.pose_data.as_ref().map_or(0, |p| p.len()),
            url
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach classifier at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            bail!("Classifier returned {}: {}", status, body);
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .context("Failed to parse classifier response")?;
        let verdict = parsed.analysis;

        if verdict.threat_detected {
            info!(
                "🌐 Classifier threat at {:.2}s: {} (conf={:.2})",
                request.timestamp, verdict.category, verdict.confidence
            );
        } else {
            debug!("🌐 Classifier: no threat at {:.2}s", request.timestamp);
        }
        Ok(verdict)
    }
}

// ============================================================================
// TIMER
// ============================================================================

/// Fixed-interval gate for classifier calls, driven by session time.
#[derive(Debug, Clone)]
pub struct ClassifierTimer {
    interval_sec: f64,
    last_fired: Option<f64>,
}

impl ClassifierTimer {
    pub fn new(interval_sec: f64) -> Self {
        Self {
            interval_sec,
            last_fired: None,
        }
    }

    /// True (and re-armed) when at least one interval has passed since the
    /// last firing. A timestamp before the last firing re-arms the timer.
    pub fn due(&mut self, now: f64) -> bool {
        let ready = match self.last_fired {
            None => true,
            Some(last) => now < last || now - last >= self.interval_sec,
        };
        if ready {
            self.last_fired = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

// ============================================================================
// FRAME ENCODING
// ============================================================================

pub fn frame_data_url(bytes: &[u8], mime: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Read a still image from disk as a data URL. The MIME type follows the
/// file extension; anything unrecognised is sent as JPEG.
pub fn load_frame_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read frame {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        other => {
            warn!("Unknown frame extension {:?}, sending as JPEG", other);
            "image/jpeg"
        }
    };
    Ok(frame_data_url(&bytes, mime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Joint;

    #[test]
    fn test_response_parses_and_converts_to_event() {
        let body = r#"{
            "analysis": {
                "threatDetected": true,
                "confidence": 0.82,
                "description": "Person holding a knife",
                "category": "weapon",
                "explanation": "A blade is visible in the right hand"
            }
        }"#;
        let parsed: AnalyzeResponse = serde_json::from_str(body).unwrap();
        let event = parsed.analysis.into_event(12.5).unwrap();

        assert_eq!(event.kind(), DetectionKind::VlmDetection);
        assert_eq!(event.timestamp(), 12.5);
        assert!((event.confidence() - 0.82).abs() < 1e-6);
        assert_eq!(event.description(), "Person holding a knife");
        assert_eq!(
            event.payload(),
            Some(&EventPayload::Threat {
                category: "weapon".to_string(),
                explanation: "A blade is visible in the right hand".to_string(),
            })
        );
    }

    #[test]
    fn test_negative_verdict_yields_no_event() {
        let verdict: ThreatVerdict =
            serde_json::from_str(r#"{"threatDetected": false, "confidence": 0.1}"#).unwrap();
        assert!(verdict.into_event(1.0).is_none());
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        let verdict: ThreatVerdict = serde_json::from_str(
            r#"{"threatDetected": true, "confidence": 1.7, "category": "violence"}"#,
        )
        .unwrap();
        let event = verdict.into_event(0.0).unwrap();
        assert_eq!(event.confidence(), 1.0);
        assert_eq!(event.description(), "threat detected: violence");
    }

    #[test]
    fn test_request_uses_camel_case_fields() {
        let pose = vec![
            Keypoint::new(Joint::Nose, 100.0, 50.0, 1.0),
            Keypoint::new(Joint::LeftAnkle, 100.0, 250.0, 1.0),
            Keypoint::new(Joint::RightAnkle, 110.0, 250.0, 0.1),
        ];
        let summary = PoseSummary::from_pose(&pose, &DetectionConfig::default()).unwrap();
        assert_eq!(summary.keypoint_count, 2);

        let request = ClassifierRequest {
            frame_data_url: frame_data_url(b"abc", "image/jpeg"),
            pose_data: Some(vec![summary]),
            timestamp: 3.0,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["frameDataUrl"], "data:image/jpeg;base64,YWJj");
        assert_eq!(json["poseData"][0]["personHeight"], 200.0);
        assert_eq!(json["poseData"][0]["centerY"], 150.0);
        assert_eq!(json["poseData"][0]["keypoints"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_timer_fires_once_per_interval() {
        let mut timer = ClassifierTimer::new(1.5);
        assert!(timer.due(0.0));
        assert!(!timer.due(1.0));
        assert!(timer.due(1.5));
        assert!(!timer.due(2.9));
        assert!(timer.due(3.1));

        timer.reset();
        assert!(timer.due(3.2));
    }

    #[test]
    fn test_frame_file_is_encoded_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            load_frame_data_url(&path).unwrap(),
            "data:image/png;base64,YWJj"
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = VlmClient::new("http://localhost:3001/", 5).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3001/api/analyze-vlm");
    }
}
