// src/session.rs
//
// Recording lifecycle around one DetectionManager. Starting a recording
// resets all rule state; stopping it yields the metadata persisted with it.

use crate::detection::{DetectionConfig, DetectionManager, SessionMode};
use crate::error::DetectionError;
use crate::pipeline::{EventTimeline, SessionStats};
use crate::types::{DetectionEvent, DetectionKind, Keypoint};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

const NO_TRANSCRIPT: &str = "No speech detected";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    #[serde(rename = "type")]
    pub kind: DetectionKind,
    pub timestamp: f64,
    pub confidence: f32,
    pub description: String,
}

impl From<&DetectionEvent> for RecordedEvent {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            kind: event.kind(),
            timestamp: event.timestamp(),
            confidence: event.confidence(),
            description: event.description().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingMetadata {
    pub id: String,
    /// Wall-clock start of the recording.
    pub timestamp: DateTime<Utc>,
    /// Seconds.
    pub duration: f64,
    pub events: Vec<RecordedEvent>,
    pub transcript: String,
}

pub struct RecordingSession {
    manager: DetectionManager,
    timeline: EventTimeline,
    stats: SessionStats,
    active: Option<ActiveRecording>,
}

struct ActiveRecording {
    id: String,
    started_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn new(
        config: DetectionConfig,
        mode: SessionMode,
        max_timeline_events: usize,
    ) -> Result<Self, DetectionError> {
        Ok(Self {
            manager: DetectionManager::with_mode(config, mode)?,
            timeline: EventTimeline::new(max_timeline_events),
            stats: SessionStats::new(),
            active: None,
        })
    }

    pub fn start(&mut self) -> &str {
        self.start_at(Utc::now())
    }

    /// Begin a recording at `now`. Any recording in progress is discarded.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> &str {
        if let Some(previous) = &self.active {
            warn!("Discarding unfinished recording {}", previous.id);
        }

        self.manager.reset();
        self.timeline.clear();
        self.stats = SessionStats::new();

        let id = format!("recording-{}", now.timestamp_millis());
        info!("🎬 Recording started: {}", id);
        let active = self.active.insert(ActiveRecording {
            id,
            started_at: now,
        });
        &active.id
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn recording_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    /// Run the rules on one frame. Confirmed events are returned and also
    /// appended to the session timeline.
    pub fn ingest(
        &mut self,
        pose: &[Keypoint],
        timestamp: f64,
    ) -> Result<Vec<DetectionEvent>, DetectionError> {
        let events = self.manager.detect_all(pose, timestamp)?;
        self.stats.sync_frames(self.manager.counters());
        self.stats.record_events(&events);
        self.timeline.extend(events.iter().cloned());
        self.stats.timeline_dropped = self.timeline.dropped();
        Ok(events)
    }

    /// Merge an event produced outside the pose rules (classifier verdicts).
    pub fn merge_external(&mut self, event: DetectionEvent) {
        self.stats.record_events(std::iter::once(&event));
        self.timeline.publish(event);
        self.stats.timeline_dropped = self.timeline.dropped();
    }

    /// Finish the recording. `None` when no recording is in progress.
    pub fn stop(&mut self, duration_sec: f64, transcript: Option<String>) -> Option<RecordingMetadata> {
        let active = self.active.take()?;

        let transcript = transcript
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TRANSCRIPT.to_string());

        let events: Vec<RecordedEvent> = self
            .timeline
            .drain()
            .iter()
            .map(RecordedEvent::from)
            .collect();

        info!(
            "🎬 Recording stopped: {} ({:.1}s, {} events)",
            active.id,
            duration_sec,
            events.len()
        );

        Some(RecordingMetadata {
            id: active.id,
            timestamp: active.started_at,
            duration: duration_sec.max(0.0),
            events,
            transcript,
        })
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn manager(&self) -> &DetectionManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Joint;
    use chrono::TimeZone;

    /// Standing figure with both wrists raised well above the shoulders.
    fn hands_up() -> Vec<Keypoint> {
        vec![
            Keypoint::new(Joint::Nose, 100.0, 40.0, 0.9),
            Keypoint::new(Joint::LeftShoulder, 90.0, 80.0, 0.9),
            Keypoint::new(Joint::RightShoulder, 110.0, 80.0, 0.9),
            Keypoint::new(Joint::LeftWrist, 85.0, 30.0, 0.9),
            Keypoint::new(Joint::RightWrist, 115.0, 30.0, 0.9),
            Keypoint::new(Joint::LeftAnkle, 95.0, 240.0, 0.9),
            Keypoint::new(Joint::RightAnkle, 105.0, 240.0, 0.9),
        ]
    }

    fn session() -> RecordingSession {
        RecordingSession::new(DetectionConfig::default(), SessionMode::Live, 100).unwrap()
    }

    #[test]
    fn test_start_assigns_millis_id() {
        let mut session = session();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let id = session.start_at(start).to_string();
        assert_eq!(id, format!("recording-{}", start.timestamp_millis()));
        assert!(session.is_recording());
        assert_eq!(session.started_at(), Some(start));
    }

    #[test]
    fn test_stop_collects_core_and_external_events_in_order() {
        let mut session = session();
        session.start_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let events = session.ingest(&hands_up(), 1.0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), DetectionKind::HandsRaised);

        session.merge_external(DetectionEvent::new(
            DetectionKind::VlmDetection,
            0.5,
            0.7,
            "Person holding a knife",
        ));

        let metadata = session.stop(4.0, None).unwrap();
        assert!(!session.is_recording());
        assert!(session.timeline().is_empty());
        assert_eq!(metadata.duration, 4.0);
        assert_eq!(metadata.transcript, "No speech detected");
        let kinds: Vec<_> = metadata.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![DetectionKind::VlmDetection, DetectionKind::HandsRaised]
        );

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["events"][1]["type"], "hands_raised");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_restart_resets_rule_state() {
        let mut session = session();
        session.start();
        assert_eq!(session.ingest(&hands_up(), 1.0).unwrap().len(), 1);
        // Still inside the cooldown window.
        assert!(session.ingest(&hands_up(), 2.0).unwrap().is_empty());
        session.stop(2.0, Some("help me".to_string()));

        session.start();
        assert!(session.timeline().is_empty());
        assert_eq!(session.ingest(&hands_up(), 0.0).unwrap().len(), 1);
        assert_eq!(session.stats().total_events(), 1);
    }

    #[test]
    fn test_timeline_overflow_is_reported_in_stats() {
        let mut session =
            RecordingSession::new(DetectionConfig::default(), SessionMode::Live, 1).unwrap();
        session.start();
        session.ingest(&hands_up(), 0.0).unwrap();
        session.merge_external(DetectionEvent::new(DetectionKind::VlmDetection, 0.5, 0.7, "threat"));

        let summary = session.stats().summary();
        assert_eq!(summary.timeline_dropped, 1);
        assert_eq!(summary.total_events, 2);
        assert_eq!(session.stop(1.0, None).unwrap().events.len(), 1);
    }

    #[test]
    fn test_stop_without_start_is_none() {
        let mut session = session();
        assert!(session.stop(1.0, None).is_none());
    }

    #[test]
    fn test_transcript_is_kept_when_present() {
        let mut session = session();
        session.start();
        let metadata = session.stop(1.0, Some(" call an ambulance ".to_string())).unwrap();
        assert_eq!(metadata.transcript, "call an ambulance");
    }
}
