// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// KEYPOINTS
// ============================================================================

/// Joint vocabulary of the pose model (COCO / MoveNet ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; 17] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

/// A single joint estimate in frame-pixel space.
///
/// The pose model reports its per-joint confidence as `score`; both spellings
/// are accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    #[serde(rename = "name")]
    pub joint: Joint,
    pub x: f32,
    pub y: f32,
    #[serde(alias = "score")]
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(joint: Joint, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            joint,
            x,
            y,
            confidence,
        }
    }

    /// A joint counts as observed when it clears the confidence gate and
    /// carries a usable position.
    pub fn is_observed(&self, confidence_threshold: f32) -> bool {
        self.confidence >= confidence_threshold && self.x.is_finite() && self.y.is_finite()
    }
}

/// Best observed estimate of `joint` in the pose, if any.
pub fn observed_joint(pose: &[Keypoint], joint: Joint, confidence_threshold: f32) -> Option<&Keypoint> {
    pose.iter()
        .filter(|kp| kp.joint == joint && kp.is_observed(confidence_threshold))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// One line of a recorded pose log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseFrame {
    pub timestamp: f64,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    /// Still image captured with this pose, relative to the log file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<std::path::PathBuf>,
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Fall,
    PersonOnGround,
    Unconscious,
    HandsRaised,
    /// Threat reported by the external vision-language classifier.
    VlmDetection,
}

impl DetectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fall => "fall",
            Self::PersonOnGround => "person_on_ground",
            Self::Unconscious => "unconscious",
            Self::HandsRaised => "hands_raised",
            Self::VlmDetection => "vlm_detection",
        }
    }

    /// Events not produced by the pose rules. Their rate limiting belongs to
    /// the caller's classifier timer.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::VlmDetection)
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific extras attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Keypoints { keypoints: Vec<Keypoint> },
    Threat { category: String, explanation: String },
}

/// A confirmed detection. Fields are read-only once built; confidence is
/// clamped into [0, 1] on construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    #[serde(rename = "type")]
    kind: DetectionKind,
    timestamp: f64,
    confidence: f32,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<EventPayload>,
}

impl DetectionEvent {
    pub fn new(
        kind: DetectionKind,
        timestamp: f64,
        confidence: f32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            timestamp,
            confidence: clamp_confidence(confidence),
            description: description.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn kind(&self) -> DetectionKind {
        self.kind
    }

    /// Seconds since session start.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> Option<&EventPayload> {
        self.payload.as_ref()
    }
}

pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
