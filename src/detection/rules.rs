// src/detection/rules.rs
//
// The four pose rules. Each one looks at the current frame plus its own
// bounded history and may propose a candidate; confirmation and rate
// limiting happen in the debounce state machine, never here.

use super::config::DetectionConfig;
use super::history::SampleHistory;
use super::pose_metrics::{mean_joint_displacement, PoseMetrics};
use crate::types::{clamp_confidence, observed_joint, DetectionKind, Joint, Keypoint};

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// Everything a rule may look at for one frame.
pub struct RuleInput<'a> {
    pub pose: &'a [Keypoint],
    pub metrics: &'a PoseMetrics,
    pub timestamp: f64,
}

/// Unconfirmed per-frame proposal. Only the debounce layer turns it into a
/// `DetectionEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCandidate {
    pub kind: DetectionKind,
    pub confidence: f32,
    pub timestamp: f64,
    pub description: String,
    pub keypoints: Vec<Keypoint>,
}

impl DetectionCandidate {
    fn new(kind: DetectionKind, input: &RuleInput<'_>, confidence: f32, description: String) -> Self {
        Self {
            kind,
            confidence: clamp_confidence(confidence),
            timestamp: input.timestamp,
            description,
            keypoints: input.pose.to_vec(),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionRule {
    Fall,
    PersonOnGround,
    Unconscious,
    HandsRaised,
}

impl DetectionRule {
    /// Evaluation order; also the order of events emitted for one frame.
    pub const ALL: [DetectionRule; 4] = [
        DetectionRule::Fall,
        DetectionRule::PersonOnGround,
        DetectionRule::Unconscious,
        DetectionRule::HandsRaised,
    ];

    pub fn kind(&self) -> DetectionKind {
        match self {
            Self::Fall => DetectionKind::Fall,
            Self::PersonOnGround => DetectionKind::PersonOnGround,
            Self::Unconscious => DetectionKind::Unconscious,
            Self::HandsRaised => DetectionKind::HandsRaised,
        }
    }

    /// Hands-raised is a single-frame gesture and keeps no samples.
    pub fn needs_history(&self) -> bool {
        !matches!(self, Self::HandsRaised)
    }

    /// Whether the frame carries the joints this rule needs. A rule without
    /// evidence abstains and leaves its state untouched.
    pub fn has_evidence(&self, input: &RuleInput<'_>, config: &DetectionConfig) -> bool {
        match self {
            Self::Fall | Self::PersonOnGround | Self::Unconscious => {
                input.metrics.posture_ratio().is_some()
            }
            Self::HandsRaised => HAND_PAIRS.iter().any(|(wrist, shoulder)| {
                observed_joint(input.pose, *wrist, config.confidence_threshold).is_some()
                    && observed_joint(input.pose, *shoulder, config.confidence_threshold).is_some()
            }),
        }
    }

    /// `history` already contains the current frame's sample for rules that
    /// keep one.
    pub fn evaluate(
        &self,
        input: &RuleInput<'_>,
        history: &SampleHistory,
        config: &DetectionConfig,
    ) -> Option<DetectionCandidate> {
        match self {
            Self::Fall => evaluate_fall(input, history, config),
            Self::PersonOnGround => evaluate_ground(input, history, config),
            Self::Unconscious => evaluate_unconscious(input, history, config),
            Self::HandsRaised => evaluate_hands_raised(input, config),
        }
    }
}

// ============================================================================
// FALL
// ============================================================================

fn evaluate_fall(
    input: &RuleInput<'_>,
    history: &SampleHistory,
    config: &DetectionConfig,
) -> Option<DetectionCandidate> {
    let current = input.metrics.posture_ratio()?;

    let reference = history
        .since(input.timestamp - config.fall_window_sec)
        .filter_map(|s| s.posture_ratio())
        .fold(f32::MIN, f32::max);
    if reference <= 0.0 {
        return None;
    }

    let drop = (reference - current) / reference;
    if drop < config.fall_drop_ratio {
        return None;
    }

    let confidence = drop / (2.0 * config.fall_drop_ratio);
    Some(DetectionCandidate::new(
        DetectionKind::Fall,
        input,
        confidence,
        format!(
            "possible fall detected (posture ratio {:.2} -> {:.2})",
            reference, current
        ),
    ))
}

// ============================================================================
// PERSON ON GROUND
// ============================================================================

/// Start of the unbroken trailing run of low-posture samples.
fn low_posture_since(history: &SampleHistory, threshold: f32) -> Option<f64> {
    let mut run_start = None;
    for sample in history.iter_rev() {
        match sample.posture_ratio() {
            Some(ratio) if ratio < threshold => run_start = Some(sample.timestamp),
            _ => break,
        }
    }
    run_start
}

fn ground_duration(input: &RuleInput<'_>, history: &SampleHistory, config: &DetectionConfig) -> Option<f64> {
    let since = low_posture_since(history, config.ground_ratio_threshold)?;
    let duration = input.timestamp - since;
    (duration >= config.ground_duration_sec).then_some(duration)
}

fn evaluate_ground(
    input: &RuleInput<'_>,
    history: &SampleHistory,
    config: &DetectionConfig,
) -> Option<DetectionCandidate> {
    let duration = ground_duration(input, history, config)?;
    let required = config.ground_duration_sec;
    let excess = ((duration - required) / required).min(1.0) as f32;

    Some(DetectionCandidate::new(
        DetectionKind::PersonOnGround,
        input,
        0.6 + 0.4 * excess,
        format!("person on ground for {:.1}s", duration),
    ))
}

// ============================================================================
// UNCONSCIOUS
// ============================================================================

/// Start of the unbroken trailing run of frames with negligible motion.
fn still_since(history: &SampleHistory, config: &DetectionConfig) -> Option<f64> {
    let samples: Vec<_> = history.iter_rev().collect();
    let mut run_start = None;
    for pair in samples.windows(2) {
        let (current, previous) = (pair[0], pair[1]);
        match mean_joint_displacement(
            &previous.keypoints,
            &current.keypoints,
            config.confidence_threshold,
        ) {
            Some(moved) if moved <= config.stillness_motion_px => {
                run_start = Some(previous.timestamp)
            }
            _ => break,
        }
    }
    run_start
}

fn evaluate_unconscious(
    input: &RuleInput<'_>,
    history: &SampleHistory,
    config: &DetectionConfig,
) -> Option<DetectionCandidate> {
    let on_ground = ground_duration(input, history, config)?;

    let still = input.timestamp - still_since(history, config)?;
    if still < config.unconscious_stillness_sec {
        return None;
    }

    let ground_factor = (on_ground / (2.0 * config.ground_duration_sec)).min(1.0);
    let still_factor = (still / (2.0 * config.unconscious_stillness_sec)).min(1.0);
    let confidence = (0.5 * ground_factor + 0.5 * still_factor) as f32;

    Some(DetectionCandidate::new(
        DetectionKind::Unconscious,
        input,
        confidence,
        format!(
            "possible unconscious person: on ground {:.1}s, no movement for {:.1}s",
            on_ground, still
        ),
    ))
}

// ============================================================================
// HANDS RAISED
// ============================================================================

const HAND_PAIRS: [(Joint, Joint); 2] = [
    (Joint::LeftWrist, Joint::LeftShoulder),
    (Joint::RightWrist, Joint::RightShoulder),
];

fn evaluate_hands_raised(input: &RuleInput<'_>, config: &DetectionConfig) -> Option<DetectionCandidate> {
    let threshold = config.confidence_threshold;
    let raised: Vec<Joint> = HAND_PAIRS
        .iter()
        .filter_map(|(wrist, shoulder)| {
            let w = observed_joint(input.pose, *wrist, threshold)?;
            let s = observed_joint(input.pose, *shoulder, threshold)?;
            // Image y grows downwards.
            (s.y - w.y > config.hands_raised_margin_px).then_some(*wrist)
        })
        .collect();

    let description = match raised.as_slice() {
        [] => return None,
        [_, _] => "both hands raised above shoulders".to_string(),
        [Joint::LeftWrist] => "left hand raised above shoulder".to_string(),
        _ => "right hand raised above shoulder".to_string(),
    };

    Some(DetectionCandidate::new(
        DetectionKind::HandsRaised,
        input,
        config.hands_raised_confidence,
        description,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::history::PoseSample;
    use crate::detection::pose_metrics::compute_pose_metrics;

    /// Two-joint pose whose posture ratio (center_y / height) is `ratio`,
    /// with a height of 100px.
    fn ratio_pose(ratio: f32, jitter: f32) -> Vec<Keypoint> {
        let center = ratio * 100.0;
        vec![
            Keypoint::new(Joint::Nose, 200.0 + jitter, center - 50.0, 0.9),
            Keypoint::new(Joint::LeftAnkle, 200.0 + jitter, center + 50.0, 0.9),
        ]
    }

    fn feed(
        rule: DetectionRule,
        frames: &[(f64, Vec<Keypoint>)],
        config: &DetectionConfig,
    ) -> Vec<DetectionCandidate> {
        let mut history = SampleHistory::new(config.history_window_sec);
        let mut out = Vec::new();
        for (t, pose) in frames {
            let metrics = compute_pose_metrics(pose, config.confidence_threshold, 2).unwrap();
            let input = RuleInput {
                pose,
                metrics: &metrics,
                timestamp: *t,
            };
            if !rule.has_evidence(&input, config) {
                continue;
            }
            history.push(PoseSample {
                timestamp: *t,
                metrics,
                keypoints: pose.clone(),
            });
            out.extend(rule.evaluate(&input, &history, config));
        }
        out
    }

    #[test]
    fn test_ratio_pose_builder() {
        let m = compute_pose_metrics(&ratio_pose(0.55, 0.0), 0.3, 2).unwrap();
        assert!((m.posture_ratio().unwrap() - 0.55).abs() < 1e-5);
    }

    #[test]
    fn test_fall_fires_on_fractional_drop() {
        let config = DetectionConfig {
            fall_drop_ratio: 0.25,
            ..DetectionConfig::default()
        };
        let frames: Vec<_> = [0.5, 0.5, 0.5, 0.45, 0.3, 0.2]
            .iter()
            .enumerate()
            .map(|(i, r)| (i as f64 * 0.1, ratio_pose(*r, 0.0)))
            .collect();
        let candidates = feed(DetectionRule::Fall, &frames, &config);
        assert!(!candidates.is_empty());
        assert!((candidates[0].timestamp - 0.4).abs() < 1e-9);
        assert!(candidates[0].confidence > 0.5);
        assert!(candidates[0].description.starts_with("possible fall detected"));
    }

    #[test]
    fn test_slow_decline_is_not_a_fall() {
        let config = DetectionConfig {
            fall_drop_ratio: 0.25,
            fall_window_sec: 1.0,
            ..DetectionConfig::default()
        };
        // 0.9 -> 0.5 over four seconds: never more than ~11% within one second.
        let frames: Vec<_> = (0..=40)
            .map(|i| (i as f64 * 0.1, ratio_pose(0.9 - 0.01 * i as f32, 0.0)))
            .collect();
        assert!(feed(DetectionRule::Fall, &frames, &config).is_empty());
    }

    #[test]
    fn test_ground_requires_duration() {
        let config = DetectionConfig::default();
        let frames: Vec<_> = (0..=30)
            .map(|i| (i as f64 * 0.1, ratio_pose(0.55, 0.0)))
            .collect();
        let candidates = feed(DetectionRule::PersonOnGround, &frames, &config);
        let first = &candidates[0];
        assert!((first.timestamp - 2.0).abs() < 0.11);
        assert!(first.confidence < 1.0);
        assert!(first.confidence >= 0.6);
        assert!(candidates.last().unwrap().confidence > first.confidence);
    }

    #[test]
    fn test_ground_run_resets_when_posture_recovers() {
        let config = DetectionConfig::default();
        let mut frames: Vec<_> = (0..15).map(|i| (i as f64 * 0.1, ratio_pose(0.55, 0.0))).collect();
        frames.push((1.5, ratio_pose(0.9, 0.0)));
        frames.extend((16..30).map(|i| (i as f64 * 0.1, ratio_pose(0.55, 0.0))));
        assert!(feed(DetectionRule::PersonOnGround, &frames, &config).is_empty());
    }

    #[test]
    fn test_unconscious_needs_stillness() {
        let config = DetectionConfig {
            ground_duration_sec: 1.0,
            unconscious_stillness_sec: 2.0,
            ..DetectionConfig::default()
        };
        let still: Vec<_> = (0..=25).map(|i| (i as f64 * 0.1, ratio_pose(0.5, 0.0))).collect();
        let candidates = feed(DetectionRule::Unconscious, &still, &config);
        assert!(!candidates.is_empty());
        assert!((candidates[0].timestamp - 2.0).abs() < 0.11);

        let moving: Vec<_> = (0..=25)
            .map(|i| (i as f64 * 0.1, ratio_pose(0.5, if i % 2 == 0 { 0.0 } else { 20.0 })))
            .collect();
        assert!(feed(DetectionRule::Unconscious, &moving, &config).is_empty());
    }

    fn arms_pose(wrist_y: f32, wrist_confidence: f32) -> Vec<Keypoint> {
        vec![
            Keypoint::new(Joint::LeftShoulder, 100.0, 200.0, 0.9),
            Keypoint::new(Joint::RightShoulder, 160.0, 200.0, 0.9),
            Keypoint::new(Joint::LeftWrist, 90.0, wrist_y, wrist_confidence),
            Keypoint::new(Joint::RightWrist, 170.0, wrist_y, wrist_confidence),
        ]
    }

    #[test]
    fn test_hands_raised_single_frame() {
        let config = DetectionConfig::default();
        let frames = vec![(0.0, arms_pose(150.0, 0.9))];
        let candidates = feed(DetectionRule::HandsRaised, &frames, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].description, "both hands raised above shoulders");
        assert_eq!(candidates[0].confidence, 0.9);
    }

    #[test]
    fn test_hands_raised_margin_is_strict() {
        let config = DetectionConfig::default();
        // Exactly the margin above the shoulder is not enough.
        let frames = vec![(0.0, arms_pose(170.0, 0.9))];
        assert!(feed(DetectionRule::HandsRaised, &frames, &config).is_empty());
    }

    #[test]
    fn test_hands_raised_gated_by_confidence() {
        let config = DetectionConfig::default();
        let frames = vec![(0.0, arms_pose(50.0, 0.1))];
        assert!(feed(DetectionRule::HandsRaised, &frames, &config).is_empty());
    }

    #[test]
    fn test_one_hand_description() {
        let config = DetectionConfig::default();
        let mut pose = arms_pose(250.0, 0.9);
        pose[3].y = 100.0;
        let candidates = feed(DetectionRule::HandsRaised, &[(0.0, pose)], &config);
        assert_eq!(candidates[0].description, "right hand raised above shoulder");
    }
}
