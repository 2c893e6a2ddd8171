// src/detection/pose_metrics.rs
//
// Scalar summaries of a single pose. Pure functions; a pose with too few
// confident joints has no metrics at all and is treated as a no-evidence frame.

use crate::types::Keypoint;

/// Below this vertical extent the posture ratio is meaningless.
const MIN_HEIGHT_PX: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMetrics {
    /// Vertical extent between the highest and lowest observed joints.
    pub height: f32,
    /// Confidence-weighted mean vertical position of observed joints.
    pub center_y: f32,
    pub observed_joints: usize,
}

impl PoseMetrics {
    /// centerY / height. Low values mean a low posture.
    pub fn posture_ratio(&self) -> Option<f32> {
        if self.height < MIN_HEIGHT_PX {
            return None;
        }
        Some(self.center_y / self.height)
    }
}

pub fn compute_pose_metrics(
    pose: &[Keypoint],
    confidence_threshold: f32,
    min_observed_joints: usize,
) -> Option<PoseMetrics> {
    let observed: Vec<&Keypoint> = pose
        .iter()
        .filter(|kp| kp.is_observed(confidence_threshold))
        .collect();

    if observed.len() < min_observed_joints.max(2) {
        return None;
    }

    Some(PoseMetrics {
        height: person_height(&observed),
        center_y: weighted_center_y(&observed)?,
        observed_joints: observed.len(),
    })
}

pub fn calculate_person_height(pose: &[Keypoint], confidence_threshold: f32) -> Option<f32> {
    let observed: Vec<&Keypoint> = pose
        .iter()
        .filter(|kp| kp.is_observed(confidence_threshold))
        .collect();
    if observed.len() < 2 {
        return None;
    }
    Some(person_height(&observed))
}

pub fn calculate_center_y(pose: &[Keypoint], confidence_threshold: f32) -> Option<f32> {
    let observed: Vec<&Keypoint> = pose
        .iter()
        .filter(|kp| kp.is_observed(confidence_threshold))
        .collect();
    if observed.len() < 2 {
        return None;
    }
    weighted_center_y(&observed)
}

fn person_height(observed: &[&Keypoint]) -> f32 {
    let (min_y, max_y) = observed
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), kp| (lo.min(kp.y), hi.max(kp.y)));
    max_y - min_y
}

fn weighted_center_y(observed: &[&Keypoint]) -> Option<f32> {
    let total_weight: f32 = observed.iter().map(|kp| kp.confidence).sum();
    if total_weight <= 0.0 {
        // Only reachable with a zero confidence threshold.
        let mean = observed.iter().map(|kp| kp.y).sum::<f32>() / observed.len() as f32;
        return Some(mean);
    }
    Some(observed.iter().map(|kp| kp.y * kp.confidence).sum::<f32>() / total_weight)
}

/// Mean displacement (px) of joints observed in both poses. `None` when the
/// poses share no observed joint.
pub fn mean_joint_displacement(
    previous: &[Keypoint],
    current: &[Keypoint],
    confidence_threshold: f32,
) -> Option<f32> {
    let mut total = 0.0_f32;
    let mut matched = 0usize;

    for kp in current.iter().filter(|kp| kp.is_observed(confidence_threshold)) {
        if let Some(prev) = previous
            .iter()
            .find(|p| p.joint == kp.joint && p.is_observed(confidence_threshold))
        {
            total += ((kp.x - prev.x).powi(2) + (kp.y - prev.y).powi(2)).sqrt();
            matched += 1;
        }
    }

    if matched == 0 {
        None
    } else {
        Some(total / matched as f32)
    }
}
