// src/detection/config.rs

use crate::error::DetectionError;
use serde::{Deserialize, Serialize};

/// Thresholds for the pose rules. Fixed for the lifetime of a
/// `DetectionManager`; checked once by [`DetectionConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum joint confidence for a joint to count as observed.
    #[serde(alias = "confidenceThreshold")]
    pub confidence_threshold: f32,
    /// Observed joints required before metrics are defined.
    #[serde(alias = "minObservedJoints")]
    pub min_observed_joints: usize,
    /// Fractional drop of the posture ratio that flags a fall.
    #[serde(alias = "fallDropRatio")]
    pub fall_drop_ratio: f32,
    /// Sub-window the fall drop must happen within.
    #[serde(alias = "fallWindowSec")]
    pub fall_window_sec: f64,
    /// Posture ratio below which the person counts as low / on the ground.
    #[serde(alias = "groundRatioThreshold")]
    pub ground_ratio_threshold: f32,
    #[serde(alias = "groundDurationSec")]
    pub ground_duration_sec: f64,
    #[serde(alias = "unconsciousStillnessSec")]
    pub unconscious_stillness_sec: f64,
    /// Mean per-joint displacement (px) between frames still counted as motionless.
    #[serde(alias = "stillnessMotionPx")]
    pub stillness_motion_px: f32,
    #[serde(alias = "handsRaisedMarginPx")]
    pub hands_raised_margin_px: f32,
    #[serde(alias = "handsRaisedConfidence")]
    pub hands_raised_confidence: f32,
    /// Minimum gap between two confirmed events of the same type.
    #[serde(alias = "cooldownSec")]
    pub cooldown_sec: f64,
    /// Retained per-rule history.
    #[serde(alias = "historyWindowSec")]
    pub history_window_sec: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            min_observed_joints: 2,
            fall_drop_ratio: 0.3,
            fall_window_sec: 1.0,
            ground_ratio_threshold: 0.6,
            ground_duration_sec: 2.0,
            unconscious_stillness_sec: 5.0,
            stillness_motion_px: 4.0,
            hands_raised_margin_px: 30.0,
            hands_raised_confidence: 0.9,
            cooldown_sec: 5.0,
            history_window_sec: 10.0,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        unit_interval("confidence_threshold", self.confidence_threshold)?;
        unit_interval("hands_raised_confidence", self.hands_raised_confidence)?;

        finite("fall_drop_ratio", self.fall_drop_ratio as f64)?;
        if self.fall_drop_ratio <= 0.0 || self.fall_drop_ratio > 1.0 {
            return Err(DetectionError::config(
                "fall_drop_ratio",
                format!("must be in (0, 1], got {}", self.fall_drop_ratio),
            ));
        }

        if self.min_observed_joints < 2 {
            return Err(DetectionError::config(
                "min_observed_joints",
                format!("must be at least 2, got {}", self.min_observed_joints),
            ));
        }

        positive("fall_window_sec", self.fall_window_sec)?;
        positive("ground_duration_sec", self.ground_duration_sec)?;
        positive("unconscious_stillness_sec", self.unconscious_stillness_sec)?;
        positive("history_window_sec", self.history_window_sec)?;
        positive("ground_ratio_threshold", self.ground_ratio_threshold as f64)?;

        non_negative("stillness_motion_px", self.stillness_motion_px as f64)?;
        non_negative("hands_raised_margin_px", self.hands_raised_margin_px as f64)?;
        non_negative("cooldown_sec", self.cooldown_sec)?;

        let longest_rule_window = self
            .fall_window_sec
            .max(self.ground_duration_sec)
            .max(self.unconscious_stillness_sec);
        if self.history_window_sec < longest_rule_window {
            return Err(DetectionError::config(
                "history_window_sec",
                format!(
                    "must cover the longest rule window ({:.2}s), got {:.2}s",
                    longest_rule_window, self.history_window_sec
                ),
            ));
        }

        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), DetectionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DetectionError::config(field, format!("must be finite, got {}", value)))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), DetectionError> {
    finite(field, value as f64)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(DetectionError::config(
            field,
            format!("must be in [0, 1], got {}", value),
        ));
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), DetectionError> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(DetectionError::config(
            field,
            format!("must be positive, got {}", value),
        ));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), DetectionError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(DetectionError::config(
            field,
            format!("must not be negative, got {}", value),
        ));
    }
    Ok(())
}
