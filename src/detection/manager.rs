// src/detection/manager.rs
//
// Orchestrator for the pose rules. Single entry point: call detect_all()
// once per frame with strictly non-decreasing timestamps. Every rule gets
// the frame in a fixed order, so events confirmed on the same frame always
// come out as fall, person_on_ground, unconscious, hands_raised.
//
// The manager performs no I/O. Alerting, storage and UI act on the returned
// events. One manager per camera stream; nothing is shared between instances.

use super::config::DetectionConfig;
use super::history::PoseSample;
use super::pose_metrics::compute_pose_metrics;
use super::rules::{DetectionRule, RuleInput};
use super::state_machine::{DebounceState, RuleStateMachine};
use crate::error::DetectionError;
use crate::types::{DetectionEvent, DetectionKind, Keypoint};
use tracing::{debug, info, warn};

/// How the manager treats a timestamp older than the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Live capture: a backwards timestamp is rejected.
    #[default]
    Live,
    /// Reviewing a stored session: a backwards timestamp is a seek and
    /// resets all rule state before the frame is processed.
    Replay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub frames: u64,
    pub no_evidence_frames: u64,
    pub rewinds: u64,
    /// Candidates dropped by a rule's cooldown.
    pub suppressed: u64,
}

pub struct DetectionManager {
    config: DetectionConfig,
    rules: Vec<RuleStateMachine>,
    mode: SessionMode,
    last_timestamp: Option<f64>,
    counters: FrameCounters,
}

impl DetectionManager {
    pub fn new(config: DetectionConfig) -> Result<Self, DetectionError> {
        Self::with_mode(config, SessionMode::Live)
    }

    pub fn with_mode(config: DetectionConfig, mode: SessionMode) -> Result<Self, DetectionError> {
        config.validate()?;

        let rules = DetectionRule::ALL
            .iter()
            .map(|rule| RuleStateMachine::new(*rule, &config))
            .collect();

        Ok(Self {
            config,
            rules,
            mode,
            last_timestamp: None,
            counters: FrameCounters::default(),
        })
    }

    /// Evaluate one frame and return the events confirmed on it, usually none.
    ///
    /// A pose with too few confident joints is absorbed without touching any
    /// rule state. Fails only on a non-finite timestamp, or on a backwards
    /// timestamp in [`SessionMode::Live`].
    pub fn detect_all(
        &mut self,
        pose: &[Keypoint],
        timestamp: f64,
    ) -> Result<Vec<DetectionEvent>, DetectionError> {
        if !timestamp.is_finite() {
            return Err(DetectionError::InvalidTimestamp(timestamp));
        }

        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                match self.mode {
                    SessionMode::Live => {
                        warn!(
                            "Rejected frame at {:.3}s: previous frame was {:.3}s",
                            timestamp, previous
                        );
                        return Err(DetectionError::NonMonotonicTimestamp {
                            previous,
                            current: timestamp,
                        });
                    }
                    SessionMode::Replay => {
                        info!(
                            "⏪ Seek from {:.3}s to {:.3}s, resetting rule state",
                            previous, timestamp
                        );
                        self.reset_rules();
                        self.counters.rewinds += 1;
                    }
                }
            }
        }

        self.last_timestamp = Some(timestamp);
        self.counters.frames += 1;

        let Some(metrics) = compute_pose_metrics(
            pose,
            self.config.confidence_threshold,
            self.config.min_observed_joints,
        ) else {
            self.counters.no_evidence_frames += 1;
            debug!("No-evidence frame at {:.2}s", timestamp);
            return Ok(Vec::new());
        };

        let input = RuleInput {
            pose,
            metrics: &metrics,
            timestamp,
        };
        let sample = PoseSample {
            timestamp,
            metrics,
            keypoints: pose.to_vec(),
        };

        let suppressed_before = self.suppressed_in_rules();
        let config = &self.config;
        let events = self
            .rules
            .iter_mut()
            .filter_map(|rule| rule.process(&input, &sample, config))
            .collect();
        self.counters.suppressed += self.suppressed_in_rules() - suppressed_before;
        Ok(events)
    }

    fn suppressed_in_rules(&self) -> u64 {
        self.rules.iter().map(|r| r.suppressed()).sum()
    }

    /// Clear every rule's history and cooldown. Call at the start of each
    /// recording session.
    pub fn reset(&mut self) {
        self.reset_rules();
        self.counters = FrameCounters::default();
        debug!("Detection state reset");
    }

    /// Rule state only; frame counters survive a replay seek.
    fn reset_rules(&mut self) {
        for rule in &mut self.rules {
            rule.reset();
        }
        self.last_timestamp = None;
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn rule_state(&self, kind: DetectionKind) -> Option<DebounceState> {
        self.rule(kind).map(|r| r.state())
    }

    pub fn last_confirmed(&self, kind: DetectionKind) -> Option<f64> {
        self.rule(kind).and_then(|r| r.last_confirmed())
    }

    pub fn history_len(&self, kind: DetectionKind) -> usize {
        self.rule(kind).map_or(0, |r| r.history_len())
    }

    fn rule(&self, kind: DetectionKind) -> Option<&RuleStateMachine> {
        self.rules.iter().find(|r| r.rule().kind() == kind)
    }
}
