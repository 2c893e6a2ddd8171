// src/detection/state_machine.rs
//
// Per-rule debounce. Each rule owns one RuleStateMachine: its sample history
// plus the time of its last confirmation. The first qualifying candidate is
// confirmed immediately; later candidates are dropped until the cooldown has
// elapsed.
//
//   IDLE --candidate--> CONFIRMED --next frame--> COOLDOWN --cooldown elapsed--> IDLE

use super::config::DetectionConfig;
use super::history::{PoseSample, SampleHistory};
use super::rules::{DetectionCandidate, DetectionRule, RuleInput};
use crate::types::{DetectionEvent, EventPayload};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    /// An event was emitted on the most recent evaluated frame.
    Confirmed,
    Cooldown,
}

pub struct RuleStateMachine {
    rule: DetectionRule,
    state: DebounceState,
    history: SampleHistory,
    last_confirmed: Option<f64>,
    cooldown_sec: f64,
    suppressed: u64,
}

impl RuleStateMachine {
    pub fn new(rule: DetectionRule, config: &DetectionConfig) -> Self {
        Self {
            rule,
            state: DebounceState::Idle,
            history: SampleHistory::new(config.history_window_sec),
            last_confirmed: None,
            cooldown_sec: config.cooldown_sec,
            suppressed: 0,
        }
    }

    /// Run the rule for one frame. Without the joints the rule needs it
    /// abstains, leaving history and cooldown untouched; a confirmation from
    /// the previous frame still decays.
    pub fn process(
        &mut self,
        input: &RuleInput<'_>,
        sample: &PoseSample,
        config: &DetectionConfig,
    ) -> Option<DetectionEvent> {
        if self.state == DebounceState::Confirmed {
            self.state = DebounceState::Cooldown;
        }
        if !self.rule.has_evidence(input, config) {
            debug!("{:?}: abstained at {:.2}s (missing joints)", self.rule, input.timestamp);
            return None;
        }

        self.advance(input.timestamp);

        if self.rule.needs_history() {
            self.history.push(sample.clone());
        }

        let candidate = self.rule.evaluate(input, &self.history, config)?;
        self.submit(candidate)
    }

    /// Time-driven transitions: CONFIRMED always decays to COOLDOWN, and
    /// COOLDOWN ends once `cooldown_sec` has passed since confirmation.
    fn advance(&mut self, now: f64) {
        if self.state == DebounceState::Confirmed {
            self.state = DebounceState::Cooldown;
        }
        if self.state == DebounceState::Cooldown {
            let elapsed = self.last_confirmed.map_or(f64::INFINITY, |t| now - t);
            if elapsed >= self.cooldown_sec {
                self.state = DebounceState::Idle;
            }
        }
    }

    pub fn submit(&mut self, candidate: DetectionCandidate) -> Option<DetectionEvent> {
        self.advance(candidate.timestamp);

        if self.state != DebounceState::Idle {
            self.suppressed += 1;
            debug!(
                "{}: suppressed at {:.2}s (cooldown, last confirmed {:.2}s)",
                candidate.kind,
                candidate.timestamp,
                self.last_confirmed.unwrap_or_default()
            );
            return None;
        }

        self.state = DebounceState::Confirmed;
        self.last_confirmed = Some(candidate.timestamp);

        info!(
            "✅ CONFIRMED: {} at {:.2}s, conf={:.2} ({})",
            candidate.kind, candidate.timestamp, candidate.confidence, candidate.description
        );

        Some(
            DetectionEvent::new(
                candidate.kind,
                candidate.timestamp,
                candidate.confidence,
                candidate.description,
            )
            .with_payload(EventPayload::Keypoints {
                keypoints: candidate.keypoints,
            }),
        )
    }

    pub fn rule(&self) -> DetectionRule {
        self.rule
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn last_confirmed(&self) -> Option<f64> {
        self.last_confirmed
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Candidates dropped by cooldown since the last reset.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
        self.history.clear();
        self.last_confirmed = None;
        self.suppressed = 0;
    }
}
