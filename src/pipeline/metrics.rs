// src/pipeline/metrics.rs
//
// Per-session counters, logged at the end of a replay and embedded in the
// driver's summary.

use crate::detection::FrameCounters;
use crate::types::DetectionEvent;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub frames: u64,
    pub no_evidence_frames: u64,
    pub rewinds: u64,
    pub suppressed: u64,
    pub timeline_dropped: u64,
    pub events_by_type: BTreeMap<&'static str, u64>,
    pub alerts_sent: u64,
    pub alert_failures: u64,
    pub classifier_calls: u64,
    pub classifier_failures: u64,
    pub started_at: Instant,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            frames: 0,
            no_evidence_frames: 0,
            rewinds: 0,
            suppressed: 0,
            timeline_dropped: 0,
            events_by_type: BTreeMap::new(),
            alerts_sent: 0,
            alert_failures: 0,
            classifier_calls: 0,
            classifier_failures: 0,
            started_at: Instant::now(),
        }
    }

    /// Copy frame counters from the manager. These are cumulative since the
    /// last reset, so the latest snapshot wins.
    pub fn sync_frames(&mut self, counters: FrameCounters) {
        self.frames = counters.frames;
        self.no_evidence_frames = counters.no_evidence_frames;
        self.rewinds = counters.rewinds;
        self.suppressed = counters.suppressed;
    }

    pub fn record_events<'a>(&mut self, events: impl IntoIterator<Item = &'a DetectionEvent>) {
        for event in events {
            *self.events_by_type.entry(event.kind().as_str()).or_insert(0) += 1;
        }
    }

    pub fn total_events(&self) -> u64 {
        self.events_by_type.values().sum()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            frames: self.frames,
            no_evidence_frames: self.no_evidence_frames,
            rewinds: self.rewinds,
            suppressed: self.suppressed,
            timeline_dropped: self.timeline_dropped,
            total_events: self.total_events(),
            events_by_type: self
                .events_by_type
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            alerts_sent: self.alerts_sent,
            alert_failures: self.alert_failures,
            classifier_calls: self.classifier_calls,
            classifier_failures: self.classifier_failures,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSummary {
    pub frames: u64,
    pub no_evidence_frames: u64,
    pub rewinds: u64,
    pub suppressed: u64,
    pub timeline_dropped: u64,
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub alerts_sent: u64,
    pub alert_failures: u64,
    pub classifier_calls: u64,
    pub classifier_failures: u64,
    pub elapsed_secs: f64,
}
