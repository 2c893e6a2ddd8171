// src/pipeline/timeline.rs
//
// Caller-side event log. Core events arrive in frame order; classifier
// verdicts arrive late and out of band. Both are merged here by timestamp.

use crate::types::DetectionEvent;
use std::collections::VecDeque;
use tracing::warn;

pub struct EventTimeline {
    events: VecDeque<DetectionEvent>,
    max_events: usize,
    dropped: u64,
}

impl EventTimeline {
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
            dropped: 0,
        }
    }

    /// Insert after every event with an equal or earlier timestamp, so ties
    /// keep arrival order.
    pub fn publish(&mut self, event: DetectionEvent) {
        let at = self
            .events
            .partition_point(|e| e.timestamp() <= event.timestamp());
        self.events.insert(at, event);

        if self.events.len() > self.max_events {
            warn!(
                "Event timeline full ({} events), dropping oldest",
                self.max_events
            );
            self.events.pop_front();
            self.dropped += 1;
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = DetectionEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter()
    }

    pub fn drain(&mut self) -> Vec<DetectionEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}
