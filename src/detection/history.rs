// src/detection/history.rs
//
// Bounded per-rule sample history. Samples older than the retention window
// are evicted on every push; a hard capacity caps memory if frames arrive
// faster than expected.

use super::pose_metrics::PoseMetrics;
use crate::types::Keypoint;
use std::collections::VecDeque;

/// Upper bound on the sampling rate the capacity is sized for.
const MAX_SAMPLE_RATE_HZ: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct PoseSample {
    pub timestamp: f64,
    pub metrics: PoseMetrics,
    pub keypoints: Vec<Keypoint>,
}

impl PoseSample {
    pub fn posture_ratio(&self) -> Option<f32> {
        self.metrics.posture_ratio()
    }
}

#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<PoseSample>,
    window_sec: f64,
    capacity: usize,
}

impl SampleHistory {
    pub fn new(window_sec: f64) -> Self {
        let capacity = ((window_sec * MAX_SAMPLE_RATE_HZ).ceil() as usize).max(2);
        Self::with_capacity(window_sec, capacity)
    }

    pub fn with_capacity(window_sec: f64, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            window_sec,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: PoseSample) {
        let cutoff = sample.timestamp - self.window_sec;
        while self
            .samples
            .front()
            .map_or(false, |oldest| oldest.timestamp < cutoff)
        {
            self.samples.pop_front();
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&PoseSample> {
        self.samples.back()
    }

    /// Samples newer than or at `since`, oldest first.
    pub fn since(&self, since: f64) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter().filter(move |s| s.timestamp >= since)
    }

    /// Newest first.
    pub fn iter_rev(&self) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter().rev()
    }

    /// Timestamp span between the oldest and newest retained samples.
    pub fn span(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: f64) -> PoseSample {
        PoseSample {
            timestamp,
            metrics: PoseMetrics {
                height: 100.0,
                center_y: 50.0,
                observed_joints: 2,
            },
            keypoints: Vec::new(),
        }
    }

    #[test]
    fn test_evicts_samples_outside_window() {
        let mut history = SampleHistory::new(1.0);
        for i in 0..30 {
            history.push(sample(i as f64 * 0.1));
        }
        assert!(history.span() <= 1.0 + 1e-9);
        assert!((history.latest().unwrap().timestamp - 2.9).abs() < 1e-9);
        assert!(history.iter_rev().all(|s| s.timestamp >= 1.8));
    }

    #[test]
    fn test_capacity_is_a_hard_bound() {
        let mut history = SampleHistory::with_capacity(100.0, 5);
        for i in 0..20 {
            history.push(sample(i as f64));
        }
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter_rev().last().unwrap().timestamp, 15.0);
    }

    #[test]
    fn test_since_and_clear() {
        let mut history = SampleHistory::new(10.0);
        for i in 0..5 {
            history.push(sample(i as f64));
        }
        assert_eq!(history.since(3.0).count(), 2);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.span(), 0.0);
    }
}
