// src/pipeline/mod.rs

pub mod metrics;
pub mod timeline;

pub use metrics::{SessionStats, StatsSummary};
pub use timeline::EventTimeline;
