// src/detection/mod.rs

mod config;
mod history;
mod manager;
mod pose_metrics;
mod rules;
mod state_machine;

// Re-export public APIs
pub use config::DetectionConfig;
pub use history::{PoseSample, SampleHistory};
pub use manager::{DetectionManager, FrameCounters, SessionMode};
pub use pose_metrics::{
    calculate_center_y, calculate_person_height, compute_pose_metrics, mean_joint_displacement,
    PoseMetrics,
};
pub use rules::{DetectionCandidate, DetectionRule, RuleInput};
pub use state_machine::{DebounceState, RuleStateMachine};
