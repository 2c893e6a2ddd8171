// src/lib.rs

pub mod alert;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod session;
pub mod types;

pub use config::Config;
pub use detection::{DetectionConfig, DetectionManager, SessionMode};
pub use error::DetectionError;
pub use types::{DetectionEvent, DetectionKind, Joint, Keypoint, PoseFrame};
