// src/main.rs

use anyhow::Result;
use pose_sentinel::replay::{find_pose_logs, ReplayDriver};
use pose_sentinel::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pose_sentinel={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🧍 Pose Sentinel replay starting");
    info!("✓ Configuration: {}", config_path);
    info!(
        "Thresholds: fall_drop={:.2}, ground_ratio={:.2}, ground={:.1}s, stillness={:.1}s, cooldown={:.1}s",
        config.detection.fall_drop_ratio,
        config.detection.ground_ratio_threshold,
        config.detection.ground_duration_sec,
        config.detection.unconscious_stillness_sec,
        config.detection.cooldown_sec
    );

    let logs = find_pose_logs(&config.replay.input_dir)?;
    if logs.is_empty() {
        warn!("No pose logs found in {}", config.replay.input_dir);
        return Ok(());
    }

    let mut driver = ReplayDriver::new(config)?;
    let mut total_events = 0u64;
    let mut failed = 0usize;

    for (idx, log) in logs.iter().enumerate() {
        info!("========================================");
        info!("Replaying {}/{}: {}", idx + 1, logs.len(), log.display());

        match driver.replay_file(log).await {
            Ok(outcome) => {
                let s = &outcome.summary;
                info!("✓ {} saved to {}", outcome.metadata.id, outcome.output_path.display());
                info!(
                    "  Frames: {} ({} without evidence, {} seeks)",
                    s.frames, s.no_evidence_frames, s.rewinds
                );
                info!("  Duration: {:.1}s", outcome.metadata.duration);
                info!(
                    "  Suppressed by cooldown: {}, dropped from timeline: {}",
                    s.suppressed, s.timeline_dropped
                );
                for (kind, count) in &s.events_by_type {
                    info!("  {}: {}", kind, count);
                }
                if s.classifier_calls > 0 {
                    info!(
                        "  🌐 Classifier: {} calls, {} failed",
                        s.classifier_calls, s.classifier_failures
                    );
                }
                if s.alerts_sent + s.alert_failures > 0 {
                    info!(
                        "  📨 Alerts: {} sent, {} failed",
                        s.alerts_sent, s.alert_failures
                    );
                }
                total_events += s.total_events;
            }
            Err(e) => {
                error!("Failed to replay {}: {:#}", log.display(), e);
                failed += 1;
            }
        }
    }

    info!("========================================");
    info!(
        "Done: {} log(s), {} event(s), {} failure(s)",
        logs.len(),
        total_events,
        failed
    );
    Ok(())
}
