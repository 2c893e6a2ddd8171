// src/replay.rs
//
// Offline driver: replays recorded pose logs through a RecordingSession as
// if they were live, with the same classifier and alert collaborators.
//
// Log format is JSON lines, one frame per line:
//   {"timestamp": 0.1, "keypoints": [{"name": "nose", "x": .., "y": .., "score": ..}], "frame": "f0001.jpg"}
// `frame` is optional and resolved relative to the log file.

use crate::alert::{AlertClient, AlertRequest};
use crate::classifier::{load_frame_data_url, ClassifierRequest, ClassifierTimer, PoseSummary, VlmClient};
use crate::config::Config;
use crate::detection::SessionMode;
use crate::pipeline::StatsSummary;
use crate::session::{RecordingMetadata, RecordingSession};
use crate::types::{DetectionEvent, PoseFrame};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn find_pose_logs(input_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        anyhow::bail!("Input directory {} does not exist", input_dir.display());
    }

    let mut logs: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e.eq_ignore_ascii_case("jsonl"))
        })
        .collect();
    logs.sort();

    info!("Found {} pose log(s)", logs.len());
    Ok(logs)
}

/// Parse a pose log. Blank lines are skipped; a malformed line fails the
/// whole file with its line number.
pub fn read_pose_log(path: &Path) -> Result<Vec<PoseFrame>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pose log {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<PoseFrame>(line)
                .with_context(|| format!("{}:{}: invalid pose frame", path.display(), idx + 1))
        })
        .collect()
}

/// Transcript sidecar: `<log stem>.txt` next to the log.
fn read_transcript(log_path: &Path) -> Option<String> {
    let path = log_path.with_extension("txt");
    fs::read_to_string(path).ok()
}

pub struct ReplayOutcome {
    pub metadata: RecordingMetadata,
    pub summary: StatsSummary,
    pub output_path: PathBuf,
}

pub struct ReplayDriver {
    config: Config,
    classifier: Option<VlmClient>,
    alerts: Option<AlertClient>,
    last_start: Option<DateTime<Utc>>,
}

impl ReplayDriver {
    pub fn new(config: Config) -> Result<Self> {
        let classifier = if config.classifier.enabled {
            info!("🌐 Classifier enabled: {}", config.classifier.server_url);
            Some(VlmClient::new(
                &config.classifier.server_url,
                config.classifier.timeout_secs,
            )?)
        } else {
            None
        };

        let alerts = if config.alert.enabled {
            info!("📨 Alerts enabled: {}", config.alert.server_url);
            Some(AlertClient::new(
                &config.alert.server_url,
                config.alert.timeout_secs,
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            classifier,
            alerts,
            last_start: None,
        })
    }

    /// Recording ids are millisecond stamps; keep them unique when logs are
    /// replayed back to back.
    fn next_start(&mut self) -> DateTime<Utc> {
        let start = start_after(self.last_start, Utc::now());
        self.last_start = Some(start);
        start
    }

    pub async fn replay_file(&mut self, log_path: &Path) -> Result<ReplayOutcome> {
        let frames = read_pose_log(log_path)?;
        let base_dir = log_path.parent().unwrap_or_else(|| Path::new("."));

        let mut session = RecordingSession::new(
            self.config.detection.clone(),
            SessionMode::Replay,
            self.config.replay.max_timeline_events,
        )
        .context("Invalid detection config")?;
        let started_at = self.next_start();
        session.start_at(started_at);

        let mut timer = ClassifierTimer::new(self.config.classifier.interval_sec);
        let mut first_ts: Option<f64> = None;
        let mut last_ts: Option<f64> = None;

        for frame in &frames {
            let events = match session.ingest(&frame.keypoints, frame.timestamp) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Skipping frame in {}: {}", log_path.display(), e);
                    continue;
                }
            };
            first_ts.get_or_insert(frame.timestamp);
            last_ts = Some(frame.timestamp);

            let frame_path = frame.frame.as_ref().map(|p| base_dir.join(p));
            let mut frame_url: Option<String> = None;

            if let Some(classifier) = &self.classifier {
                if let Some(path) = &frame_path {
                    if timer.due(frame.timestamp) {
                        frame_url = load_frame(path);
                        if let Some(url) = &frame_url {
                            let request = ClassifierRequest {
                                frame_data_url: url.clone(),
                                pose_data: PoseSummary::from_pose(
                                    &frame.keypoints,
                                    &self.config.detection,
                                )
                                .map(|summary| vec![summary]),
                                timestamp: frame.timestamp,
                            };
                            session.stats_mut().classifier_calls += 1;
                            match classifier.analyze(&request).await {
                                Ok(verdict) => {
                                    if let Some(event) = verdict.into_event(frame.timestamp) {
                                        self.alert(&mut session, &event, started_at, frame_url.clone())
                                            .await;
                                        session.merge_external(event);
                                    }
                                }
                                Err(e) => {
                                    session.stats_mut().classifier_failures += 1;
                                    warn!("🌐 Classifier call failed: {:#}", e);
                                }
                            }
                        }
                    }
                }
            }

            if self.alerts.is_some() && !events.is_empty() {
                if frame_url.is_none() {
                    frame_url = frame_path.as_deref().and_then(load_frame);
                }
                for event in &events {
                    self.alert(&mut session, event, started_at, frame_url.clone())
                        .await;
                }
            }
        }

        let duration = match (first_ts, last_ts) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let summary = session.stats().summary();
        let metadata = session
            .stop(duration, read_transcript(log_path))
            .context("Recording was not active")?;

        let output_path = self.write_metadata(&metadata)?;
        Ok(ReplayOutcome {
            metadata,
            summary,
            output_path,
        })
    }

    async fn alert(
        &self,
        session: &mut RecordingSession,
        event: &DetectionEvent,
        started_at: DateTime<Utc>,
        frame_url: Option<String>,
    ) {
        let Some(client) = &self.alerts else {
            return;
        };
        let request =
            AlertRequest::from_event(event, started_at, &self.config.replay.camera_id, frame_url);
        let report = client.dispatch_all(std::slice::from_ref(&request)).await;
        let stats = session.stats_mut();
        stats.alerts_sent += report.sent;
        stats.alert_failures += report.failed;
    }

    fn write_metadata(&self, metadata: &RecordingMetadata) -> Result<PathBuf> {
        let output_dir = Path::new(&self.config.replay.output_dir);
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let path = output_dir.join(format!("{}.json", metadata.id));
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Metadata written to {}", path.display());
        Ok(path)
    }
}

/// Ids only carry milliseconds, so two starts inside the same millisecond
/// must still differ at that resolution.
fn start_after(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now.timestamp_millis() <= last.timestamp_millis() => {
            last + ChronoDuration::milliseconds(1)
        }
        _ => now,
    }
}

fn load_frame(path: &Path) -> Option<String> {
    match load_frame_data_url(path) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("{:#}", e);
            None
        }
    }
}
