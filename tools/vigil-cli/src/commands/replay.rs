//! Re-run a recorded session through fresh trackers.

use std::path::PathBuf;
use std::time::Duration;

use vigil_attention::{AttentionTracker, Thresholds};
use vigil_common::clock::SessionClock;
use vigil_common::config::AppConfig;
use vigil_session_model::{summarize_records, RecordKind, SessionLog};
use vigil_telemetry::{MemoryRecorder, ReplaySource};
use vigil_warning_engine::{ActuatorHandle, LoggingActuator, MonitorSession, RecorderHandle};

pub async fn run(
    config: AppConfig,
    log: PathBuf,
    glance_secs: Option<f64>,
    warning_secs: Option<f64>,
) -> anyhow::Result<()> {
    let session_log = SessionLog::load(&log)
        .map_err(|e| anyhow::anyhow!("Failed to load session log: {e}"))?;

    if session_log.header.channels.is_empty() {
        anyhow::bail!("Session log header lists no channels");
    }

    let glance_override = glance_secs.map(Duration::try_from_secs_f64).transpose()?;
    let warning_override = warning_secs.map(Duration::try_from_secs_f64).transpose()?;

    let mut trackers = Vec::new();
    for recorded in &session_log.header.channels {
        let logged = Thresholds::from_recorded(recorded)?;
        let thresholds = Thresholds::new(
            glance_override.unwrap_or(logged.glance_period()),
            warning_override.unwrap_or(logged.warning_period()),
        )?;
        trackers.push(AttentionTracker::new(recorded.channel, thresholds));
    }

    println!("Replaying: {}", log.display());
    for tracker in &trackers {
        let t = tracker.thresholds();
        println!(
            "  {}: glance {:.3}s, warning {:.3}s",
            tracker.channel(),
            t.glance_period().as_secs_f64(),
            t.warning_period().as_secs_f64()
        );
    }
    println!();

    let source = ReplaySource::from_log(&session_log, log.display().to_string());
    let recorder = MemoryRecorder::new();
    let mut session = MonitorSession::new(
        Box::new(source),
        RecorderHandle::spawn(Box::new(recorder.clone()), config.recorder.queue_capacity),
    );
    for tracker in trackers {
        let channel = tracker.channel();
        let handle = ActuatorHandle::spawn(
            channel,
            Box::new(LoggingActuator::new(channel)),
            &config.actuator,
        )?;
        session.add_channel(tracker, handle)?;
    }

    session.run().await?;
    session.shutdown().await?;

    let replayed = recorder.records();
    println!("Transitions:");
    for record in &replayed {
        if let RecordKind::Transition {
            channel,
            transition,
            ..
        } = &record.kind
        {
            let marker = match transition.actuation() {
                Some(actuation) => format!("  [{actuation}]"),
                None => String::new(),
            };
            println!(
                "  {:>9.3}s  {:<8} {}{}",
                record.timestamp_secs(),
                channel.as_str(),
                transition.label(),
                marker
            );
        }
    }
    println!();

    let before = summarize_records(&session_log.records);
    let after = summarize_records(&replayed);
    println!("Activations (recorded -> replayed):");
    for (channel, summary) in &after.channels {
        let recorded = before
            .channels
            .get(channel)
            .map(|c| c.activations)
            .unwrap_or(0);
        println!(
            "  {}: {} -> {} (warning on {:.2}s)",
            channel,
            recorded,
            summary.activations,
            SessionClock::ns_to_secs(summary.warning_on_ns)
        );
    }

    Ok(())
}
