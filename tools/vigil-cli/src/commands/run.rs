//! Monitor a live gaze feed.

use std::net::SocketAddr;
use std::path::PathBuf;

use vigil_common::clock::{session_stamp, SessionClock};
use vigil_common::config::AppConfig;
use vigil_session_model::{Channel, SessionLog};
use vigil_telemetry::{JsonlRecorder, TelemetrySource, UdpSource};
use vigil_warning_engine::{
    actuator_for, build_trackers, session_header, ActuatorHandle, MonitorSession, RecorderHandle,
};

pub async fn run(
    mut config: AppConfig,
    bind: Option<SocketAddr>,
    timeout_ms: Option<u64>,
    log_dir: Option<PathBuf>,
    visual_only: bool,
    auditory_only: bool,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.telemetry.bind = bind;
    }
    if let Some(ms) = timeout_ms {
        config.telemetry.read_timeout_ms = (ms > 0).then_some(ms);
    }
    if let Some(dir) = log_dir {
        config.recorder.dir = dir;
    }
    if visual_only {
        config.channels.retain(|c| c.channel == Channel::Visual);
    }
    if auditory_only {
        config.channels.retain(|c| c.channel == Channel::Auditory);
    }
    config.validate()?;

    let clock = SessionClock::start();
    let source = UdpSource::bind(&config.telemetry, clock.clone()).await?;
    let trackers = build_trackers(&config.channels)?;
    let header = session_header(clock.epoch_wall_rfc3339(), source.describe(), &trackers);

    let recorder = JsonlRecorder::create_in(
        &config.recorder.dir,
        &session_stamp(clock.epoch_wall()),
        &header,
    )?
    .with_flush_every(config.recorder.flush_every);
    let log_path = recorder.path().clone();

    println!("Starting monitoring session");
    println!("  Listening on: {}", source.describe());
    for tracker in &trackers {
        let t = tracker.thresholds();
        println!(
            "  {}: warning after {:.2}s away, cleared after {:.2}s back",
            tracker.channel(),
            t.warning_period().as_secs_f64(),
            t.glance_period().as_secs_f64()
        );
    }
    println!("  Log: {}", log_path.display());
    println!();

    let recorder = RecorderHandle::spawn(Box::new(recorder), config.recorder.queue_capacity);
    let mut session = MonitorSession::new(Box::new(source), recorder);
    for tracker in trackers {
        let channel = tracker.channel();
        let handle = ActuatorHandle::spawn(channel, actuator_for(channel), &config.actuator)?;
        session.add_channel(tracker, handle)?;
    }

    println!("Press Ctrl+C to stop monitoring...");
    println!();

    // Ctrl+C only signals; run() returns on its own and flushes the log.
    let stop = session.stop_signal();
    let interrupt = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!();
                stop.stop();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let result = session.run().await;
    interrupt.abort();
    result?;

    let report = session.shutdown().await?;

    println!("Session ended after {:.1}s", clock.elapsed_secs());
    println!(
        "  Samples: {} ({} rejected, {} timeouts)",
        report.stats.samples, report.stats.rejected, report.stats.timeouts
    );
    for (channel, channel_report) in &report.channels {
        println!(
            "  {}: {} activation(s), {} failed actuator call(s), ended {}",
            channel,
            channel_report.actuator.activations,
            channel_report.actuator.failures,
            channel_report.phase
        );
    }
    if report.stats.recorder_failures > 0 {
        println!(
            "  Warning: {} record(s) could not be written",
            report.stats.recorder_failures
        );
    }
    if report.stats.records_dropped > 0 {
        println!(
            "  Warning: {} record(s) dropped while the log writer was behind",
            report.stats.records_dropped
        );
    }

    // The writer is closed once shutdown returns; confirm it reads back.
    match SessionLog::load(&log_path) {
        Ok(log) => println!(
            "Session log saved to: {} ({} records)",
            log_path.display(),
            log.records.len()
        ),
        Err(e) => tracing::warn!(
            path = %log_path.display(),
            error = %e,
            "Session log does not read back"
        ),
    }

    Ok(())
}
