//! Monitoring session: the poll loop.
//!
//! A session owns the telemetry source, one tracker and actuator handle per
//! channel, and the recorder handle. Every sample is delivered to every
//! tracker, in channel order, before the next receive. Nothing on the loop
//! blocks: actuators and the recorder run on their own workers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use vigil_attention::{AttentionTracker, Thresholds};
use vigil_common::config::ChannelConfig;
use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::{
    Channel, Sample, SessionHeader, SessionRecord, TimestampNs, TrackerPhase, SCHEMA_VERSION,
};
use vigil_telemetry::{Received, TelemetrySource};

use crate::actuator::{ActuatorHandle, ActuatorStats};
use crate::recorder::{RecorderHandle, RecorderStats};

/// Pause after the first failed receive. Doubles per consecutive failure.
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(10);
const MAX_SOURCE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Pause before the next receive after `consecutive` failures in a row.
fn source_error_backoff(consecutive: u32) -> Duration {
    let doublings = consecutive.saturating_sub(1).min(16);
    SOURCE_ERROR_BACKOFF
        .saturating_mul(1u32 << doublings)
        .min(MAX_SOURCE_ERROR_BACKOFF)
}

/// Cloneable request to end a session.
///
/// Wakes a [`MonitorSession::run`] parked in a receive, so the loop returns
/// and flushes even when the source has no read timeout.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        loop {
            // Registered before the check so a stop in between still wakes us.
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Create one tracker per configured channel.
pub fn build_trackers(channels: &[ChannelConfig]) -> VigilResult<Vec<AttentionTracker>> {
    channels
        .iter()
        .map(|c| Ok(AttentionTracker::new(c.channel, Thresholds::from_config(c)?)))
        .collect()
}

/// Log header describing a session over `trackers`.
pub fn session_header(
    epoch_wall: impl Into<String>,
    source: impl Into<String>,
    trackers: &[AttentionTracker],
) -> SessionHeader {
    SessionHeader {
        schema_version: SCHEMA_VERSION.to_string(),
        epoch_wall: epoch_wall.into(),
        source: source.into(),
        channels: trackers
            .iter()
            .map(|t| t.thresholds().describe(t.channel()))
            .collect(),
    }
}

/// Loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub samples: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub source_errors: u64,
    pub transitions: u64,
    pub actuations: u64,
    /// Records the log writer failed on. Known after shutdown.
    pub recorder_failures: u64,
    /// Records dropped because the log writer fell behind.
    pub records_dropped: u64,
    pub last_arrival_ns: Option<TimestampNs>,
}

/// Final state of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub phase: TrackerPhase,
    pub actuator: ActuatorStats,
}

/// What a finished session hands back.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub recorder: RecorderStats,
    pub channels: BTreeMap<Channel, ChannelReport>,
}

struct ChannelRuntime {
    tracker: AttentionTracker,
    actuator: ActuatorHandle,
}

pub struct MonitorSession {
    source: Box<dyn TelemetrySource>,
    channels: Vec<ChannelRuntime>,
    recorder: RecorderHandle,
    stop: StopSignal,
    stats: SessionStats,
}

impl MonitorSession {
    pub fn new(source: Box<dyn TelemetrySource>, recorder: RecorderHandle) -> Self {
        Self {
            source,
            channels: Vec::new(),
            recorder,
            stop: StopSignal::new(),
            stats: SessionStats::default(),
        }
    }

    /// Attach a channel. Samples reach channels in the order they were added.
    pub fn add_channel(
        &mut self,
        tracker: AttentionTracker,
        actuator: ActuatorHandle,
    ) -> VigilResult<()> {
        let channel = tracker.channel();
        if actuator.channel() != channel {
            return Err(VigilError::config(format!(
                "actuator for {} attached to {channel} tracker",
                actuator.channel()
            )));
        }
        if self.channels.iter().any(|c| c.tracker.channel() == channel) {
            return Err(VigilError::session(format!("channel {channel} added twice")));
        }
        self.channels.push(ChannelRuntime { tracker, actuator });
        Ok(())
    }

    /// Shared signal; stopping it ends [`run`](Self::run), interrupting a
    /// pending receive.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn phase(&self, channel: Channel) -> Option<TrackerPhase> {
        self.channels
            .iter()
            .find(|c| c.tracker.channel() == channel)
            .map(|c| c.tracker.phase())
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    /// Receive and deliver samples until the source closes or the session
    /// is stopped, then flush the log.
    ///
    /// Each sample is fully delivered before the next await, so a stop loses
    /// at most a receive in flight.
    pub async fn run(&mut self) -> VigilResult<SessionStats> {
        if self.channels.is_empty() {
            return Err(VigilError::session("no warning channels attached"));
        }

        tracing::info!(
            source = %self.source.describe(),
            channels = self.channels.len(),
            "Monitoring session started"
        );

        let stop = self.stop.clone();
        let mut consecutive_errors = 0u32;

        while !stop.is_stopped() {
            let received = tokio::select! {
                received = self.source.recv() => received,
                _ = stop.stopped() => break,
            };

            match received {
                Ok(Received::Sample(sample)) => self.deliver(sample),
                Ok(Received::Rejected {
                    seq,
                    arrival_ns,
                    reason,
                }) => {
                    self.stats.rejected += 1;
                    tracing::warn!(seq, reason = %reason, "Discarding malformed sample");
                    self.recorder
                        .submit(SessionRecord::rejected(arrival_ns, seq, reason));
                }
                Ok(Received::TimedOut) => {
                    self.stats.timeouts += 1;
                    tracing::debug!("No sample within read timeout");
                }
                Ok(Received::Closed) => {
                    tracing::info!("Telemetry source closed");
                    break;
                }
                Err(e) => {
                    self.stats.source_errors += 1;
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let backoff = source_error_backoff(consecutive_errors);
                    if consecutive_errors.is_power_of_two() {
                        tracing::warn!(
                            error = %e,
                            consecutive = consecutive_errors,
                            backoff_ms = backoff.as_millis() as u64,
                            "Telemetry receive failed"
                        );
                    } else {
                        tracing::debug!(
                            error = %e,
                            consecutive = consecutive_errors,
                            "Telemetry receive failed"
                        );
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = stop.stopped() => break,
                    }
                    continue;
                }
            }
            consecutive_errors = 0;
        }

        if let Err(e) = self.recorder.flush().await {
            tracing::warn!(error = %e, "Session log flush failed");
        }
        self.stats.records_dropped = self.recorder.dropped();

        tracing::info!(
            samples = self.stats.samples,
            rejected = self.stats.rejected,
            transitions = self.stats.transitions,
            records_dropped = self.stats.records_dropped,
            "Monitoring session ended"
        );

        Ok(self.stats)
    }

    /// Feed one sample to every channel. Never awaits.
    fn deliver(&mut self, sample: Sample) {
        self.stats.samples += 1;
        self.stats.last_arrival_ns = Some(sample.arrival_ns);

        for runtime in &mut self.channels {
            let step = runtime.tracker.update(sample.in_aoi, sample.arrival_ns);

            for record in step.records(sample.seq) {
                self.recorder.submit(record);
            }

            if let Some(transition) = &step.transition {
                self.stats.transitions += 1;
                tracing::info!(
                    channel = %step.channel,
                    t = transition.at,
                    "{}",
                    transition.kind.label()
                );
            }

            if let Some(actuation) = step.actuation {
                self.stats.actuations += 1;
                runtime.actuator.request(actuation);
            }
        }
    }

    /// Turn all indicators off, stop the actuator workers, and drain the log.
    pub async fn shutdown(mut self) -> VigilResult<SessionReport> {
        let mut channels = BTreeMap::new();
        for runtime in self.channels.drain(..) {
            let phase = runtime.tracker.phase();
            let channel = runtime.tracker.channel();
            let actuator = runtime.actuator.shutdown().await;
            channels.insert(channel, ChannelReport { phase, actuator });
        }

        let recorder = self.recorder.shutdown().await;
        self.stats.recorder_failures = recorder.failures;
        self.stats.records_dropped = recorder.dropped;

        Ok(SessionReport {
            stats: self.stats,
            recorder,
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::LoggingActuator;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use vigil_common::config::ActuatorConfig;
    use vigil_session_model::{validate_records, RecordKind};
    use vigil_telemetry::{MemoryRecorder, ScriptItem, ScriptedSource, TransitionRecorder};

    const MS: u64 = 1_000_000;

    fn channel_config(channel: Channel) -> ChannelConfig {
        ChannelConfig {
            channel,
            glance_period_secs: 2.5,
            warning_period_secs: 0.16,
        }
    }

    fn session(source: ScriptedSource, recorder: &MemoryRecorder) -> MonitorSession {
        session_with(Box::new(source), Box::new(recorder.clone()))
    }

    fn session_with(
        source: Box<dyn TelemetrySource>,
        recorder: Box<dyn TransitionRecorder>,
    ) -> MonitorSession {
        let mut session = MonitorSession::new(source, RecorderHandle::spawn(recorder, 64));
        let configs = [
            channel_config(Channel::Visual),
            channel_config(Channel::Auditory),
        ];
        for tracker in build_trackers(&configs).unwrap() {
            let channel = tracker.channel();
            let handle = ActuatorHandle::spawn(
                channel,
                Box::new(LoggingActuator::new(channel)),
                &ActuatorConfig::default(),
            )
            .unwrap();
            session.add_channel(tracker, handle).unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_every_sample_reaches_every_channel() {
        let source = ScriptedSource::from_samples(&[(false, 0), (false, 200 * MS), (true, 300 * MS)]);
        let recorder = MemoryRecorder::new();
        let mut session = session(source, &recorder);

        let stats = session.run().await.unwrap();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.last_arrival_ns, Some(300 * MS));
        // Started, triggered, glance started; on both channels.
        assert_eq!(stats.transitions, 6);
        assert_eq!(stats.actuations, 2);

        let records = recorder.records();
        let observations = records
            .iter()
            .filter(|r| matches!(r.kind, RecordKind::Observation { .. }))
            .count();
        assert_eq!(observations, 6);
        assert!(validate_records(&records).is_empty());

        // Let the actuator workers catch up before shutting down.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = session.shutdown().await.unwrap();
        assert_eq!(report.channels[&Channel::Visual].phase, TrackerPhase::ActiveReprieve);
        assert_eq!(report.channels[&Channel::Auditory].actuator.activations, 1);
        // Shutdown turns the indicator off.
        assert_eq!(report.channels[&Channel::Auditory].actuator.deactivations, 1);
    }

    #[tokio::test]
    async fn test_rejected_payloads_are_recorded_and_skipped() {
        let source = ScriptedSource::new(vec![
            ScriptItem::Payload(b"false".to_vec(), 0),
            ScriptItem::Payload(b"not a sample".to_vec(), 50 * MS),
            ScriptItem::Timeout,
            ScriptItem::Payload(b"false".to_vec(), 200 * MS),
        ]);
        let recorder = MemoryRecorder::new();
        let mut session = session(source, &recorder);

        let stats = session.run().await.unwrap();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(session.phase(Channel::Visual), Some(TrackerPhase::Active));

        let records = recorder.records();
        assert!(records
            .iter()
            .any(|r| matches!(&r.kind, RecordKind::Rejected { seq: 1, .. })));
        assert!(validate_records(&records).is_empty());
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_run_skips_receive() {
        let source = ScriptedSource::from_samples(&[(false, 0), (false, 200 * MS)]);
        let recorder = MemoryRecorder::new();
        let mut session = session(source, &recorder);

        session.stop();
        let stats = session.run().await.unwrap();
        assert_eq!(stats.samples, 0);
        assert!(recorder.is_empty());
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_without_channels_fails() {
        let mut session = MonitorSession::new(
            Box::new(ScriptedSource::from_samples(&[(true, 0)])),
            RecorderHandle::spawn(Box::new(MemoryRecorder::new()), 8),
        );
        assert!(session.run().await.is_err());
    }

    #[tokio::test]
    async fn test_add_channel_rejects_duplicates_and_mismatches() {
        let recorder = MemoryRecorder::new();
        let mut session = session(ScriptedSource::new(vec![]), &recorder);

        let tracker = build_trackers(&[channel_config(Channel::Visual)])
            .unwrap()
            .remove(0);
        let handle = ActuatorHandle::spawn(
            Channel::Visual,
            Box::new(LoggingActuator::new(Channel::Visual)),
            &ActuatorConfig::default(),
        )
        .unwrap();
        assert!(session.add_channel(tracker, handle).is_err());

        let tracker = build_trackers(&[channel_config(Channel::Visual)])
            .unwrap()
            .remove(0);
        let handle = ActuatorHandle::spawn(
            Channel::Auditory,
            Box::new(LoggingActuator::new(Channel::Auditory)),
            &ActuatorConfig::default(),
        )
        .unwrap();
        assert!(MonitorSession::new(
            Box::new(ScriptedSource::new(vec![])),
            RecorderHandle::spawn(Box::new(MemoryRecorder::new()), 8),
        )
        .add_channel(tracker, handle)
        .is_err());
    }

    struct BrokenRecorder;

    impl TransitionRecorder for BrokenRecorder {
        fn record(&mut self, _record: &SessionRecord) -> VigilResult<()> {
            Err(VigilError::recorder("log volume unmounted"))
        }

        fn flush(&mut self) -> VigilResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_recorder_does_not_stop_delivery() {
        let source = ScriptedSource::from_samples(&[(false, 0), (false, 200 * MS), (true, 300 * MS)]);
        let mut session = session_with(Box::new(source), Box::new(BrokenRecorder));

        let stats = session.run().await.unwrap();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.transitions, 6);
        assert_eq!(session.phase(Channel::Visual), Some(TrackerPhase::ActiveReprieve));

        let report = session.shutdown().await.unwrap();
        // Observations and transitions on both channels all failed.
        assert_eq!(report.stats.recorder_failures, 12);
        assert_eq!(report.recorder.written, 0);
        assert_eq!(report.stats.records_dropped, 0);
    }

    /// Yields a scripted mix of receive errors and results, then closes.
    struct UnreliableSource {
        steps: VecDeque<Option<Received>>,
    }

    #[async_trait]
    impl TelemetrySource for UnreliableSource {
        async fn recv(&mut self) -> VigilResult<Received> {
            match self.steps.pop_front() {
                Some(Some(received)) => Ok(received),
                Some(None) => Err(VigilError::telemetry("connection reset")),
                None => Ok(Received::Closed),
            }
        }

        fn describe(&self) -> String {
            "unreliable".to_string()
        }
    }

    #[tokio::test]
    async fn test_source_errors_back_off_and_continue() {
        let source = UnreliableSource {
            steps: VecDeque::from(vec![
                None,
                None,
                Some(Received::Sample(Sample::new(0, false, 0))),
                None,
                Some(Received::Sample(Sample::new(1, false, 200 * MS))),
            ]),
        };
        let recorder = MemoryRecorder::new();
        let mut session = session_with(Box::new(source), Box::new(recorder.clone()));

        let stats = session.run().await.unwrap();
        assert_eq!(stats.source_errors, 3);
        assert_eq!(stats.samples, 2);
        assert_eq!(session.phase(Channel::Visual), Some(TrackerPhase::Active));
        assert!(validate_records(&recorder.records()).is_empty());
        session.shutdown().await.unwrap();
    }

    #[test]
    fn test_source_error_backoff_doubles_and_caps() {
        assert_eq!(source_error_backoff(1), Duration::from_millis(10));
        assert_eq!(source_error_backoff(2), Duration::from_millis(20));
        assert_eq!(source_error_backoff(4), Duration::from_millis(80));
        assert_eq!(source_error_backoff(8), Duration::from_secs(1));
        assert_eq!(source_error_backoff(u32::MAX), Duration::from_secs(1));
    }

    /// Never yields anything.
    struct SilentSource;

    #[async_trait]
    impl TelemetrySource for SilentSource {
        async fn recv(&mut self) -> VigilResult<Received> {
            std::future::pending().await
        }

        fn describe(&self) -> String {
            "silent".to_string()
        }
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocked_receive() {
        let recorder = MemoryRecorder::new();
        let mut session = session_with(Box::new(SilentSource), Box::new(recorder.clone()));
        let stop = session.stop_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.stop();
        });

        let stats = tokio::time::timeout(Duration::from_secs(2), session.run())
            .await
            .expect("run should return once stopped")
            .unwrap();
        assert_eq!(stats.samples, 0);
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_signal_resolves_for_late_waiters() {
        let stop = StopSignal::new();
        stop.stop();
        tokio::time::timeout(Duration::from_millis(100), stop.stopped())
            .await
            .unwrap();
        assert!(stop.clone().is_stopped());
    }

    #[test]
    fn test_session_header_lists_channel_thresholds() {
        let trackers = build_trackers(&[
            channel_config(Channel::Visual),
            channel_config(Channel::Auditory),
        ])
        .unwrap();
        let header = session_header("2026-01-01T00:00:00Z", "scripted", &trackers);

        assert_eq!(header.schema_version, SCHEMA_VERSION);
        assert_eq!(header.channels.len(), 2);
        assert_eq!(header.channels[0].channel, Channel::Visual);
        assert_eq!(header.channels[0].warning_period_ns, 160 * MS);
        assert_eq!(header.channels[1].glance_period_ns, 2500 * MS);
    }
}
