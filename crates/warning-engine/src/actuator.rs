//! Warning actuators and their dispatch workers.
//!
//! The monitoring loop never calls an actuator directly. It publishes the
//! desired warning state to an [`ActuatorHandle`]; a worker on tokio's
//! blocking pool owns the actuator and reconciles it to the latest desired
//! state, retrying failed calls. Only the newest request matters, so a slow
//! actuator can fall behind without ever applying a stale order, and its
//! calls never occupy an async worker thread.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_common::config::ActuatorConfig;
use vigil_common::error::{VigilError, VigilResult};
use vigil_session_model::{Actuation, Channel};

/// Capability interface for a perceptible warning indicator.
///
/// `activate` while active and `deactivate` while inactive must be no-ops
/// that return `Ok(())`. Calls may block.
pub trait Actuator: Send + 'static {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Prepare the indicator. Called once before any activation.
    fn init(&mut self) -> VigilResult<()>;

    /// Start the indicator.
    fn activate(&mut self) -> VigilResult<()>;

    /// Stop the indicator.
    fn deactivate(&mut self) -> VigilResult<()>;
}

/// Text banner on a terminal.
pub struct VisualActuator<W: Write + Send + 'static> {
    out: W,
    active: bool,
}

impl<W: Write + Send + 'static> VisualActuator<W> {
    pub fn new(out: W) -> Self {
        Self { out, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl VisualActuator<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send + 'static> Actuator for VisualActuator<W> {
    fn name(&self) -> &str {
        "visual"
    }

    fn init(&mut self) -> VigilResult<()> {
        self.out
            .flush()
            .map_err(|e| VigilError::actuator(format!("visual output not writable: {e}")))
    }

    fn activate(&mut self) -> VigilResult<()> {
        if self.active {
            return Ok(());
        }
        writeln!(self.out, "[VISUAL WARNING] >>> LOOK BACK AT THE ROAD <<<")
            .and_then(|_| self.out.flush())
            .map_err(|e| VigilError::actuator(format!("failed to show visual warning: {e}")))?;
        self.active = true;
        Ok(())
    }

    fn deactivate(&mut self) -> VigilResult<()> {
        if !self.active {
            return Ok(());
        }
        writeln!(self.out, "[visual warning cleared]")
            .and_then(|_| self.out.flush())
            .map_err(|e| VigilError::actuator(format!("failed to clear visual warning: {e}")))?;
        self.active = false;
        Ok(())
    }
}

/// Terminal bell.
pub struct AuditoryActuator<W: Write + Send + 'static> {
    out: W,
    active: bool,
}

impl<W: Write + Send + 'static> AuditoryActuator<W> {
    pub fn new(out: W) -> Self {
        Self { out, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl AuditoryActuator<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send + 'static> Actuator for AuditoryActuator<W> {
    fn name(&self) -> &str {
        "auditory"
    }

    fn init(&mut self) -> VigilResult<()> {
        self.out
            .flush()
            .map_err(|e| VigilError::actuator(format!("auditory output not writable: {e}")))
    }

    fn activate(&mut self) -> VigilResult<()> {
        if self.active {
            return Ok(());
        }
        writeln!(self.out, "\x07[AUDITORY WARNING] alarm sounding")
            .and_then(|_| self.out.flush())
            .map_err(|e| VigilError::actuator(format!("failed to sound alarm: {e}")))?;
        self.active = true;
        Ok(())
    }

    fn deactivate(&mut self) -> VigilResult<()> {
        if !self.active {
            return Ok(());
        }
        writeln!(self.out, "[auditory warning stopped]")
            .and_then(|_| self.out.flush())
            .map_err(|e| VigilError::actuator(format!("failed to stop alarm: {e}")))?;
        self.active = false;
        Ok(())
    }
}

/// Actuator that only logs. Used for replays and dry runs.
pub struct LoggingActuator {
    channel: Channel,
    active: bool,
}

impl LoggingActuator {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            active: false,
        }
    }
}

impl Actuator for LoggingActuator {
    fn name(&self) -> &str {
        "logging"
    }

    fn init(&mut self) -> VigilResult<()> {
        Ok(())
    }

    fn activate(&mut self) -> VigilResult<()> {
        if !self.active {
            tracing::info!(channel = %self.channel, "Warning on");
            self.active = true;
        }
        Ok(())
    }

    fn deactivate(&mut self) -> VigilResult<()> {
        if self.active {
            tracing::info!(channel = %self.channel, "Warning off");
            self.active = false;
        }
        Ok(())
    }
}

/// The terminal actuator for a channel.
pub fn actuator_for(channel: Channel) -> Box<dyn Actuator> {
    match channel {
        Channel::Visual => Box::new(VisualActuator::stderr()),
        Channel::Auditory => Box::new(AuditoryActuator::stderr()),
    }
}

/// Outcome counters of one actuator worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorStats {
    pub activations: u64,
    pub deactivations: u64,
    /// Calls that still failed after all retries.
    pub failures: u64,
    /// Individual failed attempts, including ones later retried.
    pub failed_attempts: u64,
}

/// Handle to a channel's actuator worker.
pub struct ActuatorHandle {
    channel: Channel,
    desired: watch::Sender<bool>,
    task: JoinHandle<ActuatorStats>,
}

impl ActuatorHandle {
    /// Initialise `actuator` and move it onto a blocking worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        channel: Channel,
        mut actuator: Box<dyn Actuator>,
        config: &ActuatorConfig,
    ) -> VigilResult<Self> {
        actuator.init()?;
        tracing::debug!(%channel, actuator = actuator.name(), "Actuator initialised");

        let (desired, rx) = watch::channel(false);
        let runtime = Handle::current();
        let max_retries = config.max_retries;
        let backoff = config.retry_backoff();
        let task = tokio::task::spawn_blocking(move || {
            reconcile(runtime, channel, actuator, rx, max_retries, backoff)
        });

        Ok(Self {
            channel,
            desired,
            task,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Publish a new desired state. Never blocks.
    pub fn request(&self, actuation: Actuation) {
        self.desired
            .send_replace(matches!(actuation, Actuation::Activate));
    }

    /// Turn the indicator off, stop the worker, and return its counters.
    pub async fn shutdown(self) -> ActuatorStats {
        self.desired.send_replace(false);
        let channel = self.channel;
        drop(self.desired);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(%channel, error = %e, "Actuator worker join failed");
                ActuatorStats::default()
            }
        }
    }
}

fn reconcile(
    runtime: Handle,
    channel: Channel,
    mut actuator: Box<dyn Actuator>,
    mut desired: watch::Receiver<bool>,
    max_retries: u32,
    backoff: Duration,
) -> ActuatorStats {
    let mut stats = ActuatorStats::default();
    let mut applied = false;

    loop {
        let target = *desired.borrow_and_update();
        if target != applied
            && apply(channel, actuator.as_mut(), target, max_retries, backoff, &mut stats)
        {
            applied = target;
        }
        if runtime.block_on(desired.changed()).is_err() {
            break;
        }
    }

    // Sender dropped: apply whatever was last requested.
    let target = *desired.borrow();
    if target != applied {
        apply(channel, actuator.as_mut(), target, max_retries, backoff, &mut stats);
    }

    stats
}

fn apply(
    channel: Channel,
    actuator: &mut dyn Actuator,
    on: bool,
    max_retries: u32,
    backoff: Duration,
    stats: &mut ActuatorStats,
) -> bool {
    for attempt in 0..=max_retries {
        let result = if on {
            actuator.activate()
        } else {
            actuator.deactivate()
        };

        match result {
            Ok(()) => {
                if on {
                    stats.activations += 1;
                } else {
                    stats.deactivations += 1;
                }
                return true;
            }
            Err(e) => {
                stats.failed_attempts += 1;
                tracing::warn!(
                    %channel,
                    actuator = actuator.name(),
                    attempt = attempt + 1,
                    error = %e,
                    "Actuator call failed"
                );
                if attempt < max_retries {
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    stats.failures += 1;
    tracing::error!(
        %channel,
        actuator = actuator.name(),
        on,
        "Actuator gave up after retries"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_visual_actuator_is_idempotent() {
        let mut visual = VisualActuator::new(Vec::new());
        visual.init().unwrap();
        visual.activate().unwrap();
        visual.activate().unwrap();
        assert!(visual.is_active());
        visual.deactivate().unwrap();
        visual.deactivate().unwrap();
        assert!(!visual.is_active());

        let out = String::from_utf8(visual.into_inner()).unwrap();
        assert_eq!(out.matches("VISUAL WARNING").count(), 1);
        assert_eq!(out.matches("cleared").count(), 1);
    }

    #[test]
    fn test_auditory_actuator_rings_bell_once() {
        let mut auditory = AuditoryActuator::new(Vec::new());
        auditory.deactivate().unwrap();
        auditory.activate().unwrap();
        auditory.activate().unwrap();
        auditory.deactivate().unwrap();

        let out = auditory.into_inner();
        assert_eq!(out.iter().filter(|&&b| b == 0x07).count(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("stopped"));
    }

    #[test]
    fn test_actuator_for_selects_by_channel() {
        assert_eq!(actuator_for(Channel::Visual).name(), "visual");
        assert_eq!(actuator_for(Channel::Auditory).name(), "auditory");
    }

    /// Fails the first `failures` calls, then records every applied state.
    struct Flaky {
        failures: u32,
        applied: Arc<Mutex<Vec<bool>>>,
    }

    impl Actuator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn init(&mut self) -> VigilResult<()> {
            Ok(())
        }

        fn activate(&mut self) -> VigilResult<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(VigilError::actuator("lamp unplugged"));
            }
            self.applied.lock().unwrap().push(true);
            Ok(())
        }

        fn deactivate(&mut self) -> VigilResult<()> {
            self.applied.lock().unwrap().push(false);
            Ok(())
        }
    }

    fn config(max_retries: u32) -> ActuatorConfig {
        ActuatorConfig {
            max_retries,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_worker_retries_failed_activation() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let handle = ActuatorHandle::spawn(
            Channel::Visual,
            Box::new(Flaky {
                failures: 2,
                applied: applied.clone(),
            }),
            &config(3),
        )
        .unwrap();

        handle.request(Actuation::Activate);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = handle.shutdown().await;

        assert_eq!(*applied.lock().unwrap(), vec![true, false]);
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.deactivations, 1);
        assert_eq!(stats.failed_attempts, 2);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_retries() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let handle = ActuatorHandle::spawn(
            Channel::Auditory,
            Box::new(Flaky {
                failures: u32::MAX,
                applied: applied.clone(),
            }),
            &config(2),
        )
        .unwrap();

        handle.request(Actuation::Activate);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = handle.shutdown().await;

        assert_eq!(stats.failures, 1);
        assert_eq!(stats.failed_attempts, 3);
        assert_eq!(stats.activations, 0);
        // Never turned on, so nothing to turn off.
        assert!(applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_settles_on_latest_request() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let handle = ActuatorHandle::spawn(
            Channel::Visual,
            Box::new(Flaky {
                failures: 0,
                applied: applied.clone(),
            }),
            &config(0),
        )
        .unwrap();

        for _ in 0..3 {
            handle.request(Actuation::Activate);
            handle.request(Actuation::Deactivate);
        }
        let stats = handle.shutdown().await;

        // Intermediate requests may be skipped, never reordered.
        let applied = applied.lock().unwrap();
        assert!(applied.len() <= 6);
        assert!(applied.windows(2).all(|w| w[0] != w[1]));
        assert_ne!(applied.last(), Some(&true));
        assert_eq!(stats.activations, stats.deactivations);
    }

    /// Holds the calling thread for `delay` on every call.
    struct Sluggish {
        delay: Duration,
    }

    impl Actuator for Sluggish {
        fn name(&self) -> &str {
            "sluggish"
        }

        fn init(&mut self) -> VigilResult<()> {
            Ok(())
        }

        fn activate(&mut self) -> VigilResult<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }

        fn deactivate(&mut self) -> VigilResult<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocking_actuator_does_not_stall_runtime() {
        // Single-threaded runtime: a blocking call on it would hold every
        // other task, timers included.
        let handle = ActuatorHandle::spawn(
            Channel::Auditory,
            Box::new(Sluggish {
                delay: Duration::from_millis(200),
            }),
            &config(0),
        )
        .unwrap();

        handle.request(Actuation::Activate);
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(150));

        let stats = handle.shutdown().await;
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.deactivations, 1);
    }
}
