//! End-to-end tracker scenarios with the reference thresholds
//! (warning period 0.16 s, glance period 2.5 s).

use std::time::Duration;

use vigil_attention::{AttentionTracker, Thresholds, TrackerState};
use vigil_session_model::{validate_records, Actuation, Channel, TrackerPhase, TransitionKind};

fn reference_tracker(channel: Channel) -> AttentionTracker {
    let thresholds =
        Thresholds::new(Duration::from_millis(2500), Duration::from_millis(160)).unwrap();
    AttentionTracker::new(channel, thresholds)
}

fn secs(s: f64) -> u64 {
    (s * 1_000_000_000.0).round() as u64
}

#[test]
fn sustained_inattention_triggers_then_sustained_glance_disables() {
    let mut tracker = reference_tracker(Channel::Visual);

    let mut actuations = Vec::new();
    let mut phases = Vec::new();
    for (in_aoi, at) in [
        (false, 0.00),
        (false, 0.10),
        (false, 0.20),
        (true, 0.30),
        (true, 2.90),
    ] {
        let step = tracker.update(in_aoi, secs(at));
        actuations.push(step.actuation);
        phases.push(tracker.phase());
    }

    assert_eq!(
        actuations,
        vec![
            None,
            None,
            Some(Actuation::Activate),
            None,
            Some(Actuation::Deactivate),
        ]
    );
    assert_eq!(
        phases,
        vec![
            TrackerPhase::Pending,
            TrackerPhase::Pending,
            TrackerPhase::Active,
            TrackerPhase::ActiveReprieve,
            TrackerPhase::Idle,
        ]
    );
}

#[test]
fn aborted_glance_does_not_delay_trigger() {
    let mut tracker = reference_tracker(Channel::Visual);

    tracker.update(false, secs(0.00));
    assert_eq!(tracker.phase(), TrackerPhase::Pending);

    tracker.update(true, secs(0.05));
    assert_eq!(tracker.phase(), TrackerPhase::PendingReprieve);

    let step = tracker.update(false, secs(0.10));
    assert_eq!(
        step.transition.map(|t| t.kind),
        Some(TransitionKind::GlanceDetectionEnded)
    );
    assert_eq!(tracker.state(), TrackerState::Pending { warning_start: 0 });

    let step = tracker.update(false, secs(0.20));
    assert_eq!(step.actuation, Some(Actuation::Activate));
    assert_eq!(tracker.phase(), TrackerPhase::Active);
}

#[test]
fn full_reprieve_never_activates() {
    let mut tracker = reference_tracker(Channel::Auditory);

    let steps: Vec<_> = [(false, 0.0), (true, 0.1), (true, 1.0), (true, 2.0), (true, 2.6)]
        .into_iter()
        .map(|(in_aoi, at)| tracker.update(in_aoi, secs(at)))
        .collect();

    assert!(steps.iter().all(|s| s.actuation.is_none()));
    assert_eq!(
        steps.last().and_then(|s| s.transition).map(|t| t.kind),
        Some(TransitionKind::WarningAverted)
    );
    assert_eq!(tracker.state(), TrackerState::Idle);
}

#[test]
fn repeated_attention_in_idle_and_inattention_in_active_are_noops() {
    let mut tracker = reference_tracker(Channel::Visual);

    for i in 0..50 {
        let step = tracker.update(true, secs(i as f64 * 0.025));
        assert!(step.transition.is_none());
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    tracker.update(false, secs(2.0));
    tracker.update(false, secs(2.2));
    assert_eq!(tracker.state(), TrackerState::Active);

    for i in 0..50 {
        let step = tracker.update(false, secs(2.3 + i as f64 * 0.025));
        assert!(step.transition.is_none());
        assert!(step.actuation.is_none());
        assert_eq!(tracker.state(), TrackerState::Active);
    }
}

#[test]
fn channels_with_different_thresholds_diverge_on_the_same_feed() {
    let mut visual = AttentionTracker::new(
        Channel::Visual,
        Thresholds::from_secs(0.16, 3.0).unwrap(),
    );
    let mut auditory = AttentionTracker::new(
        Channel::Auditory,
        Thresholds::from_secs(0.16, 3.5).unwrap(),
    );

    let mut fired = Vec::new();
    // 40 Hz feed, operator looks away for four seconds.
    for i in 0..=160u64 {
        let at = i * 25_000_000;
        for tracker in [&mut visual, &mut auditory] {
            if let Some(Actuation::Activate) = tracker.update(false, at).actuation {
                fired.push((tracker.channel(), at));
            }
        }
    }

    assert_eq!(
        fired,
        vec![
            (Channel::Visual, secs(3.0)),
            (Channel::Auditory, secs(3.5)),
        ]
    );
}

#[test]
fn emitted_records_pass_log_validation() {
    let mut tracker = reference_tracker(Channel::Visual);
    let feed = [
        (false, 0.00),
        (true, 0.05),
        (false, 0.10),
        (false, 0.20),
        (true, 0.30),
        (false, 0.40),
        (true, 0.50),
        (true, 3.10),
    ];

    let records: Vec<_> = feed
        .iter()
        .enumerate()
        .flat_map(|(seq, &(in_aoi, at))| tracker.update(in_aoi, secs(at)).records(seq as u64))
        .collect();

    assert!(validate_records(&records).is_empty());
    assert_eq!(tracker.phase(), TrackerPhase::Idle);
}
