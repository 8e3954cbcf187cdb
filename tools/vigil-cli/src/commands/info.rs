//! Show session log information.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use vigil_common::clock::{local_time_at, SessionClock};
use vigil_session_model::{summarize_records, SessionLog};

pub fn run(log: PathBuf) -> anyhow::Result<()> {
    let session_log = SessionLog::load(&log)
        .map_err(|e| anyhow::anyhow!("Failed to load session log: {e}"))?;

    let header = &session_log.header;
    let epoch = DateTime::parse_from_rfc3339(&header.epoch_wall)
        .map(|t| t.with_timezone(&Utc))
        .ok();

    println!("Session: {}", log.display());
    println!("  Schema: {}", header.schema_version);
    println!("  Source: {}", header.source);
    match epoch {
        Some(epoch) => println!(
            "  Started: {}",
            local_time_at(epoch, 0).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("  Started: {} (unparsed)", header.epoch_wall),
    }
    println!();

    println!("Channels:");
    for c in &header.channels {
        println!(
            "  {}: glance {:.3}s, warning {:.3}s",
            c.channel,
            SessionClock::ns_to_secs(c.glance_period_ns),
            SessionClock::ns_to_secs(c.warning_period_ns)
        );
    }
    println!();

    let summary = summarize_records(&session_log.records);
    println!("Activity:");
    println!("  Records: {}", summary.records);
    println!("  Rejected samples: {}", summary.rejected);
    println!(
        "  Duration: {:.2}s",
        SessionClock::ns_to_secs(summary.duration_ns())
    );
    for (channel, c) in &summary.channels {
        println!(
            "  {}: {} observations, {} transitions, {} warning(s), on for {:.2}s",
            channel,
            c.observations,
            c.transitions,
            c.activations,
            SessionClock::ns_to_secs(c.warning_on_ns)
        );
    }

    if let (Some(epoch), Some(first), Some(last)) = (epoch, summary.first_ns, summary.last_ns) {
        println!();
        println!(
            "Wall clock: {} -> {}",
            local_time_at(epoch, first).format("%H:%M:%S%.3f"),
            local_time_at(epoch, last).format("%H:%M:%S%.3f")
        );
    }

    Ok(())
}
