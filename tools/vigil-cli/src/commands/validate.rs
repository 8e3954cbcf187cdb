//! Audit a session log.

use std::path::PathBuf;

use vigil_common::error::VigilError;
use vigil_session_model::{validate_records, SessionLog};

pub fn run(log: PathBuf) -> anyhow::Result<()> {
    println!("Validating session log: {}", log.display());

    let session_log = SessionLog::load(&log)
        .map_err(|e| anyhow::anyhow!("Failed to load session log: {e}"))?;

    println!("  Schema: {}", session_log.header.schema_version);
    println!("  Source: {}", session_log.header.source);
    println!("  Records: {}", session_log.records.len());

    let issues = validate_records(&session_log.records);
    if issues.is_empty() {
        println!("\nSession log is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for issue in &issues {
        println!("  - {issue}");
    }

    let violations = issues
        .iter()
        .filter(|i| i.is_consistency_violation())
        .count();
    if violations > 0 {
        tracing::error!(violations, "Tracker state inconsistency in session log");
        return Err(VigilError::consistency(format!(
            "{violations} tracker consistency violation(s) in {}",
            log.display()
        ))
        .into());
    }

    println!(
        "\n{} delivery issue(s) found. Tracker states are consistent.",
        issues.len()
    );
    Ok(())
}
