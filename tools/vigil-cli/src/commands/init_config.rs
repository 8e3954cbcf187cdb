//! Write the default configuration file.

use std::path::PathBuf;

use vigil_common::config::AppConfig;

pub fn run(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = AppConfig::default();
    config.save_to(&path)?;

    println!("Configuration written to {}", path.display());
    println!();
    println!("Channels:");
    for c in &config.channels {
        println!(
            "  {}: glance {}s, warning {}s",
            c.channel, c.glance_period_secs, c.warning_period_secs
        );
    }
    println!("Telemetry: udp://{}", config.telemetry.bind);
    println!("Session logs: {}", config.recorder.dir.display());

    Ok(())
}
