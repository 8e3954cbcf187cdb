//! Send a synthetic gaze pattern to a listener.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use vigil_common::config::AppConfig;
use vigil_telemetry::PayloadDecoder;

pub async fn run(
    config: AppConfig,
    target: Option<SocketAddr>,
    away_secs: f64,
    back_secs: f64,
    rate_hz: u32,
    cycles: u32,
    json: bool,
) -> anyhow::Result<()> {
    let away = Duration::try_from_secs_f64(away_secs)?;
    let back = Duration::try_from_secs_f64(back_secs)?;
    let target = target.unwrap_or(config.telemetry.bind);
    let encoder = PayloadDecoder::new(config.telemetry.field.clone());

    let local: SocketAddr = if target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;

    println!("Emitting to {target} at {rate_hz} Hz");
    println!(
        "  {cycles} cycle(s): {:.2}s away, {:.2}s back",
        away.as_secs_f64(),
        back.as_secs_f64()
    );

    let period = Duration::from_secs(1) / rate_hz;
    let mut ticker = tokio::time::interval(period);
    let mut sent = 0u64;

    for cycle in 0..cycles {
        for (in_aoi, span) in [(false, away), (true, back)] {
            let payload = if json {
                encoder.encode_json(in_aoi)
            } else {
                PayloadDecoder::encode_literal(in_aoi).to_vec()
            };
            let until = tokio::time::Instant::now() + span;
            tracing::debug!(cycle, in_aoi, "Emitting phase");
            while tokio::time::Instant::now() < until {
                ticker.tick().await;
                socket.send_to(&payload, target).await?;
                sent += 1;
            }
        }
    }

    println!("Sent {sent} samples");
    Ok(())
}
