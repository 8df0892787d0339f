use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::api::{prepare_reading, ServerClient};
use crate::errors::{ClientError, Result};
use crate::telemetry::{position_structure, random_position, POSITION_TYPE};

const BURST_SIZE: u64 = 20;

/// Registers the position schema unless it is already there.
pub async fn ensure_position_type(client: &ServerClient) -> Result<()> {
    match client.register(POSITION_TYPE, &position_structure()).await {
        Ok(reply) => {
            info!("{}", reply["status"].as_str().unwrap_or("registered"));
            Ok(())
        }
        Err(ClientError::Server { status: 400, detail })
            if detail == "Message type already exists" =>
        {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Streams random position readings for `devices` devices at roughly `rate`
/// readings per second. Stops after `count` readings, or never when zero.
pub async fn run(client: &ServerClient, devices: usize, rate: u64, count: u64) -> Result<()> {
    ensure_position_type(client).await?;
    let schemas = client.message_types().await?;

    let rate = rate.max(1);
    let burst_interval = Duration::from_millis((BURST_SIZE * 1000) / rate);
    let devices = devices.max(1) as u64;
    info!(
        "Publishing {} readings/s for {} devices in bursts of {}",
        rate, devices, BURST_SIZE
    );

    let mut rng = rand::thread_rng();
    let mut sent = 0u64;
    let mut failed = 0u64;

    loop {
        let burst_start = Instant::now();

        for _ in 0..BURST_SIZE {
            if count > 0 && sent + failed >= count {
                info!("Done: {} sent, {} failed", sent, failed);
                return Ok(());
            }

            let device_id = format!("HOLO{}", (sent + failed) % devices + 1);
            let reading = prepare_reading(&schemas, &device_id, POSITION_TYPE, random_position(&mut rng))?;
            match client.send_reading(&reading).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Failed to send reading for {}: {}", device_id, e);
                }
            }
        }

        if sent % 1000 < BURST_SIZE {
            info!("Sent {} readings", sent);
        }

        let elapsed = burst_start.elapsed();
        if elapsed < burst_interval {
            tokio::time::sleep(burst_interval - elapsed).await;
        } else if elapsed > burst_interval * 2 {
            warn!(
                "Burst took {:?}, target was {:?} - server may be overloaded",
                elapsed, burst_interval
            );
        }
    }
}
