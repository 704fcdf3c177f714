//! Print ID information events from the first cube found.
//!
//! Usage:
//!   cargo run --bin id_reader              # any cube, read for 10 s
//!   cargo run --bin id_reader -- h4Y 30    # cube "h4Y", read for 30 s
//!
//! Place the cube on a toio mat or a card to see Position / Standard IDs;
//! lift it to see the "missed" events.

use std::time::Duration;

use anyhow::Result;
use log::info;
use tokio::time::sleep;

use toio_rs::prelude::*;

const DEFAULT_READ_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let suffix = args.next().filter(|s| s != "-");
    let read_secs = match args.next() {
        Some(s) => s.parse()?,
        None => DEFAULT_READ_SECS,
    };

    let client = ToioClient::with_default_adapter(ToioClientConfig::default()).await?;
    client.enable().await?;

    let ctx = CancelToken::new();
    let cube = client.connect_first(&ctx, suffix.as_deref()).await?;
    info!("✅  Connected to: {}", cube.name());

    let mut events = cube.start_id_notify().await?;
    let deadline = sleep(Duration::from_secs(read_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CubeEvent::PositionId(p)) => println!(
                    "[POSITION] cube=({:4}, {:4}) {:3}°  sensor=({:4}, {:4}) {:3}°",
                    p.cube_x, p.cube_y, p.cube_angle, p.sensor_x, p.sensor_y, p.sensor_angle
                ),
                Some(CubeEvent::StandardId(s)) => {
                    println!("[STANDARD] id={:<10} angle={:3}°", s.value, s.angle)
                }
                Some(CubeEvent::PositionIdMissed) => println!("[POSITION] missed"),
                Some(CubeEvent::StandardIdMissed) => println!("[STANDARD] missed"),
                None => {
                    info!("❌  Disconnected from cube.");
                    break;
                }
            },
            _ = &mut deadline => {
                info!("Read time over.");
                break;
            }
        }
    }

    cube.disconnect().await?;
    Ok(())
}
