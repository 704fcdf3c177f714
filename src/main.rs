use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::Result;
use log::{error, info};

use toio_rs::cancel::CancelToken;
use toio_rs::client::{ToioClient, ToioClientConfig};

/// Speed used by the interactive drive commands.
const DRIVE_SPEED: i32 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=toio_rs=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Connect ───────────────────────────────────────────────────────────────
    // An optional first argument picks a cube by the ID printed on it.
    let suffix = std::env::args().nth(1);
    let client = ToioClient::with_default_adapter(ToioClientConfig::default()).await?;
    client.enable().await?;

    let ctx = CancelToken::new();
    info!("Looking for a toio Core Cube …");
    let cube = client.connect_first(&ctx, suffix.as_deref()).await?;
    info!("✅  Connected to: {}", cube.name());

    // ── Spin in place for two seconds ─────────────────────────────────────────
    cube.motor_control(DRIVE_SPEED, -DRIVE_SPEED).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    cube.stop().await?;

    info!("Commands (type + Enter):");
    info!("  f / b  – forward / backward");
    info!("  l / r  – spin left / right");
    info!("  s      – stop");
    info!("  <left> <right> – raw wheel speeds, e.g. '100 -40'");
    info!("  q      – quit\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (to avoid holding a non-Send
    // StdinLock across await points), then relayed to the async side.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        let result = match line.as_str() {
            "" => continue,
            "q" => break,
            "f" => cube.motor_control(DRIVE_SPEED, DRIVE_SPEED).await,
            "b" => cube.motor_control(-DRIVE_SPEED, -DRIVE_SPEED).await,
            "l" => cube.motor_control(-DRIVE_SPEED, DRIVE_SPEED).await,
            "r" => cube.motor_control(DRIVE_SPEED, -DRIVE_SPEED).await,
            "s" => cube.stop().await,
            raw => match parse_speeds(raw) {
                Some((left, right)) => cube.motor_control(left, right).await,
                None => {
                    error!("Unrecognised command: '{raw}'");
                    continue;
                }
            },
        };
        if let Err(e) = result {
            error!("Command error: {e}");
        }
    }

    info!("Quit requested.");
    cube.stop().await.ok();
    cube.disconnect().await?;
    Ok(())
}

fn parse_speeds(line: &str) -> Option<(i32, i32)> {
    let mut parts = line.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((left, right))
}
