//! # toio-rs
//!
//! Async Rust library for discovering and driving
//! [toio Core Cubes](https://toio.io/) over Bluetooth Low Energy.
//!
//! ## What it covers
//!
//! | Feature | Entry point |
//! |---|---|
//! | Find N distinct cubes, deduplicated by address | [`client::ToioClient::scan`] |
//! | Find specific cubes by their printed ID | [`client::ToioClient::scan_by_id`] |
//! | Drive the wheels | [`client::CubeHandle::motor_control`] |
//! | Read mat positions and card IDs | [`client::CubeHandle::start_id_notify`] |
//!
//! ## Quick start
//!
//! ```no_run
//! use toio_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ToioClient::with_default_adapter(ToioClientConfig::default()).await?;
//!     client.enable().await?;
//!
//!     let cube = client.connect_first(&CancelToken::new(), None).await?;
//!     let mut events = cube.start_id_notify().await?;
//!     cube.motor_control(60, -60).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let CubeEvent::PositionId(pos) = event {
//!             println!("at ({}, {})", pos.cube_x, pos.cube_y);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`client`] | Scanning, connecting, and the [`client::CubeHandle`] command API |
//! | [`scanner`] | Cancellable, deduplicating discovery over any [`transport::Transport`] |
//! | [`relay`] | Bounded, non-blocking bridge from notifications to an event stream |
//! | [`protocol`] | GATT UUIDs and the motor command encoder |
//! | [`parse`] | ID notification decoder |
//! | [`types`] | Event types produced by the decoder |
//! | [`transport`] | The BLE operations the library needs from a radio stack |
//! | [`btle`] | `btleplug` implementation of [`transport::Transport`] |
//! | [`cancel`] | Cooperative cancellation token |
//! | [`error`] | Error types |

pub mod btle;
pub mod cancel;
pub mod client;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod relay;
pub mod scanner;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::btle::BtleTransport;
    pub use crate::cancel::CancelToken;
    pub use crate::client::{CubeHandle, ToioClient, ToioClientConfig};
    pub use crate::scanner::{Device, ScanReport, Scanner};

    // ── Events and errors ─────────────────────────────────────────────────────
    pub use crate::error::{DecodeError, ToioError};
    pub use crate::relay::EventStream;
    pub use crate::types::{CubeEvent, PositionId, StandardId};

    // ── Protocol ──────────────────────────────────────────────────────────────
    pub use crate::protocol::{encode_motor_command, MotorCommand, MAX_MOTOR_SPEED};
}
