//! The BLE operations the library needs from a radio stack.
//!
//! [`crate::btle::BtleTransport`] implements these traits on top of
//! `btleplug`.  Tests drive the scanner and the cube handle through in-memory
//! implementations instead.

use async_trait::async_trait;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::Result;

/// One advertisement sighting reported during a scan.
#[derive(Clone, Debug)]
pub struct Advertisement<P> {
    /// Advertised local name, empty when the packet carried none.
    pub name: String,
    /// Platform link-layer identifier; the dedup key for discovery.
    pub address: String,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Token that [`Transport::connect`] accepts to open a link to this peer.
    pub peer: P,
}

/// Callback receiving advertisement reports, one at a time.
pub type ReportSink<P> = Box<dyn Fn(Advertisement<P>) + Send + Sync>;

/// Callback receiving raw notification payloads, one at a time.
///
/// Dropping the sink signals the end of the notification stream.
pub type NotifySink = Box<dyn Fn(&[u8]) + Send + Sync>;

/// The radio adapter.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Peer token carried by advertisements.
    type Peer: Clone + Send + Sync + 'static;
    /// An open connection.
    type Link: Link;

    /// Make sure the radio is powered and ready to scan.
    async fn enable(&self) -> Result<()>;

    /// Run the advertisement stream, delivering each report to `on_report`.
    ///
    /// Resolves with `Ok` once `stop` is cancelled, or with the error when
    /// the stream fails.  `stop` may already be cancelled on the first poll;
    /// the radio must be idle again by the time this resolves.
    async fn scan(&self, on_report: ReportSink<Self::Peer>, stop: CancelToken) -> Result<()>;

    /// Stop whatever [`Transport::scan`] is running.  Safe to call when no
    /// scan is running and safe to call repeatedly.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a connection to `peer`.
    async fn connect(&self, peer: &Self::Peer) -> Result<Self::Link>;
}

/// An established connection to one peer.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    type Characteristic: GattCharacteristic;

    /// Look up `characteristic` inside `service`.  `Ok(None)` when the peer
    /// does not expose it.
    async fn discover_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<Self::Characteristic>>;

    async fn disconnect(&self) -> Result<()>;
}

/// A characteristic on a connected peer.
#[async_trait]
pub trait GattCharacteristic: Send + Sync + 'static {
    async fn write_without_response(&self, data: &[u8]) -> Result<()>;

    /// Enable notifications, delivering each payload to `on_notify` until the
    /// link closes.
    async fn subscribe(&self, on_notify: NotifySink) -> Result<()>;
}
