use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::btle::BtleTransport;
use crate::cancel::CancelToken;
use crate::error::{Result, ToioError};
use crate::protocol::{
    encode_motor_command, ID_INFORMATION_CHARACTERISTIC, MOTOR_CHARACTERISTIC, TOIO_NAME_PREFIX,
    TOIO_SERVICE_UUID,
};
use crate::relay::{self, EventStream};
use crate::scanner::{has_name_prefix, Device, ScanReport, Scanner};
use crate::transport::{GattCharacteristic as _, Link, Transport};

// ── ToioClientConfig ──────────────────────────────────────────────────────────

/// Configuration for [`ToioClient`].
#[derive(Debug, Clone)]
pub struct ToioClientConfig {
    /// BLE scan duration in seconds before giving up. Default: `10`.
    pub scan_timeout_secs: u64,
    /// Hard limit on opening a connection, in seconds. Default: `10`.
    ///
    /// Only applied by [`ToioClient::with_default_adapter`]; custom
    /// transports enforce their own limits.
    pub connect_timeout_secs: u64,
    /// Match devices whose advertised name starts with this string.
    /// Default: `"toio"`.
    pub name_prefix: String,
    /// Capacity of each ID event stream.  When the consumer falls this far
    /// behind, new events are dropped.  `0` is treated as `1`.  Default: `32`.
    pub event_buffer: usize,
}

impl Default for ToioClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            connect_timeout_secs: 10,
            name_prefix: TOIO_NAME_PREFIX.into(),
            event_buffer: 32,
        }
    }
}

// ── ToioClient ────────────────────────────────────────────────────────────────

/// BLE client for toio Core Cubes.
///
/// Handles scanning, connecting, and characteristic lookup.  Generic over the
/// [`Transport`] so the same logic runs on real hardware
/// ([`BtleTransport`]) and in tests.
pub struct ToioClient<T: Transport> {
    transport: Arc<T>,
    config: ToioClientConfig,
}

impl ToioClient<BtleTransport> {
    /// Build a client on the first Bluetooth adapter of this machine.
    pub async fn with_default_adapter(config: ToioClientConfig) -> Result<Self> {
        let transport = BtleTransport::first_adapter()
            .await?
            .with_connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        Ok(Self::new(Arc::new(transport), config))
    }
}

impl<T: Transport> ToioClient<T> {
    pub fn new(transport: Arc<T>, config: ToioClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ToioClientConfig {
        &self.config
    }

    fn scanner(&self) -> Scanner<T> {
        Scanner::new(Arc::clone(&self.transport))
            .with_timeout(Duration::from_secs(self.config.scan_timeout_secs))
    }

    /// Make sure the radio is ready.  Call once before the first scan.
    pub async fn enable(&self) -> Result<()> {
        self.transport.enable().await
    }

    // ── Public: scan ─────────────────────────────────────────────────────────

    /// Scan for up to `count` distinct cubes.
    ///
    /// Returns early once `count` cubes are found; otherwise runs for
    /// `config.scan_timeout_secs`.  Cubes found before a timeout or a
    /// cancellation are still returned in [`ScanReport::devices`].
    pub async fn scan(&self, ctx: &CancelToken, count: usize) -> ScanReport<T::Peer> {
        let filter = has_name_prefix(self.config.name_prefix.clone());
        self.scanner().scan(ctx, count, filter).await
    }

    /// Scan for the cubes whose advertised name ends with one of `ids`
    /// (the short identifier printed on the cube, e.g. `"h4Y"`).
    pub async fn scan_by_id(&self, ctx: &CancelToken, ids: &[&str]) -> ScanReport<T::Peer> {
        self.scanner()
            .scan_by_id(ctx, &self.config.name_prefix, ids)
            .await
    }

    // ── Public: connect ──────────────────────────────────────────────────────

    /// Connect to a cube returned by [`ToioClient::scan`] and look up its
    /// motor and ID characteristics.
    ///
    /// If the link opens but the peer is not a usable cube, the link is
    /// closed again before the error is returned.
    pub async fn connect(&self, device: &Device<T::Peer>) -> Result<CubeHandle<T::Link>> {
        info!("Connecting to {}  address={}", device.name, device.address);
        let link = self.transport.connect(&device.peer).await?;

        match open_characteristics(&link).await {
            Ok((motor, id_info)) => {
                info!("Connected: {}", device.name);
                Ok(CubeHandle {
                    name: device.name.clone(),
                    address: device.address.clone(),
                    link,
                    motor,
                    id_info,
                    connected: AtomicBool::new(true),
                    event_buffer: self.config.event_buffer,
                })
            }
            Err(e) => {
                warn!("{}: setup failed: {e}", device.name);
                if let Err(cleanup) = link.disconnect().await {
                    warn!("{}: disconnect after failed setup also failed: {cleanup}", device.name);
                }
                Err(e)
            }
        }
    }

    // ── Public: connect_first (convenience) ──────────────────────────────────

    /// Scan for one cube, connect, and return its handle.
    ///
    /// With `name_suffix` set (e.g. `Some("h4Y")`), only a cube whose name
    /// ends with it is accepted.  When no cube turns up the scan's error is
    /// returned.
    pub async fn connect_first(
        &self,
        ctx: &CancelToken,
        name_suffix: Option<&str>,
    ) -> Result<CubeHandle<T::Link>> {
        let report = match name_suffix {
            Some(suffix) => self.scan_by_id(ctx, &[suffix]).await,
            None => self.scan(ctx, 1).await,
        };
        let ScanReport { devices, error } = report;
        let Some(device) = devices.into_iter().next() else {
            return Err(error.unwrap_or(ToioError::DiscoveryTimeout {
                wanted: 1,
                found: 0,
            }));
        };
        self.connect(&device).await
    }
}

// ── Private: characteristic lookup ────────────────────────────────────────────

async fn open_characteristics<L: Link>(link: &L) -> Result<(L::Characteristic, L::Characteristic)> {
    let motor = find_char(link, MOTOR_CHARACTERISTIC).await?;
    let id_info = find_char(link, ID_INFORMATION_CHARACTERISTIC).await?;
    Ok((motor, id_info))
}

async fn find_char<L: Link>(link: &L, characteristic: Uuid) -> Result<L::Characteristic> {
    link.discover_characteristic(TOIO_SERVICE_UUID, characteristic)
        .await?
        .ok_or(ToioError::MissingCharacteristic {
            service: TOIO_SERVICE_UUID,
            characteristic,
        })
}

// ── CubeHandle ────────────────────────────────────────────────────────────────

/// A handle to a connected cube.
pub struct CubeHandle<L: Link> {
    name: String,
    address: String,
    link: L,
    motor: L::Characteristic,
    id_info: L::Characteristic,
    connected: AtomicBool,
    event_buffer: usize,
}

impl<L: Link> CubeHandle<L> {
    /// Advertised name of the cube.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `false` once [`CubeHandle::disconnect`] has been called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ToioError::NotConnected)
        }
    }

    /// Drive both wheels.  Speeds saturate at ±255; negative turns the wheel
    /// backwards.  The wheels keep turning until the next command.
    pub async fn motor_control(&self, left: i32, right: i32) -> Result<()> {
        self.ensure_connected()?;
        let frame = encode_motor_command(left, right);
        debug!("{}: motor {left} {right} -> {frame:02x?}", self.name);
        self.motor.write_without_response(&frame).await
    }

    /// Stop both wheels.
    pub async fn stop(&self) -> Result<()> {
        self.motor_control(0, 0).await
    }

    /// Subscribe to ID information notifications and return the stream of
    /// decoded events.
    ///
    /// The stream ends when the link closes.  If the consumer falls more than
    /// `config.event_buffer` events behind, newer events are dropped.
    pub async fn start_id_notify(&self) -> Result<EventStream> {
        self.ensure_connected()?;
        let (relay, events) = relay::channel(self.event_buffer);
        self.id_info
            .subscribe(Box::new(move |frame: &[u8]| {
                relay.dispatch(frame);
            }))
            .await?;
        info!("{}: ID notifications enabled", self.name);
        Ok(events)
    }

    /// Disconnect.  Calling it again is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Disconnecting {}", self.name);
        self.link.disconnect().await
    }
}
