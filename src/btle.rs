//! [`Transport`] implementation on top of `btleplug`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Result, ToioError};
use crate::transport::{Advertisement, GattCharacteristic, Link, NotifySink, ReportSink, Transport};

/// Hard limit on `Peripheral::connect`.  BlueZ's `Device1.Connect` can block
/// forever when the device is out of range.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SERVICE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// How long [`BtleTransport::enable`] waits for the adapter to report
/// `PoweredOn` before failing with [`ToioError::RadioUnavailable`].  Applies
/// on every platform, not only to the CoreBluetooth warm-up on macOS.
const RADIO_READY_TIMEOUT: Duration = Duration::from_secs(3);

// ── BtleTransport ─────────────────────────────────────────────────────────────

/// A host Bluetooth adapter driven through `btleplug`.
pub struct BtleTransport {
    adapter: Adapter,
    connect_timeout: Duration,
    /// Stop signal of the scan currently running, if any.
    scan_stop: Mutex<Option<CancelToken>>,
}

impl BtleTransport {
    /// Use the first adapter the platform reports.
    pub async fn first_adapter() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ToioError::NoAdapter)?;
        Ok(Self::new(adapter))
    }

    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scan_stop: Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn scan_stop(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.scan_stop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_scan(&self, on_report: &ReportSink<Peripheral>, stop: &CancelToken) -> Result<()> {
        // Subscribe before starting the scan so no early sighting is missed.
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => return Ok(()),
                event = events.next() => event,
            };
            match event {
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    if let Some(report) = self.advertisement(&id).await {
                        on_report(report);
                    }
                }
                Some(_) => {}
                None => {
                    return Err(btleplug::Error::RuntimeError(
                        "adapter event stream closed".into(),
                    )
                    .into());
                }
            }
        }
    }

    async fn advertisement(&self, id: &PeripheralId) -> Option<Advertisement<Peripheral>> {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                debug!("scan: peripheral {id:?} vanished: {e}");
                return None;
            }
        };
        let props = peripheral.properties().await.ok().flatten()?;
        Some(Advertisement {
            name: props.local_name.unwrap_or_default(),
            address: id.to_string(),
            rssi: props.rssi.unwrap_or(0),
            peer: peripheral,
        })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Peer = Peripheral;
    type Link = BtleLink;

    /// Wait up to 3 s for the adapter to report `PoweredOn`, on all
    /// platforms.  A radio that is off or unauthorised yields
    /// [`ToioError::RadioUnavailable`].
    ///
    /// On macOS, `CBCentralManager` starts in an "unknown" state and silently
    /// ignores scan requests until it reaches `PoweredOn`, so this must be
    /// awaited before the first scan.
    async fn enable(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + RADIO_READY_TIMEOUT;
        loop {
            match self.adapter.adapter_state().await? {
                CentralState::PoweredOn => {
                    info!("Bluetooth adapter is PoweredOn");
                    break;
                }
                state if tokio::time::Instant::now() >= deadline => {
                    return Err(ToioError::RadioUnavailable(state));
                }
                state => debug!("adapter state = {state:?}, waiting…"),
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        // Let the CoreBluetooth delegate settle.
        #[cfg(target_os = "macos")]
        tokio::time::sleep(Duration::from_millis(300)).await;

        Ok(())
    }

    async fn scan(&self, on_report: ReportSink<Peripheral>, stop: CancelToken) -> Result<()> {
        let previous = self.scan_stop().replace(stop.clone());
        if let Some(previous) = previous {
            debug!("scan: superseding a scan that was still running");
            previous.cancel();
        }

        let result = if stop.is_cancelled() {
            debug!("scan: stopped before it started");
            Ok(())
        } else {
            let result = self.run_scan(&on_report, &stop).await;
            if let Err(e) = self.adapter.stop_scan().await {
                warn!("scan: adapter stop_scan failed: {e}");
            }
            result
        };

        {
            let mut registered = self.scan_stop();
            if registered.as_ref().is_some_and(|t| t.same_as(&stop)) {
                registered.take();
            }
        }
        result
    }

    /// Cancel the scan currently registered with this adapter, if any.  The
    /// scan task itself turns the radio off.
    async fn stop_scan(&self) -> Result<()> {
        let running = self.scan_stop().take();
        if let Some(stop) = running {
            stop.cancel();
        }
        Ok(())
    }

    async fn connect(&self, peer: &Peripheral) -> Result<BtleLink> {
        tokio::time::timeout(self.connect_timeout, peer.connect())
            .await
            .map_err(|_| ToioError::Timeout {
                operation: "connect",
                after: self.connect_timeout,
            })??;

        // On Linux (bluez-async / D-Bus) the BLE stack signals connection
        // completion before the remote GATT service cache is populated.
        // Calling discover_services() too quickly can return an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        let discovered =
            match tokio::time::timeout(SERVICE_DISCOVERY_TIMEOUT, peer.discover_services()).await {
                Ok(result) => result.map_err(ToioError::from),
                Err(_) => Err(ToioError::Timeout {
                    operation: "discover_services",
                    after: SERVICE_DISCOVERY_TIMEOUT,
                }),
            };
        if let Err(e) = discovered {
            if let Err(cleanup) = peer.disconnect().await {
                warn!("disconnect after failed service discovery also failed: {cleanup}");
            }
            return Err(e);
        }

        info!("Connected and services discovered: {}", peer.id());
        Ok(BtleLink {
            peripheral: peer.clone(),
            adapter: self.adapter.clone(),
        })
    }
}

// ── BtleLink ──────────────────────────────────────────────────────────────────

/// A connected `btleplug` peripheral.
pub struct BtleLink {
    peripheral: Peripheral,
    /// The adapter that owns the connection.  Kept so the notification task
    /// can watch for `DeviceDisconnected` on the right adapter.
    adapter: Adapter,
}

#[async_trait]
impl Link for BtleLink {
    type Characteristic = BtleCharacteristic;

    async fn discover_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<BtleCharacteristic>> {
        if !self.peripheral.services().iter().any(|s| s.uuid == service) {
            return Err(ToioError::MissingService(service));
        }
        let found = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic);
        Ok(found.map(|characteristic| BtleCharacteristic {
            peripheral: self.peripheral.clone(),
            adapter: self.adapter.clone(),
            characteristic,
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

// ── BtleCharacteristic ────────────────────────────────────────────────────────

pub struct BtleCharacteristic {
    peripheral: Peripheral,
    adapter: Adapter,
    characteristic: Characteristic,
}

#[async_trait]
impl GattCharacteristic for BtleCharacteristic {
    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, on_notify: NotifySink) -> Result<()> {
        let mut notifications = self.peripheral.notifications().await?;
        let mut adapter_events = self.adapter.events().await?;
        self.peripheral.subscribe(&self.characteristic).await?;

        let uuid = self.characteristic.uuid;
        let peripheral_id = self.peripheral.id();

        // Ends on whichever comes first: the notification stream closing or
        // the adapter reporting the device gone.  Dropping `on_notify` then
        // ends the consumer's event stream.
        tokio::spawn(async move {
            info!("{uuid}: notification stream subscribed, waiting for data…");
            let mut watching = true;
            loop {
                tokio::select! {
                    notif = notifications.next() => match notif {
                        Some(notif) if notif.uuid == uuid => on_notify(&notif.value),
                        Some(_) => {}
                        None => break,
                    },
                    event = adapter_events.next(), if watching => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            info!("Disconnect watcher: device {id:?} disconnected.");
                            break;
                        }
                        Some(_) => {}
                        None => {
                            warn!("Disconnect watcher: adapter event stream closed");
                            watching = false;
                        }
                    },
                }
            }
            info!("{uuid}: notification stream ended – device disconnected.");
        });

        Ok(())
    }
}
