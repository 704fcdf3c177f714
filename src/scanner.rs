//! Cancellable, deduplicating discovery of nearby cubes.
//!
//! [`Scanner::scan`] runs the transport's advertisement stream on its own
//! task and folds every report into a [`ScanSession`].  The scan ends on the
//! first of:
//!
//! * the session collecting the wanted number of distinct devices,
//! * the caller's [`CancelToken`] firing,
//! * the advertisement stream failing,
//! * the scan deadline.
//!
//! Whatever was collected up to that point is returned, together with an
//! error describing why the scan fell short (if it did).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::error::{Result, ToioError};
use crate::transport::{Advertisement, ReportSink, Transport};

/// Scan duration used when none is configured.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the advertisement task to finish after it was told
/// to stop before giving up on it.
const STREAM_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ── Device ────────────────────────────────────────────────────────────────────

/// A cube discovered during a scan.
///
/// Returned by [`Scanner::scan`]; pass to
/// [`crate::client::ToioClient::connect`] to open a connection.
#[derive(Clone, Debug)]
pub struct Device<P> {
    /// Advertised local name (e.g. `"toio Core Cube-h4Y"`).
    pub name: String,
    /// Platform BLE identifier.  Unique per device within a scan.
    /// • macOS / Windows: a UUID string
    /// • Linux: a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub address: String,
    /// Signal strength of the first sighting, in dBm.
    pub rssi: i16,
    /// Transport token used to open the connection.
    pub peer: P,
}

impl<P> From<Advertisement<P>> for Device<P> {
    fn from(ad: Advertisement<P>) -> Self {
        Self {
            name: ad.name,
            address: ad.address,
            rssi: ad.rssi,
            peer: ad.peer,
        }
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// Accept advertisements whose name starts with `prefix`.
pub fn has_name_prefix<P: 'static>(
    prefix: impl Into<String>,
) -> impl Fn(&Advertisement<P>) -> bool + Send + Sync + 'static {
    let prefix = prefix.into();
    move |ad: &Advertisement<P>| ad.name.starts_with(&prefix)
}

/// Accept advertisements whose name starts with `prefix` and ends with one of
/// `ids`.
pub fn has_name_id<P: 'static>(
    prefix: impl Into<String>,
    ids: Vec<String>,
) -> impl Fn(&Advertisement<P>) -> bool + Send + Sync + 'static {
    let prefix = prefix.into();
    move |ad: &Advertisement<P>| {
        ad.name.starts_with(&prefix) && ids.iter().any(|id| ad.name.ends_with(id.as_str()))
    }
}

// ── ScanReport ────────────────────────────────────────────────────────────────

/// Outcome of one scan.
#[derive(Debug)]
pub struct ScanReport<P> {
    /// Distinct devices in first-seen order.  Never longer than the wanted
    /// count.
    pub devices: Vec<Device<P>>,
    /// `None` when the wanted count was reached.  Otherwise why the scan
    /// ended early: [`ToioError::DiscoveryTimeout`], [`ToioError::Cancelled`],
    /// or the transport's own error.  `devices` is valid either way.
    pub error: Option<ToioError>,
}

impl<P> ScanReport<P> {
    fn empty() -> Self {
        Self {
            devices: Vec::new(),
            error: None,
        }
    }

    /// `true` when the scan found everything it was asked for.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Collapse into a `Result`, discarding partial devices on error.
    pub fn into_result(self) -> Result<Vec<Device<P>>> {
        match self.error {
            None => Ok(self.devices),
            Some(e) => Err(e),
        }
    }
}

// ── ScanSession ───────────────────────────────────────────────────────────────

/// What [`ScanSession::intake`] did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    /// New device appended to the result.
    Recorded,
    /// The name filter rejected it.
    Rejected,
    /// Address already recorded.
    Duplicate,
    /// The session already holds the wanted number of devices.
    Full,
}

struct Found<P> {
    seen: HashSet<String>,
    devices: Vec<Device<P>>,
}

type NameFilter<P> = Box<dyn Fn(&Advertisement<P>) -> bool + Send + Sync>;

/// Per-scan state: the name filter, the dedup set, and the growing result.
///
/// One session belongs to exactly one scan; concurrent scans never share
/// dedup state.
pub struct ScanSession<P> {
    wanted: usize,
    filter: NameFilter<P>,
    found: Mutex<Found<P>>,
    satisfied: CancelToken,
}

impl<P: Clone> ScanSession<P> {
    pub fn new<F>(wanted: usize, filter: F) -> Self
    where
        F: Fn(&Advertisement<P>) -> bool + Send + Sync + 'static,
    {
        Self {
            wanted,
            filter: Box::new(filter),
            found: Mutex::new(Found {
                seen: HashSet::new(),
                devices: Vec::with_capacity(wanted),
            }),
            satisfied: CancelToken::new(),
        }
    }

    /// Fold one advertisement into the session.
    ///
    /// The dedup check, insert, and append happen under one lock.  The report
    /// that completes the session fires the satisfaction signal.
    pub fn intake(&self, report: Advertisement<P>) -> Intake {
        if !(self.filter)(&report) {
            return Intake::Rejected;
        }

        let mut found = self.lock();
        if found.devices.len() >= self.wanted {
            return Intake::Full;
        }
        if !found.seen.insert(report.address.clone()) {
            return Intake::Duplicate;
        }
        debug!(
            "scan: found {}  address={}  rssi={}",
            report.name, report.address, report.rssi
        );
        found.devices.push(Device::from(report));
        let full = found.devices.len() >= self.wanted;
        drop(found);

        if full {
            self.satisfied.cancel();
        }
        Intake::Recorded
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied.is_cancelled()
    }

    /// Resolve once the wanted number of devices has been recorded.
    pub async fn satisfied(&self) {
        self.satisfied.cancelled().await
    }

    pub fn len(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the devices recorded so far.
    pub fn snapshot(&self) -> Vec<Device<P>> {
        self.lock().devices.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Found<P>> {
        // The critical section cannot leave `Found` half-updated, so a
        // poisoned lock still holds consistent data.
        self.found.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

enum ScanEnd {
    Satisfied,
    TimedOut,
    Cancelled,
    Failed(ToioError),
}

/// Discovers devices through a [`Transport`].
pub struct Scanner<T: Transport> {
    transport: Arc<T>,
    timeout: Duration,
}

impl<T: Transport> Scanner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Override the scan duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collect up to `want` distinct devices accepted by `filter`.
    ///
    /// Returns as soon as `want` devices are found, when `ctx` is cancelled,
    /// when the advertisement stream fails, or after the scanner's timeout,
    /// whichever comes first.  A `want` of zero returns an empty, complete
    /// report without touching the radio.
    pub async fn scan<F>(&self, ctx: &CancelToken, want: usize, filter: F) -> ScanReport<T::Peer>
    where
        F: Fn(&Advertisement<T::Peer>) -> bool + Send + Sync + 'static,
    {
        if want == 0 {
            return ScanReport::empty();
        }
        if ctx.is_cancelled() {
            return ScanReport {
                devices: Vec::new(),
                error: Some(ToioError::Cancelled),
            };
        }

        let session = Arc::new(ScanSession::new(want, filter));
        let deadline = Instant::now() + self.timeout;

        info!(
            "scan: looking for {want} device(s) for up to {:?} …",
            self.timeout
        );

        let sink_session = Arc::clone(&session);
        let on_report: ReportSink<T::Peer> = Box::new(move |report| {
            sink_session.intake(report);
        });
        // The task may first be polled after `stop` has fired.
        let stop = CancelToken::new();
        let transport = Arc::clone(&self.transport);
        let task_stop = stop.clone();
        let mut stream = tokio::spawn(async move { transport.scan(on_report, task_stop).await });
        let mut stream_done = false;

        let end = loop {
            tokio::select! {
                biased;
                _ = session.satisfied() => break ScanEnd::Satisfied,
                _ = ctx.cancelled() => break ScanEnd::Cancelled,
                joined = &mut stream, if !stream_done => {
                    stream_done = true;
                    if let Err(e) = joined.unwrap_or_else(|e| Err(e.into())) {
                        break ScanEnd::Failed(e);
                    }
                    // No more reports will arrive, but the deadline and the
                    // caller still decide when the scan is over.
                    debug!("scan: advertisement stream ended before the deadline");
                }
                _ = tokio::time::sleep_until(deadline) => break ScanEnd::TimedOut,
            }
        };

        stop.cancel();
        if let Err(e) = self.transport.stop_scan().await {
            warn!("scan: stop_scan failed: {e}");
        }

        let status = if stream_done {
            Ok(())
        } else {
            match tokio::time::timeout(STREAM_SHUTDOWN_GRACE, &mut stream).await {
                Ok(joined) => joined.unwrap_or_else(|e| Err(e.into())),
                Err(_) => {
                    warn!(
                        "scan: advertisement stream still running {STREAM_SHUTDOWN_GRACE:?} after stop, aborting it"
                    );
                    stream.abort();
                    Ok(())
                }
            }
        };

        let devices = session.snapshot();
        let error = match (end, status) {
            (ScanEnd::Satisfied, status) => {
                if let Err(e) = status {
                    warn!("scan: stream reported an error after the scan was satisfied: {e}");
                }
                None
            }
            (ScanEnd::Failed(e), _) => Some(e),
            (_, Err(e)) => Some(e),
            (ScanEnd::TimedOut, Ok(())) => Some(ToioError::DiscoveryTimeout {
                wanted: want,
                found: devices.len(),
            }),
            (ScanEnd::Cancelled, Ok(())) => Some(ToioError::Cancelled),
        };

        match &error {
            None => info!("scan: {} device(s) found", devices.len()),
            Some(e) => info!("scan: {} of {want} device(s) found ({e})", devices.len()),
        }

        ScanReport { devices, error }
    }

    /// Collect the devices whose advertised name starts with `prefix` and ends
    /// with one of `ids`, one device per distinct id.
    pub async fn scan_by_id(
        &self,
        ctx: &CancelToken,
        prefix: &str,
        ids: &[&str],
    ) -> ScanReport<T::Peer> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let want = ids.len();
        self.scan(ctx, want, has_name_id(prefix, ids)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(name: &str, address: &str) -> Advertisement<()> {
        Advertisement {
            name: name.to_string(),
            address: address.to_string(),
            rssi: -60,
            peer: (),
        }
    }

    #[test]
    fn test_duplicate_address_recorded_once() {
        let session = ScanSession::new(3, has_name_prefix("toio"));
        assert_eq!(session.intake(ad("toio-a", "AA")), Intake::Recorded);
        assert_eq!(session.intake(ad("toio-a", "AA")), Intake::Duplicate);
        assert_eq!(session.intake(ad("toio-renamed", "AA")), Intake::Duplicate);

        let devices = session.snapshot();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "toio-a");
    }

    #[test]
    fn test_filter_rejects_other_names() {
        let session = ScanSession::new(1, has_name_prefix("toio"));
        assert_eq!(session.intake(ad("MX Keys", "AA")), Intake::Rejected);
        assert_eq!(session.intake(ad("", "BB")), Intake::Rejected);
        assert!(session.is_empty());
        assert!(!session.is_satisfied());
    }

    #[test]
    fn test_session_stops_growing_when_full() {
        let session = ScanSession::new(2, has_name_prefix("toio"));
        assert_eq!(session.intake(ad("toio-1", "01")), Intake::Recorded);
        assert!(!session.is_satisfied());
        assert_eq!(session.intake(ad("toio-2", "02")), Intake::Recorded);
        assert!(session.is_satisfied());
        assert_eq!(session.intake(ad("toio-3", "03")), Intake::Full);

        let addresses: Vec<String> = session.snapshot().into_iter().map(|d| d.address).collect();
        assert_eq!(addresses, vec!["01", "02"]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let session = ScanSession::new(2, has_name_prefix("toio"));
        session.intake(ad("toio-1", "01"));
        let snapshot = session.snapshot();
        session.intake(ad("toio-2", "02"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_name_id_filter() {
        let filter = has_name_id::<()>("toio", vec!["h4Y".to_string(), "k2P".to_string()]);
        assert!(filter(&ad("toio Core Cube-h4Y", "01")));
        assert!(filter(&ad("toio Core Cube-k2P", "02")));
        assert!(!filter(&ad("toio Core Cube-zzz", "03")));
        assert!(!filter(&ad("other-h4Y", "04")));
    }

    #[test]
    fn test_report_into_result() {
        let report: ScanReport<()> = ScanReport {
            devices: vec![Device::from(ad("toio-1", "01"))],
            error: Some(ToioError::DiscoveryTimeout {
                wanted: 2,
                found: 1,
            }),
        };
        assert!(!report.is_complete());
        assert!(matches!(
            report.into_result(),
            Err(ToioError::DiscoveryTimeout { wanted: 2, found: 1 })
        ));
    }
}
