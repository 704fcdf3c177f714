//! In-memory transport used by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use toio_rs::cancel::CancelToken;
use toio_rs::error::Result;
use toio_rs::protocol::MOTOR_CHARACTERISTIC;
use toio_rs::transport::{
    Advertisement, GattCharacteristic, Link, NotifySink, ReportSink, Transport,
};

/// One scripted action of the advertisement stream.
pub enum Step {
    Report(Advertisement<String>),
    /// Sleep, returning `Ok` early if the scan is stopped meanwhile.
    Wait(Duration),
    /// Sleep without looking at the stop signal, like a slow radio start.
    Stall(Duration),
    Fail(btleplug::Error),
    /// End the stream with `Ok` before anyone asked it to stop.
    End,
    /// Wait for the stop signal, then fail while shutting down.
    FailOnStop(btleplug::Error),
}

pub fn report(name: &str, address: &str) -> Step {
    Step::Report(Advertisement {
        name: name.to_string(),
        address: address.to_string(),
        rssi: -50,
        peer: address.to_string(),
    })
}

/// State of the single cube behind every link the mock opens.
#[derive(Default)]
pub struct CubeState {
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub disconnects: AtomicUsize,
    pub connected_to: Mutex<Vec<String>>,
    sink: Mutex<Option<NotifySink>>,
}

impl CubeState {
    /// Push a raw notification frame, as the cube would.
    pub fn notify(&self, frame: &[u8]) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink(frame);
        }
    }

    /// Simulate the link dropping.
    pub fn close(&self) {
        self.sink.lock().unwrap().take();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

/// A scripted transport: each scan call plays the next script, any number
/// of connects.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    active_scans: AtomicUsize,
    stops_seen_at_start: AtomicUsize,
    pub scan_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub cube: Arc<CubeState>,
    pub missing: Vec<Uuid>,
    pub connect_error: Mutex<Option<btleplug::Error>>,
    pub fail_disconnect: bool,
}

impl MockTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([steps])),
            ..Self::default()
        }
    }

    /// Queue the script played by the following scan call.
    pub fn then(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }

    /// Scans that have started and not yet returned.
    pub fn active_scans(&self) -> usize {
        self.active_scans.load(Ordering::SeqCst)
    }

    /// Scans whose stop signal had already fired when they were first polled.
    pub fn stops_seen_at_start(&self) -> usize {
        self.stops_seen_at_start.load(Ordering::SeqCst)
    }

    async fn play(
        &self,
        steps: Vec<Step>,
        on_report: &ReportSink<String>,
        stop: &CancelToken,
    ) -> Result<()> {
        for step in steps {
            if stop.is_cancelled() {
                if let Step::FailOnStop(e) = step {
                    return Err(e.into());
                }
                return Ok(());
            }
            match step {
                Step::Report(ad) => on_report(ad),
                Step::Wait(duration) => {
                    tokio::select! {
                        _ = stop.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
                Step::Stall(duration) => tokio::time::sleep(duration).await,
                Step::Fail(e) => return Err(e.into()),
                Step::End => return Ok(()),
                Step::FailOnStop(e) => {
                    stop.cancelled().await;
                    return Err(e.into());
                }
            }
        }
        stop.cancelled().await;
        Ok(())
    }

    /// Links opened by this transport report `uuids` as absent.
    pub fn without(mut self, uuids: &[Uuid]) -> Self {
        self.missing = uuids.to_vec();
        self
    }

    /// Every link disconnect fails after closing the link.
    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Peer = String;
    type Link = MockLink;

    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    async fn scan(&self, on_report: ReportSink<String>, stop: CancelToken) -> Result<()> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if stop.is_cancelled() {
            self.stops_seen_at_start.fetch_add(1, Ordering::SeqCst);
        }
        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_default();

        self.active_scans.fetch_add(1, Ordering::SeqCst);
        let result = self.play(steps, &on_report, &stop).await;
        self.active_scans.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, peer: &String) -> Result<MockLink> {
        let connect_error = self.connect_error.lock().unwrap().take();
        if let Some(e) = connect_error {
            return Err(e.into());
        }
        self.cube.connected_to.lock().unwrap().push(peer.clone());
        Ok(MockLink {
            cube: Arc::clone(&self.cube),
            missing: self.missing.clone(),
            fail_disconnect: self.fail_disconnect,
        })
    }
}

pub struct MockLink {
    cube: Arc<CubeState>,
    missing: Vec<Uuid>,
    fail_disconnect: bool,
}

#[async_trait]
impl Link for MockLink {
    type Characteristic = MockCharacteristic;

    async fn discover_characteristic(
        &self,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<MockCharacteristic>> {
        if self.missing.contains(&characteristic) {
            return Ok(None);
        }
        Ok(Some(MockCharacteristic {
            uuid: characteristic,
            cube: Arc::clone(&self.cube),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.cube.disconnects.fetch_add(1, Ordering::SeqCst);
        self.cube.close();
        if self.fail_disconnect {
            return Err(btleplug::Error::NotConnected.into());
        }
        Ok(())
    }
}

pub struct MockCharacteristic {
    uuid: Uuid,
    cube: Arc<CubeState>,
}

#[async_trait]
impl GattCharacteristic for MockCharacteristic {
    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        if self.uuid == MOTOR_CHARACTERISTIC {
            self.cube.writes.lock().unwrap().push(data.to_vec());
        }
        Ok(())
    }

    async fn subscribe(&self, on_notify: NotifySink) -> Result<()> {
        *self.cube.sink.lock().unwrap() = Some(on_notify);
        Ok(())
    }
}
