//! Mock HID transport for integration tests.
//!
//! Records every port call so tests can assert on the full call history,
//! and lets the test play the peer (connect, disconnect, host writes).

use std::sync::{Arc, Mutex};

use composite_hid::app::channels::OutputHandler;
use composite_hid::app::ports::{ConnectionCallbacks, HidTransport, SubDevice};
use composite_hid::app::ReportChannels;
use composite_hid::config::DeviceIdentity;
use composite_hid::error::{FragmentError, TransportError};

// ── Transport call record ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    RegisterCallbacks,
    SetReportMap(Vec<u8>),
    SetOutputHandler(u8),
    SetIdentity(DeviceIdentity),
    StartAdvertising { name: String, appearance: u16 },
    StopAdvertising,
    SendInput { report_id: u8, payload: Vec<u8> },
    SetBattery { level: u8, notify: bool },
    Release,
}

// ── MockTransport ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    callbacks: Mutex<Option<Arc<dyn ConnectionCallbacks>>>,
    outputs: Mutex<Vec<(u8, OutputHandler)>>,
    pub fail_advertising: bool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_advertising() -> Arc<Self> {
        Arc::new(Self {
            fail_advertising: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::SendInput { report_id, payload } => Some((report_id, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn battery_updates(&self) -> Vec<(u8, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::SetBattery { level, notify } => Some((level, notify)),
                _ => None,
            })
            .collect()
    }

    pub fn advertised(&self) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, TransportCall::StartAdvertising { .. }))
    }

    pub fn released(&self) -> bool {
        self.calls().contains(&TransportCall::Release)
    }

    pub fn connect(&self) {
        let cb = self.callbacks.lock().unwrap().clone();
        cb.expect("callbacks registered").on_connect();
    }

    pub fn disconnect(&self) {
        let cb = self.callbacks.lock().unwrap().clone();
        cb.expect("callbacks registered").on_disconnect();
    }

    pub fn host_write(&self, report_id: u8, data: &[u8]) {
        let outputs = self.outputs.lock().unwrap();
        if let Some((_, handler)) = outputs.iter().find(|(id, _)| *id == report_id) {
            handler(data);
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl HidTransport for MockTransport {
    fn register_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>) {
        *self.callbacks.lock().unwrap() = Some(callbacks);
        self.record(TransportCall::RegisterCallbacks);
    }

    fn set_report_map(&self, map: &[u8]) -> Result<(), TransportError> {
        self.record(TransportCall::SetReportMap(map.to_vec()));
        Ok(())
    }

    fn set_output_handler(&self, report_id: u8, handler: OutputHandler) {
        let mut outputs = self.outputs.lock().unwrap();
        outputs.retain(|(id, _)| *id != report_id);
        outputs.push((report_id, handler));
        drop(outputs);
        self.record(TransportCall::SetOutputHandler(report_id));
    }

    fn set_identity(&self, identity: &DeviceIdentity) {
        self.record(TransportCall::SetIdentity(identity.clone()));
    }

    fn start_advertising(&self, name: &str, appearance: u16) -> Result<(), TransportError> {
        if self.fail_advertising {
            return Err(TransportError::AdvertisingFailed);
        }
        self.record(TransportCall::StartAdvertising {
            name: name.to_owned(),
            appearance,
        });
        Ok(())
    }

    fn stop_advertising(&self) {
        self.record(TransportCall::StopAdvertising);
    }

    fn send_input(&self, report_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.record(TransportCall::SendInput {
            report_id,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn set_battery_level(&self, level: u8, notify: bool) {
        self.record(TransportCall::SetBattery { level, notify });
    }

    fn release(&self) {
        self.record(TransportCall::Release);
    }
}

// ── FixedDevice ───────────────────────────────────────────────

/// Sub-device with a canned fragment that remembers its channels.
pub struct FixedDevice {
    pub id: u8,
    pub fragment: Vec<u8>,
    pub bound: Arc<Mutex<Option<ReportChannels>>>,
}

#[allow(dead_code)]
impl FixedDevice {
    pub fn new(id: u8, fragment: &[u8]) -> Self {
        Self {
            id,
            fragment: fragment.to_vec(),
            bound: Arc::new(Mutex::new(None)),
        }
    }

    /// Fragment of `len` bytes, all `id`.
    pub fn sized(id: u8, len: usize) -> Self {
        Self::new(id, &vec![id; len])
    }

    pub fn boxed(self) -> Box<dyn SubDevice> {
        Box::new(self)
    }
}

impl SubDevice for FixedDevice {
    fn report_id(&self) -> u8 {
        self.id
    }

    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError> {
        if self.fragment.len() > buf.len() {
            return Err(FragmentError::Overflow {
                len: self.fragment.len(),
                limit: buf.len(),
            });
        }
        buf[..self.fragment.len()].copy_from_slice(&self.fragment);
        Ok(self.fragment.len())
    }

    fn bind(&mut self, channels: ReportChannels) {
        *self.bound.lock().unwrap() = Some(channels);
    }
}
