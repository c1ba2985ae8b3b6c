//! Composite HID orchestrator — the hexagonal core.
//!
//! [`CompositeHid`] owns the sub-device registry, the connection tracker,
//! the deferred-report queue and its dispatcher. All BLE traffic flows
//! through the [`HidTransport`] port, so the whole lifecycle runs against a
//! mock transport on the host.
//!
//! ```text
//!  SubDevice* ──▶ ┌────────────────────────────┐ ──▶ HidTransport
//!                 │        CompositeHid         │
//!   producers ──▶ │  registry · tracker · queue │ ◀── connect / disconnect
//!                 └────────────────────────────┘
//!                               │
//!                               ▼
//!                          Dispatcher
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use log::{error, info, warn};

use crate::config::{COMPOSITE_DESCRIPTOR_CAPACITY, HostConfiguration};
use crate::error::Error;
use crate::task::TaskSpec;

use super::channels::ReportChannels;
use super::connection::ConnectionStatus;
use super::descriptor::{self, CompositeDescriptor};
use super::dispatcher::{self, DISPATCHER_TASK, Dispatcher};
use super::ports::{ConnectionCallbacks, HidTransport, SubDevice};
use super::queue::{DeferredReportQueue, DeferredReports};

/// Highest valid battery level, in percent.
const MAX_BATTERY_LEVEL: u8 = 100;

// ───────────────────────────────────────────────────────────────
// CompositeHid
// ───────────────────────────────────────────────────────────────

/// One BLE HID peripheral made of several [`SubDevice`]s.
pub struct CompositeHid<T: HidTransport + 'static> {
    transport: Arc<T>,
    devices: Vec<Box<dyn SubDevice>>,
    /// Snapshot taken at the last successful `start()`.
    config: Option<HostConfiguration>,
    connection: Arc<ConnectionStatus>,
    queue: Arc<DeferredReportQueue>,
    dispatcher: Option<Dispatcher>,
    dispatcher_task: TaskSpec,
    battery: AtomicU8,
    report_map: CompositeDescriptor,
    /// Registry indices bound at start.
    included: Vec<usize>,
    started: bool,
}

impl<T: HidTransport + 'static> CompositeHid<T> {
    /// Create an idle composite on top of `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            devices: Vec::new(),
            config: None,
            connection: Arc::new(ConnectionStatus::new()),
            queue: Arc::new(DeferredReportQueue::new()),
            dispatcher: None,
            dispatcher_task: DISPATCHER_TASK,
            battery: AtomicU8::new(MAX_BATTERY_LEVEL),
            report_map: CompositeDescriptor::new(),
            included: Vec::new(),
            started: false,
        }
    }

    /// Run the dispatcher with `task` instead of [`DISPATCHER_TASK`].
    pub fn with_dispatcher_task(mut self, task: TaskSpec) -> Self {
        self.dispatcher_task = task;
        self
    }

    // ── Registry ──────────────────────────────────────────────

    /// Append a sub-device. Order of registration is the order of the
    /// fragments in the report map.
    pub fn register_device(&mut self, device: Box<dyn SubDevice>) -> Result<(), Error> {
        if self.started {
            warn!(
                "HID: '{}' registered after start, ignored",
                device.name()
            );
            return Err(Error::RegistrationClosed);
        }
        info!(
            "HID: registered '{}' (report id {:#04x})",
            device.name(),
            device.report_id()
        );
        self.devices.push(device);
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Assemble the report map, bring the HID service up and start
    /// advertising.
    ///
    /// Runs to completion on the calling thread. On failure nothing is
    /// advertised and whatever the transport allocated is released.
    pub fn start(&mut self, config: &HostConfiguration) -> Result<(), Error> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        config.validate()?;
        let config = config.clone();

        self.transport
            .register_connection_callbacks(Arc::clone(&self.connection) as Arc<dyn ConnectionCallbacks>);

        let assembly = match descriptor::assemble(&self.devices, COMPOSITE_DESCRIPTOR_CAPACITY) {
            Ok(a) => a,
            Err(e) => {
                error!("HID: start aborted: {e}");
                self.transport.release();
                return Err(e.into());
            }
        };

        if let Err(e) = self.transport.set_report_map(&assembly.descriptor) {
            error!("HID: report map rejected: {e}");
            self.transport.release();
            return Err(e.into());
        }

        self.queue.reopen();
        let transport: Arc<dyn HidTransport> = Arc::clone(&self.transport) as Arc<dyn HidTransport>;
        let deferred = DeferredReports::new(Arc::clone(&self.queue));
        for &index in &assembly.included {
            let device = &mut self.devices[index];
            let channels = ReportChannels::new(
                device.report_id(),
                Arc::clone(&transport),
                deferred.clone(),
            );
            device.bind(channels);
        }

        self.transport.set_identity(&config.identity());

        let name = config.advertised_name();
        if let Err(e) = self.transport.start_advertising(&name, config.hid_type) {
            error!("HID: advertising failed: {e}");
            self.queue.close();
            self.transport.release();
            return Err(e.into());
        }
        info!("HID: advertising as '{}' (appearance {:#06x})", name, config.hid_type);

        self.report_map = assembly.descriptor;
        self.included = assembly.included;
        self.started = true;

        self.set_battery_level(config.battery_level);

        if config.queued_sending {
            match Dispatcher::spawn(
                self.dispatcher_task,
                Arc::clone(&self.queue),
                Arc::clone(&self.connection),
                config.send_interval(),
            ) {
                Ok(d) => self.dispatcher = Some(d),
                Err(e) => warn!("HID: dispatcher spawn failed ({e}), queued sending disabled"),
            }
        }

        self.config = Some(config);
        Ok(())
    }

    /// Close the deferred queue, wait for the dispatcher to exit and tear
    /// the HID profile down. Pending reports are discarded. Idempotent.
    ///
    /// A later `start()` rebuilds the profile from the new configuration.
    pub fn stop(&mut self) {
        self.queue.close();
        if let Some(d) = self.dispatcher.take() {
            d.join();
        }
        if self.started {
            self.transport.stop_advertising();
            self.transport.release();
            self.started = false;
            info!("HID: stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // ── Runtime ───────────────────────────────────────────────

    /// Store the battery level and, while running, push it to the transport.
    /// The peer is notified only when connected. Values above 100 are
    /// clamped.
    pub fn set_battery_level(&self, level: u8) {
        let level = if level > MAX_BATTERY_LEVEL {
            warn!("HID: battery level {level}% clamped to {MAX_BATTERY_LEVEL}%");
            MAX_BATTERY_LEVEL
        } else {
            level
        };
        self.battery.store(level, Ordering::Release);
        if self.started {
            self.transport
                .set_battery_level(level, self.connection.is_connected());
        }
    }

    pub fn battery_level(&self) -> u8 {
        self.battery.load(Ordering::Acquire)
    }

    /// Enqueue a report for deferred delivery. Never blocks.
    pub fn queue_device_deferred_report(&self, report: impl FnOnce() + Send + 'static) {
        self.queue.push(Box::new(report));
    }

    /// Producer handle usable from other threads.
    pub fn deferred_reports(&self) -> DeferredReports {
        DeferredReports::new(Arc::clone(&self.queue))
    }

    /// Run pending deferred reports now, while a peer is connected.
    /// Returns how many ran.
    pub fn send_deferred_reports(&self) -> usize {
        if !self.started {
            return 0;
        }
        dispatcher::flush(&self.queue, &self.connection)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Shared tracker, e.g. for callers that poll the link state.
    pub fn connection(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.connection)
    }

    // ── Introspection ─────────────────────────────────────────

    /// The installed report map; empty before the first start.
    pub fn report_map(&self) -> &[u8] {
        &self.report_map
    }

    /// Registry indices of the devices bound at start.
    pub fn included_devices(&self) -> &[usize] {
        &self.included
    }

    pub fn configuration(&self) -> Option<&HostConfiguration> {
        self.config.as_ref()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

impl<T: HidTransport + 'static> Drop for CompositeHid<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
