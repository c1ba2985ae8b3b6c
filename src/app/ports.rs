//! Port traits — the boundary between the composite core and the outside world.
//!
//! ```text
//!   SubDevice ──▶ ┌──────────────────┐ ──▶ HidTransport
//!   (fragments)   │   CompositeHid    │     (report map, notify, advertise)
//!                 └──────────────────┘ ◀── ConnectionCallbacks
//! ```
//!
//! Sub-devices and the BLE stack implement these traits. The
//! [`CompositeHid`](super::service::CompositeHid) consumes them, so the core
//! never touches the radio directly and is fully testable on the host.

use std::sync::Arc;

use crate::config::DeviceIdentity;
use crate::error::{FragmentError, TransportError};

use super::channels::{OutputHandler, ReportChannels};

// ───────────────────────────────────────────────────────────────
// Sub-device port (capability contributor)
// ───────────────────────────────────────────────────────────────

/// One logical HID function inside the composite.
///
/// Report ids must be unique across the registered devices; the assembler
/// does not check this.
pub trait SubDevice: Send {
    /// Report id this device's reports are tagged with.
    fn report_id(&self) -> u8;

    /// Name used in log lines.
    fn name(&self) -> &str {
        "sub-device"
    }

    /// Write this device's report descriptor fragment into `buf` and return
    /// the number of bytes written.
    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError>;

    /// Attach to the live report channels once the composite map is
    /// installed. Called at most once per start.
    fn bind(&mut self, channels: ReportChannels);
}

// ───────────────────────────────────────────────────────────────
// Connection callbacks (transport → core)
// ───────────────────────────────────────────────────────────────

/// Link-state notifications delivered from the BLE stack's callback context.
pub trait ConnectionCallbacks: Send + Sync {
    fn on_connect(&self);
    fn on_disconnect(&self);
}

// ───────────────────────────────────────────────────────────────
// HID transport port (core → BLE stack)
// ───────────────────────────────────────────────────────────────

/// Everything the composite needs from the BLE HID service.
///
/// Methods take `&self`: implementations are shared between the startup
/// context, the dispatcher thread and bound sub-devices.
pub trait HidTransport: Send + Sync {
    /// Route connect/disconnect events to `callbacks`.
    fn register_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>);

    /// Install the composite report map.
    fn set_report_map(&self, map: &[u8]) -> Result<(), TransportError>;

    /// Deliver host writes to the output report `report_id` to `handler`.
    fn set_output_handler(&self, report_id: u8, handler: OutputHandler);

    /// Publish manufacturer, PnP ids and HID information.
    fn set_identity(&self, identity: &DeviceIdentity);

    /// Start advertising the HID service under `name` with GAP `appearance`.
    fn start_advertising(&self, name: &str, appearance: u16) -> Result<(), TransportError>;

    fn stop_advertising(&self);

    /// Push an encoded input report to the connected peer.
    fn send_input(&self, report_id: u8, payload: &[u8]) -> Result<(), TransportError>;

    /// Update the battery characteristic, notifying the peer when `notify`.
    fn set_battery_level(&self, level: u8, notify: bool);

    /// Tear down anything created for a start that failed.
    fn release(&self);
}
