//! Host configuration
//!
//! Identity and delivery parameters for the composite peripheral. The
//! orchestrator copies this value at `start()`; later edits by the caller
//! take effect only on the next start.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Longest advertised device name accepted by the BLE stack (GAP name limit
/// minus the NUL terminator).
pub const MAX_DEVICE_NAME_LEN: usize = 30;

/// Longest single attribute write; also the per-device fragment scratch size.
pub const MAX_FRAGMENT_LEN: usize = 512;

/// Hard ceiling of the composite report map.
pub const COMPOSITE_DESCRIPTOR_CAPACITY: usize = 2048;

/// Backoff applied by the dispatcher after dropping a report while no peer
/// is connected.
pub const DISCONNECTED_BACKOFF: Duration = Duration::from_millis(10);

/// HID information characteristic: bcdHID 1.11.
pub const HID_INFO_BCD: u16 = 0x0111;

/// HID information characteristic: not localised.
pub const HID_INFO_COUNTRY: u8 = 0x00;

/// GAP appearance codes for HID peripherals.
pub mod appearance {
    pub const GENERIC_HID: u16 = 0x03C0;
    pub const KEYBOARD: u16 = 0x03C1;
    pub const MOUSE: u16 = 0x03C2;
    pub const JOYSTICK: u16 = 0x03C3;
    pub const GAMEPAD: u16 = 0x03C4;
}

/// PnP vendor-id source: Bluetooth SIG assigned.
pub const VID_SOURCE_BLUETOOTH_SIG: u8 = 0x01;
/// PnP vendor-id source: USB Implementer's Forum assigned.
pub const VID_SOURCE_USB_IF: u8 = 0x02;

/// Snapshot of everything the composite needs from its host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfiguration {
    // --- Identity ---
    /// Advertised name; truncated to [`MAX_DEVICE_NAME_LEN`] bytes.
    pub device_name: String,
    pub manufacturer: String,
    /// Initial battery level in percent (0-100).
    pub battery_level: u8,

    // --- PnP ---
    pub vid_source: u8,
    pub vid: u16,
    pub pid: u16,
    pub version: u16,
    /// NimBLE <= 1.4.1 expects PnP fields with swapped bytes.
    pub legacy_pnp_byte_order: bool,

    /// GAP appearance, see [`appearance`].
    pub hid_type: u16,

    // --- Deferred delivery ---
    /// Reports per second drained by the dispatcher; 0 = unthrottled.
    pub queue_send_rate: u32,
    /// Spawn the background dispatcher at start.
    pub queued_sending: bool,
}

impl Default for HostConfiguration {
    fn default() -> Self {
        Self {
            device_name: String::from("Composite HID"),
            manufacturer: String::from("Espressif"),
            battery_level: 100,

            vid_source: VID_SOURCE_BLUETOOTH_SIG,
            vid: 0xe502,
            pid: 0xbbab,
            version: 0x0110,
            legacy_pnp_byte_order: false,

            hid_type: appearance::GENERIC_HID,

            queue_send_rate: 240,
            queued_sending: false,
        }
    }
}

/// PnP and HID-information fields as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub vid_source: u8,
    pub vid: u16,
    pub pid: u16,
    pub version: u16,
    pub hid_country: u8,
    pub bcd_hid: u16,
}

impl HostConfiguration {
    /// Reject values the transport cannot represent.
    pub fn validate(&self) -> Result<(), Error> {
        if self.device_name.trim().is_empty() {
            return Err(Error::Config("device_name must not be empty"));
        }
        if self.battery_level > 100 {
            return Err(Error::Config("battery_level must be 0-100"));
        }
        Ok(())
    }

    /// Device name cut to the GAP limit on a character boundary.
    pub fn advertised_name(&self) -> heapless::String<MAX_DEVICE_NAME_LEN> {
        let mut name = heapless::String::new();
        for ch in self.device_name.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        name
    }

    /// PnP identity, with the legacy byte swap applied when configured.
    pub fn identity(&self) -> DeviceIdentity {
        let order = |v: u16| {
            if self.legacy_pnp_byte_order {
                v.swap_bytes()
            } else {
                v
            }
        };
        DeviceIdentity {
            manufacturer: self.manufacturer.clone(),
            vid_source: self.vid_source,
            vid: order(self.vid),
            pid: order(self.pid),
            version: order(self.version),
            hid_country: HID_INFO_COUNTRY,
            bcd_hid: HID_INFO_BCD,
        }
    }

    /// Pause after each dispatched report: `ceil(1000 / rate)` ms, or none
    /// when unthrottled.
    pub fn send_interval(&self) -> Option<Duration> {
        send_interval(self.queue_send_rate)
    }
}

pub(crate) fn send_interval(rate: u32) -> Option<Duration> {
    if rate == 0 {
        return None;
    }
    Some(Duration::from_millis(1000u64.div_ceil(u64::from(rate))))
}
