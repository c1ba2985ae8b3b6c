//! Boot-protocol style keyboard.
//!
//! Input report: modifier bitmap, reserved byte, six key slots.
//! Output report: five LED bits (Num, Caps, Scroll, Compose, Kana).

use std::sync::{Arc, Mutex, Weak};

use core::sync::atomic::{AtomicU8, Ordering};

use log::{debug, warn};

use crate::app::channels::ReportChannels;
use crate::app::ports::SubDevice;
use crate::error::{FragmentError, TransportError};

use super::{lock, render_template};

pub const DEFAULT_REPORT_ID: u8 = 0x01;

/// Key slots in one report.
pub const KEY_SLOTS: usize = 6;

/// Highest key usage the descriptor declares.
pub const MAX_KEY_USAGE: u8 = 0x65;

/// Modifier usages `0xE0..=0xE7` map onto bits of the modifier byte.
const MODIFIER_FIRST: u8 = 0xE0;
const MODIFIER_LAST: u8 = 0xE7;

pub mod leds {
    pub const NUM_LOCK: u8 = 1 << 0;
    pub const CAPS_LOCK: u8 = 1 << 1;
    pub const SCROLL_LOCK: u8 = 1 << 2;
    pub const COMPOSE: u8 = 1 << 3;
    pub const KANA: u8 = 1 << 4;
}

#[rustfmt::skip]
const DESCRIPTOR: [u8; 65] = [
    0x05, 0x01,         // Usage Page (Generic Desktop)
    0x09, 0x06,         // Usage (Keyboard)
    0xA1, 0x01,         // Collection (Application)
    0x85, 0x00,         //   Report ID (patched)
    0x05, 0x07,         //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0,         //   Usage Minimum (Left Control)
    0x29, 0xE7,         //   Usage Maximum (Right GUI)
    0x15, 0x00,         //   Logical Minimum (0)
    0x25, 0x01,         //   Logical Maximum (1)
    0x75, 0x01,         //   Report Size (1)
    0x95, 0x08,         //   Report Count (8)
    0x81, 0x02,         //   Input (Data, Var, Abs) ; modifiers
    0x95, 0x01,         //   Report Count (1)
    0x75, 0x08,         //   Report Size (8)
    0x81, 0x01,         //   Input (Const) ; reserved
    0x95, 0x06,         //   Report Count (6)
    0x75, 0x08,         //   Report Size (8)
    0x15, 0x00,         //   Logical Minimum (0)
    0x25, 0x65,         //   Logical Maximum (101)
    0x05, 0x07,         //   Usage Page (Keyboard/Keypad)
    0x19, 0x00,         //   Usage Minimum (0)
    0x29, 0x65,         //   Usage Maximum (101)
    0x81, 0x00,         //   Input (Data, Array, Abs) ; keys
    0x95, 0x05,         //   Report Count (5)
    0x75, 0x01,         //   Report Size (1)
    0x05, 0x08,         //   Usage Page (LEDs)
    0x19, 0x01,         //   Usage Minimum (Num Lock)
    0x29, 0x05,         //   Usage Maximum (Kana)
    0x91, 0x02,         //   Output (Data, Var, Abs) ; LEDs
    0x95, 0x01,         //   Report Count (1)
    0x75, 0x03,         //   Report Size (3)
    0x91, 0x01,         //   Output (Const) ; padding
    0xC0,               // End Collection
];

/// Current key state, as sent to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keys: [u8; KEY_SLOTS],
}

impl KeyboardReport {
    pub fn to_bytes(self) -> [u8; 2 + KEY_SLOTS] {
        let mut out = [0u8; 2 + KEY_SLOTS];
        out[0] = self.modifiers;
        out[2..].copy_from_slice(&self.keys);
        out
    }
}

struct Inner {
    report_id: u8,
    report: Mutex<KeyboardReport>,
    leds: AtomicU8,
    channels: Mutex<Option<ReportChannels>>,
}

#[derive(Clone)]
pub struct KeyboardDevice {
    inner: Arc<Inner>,
}

impl KeyboardDevice {
    pub fn new() -> Self {
        Self::with_report_id(DEFAULT_REPORT_ID)
    }

    pub fn with_report_id(report_id: u8) -> Self {
        Self {
            inner: Arc::new(Inner {
                report_id,
                report: Mutex::new(KeyboardReport::default()),
                leds: AtomicU8::new(0),
                channels: Mutex::new(None),
            }),
        }
    }

    /// Mark `usage` as held. Modifier usages set their modifier bit.
    /// Returns `false` if the usage is out of range or all key slots
    /// are taken.
    pub fn press(&self, usage: u8) -> bool {
        let mut report = lock(&self.inner.report);
        if (MODIFIER_FIRST..=MODIFIER_LAST).contains(&usage) {
            report.modifiers |= 1 << (usage - MODIFIER_FIRST);
            return true;
        }
        if usage == 0 || usage > MAX_KEY_USAGE {
            return false;
        }
        if report.keys.contains(&usage) {
            return true;
        }
        match report.keys.iter_mut().find(|k| **k == 0) {
            Some(slot) => {
                *slot = usage;
                true
            }
            None => {
                debug!("Keyboard: rollover, {usage:#04x} not pressed");
                false
            }
        }
    }

    pub fn release(&self, usage: u8) {
        let mut report = lock(&self.inner.report);
        if (MODIFIER_FIRST..=MODIFIER_LAST).contains(&usage) {
            report.modifiers &= !(1 << (usage - MODIFIER_FIRST));
            return;
        }
        for slot in report.keys.iter_mut().filter(|k| **k == usage) {
            *slot = 0;
        }
    }

    pub fn release_all(&self) {
        *lock(&self.inner.report) = KeyboardReport::default();
    }

    pub fn report(&self) -> KeyboardReport {
        *lock(&self.inner.report)
    }

    /// LED bits last written by the host, see [`leds`].
    pub fn leds(&self) -> u8 {
        self.inner.leds.load(Ordering::Acquire)
    }

    /// Send the current key state now.
    pub fn send_report(&self) -> Result<(), TransportError> {
        let bytes = self.report().to_bytes();
        let channels = lock(&self.inner.channels);
        let channels = channels.as_ref().ok_or(TransportError::NotStarted)?;
        channels.input.send(&bytes)
    }

    /// Snapshot the current key state and queue it for deferred delivery.
    pub fn queue_report(&self) -> Result<(), TransportError> {
        let bytes = self.report().to_bytes();
        let channels = lock(&self.inner.channels);
        let channels = channels.as_ref().ok_or(TransportError::NotStarted)?;
        let input = channels.input.clone();
        channels.deferred.queue(move || {
            if let Err(e) = input.send(&bytes) {
                warn!("Keyboard: deferred report failed: {e}");
            }
        });
        Ok(())
    }
}

impl Default for KeyboardDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SubDevice for KeyboardDevice {
    fn report_id(&self) -> u8 {
        self.inner.report_id
    }

    fn name(&self) -> &str {
        "keyboard"
    }

    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError> {
        render_template(&DESCRIPTOR, self.inner.report_id, buf)
    }

    fn bind(&mut self, channels: ReportChannels) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        channels.output.on_write(move |data| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match data {
                [leds] => inner.leds.store(*leds, Ordering::Release),
                [id, leds] if *id == inner.report_id => inner.leds.store(*leds, Ordering::Release),
                _ => warn!("Keyboard: unexpected LED report of {} bytes", data.len()),
            }
        });
        *lock(&self.inner.channels) = Some(channels);
    }
}
