//! Consumer-control media keys: one 24-bit bitmap input report.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::app::channels::ReportChannels;
use crate::app::ports::SubDevice;
use crate::error::{FragmentError, TransportError};

use super::{lock, render_template};

pub const DEFAULT_REPORT_ID: u8 = 0x43;

/// Media keys in report bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MediaKey {
    Play = 0,
    Pause,
    Record,
    FastForward,
    Rewind,
    NextTrack,
    PreviousTrack,
    Stop,
    Eject,
    RandomPlay,
    Repeat,
    PlayPause,
    Mute,
    VolumeUp,
    VolumeDown,
    WwwHome,
    MyComputer,
    Calculator,
    WwwFavorites,
    WwwSearch,
    WwwStop,
    WwwBack,
    MediaSelect,
    Mail,
}

impl MediaKey {
    pub const fn mask(self) -> u32 {
        1 << self as u8
    }
}

#[rustfmt::skip]
const DESCRIPTOR: [u8; 78] = [
    0x05, 0x0C,         // Usage Page (Consumer)
    0x09, 0x01,         // Usage (Consumer Control)
    0xA1, 0x01,         // Collection (Application)
    0x85, 0x00,         //   Report ID (patched)
    0x05, 0x0C,         //   Usage Page (Consumer)
    0x15, 0x00,         //   Logical Minimum (0)
    0x25, 0x01,         //   Logical Maximum (1)
    0x75, 0x01,         //   Report Size (1)
    0x95, 0x18,         //   Report Count (24)
    0x09, 0xB0,         //   Usage (Play)
    0x09, 0xB1,         //   Usage (Pause)
    0x09, 0xB2,         //   Usage (Record)
    0x09, 0xB3,         //   Usage (Fast Forward)
    0x09, 0xB4,         //   Usage (Rewind)
    0x09, 0xB5,         //   Usage (Scan Next Track)
    0x09, 0xB6,         //   Usage (Scan Previous Track)
    0x09, 0xB7,         //   Usage (Stop)
    0x09, 0xB8,         //   Usage (Eject)
    0x09, 0xB9,         //   Usage (Random Play)
    0x09, 0xBC,         //   Usage (Repeat)
    0x09, 0xCD,         //   Usage (Play/Pause)
    0x09, 0xE2,         //   Usage (Mute)
    0x09, 0xE9,         //   Usage (Volume Increment)
    0x09, 0xEA,         //   Usage (Volume Decrement)
    0x0A, 0x23, 0x02,   //   Usage (AC Home)
    0x0A, 0x94, 0x01,   //   Usage (AL Local Machine Browser)
    0x0A, 0x92, 0x01,   //   Usage (AL Calculator)
    0x0A, 0x2A, 0x02,   //   Usage (AC Bookmarks)
    0x0A, 0x21, 0x02,   //   Usage (AC Search)
    0x0A, 0x26, 0x02,   //   Usage (AC Stop)
    0x0A, 0x24, 0x02,   //   Usage (AC Back)
    0x0A, 0x83, 0x01,   //   Usage (AL Consumer Control Configuration)
    0x0A, 0x8A, 0x01,   //   Usage (AL Email Reader)
    0x81, 0x02,         //   Input (Data, Var, Abs)
    0xC0,               // End Collection
];

struct Inner {
    report_id: u8,
    pressed: Mutex<u32>,
    channels: Mutex<Option<ReportChannels>>,
}

#[derive(Clone)]
pub struct MediaKeysDevice {
    inner: Arc<Inner>,
}

impl MediaKeysDevice {
    pub fn new() -> Self {
        Self::with_report_id(DEFAULT_REPORT_ID)
    }

    pub fn with_report_id(report_id: u8) -> Self {
        Self {
            inner: Arc::new(Inner {
                report_id,
                pressed: Mutex::new(0),
                channels: Mutex::new(None),
            }),
        }
    }

    pub fn press(&self, key: MediaKey) {
        *lock(&self.inner.pressed) |= key.mask();
    }

    pub fn release(&self, key: MediaKey) {
        *lock(&self.inner.pressed) &= !key.mask();
    }

    pub fn release_all(&self) {
        *lock(&self.inner.pressed) = 0;
    }

    /// Bitmap of held keys, see [`MediaKey::mask`].
    pub fn pressed(&self) -> u32 {
        *lock(&self.inner.pressed)
    }

    fn payload(&self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.pressed().to_le_bytes();
        [b0, b1, b2]
    }

    pub fn send_report(&self) -> Result<(), TransportError> {
        let payload = self.payload();
        let channels = lock(&self.inner.channels);
        let channels = channels.as_ref().ok_or(TransportError::NotStarted)?;
        channels.input.send(&payload)
    }

    pub fn queue_report(&self) -> Result<(), TransportError> {
        let payload = self.payload();
        let channels = lock(&self.inner.channels);
        let channels = channels.as_ref().ok_or(TransportError::NotStarted)?;
        let input = channels.input.clone();
        channels.deferred.queue(move || {
            if let Err(e) = input.send(&payload) {
                warn!("MediaKeys: deferred report failed: {e}");
            }
        });
        Ok(())
    }
}

impl Default for MediaKeysDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SubDevice for MediaKeysDevice {
    fn report_id(&self) -> u8 {
        self.inner.report_id
    }

    fn name(&self) -> &str {
        "media-keys"
    }

    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError> {
        render_template(&DESCRIPTOR, self.inner.report_id, buf)
    }

    fn bind(&mut self, channels: ReportChannels) {
        *lock(&self.inner.channels) = Some(channels);
    }
}
