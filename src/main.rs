//! Composite HID demo firmware — main entry point.
//!
//! Presents a keyboard, a braille display and a media-key pad as one BLE
//! HID peripheral.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  KeyboardDevice   BrailleDevice   MediaKeysDevice         │
//! │        │                │                 │               │
//! │  ──────┴──── SubDevice port boundary ─────┴─────────      │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │  CompositeHid (assembly · tracker · queue)      │      │
//! │  └────────────────────────────────────────────────┘      │
//! │                                                          │
//! │  ──────────── HidTransport port boundary ────────────     │
//! │        BleHidAdapter (Bluedroid + esp_hidd)               │
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{Result, anyhow};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use composite_hid::adapters::BleHidAdapter;
use composite_hid::config::{HostConfiguration, appearance};
use composite_hid::devices::{BrailleDevice, KeyboardDevice, MediaKey, MediaKeysDevice};
use composite_hid::task::{Core, TaskSpec, spawn_on_core};
use composite_hid::{CompositeHid, Error};

const STARTUP_TASK: TaskSpec = TaskSpec {
    name: "hid-start\0",
    core: Core::Pro,
    priority: 5,
    stack_kb: 5,
};

/// Usage ID of the `a` key.
const KEY_A: u8 = 0x04;

/// Interval of the demo loop.
const TICK_MS: u32 = 2_000;

fn bring_up(
    keyboard: KeyboardDevice,
    braille: BrailleDevice,
    media: MediaKeysDevice,
    config: &HostConfiguration,
) -> Result<CompositeHid<BleHidAdapter>, Error> {
    let mut hid = CompositeHid::new(Arc::new(BleHidAdapter::new()));
    hid.register_device(Box::new(keyboard))?;
    hid.register_device(Box::new(braille))?;
    hid.register_device(Box::new(media))?;
    hid.start(config)?;
    Ok(hid)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Composite HID v{}", env!("CARGO_PKG_VERSION"));

    // Bluedroid keeps bonding keys in NVS.
    let _nvs = EspDefaultNvsPartition::take()?;

    // ── 2. Sub-devices ────────────────────────────────────────
    let keyboard = KeyboardDevice::new();
    let braille = BrailleDevice::new();
    let media = MediaKeysDevice::new();

    braille.on_cells(|cells| {
        info!("Braille row: {:02X?}", &cells[..8]);
    });

    let config = HostConfiguration {
        device_name: "ESP32 Composite HID".into(),
        hid_type: appearance::KEYBOARD,
        queued_sending: true,
        queue_send_rate: 50,
        ..HostConfiguration::default()
    };

    // ── 3. Start the composite on its own task ────────────────
    let (tx, rx) = mpsc::sync_channel::<Result<CompositeHid<BleHidAdapter>, Error>>(1);
    {
        let keyboard = keyboard.clone();
        let braille = braille.clone();
        let media = media.clone();
        spawn_on_core(STARTUP_TASK, move || {
            let result = bring_up(keyboard, braille, media, &config);
            if tx.send(result).is_err() {
                error!("Startup result dropped");
            }
        })?;
    }
    let hid = rx
        .recv()
        .map_err(|_| anyhow!("startup task exited without a result"))??;
    info!(
        "HID up: {} byte report map, {} device(s)",
        hid.report_map().len(),
        hid.included_devices().len()
    );

    // ── 4. Demo loop ──────────────────────────────────────────
    let mut battery = hid.battery_level();
    loop {
        FreeRtos::delay_ms(TICK_MS);

        if !hid.is_connected() {
            continue;
        }

        // Immediate keystroke.
        keyboard.press(KEY_A);
        if let Err(e) = keyboard.send_report() {
            warn!("Key press not sent: {e}");
        }
        keyboard.release_all();
        if let Err(e) = keyboard.send_report() {
            warn!("Key release not sent: {e}");
        }

        // Paced media key tap through the deferred queue.
        media.press(MediaKey::VolumeUp);
        let queued = media.queue_report();
        media.release_all();
        if let Err(e) = queued.and_then(|()| media.queue_report()) {
            warn!("Media key not queued: {e}");
        }

        battery = if battery <= 5 { 100 } else { battery - 5 };
        hid.set_battery_level(battery);
    }
}
