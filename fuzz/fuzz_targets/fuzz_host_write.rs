//! Fuzz target: host output writes
//!
//! Starts a keyboard + braille composite on the simulated BLE adapter and
//! replays arbitrary output writes (first byte = report id). Writes of the
//! wrong shape must be ignored without panicking.
//!
//! cargo fuzz run fuzz_host_write

#![no_main]

use std::sync::Arc;

use composite_hid::adapters::BleHidAdapter;
use composite_hid::devices::{BrailleDevice, KeyboardDevice};
use composite_hid::{CompositeHid, HostConfiguration};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&report_id, payload)) = data.split_first() else {
        return;
    };

    let adapter = Arc::new(BleHidAdapter::new());
    let keyboard = KeyboardDevice::new();
    let braille = BrailleDevice::new();
    let mut hid = CompositeHid::new(Arc::clone(&adapter));
    if hid.register_device(Box::new(keyboard.clone())).is_err()
        || hid.register_device(Box::new(braille.clone())).is_err()
        || hid.start(&HostConfiguration::default()).is_err()
    {
        return;
    }

    adapter.simulate_connect();
    adapter.simulate_host_write(report_id, payload);

    let _ = keyboard.leds();
    let _ = braille.cells();
    hid.stop();
});
