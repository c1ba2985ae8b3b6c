//! Bundled sub-devices driven end to end through the orchestrator.

use std::sync::Arc;

use crate::mock_transport::MockTransport;

use composite_hid::devices::braille::CELL_COUNT;
use composite_hid::devices::keyboard::leds;
use composite_hid::devices::{BrailleDevice, KeyboardDevice, MediaKey, MediaKeysDevice};
use composite_hid::error::TransportError;
use composite_hid::{CompositeHid, HostConfiguration};

struct Rig {
    transport: Arc<MockTransport>,
    hid: CompositeHid<MockTransport>,
    keyboard: KeyboardDevice,
    braille: BrailleDevice,
    media: MediaKeysDevice,
}

fn rig() -> Rig {
    let transport = MockTransport::new();
    let mut hid = CompositeHid::new(transport.clone());
    let keyboard = KeyboardDevice::new();
    let braille = BrailleDevice::new();
    let media = MediaKeysDevice::new();
    hid.register_device(Box::new(keyboard.clone())).unwrap();
    hid.register_device(Box::new(braille.clone())).unwrap();
    hid.register_device(Box::new(media.clone())).unwrap();
    hid.start(&HostConfiguration::default()).unwrap();
    Rig {
        transport,
        hid,
        keyboard,
        braille,
        media,
    }
}

#[test]
fn three_devices_share_one_report_map() {
    let r = rig();
    let map = r.hid.report_map();
    assert_eq!(map.len(), 65 + 27 + 78);
    // Report ids in registration order.
    assert_eq!(map[7], 0x01);
    assert_eq!(map[65 + 7], 0x40);
    assert_eq!(map[65 + 27 + 7], 0x43);
}

#[test]
fn keyboard_sends_on_its_report_id() {
    let r = rig();
    r.transport.connect();
    r.keyboard.press(0x04);
    r.keyboard.send_report().unwrap();
    assert_eq!(r.transport.sent(), vec![(0x01, vec![0, 0, 0x04, 0, 0, 0, 0, 0])]);
}

#[test]
fn keyboard_leds_follow_host_writes() {
    let r = rig();
    r.transport.host_write(0x01, &[leds::CAPS_LOCK | leds::NUM_LOCK]);
    assert_eq!(r.keyboard.leds(), leds::CAPS_LOCK | leds::NUM_LOCK);
}

#[test]
fn braille_row_arrives_from_host() {
    let r = rig();
    let row: Vec<u8> = (0..CELL_COUNT as u8).collect();
    r.transport.host_write(0x40, &row);
    assert_eq!(r.braille.cells().to_vec(), row);
}

#[test]
fn media_keys_go_through_the_deferred_queue() {
    let r = rig();
    r.media.press(MediaKey::PlayPause);
    r.media.queue_report().unwrap();
    r.media.release_all();
    r.media.queue_report().unwrap();
    assert!(r.transport.sent().is_empty());

    r.transport.connect();
    assert_eq!(r.hid.send_deferred_reports(), 2);
    assert_eq!(
        r.transport.sent(),
        vec![(0x43, vec![0x00, 0x08, 0x00]), (0x43, vec![0x00, 0x00, 0x00])]
    );
}

#[test]
fn unstarted_devices_report_not_started() {
    let kb = KeyboardDevice::new();
    assert_eq!(kb.send_report(), Err(TransportError::NotStarted));
}
