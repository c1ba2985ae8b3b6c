//! Orchestrator lifecycle: start sequence, identity, battery, registration
//! rules, stop and restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::mock_transport::{FixedDevice, MockTransport, TransportCall};

use composite_hid::adapters::BleHidAdapter;
use composite_hid::config::{HID_INFO_BCD, appearance};
use composite_hid::devices::braille::CELL_COUNT;
use composite_hid::devices::{BrailleDevice, KeyboardDevice};
use composite_hid::task::{Core, TaskSpec};
use composite_hid::error::{Error, TransportError};
use composite_hid::{CompositeHid, HostConfiguration};

fn one_device() -> (Arc<MockTransport>, CompositeHid<MockTransport>) {
    let transport = MockTransport::new();
    let mut hid = CompositeHid::new(transport.clone());
    hid.register_device(FixedDevice::sized(0x01, 8).boxed()).unwrap();
    (transport, hid)
}

#[test]
fn start_runs_the_full_sequence_in_order() {
    let (transport, mut hid) = one_device();
    let config = HostConfiguration {
        device_name: "Desk Pad".into(),
        hid_type: appearance::GAMEPAD,
        battery_level: 77,
        ..HostConfiguration::default()
    };

    hid.start(&config).unwrap();

    let calls = transport.calls();
    let pos = |pred: &dyn Fn(&TransportCall) -> bool| calls.iter().position(pred).unwrap();
    let map = pos(&|c: &TransportCall| matches!(c, TransportCall::SetReportMap(_)));
    let identity = pos(&|c: &TransportCall| matches!(c, TransportCall::SetIdentity(_)));
    let adv = pos(&|c: &TransportCall| matches!(c, TransportCall::StartAdvertising { .. }));
    let battery = pos(&|c: &TransportCall| matches!(c, TransportCall::SetBattery { .. }));
    assert!(map < identity && identity < adv && adv < battery);

    assert_eq!(
        calls[adv],
        TransportCall::StartAdvertising {
            name: "Desk Pad".into(),
            appearance: appearance::GAMEPAD,
        }
    );
    assert_eq!(transport.battery_updates(), vec![(77, false)]);
    assert!(hid.is_started());
    assert_eq!(hid.configuration(), Some(&config));
}

#[test]
fn identity_is_published_with_legacy_swap() {
    let (transport, mut hid) = one_device();
    let config = HostConfiguration {
        vid: 0x1234,
        pid: 0xABCD,
        version: 0x0102,
        legacy_pnp_byte_order: true,
        ..HostConfiguration::default()
    };
    hid.start(&config).unwrap();

    let identity = transport
        .calls()
        .into_iter()
        .find_map(|c| match c {
            TransportCall::SetIdentity(id) => Some(id),
            _ => None,
        })
        .unwrap();
    assert_eq!(identity.vid, 0x3412);
    assert_eq!(identity.pid, 0xCDAB);
    assert_eq!(identity.version, 0x0201);
    assert_eq!(identity.bcd_hid, HID_INFO_BCD);
    assert_eq!(identity.hid_country, 0);
}

#[test]
fn long_name_is_truncated_before_advertising() {
    let (transport, mut hid) = one_device();
    let config = HostConfiguration {
        device_name: "A very long composite device name indeed".into(),
        ..HostConfiguration::default()
    };
    hid.start(&config).unwrap();

    let name = transport
        .calls()
        .into_iter()
        .find_map(|c| match c {
            TransportCall::StartAdvertising { name, .. } => Some(name),
            _ => None,
        })
        .unwrap();
    assert_eq!(name.len(), 30);
    assert!(config.device_name.starts_with(&name));
}

#[test]
fn invalid_config_is_rejected_before_touching_transport() {
    let (transport, mut hid) = one_device();
    let config = HostConfiguration {
        battery_level: 101,
        ..HostConfiguration::default()
    };
    assert!(matches!(hid.start(&config), Err(Error::Config(_))));
    assert!(transport.calls().is_empty());
}

#[test]
fn advertising_failure_releases_transport() {
    let transport = MockTransport::failing_advertising();
    let mut hid = CompositeHid::new(transport.clone());
    hid.register_device(FixedDevice::sized(1, 4).boxed()).unwrap();

    assert_eq!(
        hid.start(&HostConfiguration::default()),
        Err(Error::Transport(TransportError::AdvertisingFailed))
    );
    assert!(transport.released());
    assert!(!hid.is_started());
}

#[test]
fn second_start_is_rejected() {
    let (_transport, mut hid) = one_device();
    hid.start(&HostConfiguration::default()).unwrap();
    assert_eq!(
        hid.start(&HostConfiguration::default()),
        Err(Error::AlreadyStarted)
    );
}

#[test]
fn registration_closes_at_start() {
    let (_transport, mut hid) = one_device();
    hid.start(&HostConfiguration::default()).unwrap();
    assert_eq!(
        hid.register_device(FixedDevice::sized(2, 4).boxed()),
        Err(Error::RegistrationClosed)
    );
    assert_eq!(hid.device_count(), 1);
}

#[test]
fn config_snapshot_is_a_copy() {
    let (_transport, mut hid) = one_device();
    let mut config = HostConfiguration::default();
    hid.start(&config).unwrap();
    config.device_name = "Changed".into();
    assert_eq!(
        hid.configuration().unwrap().device_name,
        HostConfiguration::default().device_name
    );
}

// ── Battery ───────────────────────────────────────────────────

#[test]
fn battery_notifies_only_when_connected() {
    let (transport, mut hid) = one_device();
    hid.start(&HostConfiguration::default()).unwrap();

    hid.set_battery_level(50);
    transport.connect();
    hid.set_battery_level(40);
    transport.disconnect();
    hid.set_battery_level(30);

    assert_eq!(hid.battery_level(), 30);
    assert_eq!(
        transport.battery_updates(),
        vec![(100, false), (50, false), (40, true), (30, false)]
    );
}

#[test]
fn battery_before_start_is_stored_only() {
    let (transport, hid) = one_device();
    hid.set_battery_level(12);
    assert_eq!(hid.battery_level(), 12);
    assert!(transport.battery_updates().is_empty());
}

#[test]
fn battery_above_100_is_clamped() {
    let (_transport, hid) = one_device();
    hid.set_battery_level(250);
    assert_eq!(hid.battery_level(), 100);
}

// ── Connection ────────────────────────────────────────────────

#[test]
fn connection_follows_transport_events() {
    let (transport, mut hid) = one_device();
    hid.start(&HostConfiguration::default()).unwrap();
    assert!(!hid.is_connected());
    transport.connect();
    assert!(hid.is_connected());
    transport.disconnect();
    assert!(!hid.is_connected());
}

// ── Stop / restart ────────────────────────────────────────────

#[test]
fn stop_is_idempotent_and_allows_restart() {
    let (transport, mut hid) = one_device();
    let config = HostConfiguration {
        queued_sending: true,
        ..HostConfiguration::default()
    };
    hid.start(&config).unwrap();
    hid.stop();
    hid.stop();
    assert!(!hid.is_started());
    assert_eq!(
        transport
            .calls()
            .iter()
            .filter(|c| **c == TransportCall::StopAdvertising)
            .count(),
        1
    );
    assert!(transport.released(), "stop tears the profile down");

    hid.start(&config).unwrap();
    assert!(hid.is_started());
}

#[test]
fn restart_on_ble_adapter_uses_new_configuration() {
    let adapter = Arc::new(BleHidAdapter::new());
    let mut hid = CompositeHid::new(Arc::clone(&adapter));
    hid.register_device(Box::new(KeyboardDevice::new())).unwrap();
    hid.start(&HostConfiguration {
        device_name: "First".into(),
        ..HostConfiguration::default()
    })
    .unwrap();
    hid.stop();

    let braille = BrailleDevice::new();
    hid.register_device(Box::new(braille.clone())).unwrap();
    let second = HostConfiguration {
        device_name: "Second".into(),
        hid_type: appearance::KEYBOARD,
        vid: 0x1209,
        pid: 0x0001,
        ..HostConfiguration::default()
    };
    hid.start(&second).unwrap();

    let log = adapter.sim_log();
    assert_eq!(log.advertised_name.as_deref(), Some("Second"));
    assert_eq!(log.appearance, Some(appearance::KEYBOARD));
    assert_eq!(log.releases, 1);
    assert_eq!(adapter.report_map(), hid.report_map());
    assert_eq!(hid.included_devices(), &[0, 1]);
    assert_eq!(adapter.identity(), Some(second.identity()));

    adapter.simulate_connect();
    adapter.simulate_host_write(0x40, &[0x11; CELL_COUNT]);
    assert_eq!(braille.cells(), [0x11; CELL_COUNT]);
}

#[test]
fn stopped_composite_stays_hidden_after_disconnect() {
    let adapter = Arc::new(BleHidAdapter::new());
    let mut hid = CompositeHid::new(Arc::clone(&adapter));
    hid.register_device(Box::new(KeyboardDevice::new())).unwrap();
    hid.start(&HostConfiguration::default()).unwrap();

    adapter.simulate_connect();
    hid.stop();
    adapter.simulate_disconnect();
    assert!(!adapter.is_advertising());
    assert!(!hid.is_connected());
}

#[test]
fn running_composite_readvertises_after_disconnect() {
    let adapter = Arc::new(BleHidAdapter::new());
    let mut hid = CompositeHid::new(Arc::clone(&adapter));
    hid.register_device(Box::new(KeyboardDevice::new())).unwrap();
    hid.start(&HostConfiguration::default()).unwrap();

    adapter.simulate_connect();
    adapter.simulate_disconnect();
    assert!(adapter.is_advertising());
}

#[test]
fn dispatcher_spawn_failure_keeps_composite_running() {
    let transport = MockTransport::new();
    let mut hid = CompositeHid::new(transport.clone()).with_dispatcher_task(TaskSpec {
        name: "hid-send\0",
        core: Core::App,
        priority: 5,
        stack_kb: 0,
    });
    hid.register_device(FixedDevice::sized(0x01, 8).boxed()).unwrap();
    hid.start(&HostConfiguration {
        queued_sending: true,
        queue_send_rate: 0,
        ..HostConfiguration::default()
    })
    .unwrap();
    assert!(hid.is_started());
    assert!(transport.advertised());

    transport.connect();
    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    hid.queue_device_deferred_report(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 0, "no background delivery");

    assert_eq!(hid.send_deferred_reports(), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_discards_pending_reports() {
    let (transport, mut hid) = one_device();
    hid.start(&HostConfiguration::default()).unwrap();
    transport.connect();
    let t = transport.clone();
    hid.queue_device_deferred_report(move || {
        use composite_hid::app::ports::HidTransport;
        let _ = t.send_input(1, &[1]);
    });
    hid.stop();
    assert_eq!(hid.send_deferred_reports(), 0);
    assert!(transport.sent().is_empty());
}
