//! BLE HID transport adapter.
//!
//! Implements [`HidTransport`] — the hexagonal boundary between the
//! composite core and the Bluetooth stack.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid + the ESP-IDF `esp_hidd` HID
//!   device profile (HID, battery and device-information services).
//! - **all other targets**: in-memory simulation that records every call,
//!   with `simulate_*` hooks standing in for the peer.
//!
//! ## Start sequence
//!
//! `set_report_map` and `set_identity` only stage data; the profile is
//! created in `start_advertising`, once the map and identity are known.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::app::channels::OutputHandler;
use crate::app::ports::{ConnectionCallbacks, HidTransport};
use crate::config::{COMPOSITE_DESCRIPTOR_CAPACITY, DeviceIdentity, MAX_FRAGMENT_LEN};
use crate::error::TransportError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Shared callback state
// ───────────────────────────────────────────────────────────────

type SharedHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// State reached from the BLE stack's callback context.
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    /// Cleared by `stop_advertising`; a disconnect only re-advertises
    /// while set.
    advertising_enabled: AtomicBool,
    callbacks: Mutex<Option<Arc<dyn ConnectionCallbacks>>>,
    outputs: Mutex<Vec<(u8, SharedHandler)>>,
}

impl Shared {
    fn connect(&self) {
        self.connected.store(true, Ordering::Release);
        let callbacks = lock(&self.callbacks).clone();
        if let Some(cb) = callbacks {
            cb.on_connect();
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        let callbacks = lock(&self.callbacks).clone();
        if let Some(cb) = callbacks {
            cb.on_disconnect();
        }
    }

    fn output(&self, report_id: u8, data: &[u8]) {
        let handler = lock(&self.outputs)
            .iter()
            .find(|(id, _)| *id == report_id)
            .map(|(_, h)| Arc::clone(h));
        match handler {
            Some(handler) => handler(data),
            None => debug!("HID: output for unbound report {report_id:#04x} ignored"),
        }
    }

    fn readvertise_enabled(&self) -> bool {
        self.advertising_enabled.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Staged configuration
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Staged {
    report_map: Vec<u8>,
    identity: Option<DeviceIdentity>,
    battery: u8,
    advertising: bool,
    /// The HID profile exists.
    started: bool,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLog,
}

/// Everything the simulation saw, for host-side assertions.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone)]
pub struct SimLog {
    pub advertised_name: Option<String>,
    pub appearance: Option<u16>,
    pub inputs: Vec<(u8, Vec<u8>)>,
    /// `(level, notified)` per battery update.
    pub battery_updates: Vec<(u8, bool)>,
    pub releases: usize,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────
//
// esp_hidd and Bluedroid callbacks are C function pointers that cannot
// capture Rust closures. These statics bridge them to the adapter.

#[cfg(target_os = "espidf")]
static ACTIVE: Mutex<Option<Arc<Shared>>> = Mutex::new(None);

#[cfg(target_os = "espidf")]
static HIDD_DEV: core::sync::atomic::AtomicPtr<esp_idf_svc::sys::esp_hidd_dev_t> =
    core::sync::atomic::AtomicPtr::new(core::ptr::null_mut());

// SMP authentication request bits (`esp_ble_auth_req_t`).
const AUTH_BOND: u8 = 0x01;
const AUTH_MITM: u8 = 0x04;
const AUTH_SC: u8 = 0x08;

/// Just-works pairing: bonding, no MITM protection, no secure connections.
const AUTH_REQ: u8 = AUTH_BOND;
const _: () = assert!(AUTH_REQ & (AUTH_MITM | AUTH_SC) == 0);

/// 128-bit form of the HID service UUID (0x1812), little endian.
#[cfg(target_os = "espidf")]
static HID_SERVICE_UUID128: [u8; 16] = [
    0xfb, 0x34, 0x9b, 0x5f, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x12, 0x18, 0x00,
    0x00,
];

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    // SAFETY: plain C struct, all-zero is a valid starting point.
    esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x30,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

#[cfg(target_os = "espidf")]
fn esp_check(ret: esp_idf_svc::sys::esp_err_t, what: &str) -> Result<(), TransportError> {
    if ret == esp_idf_svc::sys::ESP_OK as i32 {
        Ok(())
    } else {
        log::error!("HID: {what} failed ({ret})");
        Err(TransportError::Stack(ret))
    }
}

#[cfg(target_os = "espidf")]
fn active() -> Option<Arc<Shared>> {
    lock(&ACTIVE).clone()
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            let mut params = adv_params();
            esp_ble_gap_start_advertising(&mut params);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("HID GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
            let p = &(*param).ble_security.auth_cmpl;
            if p.success {
                log::info!("HID GAP: authentication complete");
            } else {
                log::warn!("HID GAP: authentication failed (reason={})", p.fail_reason);
            }
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn hidd_event_handler(
    _handler_args: *mut core::ffi::c_void,
    _base: esp_idf_svc::sys::esp_event_base_t,
    id: i32,
    event_data: *mut core::ffi::c_void,
) {
    use esp_idf_svc::sys::*;
    let Some(shared) = active() else {
        return;
    };
    let param = &*(event_data as *const esp_hidd_event_data_t);
    match id as esp_hidd_event_t {
        esp_hidd_event_t_ESP_HIDD_START_EVENT => {
            log::info!("HID: profile started");
        }
        esp_hidd_event_t_ESP_HIDD_CONNECT_EVENT => shared.connect(),
        esp_hidd_event_t_ESP_HIDD_DISCONNECT_EVENT => {
            shared.disconnect();
            if shared.readvertise_enabled() {
                let mut params = adv_params();
                esp_ble_gap_start_advertising(&mut params);
            }
        }
        esp_hidd_event_t_ESP_HIDD_OUTPUT_EVENT => {
            let out = &param.output;
            let data = core::slice::from_raw_parts(out.data, out.length as usize);
            shared.output(out.report_id as u8, data);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct BleHidAdapter {
    shared: Arc<Shared>,
    staged: Mutex<Staged>,
}

impl BleHidAdapter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            staged: Mutex::new(Staged {
                battery: 100,
                ..Staged::default()
            }),
        }
    }

    pub fn is_advertising(&self) -> bool {
        lock(&self.staged).advertising
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn battery_level(&self) -> u8 {
        lock(&self.staged).battery
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self, staged: &mut Staged, name: &str, appearance: u16) -> Result<(), TransportError> {
        use esp_idf_svc::sys::*;

        let identity = staged.identity.clone().unwrap_or_else(|| {
            warn!("HID: no identity staged, using defaults");
            crate::config::HostConfiguration::default().identity()
        });
        let c_name = std::ffi::CString::new(name).map_err(|_| TransportError::AdvertisingFailed)?;
        let c_manufacturer = std::ffi::CString::new(identity.manufacturer.as_str())
            .map_err(|_| TransportError::AdvertisingFailed)?;

        *lock(&ACTIVE) = Some(Arc::clone(&self.shared));

        // SAFETY: single-threaded bring-up; all pointers handed to the stack
        // outlive the calls (the report map lives in `staged` until release).
        unsafe {
            // BLE-only; classic BT memory is returned to the heap.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            esp_check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            esp_check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            esp_check(esp_bluedroid_init(), "bluedroid_init")?;
            esp_check(esp_bluedroid_enable(), "bluedroid_enable")?;

            esp_check(
                esp_ble_gap_register_callback(Some(gap_event_handler)),
                "gap_register_callback",
            )?;
            esp_check(
                esp_ble_gatts_register_callback(Some(esp_hidd_gatts_event_handler)),
                "gatts_register_callback",
            )?;

            let auth_req: esp_ble_auth_req_t = AUTH_REQ;
            let iocap = esp_ble_io_cap_t_ESP_IO_CAP_NONE;
            let key_size: u8 = 16;
            let keys: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
                &auth_req as *const _ as *mut _,
                core::mem::size_of_val(&auth_req) as u32,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
                &iocap as *const _ as *mut _,
                core::mem::size_of_val(&iocap) as u32,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE,
                &key_size as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY,
                &keys as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY,
                &keys as *const _ as *mut _,
                1,
            );

            let mut map = esp_hid_raw_report_map_t {
                data: staged.report_map.as_ptr(),
                len: staged.report_map.len() as u16,
            };
            let hid_cfg = esp_hid_device_config_t {
                vendor_id: identity.vid,
                product_id: identity.pid,
                version: identity.version,
                device_name: c_name.as_ptr(),
                manufacturer_name: c_manufacturer.as_ptr(),
                serial_number: core::ptr::null(),
                report_maps: &mut map,
                report_maps_len: 1,
            };
            let mut dev: *mut esp_hidd_dev_t = core::ptr::null_mut();
            esp_check(
                esp_hidd_dev_init(
                    &hid_cfg,
                    esp_hid_transport_t_ESP_HID_TRANSPORT_BLE,
                    Some(hidd_event_handler),
                    &mut dev,
                ),
                "hidd_dev_init",
            )?;
            HIDD_DEV.store(dev, Ordering::Release);
            esp_hidd_dev_battery_set(dev, staged.battery);

            esp_check(esp_ble_gap_set_device_name(c_name.as_ptr()), "set_device_name")?;

            let mut adv = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: true,
                min_interval: 0x0006,
                max_interval: 0x0010,
                appearance: i32::from(appearance),
                manufacturer_len: 0,
                p_manufacturer_data: core::ptr::null_mut(),
                service_data_len: 0,
                p_service_data: core::ptr::null_mut(),
                service_uuid_len: HID_SERVICE_UUID128.len() as u16,
                p_service_uuid: HID_SERVICE_UUID128.as_ptr() as *mut u8,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
            };
            // Advertising itself starts on ADV_DATA_SET_COMPLETE.
            esp_check(esp_ble_gap_config_adv_data(&mut adv), "config_adv_data")?;
        }

        info!(
            "HID(espidf): vid={:#06x} pid={:#06x} ver={:#06x} src={}",
            identity.vid, identity.pid, identity.version, identity.vid_source
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self, staged: &mut Staged, name: &str, appearance: u16) -> Result<(), TransportError> {
        if let Some(identity) = &staged.identity {
            info!(
                "HID(sim): '{}' by '{}' vid={:#06x} pid={:#06x} ver={:#06x}",
                name, identity.manufacturer, identity.vid, identity.pid, identity.version
            );
        }
        staged.sim.advertised_name = Some(name.to_owned());
        staged.sim.appearance = Some(appearance);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_send(&self, report_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        let dev = HIDD_DEV.load(Ordering::Acquire);
        if dev.is_null() {
            return Err(TransportError::NotStarted);
        }
        // SAFETY: `dev` stays valid until `release()` clears it.
        let ret = unsafe {
            esp_idf_svc::sys::esp_hidd_dev_input_set(
                dev,
                0,
                usize::from(report_id),
                payload.as_ptr() as *mut u8,
                payload.len(),
            )
        };
        esp_check(ret, "hidd_dev_input_set")
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send(&self, report_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        debug!("HID(sim): input {report_id:#04x} ({} bytes)", payload.len());
        lock(&self.staged).sim.inputs.push((report_id, payload.to_vec()));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_release(&self) {
        use esp_idf_svc::sys::*;
        let dev = HIDD_DEV.swap(core::ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: teardown mirrors bring-up; each call tolerates a stack
        // that was only partially initialised.
        unsafe {
            if !dev.is_null() {
                esp_hidd_dev_deinit(dev);
            }
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        *lock(&ACTIVE) = None;
        info!("HID(espidf): stack released");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_release(&self) {
        lock(&self.staged).sim.releases += 1;
        info!("HID(sim): released");
    }
}

impl Default for BleHidAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation hooks
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl BleHidAdapter {
    /// A peer connects.
    pub fn simulate_connect(&self) {
        info!("HID(sim): peer connected");
        self.shared.connect();
    }

    /// The peer disconnects; advertising resumes unless stopped.
    pub fn simulate_disconnect(&self) {
        self.shared.disconnect();
        let mut staged = lock(&self.staged);
        if staged.started && self.shared.readvertise_enabled() {
            info!("HID(sim): peer disconnected, advertising again");
            staged.advertising = true;
        } else {
            info!("HID(sim): peer disconnected");
        }
    }

    /// The peer writes an output report.
    pub fn simulate_host_write(&self, report_id: u8, data: &[u8]) {
        self.shared.output(report_id, data);
    }

    pub fn report_map(&self) -> Vec<u8> {
        lock(&self.staged).report_map.clone()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        lock(&self.staged).identity.clone()
    }

    pub fn sim_log(&self) -> SimLog {
        lock(&self.staged).sim.clone()
    }
}

// ───────────────────────────────────────────────────────────────
// HidTransport implementation
// ───────────────────────────────────────────────────────────────

impl HidTransport for BleHidAdapter {
    fn register_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>) {
        *lock(&self.shared.callbacks) = Some(callbacks);
    }

    fn set_report_map(&self, map: &[u8]) -> Result<(), TransportError> {
        if map.is_empty() || map.len() > COMPOSITE_DESCRIPTOR_CAPACITY {
            warn!("HID: report map of {} bytes rejected", map.len());
            return Err(TransportError::ReportMapRejected);
        }
        let mut staged = lock(&self.staged);
        staged.report_map.clear();
        staged.report_map.extend_from_slice(map);
        info!("HID: report map staged ({} bytes)", map.len());
        Ok(())
    }

    fn set_output_handler(&self, report_id: u8, handler: OutputHandler) {
        let mut outputs = lock(&self.shared.outputs);
        outputs.retain(|(id, _)| *id != report_id);
        outputs.push((report_id, Arc::from(handler)));
    }

    fn set_identity(&self, identity: &DeviceIdentity) {
        lock(&self.staged).identity = Some(identity.clone());
    }

    fn start_advertising(&self, name: &str, appearance: u16) -> Result<(), TransportError> {
        let mut staged = lock(&self.staged);
        if staged.report_map.is_empty() {
            return Err(TransportError::NotStarted);
        }
        if !staged.started {
            self.platform_start(&mut staged, name, appearance)?;
            staged.started = true;
        }
        staged.advertising = true;
        self.shared.advertising_enabled.store(true, Ordering::Release);
        info!("HID: advertising '{name}'");
        Ok(())
    }

    fn stop_advertising(&self) {
        self.shared.advertising_enabled.store(false, Ordering::Release);
        #[cfg(target_os = "espidf")]
        // SAFETY: no-op when advertising is already stopped.
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_stop_advertising();
        }
        lock(&self.staged).advertising = false;
    }

    fn send_input(&self, report_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        if !lock(&self.staged).started {
            return Err(TransportError::NotStarted);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if payload.len() > MAX_FRAGMENT_LEN {
            return Err(TransportError::PayloadTooLarge);
        }
        self.platform_send(report_id, payload)
    }

    fn set_battery_level(&self, level: u8, notify: bool) {
        let mut staged = lock(&self.staged);
        staged.battery = level;
        #[cfg(target_os = "espidf")]
        {
            let dev = HIDD_DEV.load(Ordering::Acquire);
            if !dev.is_null() {
                // SAFETY: `dev` stays valid until `release()` clears it.
                unsafe {
                    esp_idf_svc::sys::esp_hidd_dev_battery_set(dev, level);
                }
            }
        }
        #[cfg(not(target_os = "espidf"))]
        staged.sim.battery_updates.push((level, notify));
        debug!("HID: battery {level}% (notify={notify})");
    }

    fn release(&self) {
        self.shared.advertising_enabled.store(false, Ordering::Release);
        self.platform_release();
        lock(&self.shared.outputs).clear();
        let mut staged = lock(&self.staged);
        staged.started = false;
        staged.advertising = false;
        staged.report_map.clear();
        staged.identity = None;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
