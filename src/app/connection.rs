//! Connection state tracker.
//!
//! Two states, fed by the BLE stack's callback context and read from any
//! thread. Only the latest event is observable.

use core::sync::atomic::{AtomicBool, Ordering};

use log::info;

use super::ports::ConnectionCallbacks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The single source of truth for "may I send now?".
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    connected: AtomicBool,
}

impl ConnectionStatus {
    /// Starts out disconnected.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl ConnectionCallbacks for ConnectionStatus {
    fn on_connect(&self) {
        self.connected.store(true, Ordering::Release);
        info!("HID: peer connected");
    }

    fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!("HID: peer disconnected");
    }
}
