//! Composite BLE HID peripheral library.
//!
//! One BLE HID endpoint built from several independent sub-devices, each
//! contributing a report-map fragment and its own report channels. Exposes
//! the pure-logic core for integration testing; ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod devices;
pub mod error;
pub mod task;

pub use app::service::CompositeHid;
pub use config::HostConfiguration;
pub use error::Error;
