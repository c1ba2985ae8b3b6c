//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter   | Implements   | Connects to                        |
//! |-----------|--------------|------------------------------------|
//! | `ble_hid` | HidTransport | Bluedroid + `esp_hidd` / simulation |

pub mod ble_hid;

pub use ble_hid::BleHidAdapter;
