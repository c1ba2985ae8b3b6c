//! Ready-made sub-devices.
//!
//! Each device is a cheap, cloneable handle: register one clone with the
//! composite and keep another to drive it. Descriptors are fixed templates
//! with the configured report id patched in.

pub mod braille;
pub mod keyboard;
pub mod media_keys;

use std::sync::{Mutex, MutexGuard};

use crate::error::FragmentError;

pub use braille::BrailleDevice;
pub use keyboard::KeyboardDevice;
pub use media_keys::{MediaKey, MediaKeysDevice};

/// Offset of the report-id value in every template
/// (`Usage Page, Usage, Collection, Report ID <id>`).
const REPORT_ID_OFFSET: usize = 7;

/// Copy `template` into `buf` with `report_id` patched in.
fn render_template(template: &[u8], report_id: u8, buf: &mut [u8]) -> Result<usize, FragmentError> {
    let len = template.len();
    if len > buf.len() {
        return Err(FragmentError::Overflow {
            len,
            limit: buf.len(),
        });
    }
    buf[..len].copy_from_slice(template);
    buf[REPORT_ID_OFFSET] = report_id;
    Ok(len)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
