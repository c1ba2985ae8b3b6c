//! Composite report-map assembly.
//!
//! Each registered sub-device renders its fragment into a
//! [`MAX_FRAGMENT_LEN`] scratch buffer. Fragments are appended to the
//! composite in registration order:
//!
//! - a device whose fragment is empty or oversized is skipped, assembly
//!   continues with the next one;
//! - the first fragment that does not fit the remaining capacity ends
//!   assembly, later devices are excluded even if they would fit;
//! - zero included devices is an error.
//!
//! Report-id uniqueness is not checked.

use log::{info, warn};

use crate::config::{COMPOSITE_DESCRIPTOR_CAPACITY, MAX_FRAGMENT_LEN};
use crate::error::{AssemblyError, FragmentError};

use super::ports::SubDevice;

/// Backing storage of the composite report map.
pub type CompositeDescriptor = heapless::Vec<u8, COMPOSITE_DESCRIPTOR_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The device's fragment was rejected.
    Fragment(FragmentError),
    /// The fragment would overflow the remaining composite capacity.
    CapacityExceeded { needed: usize, remaining: usize },
    /// Assembly stopped at an earlier device; this one was not rendered.
    Truncated,
}

/// A device left out of the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exclusion {
    /// Registry index.
    pub index: usize,
    pub reason: ExclusionReason,
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub descriptor: CompositeDescriptor,
    /// Registry indices of the included devices, ascending.
    pub included: Vec<usize>,
    pub excluded: Vec<Exclusion>,
}

impl Assembly {
    pub fn included_count(&self) -> usize {
        self.included.len()
    }
}

/// Render one device into `scratch` and validate the reported length.
fn render(device: &dyn SubDevice, scratch: &mut [u8]) -> Result<usize, FragmentError> {
    match device.render_fragment(scratch)? {
        0 => Err(FragmentError::Empty),
        len if len > scratch.len() => Err(FragmentError::Overflow {
            len,
            limit: scratch.len(),
        }),
        len => Ok(len),
    }
}

/// Build the composite report map from `devices`.
///
/// `capacity` is clamped to [`COMPOSITE_DESCRIPTOR_CAPACITY`].
pub fn assemble(
    devices: &[Box<dyn SubDevice>],
    capacity: usize,
) -> Result<Assembly, AssemblyError> {
    let capacity = capacity.min(COMPOSITE_DESCRIPTOR_CAPACITY);
    let mut descriptor = CompositeDescriptor::new();
    let mut included = Vec::with_capacity(devices.len());
    let mut excluded = Vec::new();
    let mut scratch = [0u8; MAX_FRAGMENT_LEN];

    for (index, device) in devices.iter().enumerate() {
        let len = match render(device.as_ref(), &mut scratch) {
            Ok(len) => len,
            Err(e) => {
                warn!("HID: '{}' (id {:#04x}) skipped: {e}", device.name(), device.report_id());
                excluded.push(Exclusion {
                    index,
                    reason: ExclusionReason::Fragment(e),
                });
                continue;
            }
        };

        let remaining = capacity - descriptor.len();
        if len > remaining {
            warn!(
                "HID: report map full ({} of {capacity} bytes), '{}' needs {len}; {} device(s) dropped",
                descriptor.len(),
                device.name(),
                devices.len() - index
            );
            excluded.push(Exclusion {
                index,
                reason: ExclusionReason::CapacityExceeded {
                    needed: len,
                    remaining,
                },
            });
            excluded.extend((index + 1..devices.len()).map(|i| Exclusion {
                index: i,
                reason: ExclusionReason::Truncated,
            }));
            break;
        }

        // Cannot fail: `len <= remaining` and capacity is clamped to the
        // backing storage.
        if descriptor.extend_from_slice(&scratch[..len]).is_err() {
            break;
        }
        included.push(index);
    }

    if included.is_empty() {
        warn!("HID: no sub-device produced a usable descriptor");
        return Err(AssemblyError::NoDescriptors);
    }

    info!(
        "HID: report map assembled, {} bytes from {}/{} device(s)",
        descriptor.len(),
        included.len(),
        devices.len()
    );
    Ok(Assembly {
        descriptor,
        included,
        excluded,
    })
}
