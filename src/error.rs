//! Unified error types for the composite HID core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! orchestrator's lifecycle handling uniform. All variants are `Copy` so they
//! can be passed through transport callbacks and logged without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible lifecycle operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The composite descriptor could not be built.
    Assembly(AssemblyError),
    /// The transport collaborator rejected an operation.
    Transport(TransportError),
    /// Host configuration failed validation.
    Config(&'static str),
    /// `start()` was called while the composite is already running.
    AlreadyStarted,
    /// Sub-devices can only be registered before `start()`.
    RegistrationClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assembly(e) => write!(f, "assembly: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::AlreadyStarted => write!(f, "composite already started"),
            Self::RegistrationClosed => write!(f, "registration closed after start"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Descriptor fragment errors
// ---------------------------------------------------------------------------

/// A sub-device could not render a usable descriptor fragment.
///
/// Non-fatal: the device is excluded from the composite and assembly moves
/// on to the next device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    /// The device produced zero bytes.
    Empty,
    /// The fragment does not fit the per-device scratch buffer.
    Overflow { len: usize, limit: usize },
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty descriptor fragment"),
            Self::Overflow { len, limit } => {
                write!(f, "fragment of {len} bytes exceeds {limit} byte limit")
            }
        }
    }
}

impl std::error::Error for FragmentError {}

// ---------------------------------------------------------------------------
// Assembly errors
// ---------------------------------------------------------------------------

/// Fatal outcome of descriptor assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyError {
    /// No registered device contributed a fragment. An empty report map is
    /// meaningless to the host, so startup is aborted.
    NoDescriptors,
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDescriptors => write!(f, "no valid HID descriptors were assembled"),
        }
    }
}

impl std::error::Error for AssemblyError {}

impl From<AssemblyError> for Error {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No peer is connected.
    NotConnected,
    /// The HID service has not been brought up yet.
    NotStarted,
    /// The stack refused the composite report map.
    ReportMapRejected,
    /// Advertising could not be started.
    AdvertisingFailed,
    /// Report payload exceeds what a single attribute write can carry.
    PayloadTooLarge,
    /// Raw error code from the BLE stack.
    Stack(i32),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no peer connected"),
            Self::NotStarted => write!(f, "HID service not started"),
            Self::ReportMapRejected => write!(f, "report map rejected"),
            Self::AdvertisingFailed => write!(f, "advertising failed to start"),
            Self::PayloadTooLarge => write!(f, "report payload too large"),
            Self::Stack(code) => write!(f, "BLE stack error {code}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
