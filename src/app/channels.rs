//! Report channel handles handed to sub-devices at bind time.
//!
//! ```text
//!  SubDevice ──send()──▶ InputReport ──▶ HidTransport::send_input
//!  SubDevice ◀─handler── OutputReport ◀── host write
//!  SubDevice ──queue()─▶ DeferredReports ──▶ Dispatcher
//! ```

use std::sync::Arc;

use crate::error::TransportError;

use super::ports::HidTransport;
use super::queue::DeferredReports;

/// Callback invoked with the payload of a host write to an output report.
pub type OutputHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Input (device → host) side of one report id.
#[derive(Clone)]
pub struct InputReport {
    report_id: u8,
    transport: Arc<dyn HidTransport>,
}

impl InputReport {
    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    /// Send `payload` to the connected peer right away.
    pub fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.transport.send_input(self.report_id, payload)
    }
}

/// Output (host → device) side of one report id.
#[derive(Clone)]
pub struct OutputReport {
    report_id: u8,
    transport: Arc<dyn HidTransport>,
}

impl OutputReport {
    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    /// Register the handler for host writes. Replaces any previous handler.
    pub fn on_write(&self, handler: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.transport
            .set_output_handler(self.report_id, Box::new(handler));
    }
}

/// The live channels of one sub-device.
pub struct ReportChannels {
    pub input: InputReport,
    pub output: OutputReport,
    /// Producer handle for rate-limited, connection-gated delivery.
    pub deferred: DeferredReports,
}

impl ReportChannels {
    pub(crate) fn new(
        report_id: u8,
        transport: Arc<dyn HidTransport>,
        deferred: DeferredReports,
    ) -> Self {
        Self {
            input: InputReport {
                report_id,
                transport: Arc::clone(&transport),
            },
            output: OutputReport {
                report_id,
                transport,
            },
            deferred,
        }
    }
}
