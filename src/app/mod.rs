//! Composite core: pure logic, no radio.
//!
//! Sub-devices contribute report-map fragments and get bound to report
//! channels; the orchestrator assembles, gates and paces delivery. All
//! interaction with the BLE stack goes through the **port traits** in
//! [`ports`], so this layer runs unchanged against mock transports.

pub mod channels;
pub mod connection;
pub mod descriptor;
pub mod dispatcher;
pub mod ports;
pub mod queue;
pub mod service;

pub use channels::{InputReport, OutputHandler, OutputReport, ReportChannels};
pub use connection::{ConnectionState, ConnectionStatus};
pub use descriptor::{Assembly, Exclusion, ExclusionReason, assemble};
pub use ports::{ConnectionCallbacks, HidTransport, SubDevice};
pub use queue::{DeferredReport, DeferredReportQueue, DeferredReports};
pub use service::CompositeHid;
