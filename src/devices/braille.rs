//! Single-row, 40-cell, 8-dot braille display.
//!
//! Output only: the host writes a full row of cells, one byte per cell
//! (bit n = dot n+1).

use std::sync::{Arc, Mutex, Weak};

use log::{info, warn};

use crate::app::channels::ReportChannels;
use crate::app::ports::SubDevice;
use crate::error::FragmentError;

use super::{lock, render_template};

pub const DEFAULT_REPORT_ID: u8 = 0x40;

pub const CELL_COUNT: usize = 40;

#[rustfmt::skip]
const DESCRIPTOR: [u8; 27] = [
    0x05, 0x41,         // Usage Page (Braille Display)
    0x09, 0x01,         // Usage (Braille Display)
    0xA1, 0x01,         // Collection (Application)
    0x85, 0x00,         //   Report ID (patched)
    0x09, 0x02,         //   Usage (Braille Row)
    0xA1, 0x02,         //   Collection (Logical)
    0x09, 0x03,         //     Usage (8 Dot Braille Cell)
    0x15, 0x00,         //     Logical Minimum (0)
    0x26, 0xFF, 0x00,   //     Logical Maximum (255)
    0x75, 0x08,         //     Report Size (8)
    0x95, 0x28,         //     Report Count (40)
    0x91, 0x02,         //     Output (Data, Var, Abs)
    0xC0,               //   End Collection
    0xC0,               // End Collection
];

type CellsHandler = Box<dyn Fn(&[u8; CELL_COUNT]) + Send + Sync>;

struct Inner {
    report_id: u8,
    cells: Mutex<[u8; CELL_COUNT]>,
    on_cells: Mutex<Option<CellsHandler>>,
}

impl Inner {
    fn handle_write(&self, data: &[u8]) {
        let row = match data.len() {
            CELL_COUNT => data,
            // Some hosts keep the report id in front of the payload.
            n if n == CELL_COUNT + 1 && data[0] == self.report_id => &data[1..],
            0 => {
                warn!("Braille: empty write ignored");
                return;
            }
            n => {
                warn!("Braille: unexpected write of {n} bytes (expected {CELL_COUNT})");
                return;
            }
        };
        let mut cells = [0u8; CELL_COUNT];
        cells.copy_from_slice(row);
        *lock(&self.cells) = cells;
        info!("Braille: row updated");
        if let Some(handler) = lock(&self.on_cells).as_ref() {
            handler(&cells);
        }
    }
}

#[derive(Clone)]
pub struct BrailleDevice {
    inner: Arc<Inner>,
}

impl BrailleDevice {
    pub fn new() -> Self {
        Self::with_report_id(DEFAULT_REPORT_ID)
    }

    pub fn with_report_id(report_id: u8) -> Self {
        Self {
            inner: Arc::new(Inner {
                report_id,
                cells: Mutex::new([0; CELL_COUNT]),
                on_cells: Mutex::new(None),
            }),
        }
    }

    /// The row last written by the host.
    pub fn cells(&self) -> [u8; CELL_COUNT] {
        *lock(&self.inner.cells)
    }

    /// Run `handler` after every accepted row update.
    pub fn on_cells(&self, handler: impl Fn(&[u8; CELL_COUNT]) + Send + Sync + 'static) {
        *lock(&self.inner.on_cells) = Some(Box::new(handler));
    }
}

impl Default for BrailleDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SubDevice for BrailleDevice {
    fn report_id(&self) -> u8 {
        self.inner.report_id
    }

    fn name(&self) -> &str {
        "braille"
    }

    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError> {
        render_template(&DESCRIPTOR, self.inner.report_id, buf)
    }

    fn bind(&mut self, channels: ReportChannels) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        channels.output.on_write(move |data| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_write(data);
            }
        });
    }
}
