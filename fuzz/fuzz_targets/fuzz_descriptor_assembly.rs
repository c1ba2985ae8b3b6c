//! Fuzz target: `assemble`
//!
//! Each input byte pair becomes one sub-device fragment length (0..=1023,
//! so empty and oversized fragments both occur). The assembled map must
//! never exceed its capacity and must account for every device.
//!
//! cargo fuzz run fuzz_descriptor_assembly

#![no_main]

use composite_hid::app::ReportChannels;
use composite_hid::app::descriptor::assemble;
use composite_hid::app::ports::SubDevice;
use composite_hid::config::COMPOSITE_DESCRIPTOR_CAPACITY;
use composite_hid::error::FragmentError;
use libfuzzer_sys::fuzz_target;

struct Block(usize);

impl SubDevice for Block {
    fn report_id(&self) -> u8 {
        self.0 as u8
    }

    fn render_fragment(&self, buf: &mut [u8]) -> Result<usize, FragmentError> {
        let n = self.0.min(buf.len());
        buf[..n].fill(0xA5);
        // Report the true length so oversized fragments are caught by the
        // assembler rather than here.
        Ok(self.0)
    }

    fn bind(&mut self, _channels: ReportChannels) {}
}

fuzz_target!(|data: &[u8]| {
    let devices: Vec<Box<dyn SubDevice>> = data
        .chunks_exact(2)
        .take(32)
        .map(|c| Box::new(Block(usize::from(u16::from_le_bytes([c[0], c[1]]) & 0x3FF))) as Box<dyn SubDevice>)
        .collect();

    if let Ok(assembly) = assemble(&devices, COMPOSITE_DESCRIPTOR_CAPACITY) {
        assert!(assembly.descriptor.len() <= COMPOSITE_DESCRIPTOR_CAPACITY);
        assert!(!assembly.included.is_empty());
        assert_eq!(assembly.included.len() + assembly.excluded.len(), devices.len());
    }
});
