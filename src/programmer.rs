//! SPI master trait seam
//!
//! The flashing framework that owns a programmer only ever sees this trait:
//! one raw full-duplex command primitive plus the capability limits it must
//! split larger logical operations against. Generic algorithms (JEDEC
//! probing, paged reads, page-program and AAI write loops) live on the
//! framework side and are expressed purely in terms of `command`.

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// SPI master feature flags, following flashprog naming
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiFeatures: u32 {
        /// Supports 4-byte addressing commands
        const FOUR_BYTE_ADDR = 1 << 0;
    }
}

impl Default for SpiFeatures {
    fn default() -> Self {
        SpiFeatures::empty()
    }
}

/// A programmer that can execute raw SPI commands
///
/// `command` clocks `writearr` out on MOSI and then samples `readarr.len()`
/// further bytes from MISO within the same chip-select window. Callers must
/// keep `writearr` within `max_write_len` and `readarr` within
/// `max_read_len` per call, and serialize calls per programmer (`&mut self`
/// enforces this at compile time for a single owner).
pub trait SpiMaster {
    /// Feature flags supported by this programmer
    fn features(&self) -> SpiFeatures;

    /// Maximum read payload of a single `command` call
    fn max_read_len(&self) -> usize;

    /// Maximum write payload of a single `command` call
    fn max_write_len(&self) -> usize;

    /// Execute one SPI command: write `writearr`, then read into `readarr`
    fn command(&mut self, writearr: &[u8], readarr: &mut [u8]) -> Result<()>;
}
