//! dirtyjtag-spi - DirtyJTAG USB probe SPI programmer support
//!
//! This crate drives a [DirtyJTAG](https://github.com/jeanthom/DirtyJTAG)
//! probe as a raw SPI programmer for flash chips wired to its JTAG port.
//!
//! # Protocol Overview
//!
//! The probe speaks a vendor bit-bang protocol over two bulk endpoints. The
//! DJTAG1 revision exchanges fixed 32-byte frames; an XFER frame clocks up
//! to 30 bytes through the port and the response frame carries the bits
//! sampled while each output byte was driven. An SPI transaction is mapped
//! onto that full-duplex stream by sending the write bytes followed by fill
//! bytes, splitting across as many frames as needed, and returning the echo
//! of the fill region as the read data. Every transaction is bracketed by a
//! TMS reset pulse that parks the target state machine in a known idle
//! state.
//!
//! # Example
//!
//! ```no_run
//! use dirtyjtag_spi::{DirtyJtag, SpiMaster};
//!
//! let mut probe = DirtyJtag::open()?;
//!
//! // Read the JEDEC ID of the attached flash chip
//! let mut id = [0u8; 3];
//! probe.command(&[0x9F], &mut id)?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `frequency=N[hz|khz|mhz]`: SPI clock rate, 1 kHz to 65535 kHz
//!   (default 100 kHz)
//! - `device=N` or `index=N`: select the Nth probe (0-indexed)
//!
//! # Lifecycle
//!
//! [`DirtyJtag::open`] (or [`open_dirtyjtag`] for a type-erased handle)
//! claims the device and sends the one-time initialization sequence;
//! dropping the value releases the interface and closes the device. Higher
//! level SPI algorithms — probing, paged reads, page-program loops — are the
//! caller's job, layered on [`SpiMaster::command`] within the declared
//! 30-byte per-call limits.

mod device;
mod error;
mod programmer;
mod protocol;
mod transport;

pub use device::{parse_options, DirtyJtag, DirtyJtagConfig};
pub use error::{DirtyJtagError, Result};
pub use programmer::{SpiFeatures, SpiMaster};
pub use protocol::{Command, Protocol, Signal};
pub use transport::{DirtyJtagDeviceInfo, Transport, UsbTransport};

/// Open a DirtyJTAG probe from key=value options and return a type-erased
/// SPI master
pub fn open_dirtyjtag(options: &[(&str, &str)]) -> Result<Box<dyn SpiMaster>> {
    let config = parse_options(options)?;
    Ok(Box::new(DirtyJtag::open_with_config(&config)?))
}
