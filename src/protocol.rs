//! DirtyJTAG protocol constants and frame encoding
//!
//! DirtyJTAG probes speak a small bit-bang command protocol over a pair of
//! bulk endpoints. The first protocol revision (DJTAG1) exchanges fixed
//! 32-byte frames: one opcode byte followed by an opcode-specific payload.
//! An XFER frame clocks up to 30 payload bytes through the JTAG port and the
//! probe answers with a same-sized frame carrying the bits it sampled while
//! each output byte was being driven, which is exactly a full-duplex SPI
//! exchange when the flash chip hangs off TDI/TDO.
//!
//! Everything in this module is a pure byte transformation; no I/O happens
//! here.

use std::time::Duration;

use bitflags::bitflags;

use crate::error::{DirtyJtagError, Result};

// USB device identifiers
pub const DIRTYJTAG_USB_VENDOR: u16 = 0x1209;
pub const DIRTYJTAG_USB_PRODUCT: u16 = 0xC0CA;

// Bulk endpoints
pub const WRITE_EP: u8 = 0x01;
pub const READ_EP: u8 = 0x82;

/// Bulk transfer timeout
pub const USB_TIMEOUT: Duration = Duration::from_millis(1000);

/// Total size of a DJTAG1 command or response frame
pub const FRAME_SIZE: usize = 32;

/// Payload bytes carried by one XFER frame (frame minus opcode and bit count)
pub const XFER_PAYLOAD: usize = 30;

/// Fill byte driven on the wire for the read portion of a transaction and
/// for unused trailing frame bytes. The probe clocks these bytes out, so the
/// value is wire-visible and must be deterministic.
pub const XFER_FILL: u8 = 0x00;

/// Frequency floor: the FREQ frame counts in kHz, so anything below 1 kHz
/// is not representable.
pub const MIN_FREQUENCY_HZ: u64 = 1_000;

/// Frequency ceiling: the FREQ frame carries a 16-bit kHz value.
pub const MAX_FREQUENCY_HZ: u64 = 65_535 * 1_000;

/// Default SPI clock when no frequency option is given
pub const DEFAULT_FREQUENCY_KHZ: u16 = 100;

/// DirtyJTAG command identifiers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop = 0x00,
    Info = 0x01,
    Freq = 0x02,
    Xfer = 0x03,
    SetSig = 0x04,
    GetSig = 0x05,
    Clk = 0x06,
}

bitflags! {
    /// JTAG signal lines controlled through SETSIG/GETSIG
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Signal: u8 {
        const TCK = 1 << 1;
        const TDI = 1 << 2;
        const TDO = 1 << 3;
        const TMS = 1 << 4;
        const TRST = 1 << 5;
        const SRST = 1 << 6;
    }
}

/// Protocol revision spoken by the probe firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Revision not determined
    Unknown,
    /// Original protocol, fixed 32-byte frames
    Djtag1,
    /// Second revision; recognized but not implemented
    Djtag2,
}

/// Signals driven low at initialization. TDO is the probe's input and stays
/// out of the control mask.
pub const BASELINE_MASK: Signal = Signal::TDI
    .union(Signal::TMS)
    .union(Signal::TCK)
    .union(Signal::SRST)
    .union(Signal::TRST);

/// Levels asserted at initialization: both resets held inactive-high and TMS
/// parked high, everything else low.
pub const BASELINE_VALUE: Signal = Signal::SRST.union(Signal::TRST).union(Signal::TMS);

/// TMS reset pulse sent after every transaction: assert TMS, release it,
/// stop. Returns the target's TAP state machine to a known idle state.
pub const TMS_RESET: [u8; 7] = [
    Command::SetSig as u8,
    Signal::TMS.bits(),
    Signal::TMS.bits(),
    Command::SetSig as u8,
    Signal::TMS.bits(),
    0,
    Command::Stop as u8,
];

/// Encode one XFER frame over a chunk of at most [`XFER_PAYLOAD`] bytes.
///
/// Byte 1 carries the number of valid payload *bits*; trailing payload bytes
/// are padded with [`XFER_FILL`]. Oversized chunks are a caller contract
/// violation, upheld by the transaction engine's chunking.
pub fn xfer_frame(chunk: &[u8]) -> [u8; FRAME_SIZE] {
    debug_assert!(chunk.len() <= XFER_PAYLOAD);

    let mut frame = [XFER_FILL; FRAME_SIZE];
    frame[0] = Command::Xfer as u8;
    frame[1] = (chunk.len() * 8) as u8;
    frame[2..2 + chunk.len()].copy_from_slice(chunk);
    frame
}

/// Encode a SETSIG frame: which signals to drive, and their levels
pub fn setsig(mask: Signal, value: Signal) -> [u8; 3] {
    [Command::SetSig as u8, mask.bits(), value.bits()]
}

/// Encode a FREQ frame with the clock rate in kHz (big-endian)
pub fn freq(khz: u16) -> [u8; 3] {
    [Command::Freq as u8, (khz >> 8) as u8, khz as u8]
}

/// Batched initialization sequence: drive the signal baseline, set the
/// clock, stop. Sent as a single bulk write before the first transaction.
pub fn init_sequence(khz: u16) -> [u8; 7] {
    let mut seq = [0u8; 7];
    seq[..3].copy_from_slice(&setsig(BASELINE_MASK, BASELINE_VALUE));
    seq[3..6].copy_from_slice(&freq(khz));
    seq[6] = Command::Stop as u8;
    seq
}

/// Parse a `frequency` option value into kHz for the FREQ frame.
///
/// Accepts a decimal (or `0x`-prefixed hexadecimal) integer with an optional
/// case-insensitive unit suffix `hz`, `khz` or `mhz`; no suffix means hertz.
/// The resulting rate must fall in [1 kHz, 65535 kHz]; out-of-range values
/// are rejected, never clamped.
pub fn parse_frequency(s: &str) -> Result<u16> {
    let (digits, suffix) = split_number(s);

    let raw: u64 = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        digits.parse()
    }
    .map_err(|_| DirtyJtagError::InvalidParameter(format!("frequency: {s}")))?;

    let multiplier: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "hz" => 1,
        "khz" => 1_000,
        "mhz" => 1_000_000,
        _ => {
            return Err(DirtyJtagError::InvalidParameter(format!(
                "frequency units: {suffix}"
            )));
        }
    };

    let hz = raw
        .checked_mul(multiplier)
        .ok_or_else(|| DirtyJtagError::InvalidParameter(format!("frequency: {s}")))?;

    if hz == 0 {
        return Err(DirtyJtagError::InvalidParameter(format!(
            "frequency \"{s}\": must be non-zero"
        )));
    }
    if hz < MIN_FREQUENCY_HZ {
        return Err(DirtyJtagError::InvalidParameter(format!(
            "frequency \"{s}\": below the 1 kHz floor"
        )));
    }
    if hz > MAX_FREQUENCY_HZ {
        return Err(DirtyJtagError::InvalidParameter(format!(
            "frequency \"{s}\": above the 65535 kHz ceiling"
        )));
    }

    Ok((hz / 1_000) as u16)
}

/// Split a string into its leading integer literal and whatever follows
fn split_number(s: &str) -> (&str, &str) {
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let end = rest
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(rest.len());
        s.split_at(2 + end)
    } else {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        s.split_at(end)
    }
}
