//! Error types for the DirtyJTAG driver

use thiserror::Error;

use crate::protocol::Protocol;

/// Result type for DirtyJTAG operations
pub type Result<T> = std::result::Result<T, DirtyJtagError>;

/// Errors that can occur when driving a DirtyJTAG probe
#[derive(Debug, Error)]
pub enum DirtyJtagError {
    /// No probe with the DirtyJTAG VID/PID is attached
    #[error("DirtyJTAG probe not found (VID:1209 PID:C0CA)")]
    DeviceNotFound,

    /// Failed to open the USB device
    #[error("Failed to open DirtyJTAG probe: {0}")]
    OpenFailed(String),

    /// Failed to claim the interface or open its endpoints
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// USB bulk transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// A bulk write moved fewer bytes than requested
    #[error("Short USB write: sent {actual} of {expected} bytes")]
    ShortTransfer {
        /// Bytes requested
        expected: usize,
        /// Bytes the transfer actually moved
        actual: usize,
    },

    /// The probe answered with a response of the wrong length
    #[error("Unexpected response length: got {actual}, expected {expected}")]
    UnexpectedResponseLength {
        /// Length the protocol requires
        expected: usize,
        /// Length the probe delivered
        actual: usize,
    },

    /// The session's protocol version has no transfer implementation
    #[error("Protocol version {0:?} is not implemented")]
    UnsupportedProtocol(Protocol),

    /// Option value could not be parsed or is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
