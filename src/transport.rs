//! Transport layer for DirtyJTAG frames
//!
//! [`Transport`] turns a raw bulk pipe into an exact "send N bytes / receive
//! N bytes" contract: short writes and wrong-length responses are failures,
//! not partial successes, and nothing here retries. [`UsbTransport`] binds
//! the trait to a claimed nusb interface.

use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Endpoint, MaybeFuture};

use crate::error::{DirtyJtagError, Result};
use crate::protocol::{
    DIRTYJTAG_USB_PRODUCT, DIRTYJTAG_USB_VENDOR, READ_EP, USB_TIMEOUT, WRITE_EP,
};

/// Byte transport to the probe
pub trait Transport {
    /// Send `data`, failing on a transfer error or a short write
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive into `buf`
    ///
    /// With `expected = Some(n)` the transfer must deliver exactly `n`
    /// bytes; with `None` any length up to the buffer capacity is accepted.
    /// Returns the number of bytes received.
    fn receive(&mut self, buf: &mut [u8], expected: Option<usize>) -> Result<usize>;
}

/// USB bulk transport over a claimed DirtyJTAG interface
pub struct UsbTransport {
    /// Bulk OUT endpoint for command frames
    out_ep: Endpoint<Bulk, Out>,
    /// Bulk IN endpoint for response frames
    in_ep: Endpoint<Bulk, In>,
}

impl UsbTransport {
    /// Open the first attached DirtyJTAG probe
    pub fn open() -> Result<Self> {
        Self::open_nth(0)
    }

    /// Open the nth attached DirtyJTAG probe (0-indexed)
    ///
    /// Searches for devices with VID:1209 PID:C0CA and claims interface 0.
    pub fn open_nth(index: usize) -> Result<Self> {
        let devices: Vec<_> = nusb::list_devices()
            .wait()
            .map_err(|e| DirtyJtagError::OpenFailed(e.to_string()))?
            .filter(|d| {
                d.vendor_id() == DIRTYJTAG_USB_VENDOR && d.product_id() == DIRTYJTAG_USB_PRODUCT
            })
            .collect();

        let device_info = devices.get(index).ok_or(DirtyJtagError::DeviceNotFound)?;

        log::info!(
            "Opening DirtyJTAG probe at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| DirtyJtagError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| DirtyJtagError::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Bulk, Out>(WRITE_EP)
            .map_err(|e| DirtyJtagError::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Bulk, In>(READ_EP)
            .map_err(|e| DirtyJtagError::ClaimFailed(e.to_string()))?;

        Ok(Self { out_ep, in_ep })
    }

    /// List all attached DirtyJTAG probes
    pub fn list_devices() -> Result<Vec<DirtyJtagDeviceInfo>> {
        let devices: Vec<_> = nusb::list_devices()
            .wait()
            .map_err(|e| DirtyJtagError::OpenFailed(e.to_string()))?
            .filter(|d| {
                d.vendor_id() == DIRTYJTAG_USB_VENDOR && d.product_id() == DIRTYJTAG_USB_PRODUCT
            })
            .map(|d| DirtyJtagDeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
            })
            .collect();

        Ok(devices)
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = self.out_ep.transfer_blocking(buf, USB_TIMEOUT);
        match completion.status {
            Ok(()) if completion.actual_len == data.len() => {
                log::trace!("bulk out: {} bytes", data.len());
                Ok(())
            }
            Ok(()) => Err(DirtyJtagError::ShortTransfer {
                expected: data.len(),
                actual: completion.actual_len,
            }),
            Err(e) => Err(DirtyJtagError::TransferFailed(e.to_string())),
        }
    }

    fn receive(&mut self, buf: &mut [u8], expected: Option<usize>) -> Result<usize> {
        // IN request length must be a multiple of the endpoint's packet size
        let max_packet_size = self.in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, USB_TIMEOUT);
        let data = completion
            .into_result()
            .map_err(|e| DirtyJtagError::TransferFailed(e.to_string()))?;

        if let Some(expected) = expected {
            if data.len() != expected {
                return Err(DirtyJtagError::UnexpectedResponseLength {
                    expected,
                    actual: data.len(),
                });
            }
        }

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        log::trace!("bulk in: {len} bytes");
        Ok(len)
    }
}

/// Information about a connected DirtyJTAG probe
#[derive(Debug, Clone)]
pub struct DirtyJtagDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

impl std::fmt::Display for DirtyJtagDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DirtyJTAG at bus {} address {}", self.bus, self.address)
    }
}
