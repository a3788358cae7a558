//! DirtyJTAG device implementation
//!
//! This module provides the main `DirtyJtag` struct: session setup (signal
//! baseline and clock negotiation), the chunked transaction engine that maps
//! arbitrary-length SPI exchanges onto 30-byte XFER frames, and the
//! `SpiMaster` trait implementation consumed by the flashing framework.

use crate::error::{DirtyJtagError, Result};
use crate::programmer::{SpiFeatures, SpiMaster};
use crate::protocol::{self, Protocol, DEFAULT_FREQUENCY_KHZ, FRAME_SIZE, XFER_FILL, XFER_PAYLOAD};
use crate::transport::{DirtyJtagDeviceInfo, Transport, UsbTransport};

/// Configuration options for opening a DirtyJTAG probe
#[derive(Debug, Clone)]
pub struct DirtyJtagConfig {
    /// Device index (when multiple probes are connected)
    pub device_index: usize,
    /// SPI clock in kHz, as sent in the FREQ frame
    pub frequency_khz: u16,
}

impl Default for DirtyJtagConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frequency_khz: DEFAULT_FREQUENCY_KHZ,
        }
    }
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<DirtyJtagConfig> {
    let mut config = DirtyJtagConfig::default();

    for (key, value) in options {
        match *key {
            "frequency" => {
                config.frequency_khz = protocol::parse_frequency(value)?;
            }
            "device" | "index" => {
                config.device_index = value
                    .parse()
                    .map_err(|_| DirtyJtagError::InvalidParameter(format!("device: {value}")))?;
            }
            _ => {
                return Err(DirtyJtagError::InvalidParameter(format!(
                    "unknown option: {key}"
                )));
            }
        }
    }

    Ok(config)
}

/// DirtyJTAG probe driven as an SPI programmer
///
/// One value of this type is one configured session. Dropping it releases
/// the claimed interface and closes the device.
pub struct DirtyJtag<T: Transport> {
    /// Frame transport (USB in production, scripted in tests)
    transport: T,
    /// Protocol revision this session speaks
    protocol: Protocol,
}

impl DirtyJtag<UsbTransport> {
    /// Open the first attached DirtyJTAG probe with default settings
    pub fn open() -> Result<Self> {
        Self::open_with_config(&DirtyJtagConfig::default())
    }

    /// Open a DirtyJTAG probe with the specified configuration
    pub fn open_with_config(config: &DirtyJtagConfig) -> Result<Self> {
        let transport = UsbTransport::open_nth(config.device_index)?;
        Self::new(transport, config)
    }

    /// List all attached DirtyJTAG probes
    pub fn list_devices() -> Result<Vec<DirtyJtagDeviceInfo>> {
        UsbTransport::list_devices()
    }
}

impl<T: Transport> DirtyJtag<T> {
    /// Create a session over an already-open transport
    ///
    /// Sends the batched initialization sequence (signal baseline, clock,
    /// stop) as a single write. On failure the transport is dropped,
    /// releasing the device.
    pub fn new(mut transport: T, config: &DirtyJtagConfig) -> Result<Self> {
        transport.send(&protocol::init_sequence(config.frequency_khz))?;

        log::info!(
            "DirtyJTAG configured for a {} kHz SPI clock",
            config.frequency_khz
        );

        Ok(Self {
            transport,
            protocol: Protocol::Djtag1,
        })
    }

    /// Protocol revision negotiated for this session
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Execute one raw SPI transaction
    ///
    /// The wire exchange is a single clocked stream of
    /// `writearr.len() + readarr.len()` bytes: the caller's bytes first,
    /// then fixed fill bytes whose full-duplex echo carries the read data.
    /// A TMS reset pulse brackets every transaction, including empty and
    /// failed ones; the session stays usable after a failed transaction.
    pub fn xfer(&mut self, writearr: &[u8], readarr: &mut [u8]) -> Result<()> {
        match self.protocol {
            Protocol::Djtag1 => {}
            version => return Err(DirtyJtagError::UnsupportedProtocol(version)),
        }

        let result = self.djtag1_xfer(writearr, readarr);

        // The pulse returns the target state machine to idle even after a
        // failed exchange. Its own failure must not mask the first error.
        let pulse = self.transport.send(&protocol::TMS_RESET);
        result.and(pulse)
    }

    fn djtag1_xfer(&mut self, writearr: &[u8], readarr: &mut [u8]) -> Result<()> {
        let len = writearr.len() + readarr.len();
        if len == 0 {
            return Ok(());
        }

        let num_frames = len.div_ceil(XFER_PAYLOAD);
        log::trace!(
            "xfer: {} write + {} read bytes in {} frame(s)",
            writearr.len(),
            readarr.len(),
            num_frames
        );

        let mut tx = vec![XFER_FILL; len];
        tx[..writearr.len()].copy_from_slice(writearr);

        let mut rx = vec![0u8; num_frames * XFER_PAYLOAD];
        let mut response = [0u8; FRAME_SIZE];

        for (i, chunk) in tx.chunks(XFER_PAYLOAD).enumerate() {
            self.transport.send(&protocol::xfer_frame(chunk))?;
            self.transport.receive(&mut response, Some(FRAME_SIZE))?;

            // Response byte k was sampled while output byte k was driven
            let offset = i * XFER_PAYLOAD;
            rx[offset..offset + chunk.len()].copy_from_slice(&response[..chunk.len()]);
        }

        readarr.copy_from_slice(&rx[writearr.len()..len]);
        Ok(())
    }
}

impl<T: Transport> SpiMaster for DirtyJtag<T> {
    fn features(&self) -> SpiFeatures {
        SpiFeatures::FOUR_BYTE_ADDR
    }

    fn max_read_len(&self) -> usize {
        XFER_PAYLOAD
    }

    fn max_write_len(&self) -> usize {
        XFER_PAYLOAD
    }

    fn command(&mut self, writearr: &[u8], readarr: &mut [u8]) -> Result<()> {
        self.xfer(writearr, readarr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{init_sequence, Command, TMS_RESET};

    /// How the mock probe fills the payload of an XFER response
    enum Reply {
        /// Echo the request payload (a wire loopback between TDI and TDO)
        Echo,
        /// Byte j of frame i is `(i * 30 + j) as u8`, so offset arithmetic
        /// mistakes show up as wrong values rather than coincidences
        Indexed,
    }

    /// Scripted stand-in for the USB probe
    struct MockTransport {
        sent: Vec<Vec<u8>>,
        reply: Reply,
        xfers_answered: usize,
        /// Fail the nth send call (0-indexed), once
        fail_on_send: Option<usize>,
        send_calls: usize,
    }

    impl MockTransport {
        fn new(reply: Reply) -> Self {
            Self {
                sent: Vec::new(),
                reply,
                xfers_answered: 0,
                fail_on_send: None,
                send_calls: 0,
            }
        }

        fn failing_on(reply: Reply, nth_send: usize) -> Self {
            Self {
                fail_on_send: Some(nth_send),
                ..Self::new(reply)
            }
        }

        fn xfer_frames(&self) -> Vec<&Vec<u8>> {
            self.sent
                .iter()
                .filter(|f| f[0] == Command::Xfer as u8)
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, data: &[u8]) -> Result<()> {
            let call = self.send_calls;
            self.send_calls += 1;
            if self.fail_on_send == Some(call) {
                return Err(DirtyJtagError::TransferFailed("mock failure".into()));
            }
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8], expected: Option<usize>) -> Result<usize> {
            assert_eq!(expected, Some(FRAME_SIZE));
            let request = self.sent.last().expect("receive before send");
            assert_eq!(request[0], Command::Xfer as u8);
            assert_eq!(request.len(), FRAME_SIZE);

            let mut frame = [0u8; FRAME_SIZE];
            match self.reply {
                Reply::Echo => frame[..XFER_PAYLOAD].copy_from_slice(&request[2..]),
                Reply::Indexed => {
                    for (j, b) in frame[..XFER_PAYLOAD].iter_mut().enumerate() {
                        *b = (self.xfers_answered * XFER_PAYLOAD + j) as u8;
                    }
                }
            }
            self.xfers_answered += 1;

            buf[..FRAME_SIZE].copy_from_slice(&frame);
            Ok(FRAME_SIZE)
        }
    }

    fn session(reply: Reply) -> DirtyJtag<MockTransport> {
        DirtyJtag::new(MockTransport::new(reply), &DirtyJtagConfig::default()).unwrap()
    }

    #[test]
    fn test_init_sends_single_batched_sequence() {
        let dev = session(Reply::Echo);
        assert_eq!(dev.transport.sent.len(), 1);
        assert_eq!(dev.transport.sent[0], init_sequence(100));
    }

    #[test]
    fn test_init_failure_propagates() {
        let transport = MockTransport::failing_on(Reply::Echo, 0);
        assert!(DirtyJtag::new(transport, &DirtyJtagConfig::default()).is_err());
    }

    #[test]
    fn test_small_transaction_is_one_frame() {
        let mut dev = session(Reply::Echo);
        let mut readarr = [0u8; 3];
        dev.xfer(&[0x9F], &mut readarr).unwrap();

        let frames = dev.transport.xfer_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][1], 4 * 8); // 1 write + 3 read bytes
        // Reset pulse follows the exchange
        assert_eq!(dev.transport.sent.last().unwrap(), &TMS_RESET);
    }

    #[test]
    fn test_chunk_count_and_final_bit_count() {
        let mut dev = session(Reply::Echo);
        let writearr = [0u8; 61];
        dev.xfer(&writearr, &mut []).unwrap();

        let frames = dev.transport.xfer_frames();
        assert_eq!(frames.len(), 3); // ceil(61 / 30)
        assert_eq!(frames[0][1], 240);
        assert_eq!(frames[1][1], 240);
        assert_eq!(frames[2][1], 8); // 61 % 30 = 1 byte
    }

    #[test]
    fn test_exact_multiple_has_full_final_chunk() {
        let mut dev = session(Reply::Echo);
        let writearr = [0u8; 60];
        dev.xfer(&writearr, &mut []).unwrap();

        let frames = dev.transport.xfer_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][1], (XFER_PAYLOAD * 8) as u8);
    }

    #[test]
    fn test_loopback_returns_fill_bytes() {
        // With the probe echoing TDI back, the read segment must be exactly
        // the fill bytes that padded the combined transmit buffer.
        let mut dev = session(Reply::Echo);
        let writearr: Vec<u8> = (0u8..10).collect();
        let mut readarr = [0xEEu8; 25];
        dev.xfer(&writearr, &mut readarr).unwrap();
        assert!(readarr.iter().all(|&b| b == XFER_FILL));
    }

    #[test]
    fn test_read_offset_across_chunks() {
        // 10 write + 45 read bytes span two frames; the read segment is the
        // position-indexed stream starting right after the write bytes.
        let mut dev = session(Reply::Indexed);
        let writearr = [0u8; 10];
        let mut readarr = [0u8; 45];
        dev.xfer(&writearr, &mut readarr).unwrap();

        for (k, &b) in readarr.iter().enumerate() {
            assert_eq!(b, (10 + k) as u8);
        }
    }

    #[test]
    fn test_pure_read_and_pure_write() {
        let mut dev = session(Reply::Indexed);

        let mut readarr = [0u8; 7];
        dev.xfer(&[], &mut readarr).unwrap();
        for (k, &b) in readarr.iter().enumerate() {
            assert_eq!(b, k as u8);
        }

        dev.xfer(&[1, 2, 3], &mut []).unwrap();
        assert_eq!(dev.transport.xfer_frames().len(), 2);
    }

    #[test]
    fn test_empty_transaction_still_pulses() {
        let mut dev = session(Reply::Echo);
        dev.xfer(&[], &mut []).unwrap();

        assert!(dev.transport.xfer_frames().is_empty());
        // Init sequence, then exactly one reset pulse
        assert_eq!(dev.transport.sent.len(), 2);
        assert_eq!(dev.transport.sent[1], TMS_RESET);
    }

    #[test]
    fn test_mid_transaction_failure_aborts_and_pulses() {
        // Send calls: 0 = init, 1 = first XFER frame, 2 = second XFER frame
        let transport = MockTransport::failing_on(Reply::Echo, 2);
        let mut dev = DirtyJtag::new(transport, &DirtyJtagConfig::default()).unwrap();

        let writearr = [0u8; 40];
        let err = dev.xfer(&writearr, &mut []).unwrap_err();
        assert!(matches!(err, DirtyJtagError::TransferFailed(_)));

        // The reset pulse was still attempted after the failure
        assert_eq!(dev.transport.sent.last().unwrap(), &TMS_RESET);
    }

    #[test]
    fn test_pulse_failure_surfaces_after_success() {
        // Send calls: 0 = init, 1 = XFER frame, 2 = reset pulse
        let transport = MockTransport::failing_on(Reply::Echo, 2);
        let mut dev = DirtyJtag::new(transport, &DirtyJtagConfig::default()).unwrap();

        let mut readarr = [0u8; 2];
        assert!(dev.xfer(&[0xAB], &mut readarr).is_err());
    }

    #[test]
    fn test_unimplemented_protocol_fails_fast() {
        let mut dev = session(Reply::Echo);
        dev.protocol = Protocol::Djtag2;

        let err = dev.xfer(&[0x9F], &mut []).unwrap_err();
        assert!(matches!(
            err,
            DirtyJtagError::UnsupportedProtocol(Protocol::Djtag2)
        ));
        // Nothing was clocked, so no pulse either
        assert_eq!(dev.transport.sent.len(), 1);
    }

    #[test]
    fn test_spi_master_capabilities() {
        let dev = session(Reply::Echo);
        assert_eq!(dev.max_read_len(), 30);
        assert_eq!(dev.max_write_len(), 30);
        assert!(dev.features().contains(SpiFeatures::FOUR_BYTE_ADDR));
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("frequency", "500khz"), ("device", "1")]).unwrap();
        assert_eq!(config.frequency_khz, 500);
        assert_eq!(config.device_index, 1);

        // Absent frequency keeps the 100 kHz default
        assert_eq!(parse_options(&[]).unwrap().frequency_khz, 100);

        assert!(parse_options(&[("voltage", "3.3")]).is_err());
        assert!(parse_options(&[("frequency", "999")]).is_err());
    }
}
