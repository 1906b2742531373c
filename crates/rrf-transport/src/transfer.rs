//! The four-step framed transfer state machine.

use std::time::Duration;

use log::{debug, trace, warn};

use crate::bus::{ReadyPin, SpiBus};
use crate::error::TransportError;
use crate::header::{ResponseCode, TransferHeader, FORMAT_CODE, HEADER_SIZE, MAX_DATA_LENGTH};

/// Outcome of one [`DataTransfer::perform_full_transfer`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The transfer completed and the rx payload is ready to decode.
    Success,
    /// The peer appears to have restarted; channel state must be reinitialized.
    PeerReset,
    /// The transfer could not be completed after exhausting retries.
    Fatal,
}

/// The explicit phase of a single transfer attempt.
///
/// This mirrors the four-step exchange directly rather than leaving it
/// implicit in control flow, so the "what happens on a bad response" logic
/// for each phase is visible at a single match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    AwaitHeader,
    AwaitHeaderResp,
    AwaitPayload,
    AwaitPayloadResp,
    Done,
    Reset,
}

/// Tunable knobs for [`DataTransfer`].
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Protocol version this side accepts; transfers whose peer header
    /// carries a different value are treated as `BadProtocolVersion`.
    pub protocol_version: u16,
    /// Timeout waiting for the ready GPIO to assert before each exchange.
    pub ready_timeout: Duration,
    /// Number of ready-wait timeouts tolerated before declaring the transfer
    /// fatal.
    pub max_stalls: u32,
    /// Number of bad-response retries tolerated (per phase) before
    /// declaring the transfer fatal.
    pub max_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            ready_timeout: Duration::from_millis(500),
            max_stalls: 3,
            max_retries: 3,
        }
    }
}

/// Running counters useful for diagnostics and the IPC status surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferStats {
    /// Number of `performFullTransfer` calls that returned `Success`.
    pub successful_transfers: u64,
    /// Number of header-exchange attempts, including retries.
    pub header_exchanges: u64,
    /// Number of payload-exchange attempts, including retries.
    pub payload_exchanges: u64,
    /// Number of times a header response came back non-`Success`.
    pub header_retries: u64,
    /// Number of times a payload response came back non-`Success`.
    pub payload_retries: u64,
    /// Number of ready-pin wait timeouts observed.
    pub stalls: u64,
    /// Number of peer resets detected.
    pub resets: u64,
}

/// The framed, checksummed, full-duplex SPI transfer state machine.
///
/// Owns the tx/rx buffers and the two hardware handles; see the module docs
/// for the four-step exchange and the peer-reset rules it implements.
pub struct DataTransfer<B, R> {
    bus: B,
    ready_pin: R,
    config: TransferConfig,

    tx_buf: [u8; MAX_DATA_LENGTH],
    rx_buf: [u8; MAX_DATA_LENGTH],
    tx_len: usize,
    rx_len: usize,

    tx_sequence: u16,
    rx_sequence: Option<u16>,
    accepted_protocol_version: Option<u16>,

    had_reset: bool,
    stats: TransferStats,
}

impl<B, R> DataTransfer<B, R>
where
    B: SpiBus,
    R: ReadyPin,
{
    /// Construct a transfer state machine around an already-opened bus and
    /// ready pin. Corresponds to the contract's `init(readyPin, spiDevice)`;
    /// in this implementation both handles are supplied at construction
    /// time so the type carries no partially-initialized state.
    pub fn new(ready_pin: R, bus: B, config: TransferConfig) -> Self {
        Self {
            bus,
            ready_pin,
            config,
            tx_buf: [0u8; MAX_DATA_LENGTH],
            rx_buf: [0u8; MAX_DATA_LENGTH],
            tx_len: 0,
            rx_len: 0,
            tx_sequence: 0,
            rx_sequence: None,
            accepted_protocol_version: None,
            had_reset: false,
            stats: TransferStats::default(),
        }
    }

    /// Append bytes to the tx payload for the next transfer.
    ///
    /// Returns `false` (without writing anything) if `bytes` would overflow
    /// the buffer; per the framing rules the caller must defer that write
    /// to the next cycle rather than splitting a packet.
    pub fn push_tx(&mut self, bytes: &[u8]) -> bool {
        if self.tx_len + bytes.len() > self.tx_buf.len() {
            return false;
        }
        self.tx_buf[self.tx_len..self.tx_len + bytes.len()].copy_from_slice(bytes);
        self.tx_len += bytes.len();
        true
    }

    /// Remaining free bytes in the tx payload for this cycle.
    pub fn tx_remaining(&self) -> usize {
        self.tx_buf.len() - self.tx_len
    }

    /// The most recently received payload, valid until the next transfer.
    pub fn rx_payload(&self) -> &[u8] {
        &self.rx_buf[..self.rx_len]
    }

    /// Whether the most recent transfer detected a peer reset.
    pub fn had_reset(&self) -> bool {
        self.had_reset
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Run one logical transfer cycle: up to four SPI exchanges implementing
    /// the `AwaitHeader -> AwaitHeaderResp -> AwaitPayload -> AwaitPayloadResp
    /// -> Done|Retry|Reset` state machine, retrying bad responses in place.
    pub fn perform_full_transfer(&mut self) -> Result<TransferOutcome, TransportError> {
        self.had_reset = false;
        let mut state = TransferState::AwaitHeader;
        let mut stalls = 0u32;
        let mut header_retries = 0u32;
        let mut payload_retries = 0u32;

        let mut tx_header;
        let mut rx_header = TransferHeader::from_bytes(&[0u8; HEADER_SIZE]);
        let mut data_length = 0u16;

        loop {
            match state {
                TransferState::AwaitHeader => {
                    tx_header = self.build_tx_header();
                    self.wait_ready(&mut stalls)?;
                    rx_header = self.exchange_header(&tx_header)?;
                    state = TransferState::AwaitHeaderResp;
                }
                TransferState::AwaitHeaderResp => {
                    self.stats.header_exchanges += 1;
                    let our_resp = self.evaluate_header(&rx_header);
                    self.wait_ready(&mut stalls)?;
                    let peer_resp = self.exchange_response(our_resp)?;

                    if peer_resp.is_success() && our_resp.is_success() {
                        data_length = rx_header.data_length.max(self.tx_len as u16);
                        state = if data_length == 0 {
                            TransferState::Done
                        } else {
                            TransferState::AwaitPayload
                        };
                    } else if matches!(our_resp, ResponseCode::BadProtocolVersion)
                        || matches!(peer_resp, ResponseCode::BadProtocolVersion)
                    {
                        state = TransferState::Reset;
                    } else {
                        header_retries += 1;
                        self.stats.header_retries += 1;
                        if header_retries > self.config.max_retries {
                            return Ok(self.finish_fatal());
                        }
                        state = TransferState::AwaitHeader;
                    }
                }
                TransferState::AwaitPayload => {
                    self.stats.payload_exchanges += 1;
                    self.wait_ready(&mut stalls)?;
                    self.exchange_payload(data_length as usize)?;
                    state = TransferState::AwaitPayloadResp;
                }
                TransferState::AwaitPayloadResp => {
                    let our_resp = self.evaluate_payload(&rx_header, data_length as usize);
                    self.wait_ready(&mut stalls)?;
                    let peer_resp = self.exchange_response(our_resp)?;

                    if peer_resp.is_success() && our_resp.is_success() {
                        state = TransferState::Done;
                    } else {
                        payload_retries += 1;
                        self.stats.payload_retries += 1;
                        if payload_retries > self.config.max_retries {
                            return Ok(self.finish_fatal());
                        }
                        // The header is still valid; retry payload only.
                        state = TransferState::AwaitPayload;
                    }
                }
                TransferState::Done => {
                    return Ok(self.finish_success(rx_header, data_length));
                }
                TransferState::Reset => {
                    return Ok(self.finish_reset());
                }
            }
        }
    }

    fn build_tx_header(&self) -> TransferHeader {
        TransferHeader::new(
            self.config.protocol_version,
            self.tx_sequence,
            1,
            &self.tx_buf[..self.tx_len],
        )
    }

    fn wait_ready(&mut self, stalls: &mut u32) -> Result<(), TransportError> {
        let ready = self
            .ready_pin
            .wait_ready(self.config.ready_timeout)
            .map_err(|e| TransportError::ReadyPin(Box::new(e)))?;
        if !ready {
            *stalls += 1;
            self.stats.stalls += 1;
            if *stalls > self.config.max_stalls {
                return Err(TransportError::ReadyTimeout);
            }
        }
        Ok(())
    }

    fn exchange_header(&mut self, tx_header: &TransferHeader) -> Result<TransferHeader, TransportError> {
        let tx_bytes = tx_header.to_bytes();
        let mut rx_bytes = [0u8; HEADER_SIZE];
        self.bus
            .transfer(&tx_bytes, &mut rx_bytes)
            .map_err(|e| TransportError::Bus(Box::new(e)))?;
        trace!("header exchange tx={tx_bytes:02x?} rx={rx_bytes:02x?}");
        Ok(TransferHeader::from_bytes(&rx_bytes))
    }

    fn exchange_response(&mut self, our: ResponseCode) -> Result<ResponseCode, TransportError> {
        let tx_bytes = our.to_bytes();
        let mut rx_bytes = [0u8; ResponseCode::WIRE_SIZE];
        self.bus
            .transfer(&tx_bytes, &mut rx_bytes)
            .map_err(|e| TransportError::Bus(Box::new(e)))?;
        Ok(ResponseCode::from_bytes(rx_bytes))
    }

    fn exchange_payload(&mut self, len: usize) -> Result<(), TransportError> {
        if len > self.tx_buf.len() {
            return Err(TransportError::PayloadTooLarge(len, self.tx_buf.len()));
        }
        let mut tx_padded = vec![0u8; len];
        tx_padded[..self.tx_len.min(len)].copy_from_slice(&self.tx_buf[..self.tx_len.min(len)]);
        let mut rx_padded = vec![0u8; len];
        self.bus
            .transfer(&tx_padded, &mut rx_padded)
            .map_err(|e| TransportError::Bus(Box::new(e)))?;
        self.rx_buf[..len].copy_from_slice(&rx_padded);
        self.rx_len = len;
        Ok(())
    }

    fn evaluate_header(&self, rx_header: &TransferHeader) -> ResponseCode {
        if rx_header.format_code != FORMAT_CODE {
            ResponseCode::BadFormat
        } else if !rx_header.header_checksum_valid() {
            ResponseCode::BadHeaderChecksum
        } else if let Some(accepted) = self.accepted_protocol_version {
            if rx_header.protocol_version != accepted {
                ResponseCode::BadProtocolVersion
            } else {
                ResponseCode::Success
            }
        } else if rx_header.protocol_version != self.config.protocol_version {
            ResponseCode::BadProtocolVersion
        } else {
            ResponseCode::Success
        }
    }

    fn evaluate_payload(&self, rx_header: &TransferHeader, len: usize) -> ResponseCode {
        let payload = &self.rx_buf[..len.min(rx_header.data_length as usize)];
        if rx_header.data_checksum_valid(payload) {
            ResponseCode::Success
        } else {
            ResponseCode::BadDataChecksum
        }
    }

    fn detects_reset(&self, rx_header: &TransferHeader) -> bool {
        if let Some(accepted) = self.accepted_protocol_version {
            if rx_header.protocol_version != accepted {
                return true;
            }
        }
        if let Some(prev) = self.rx_sequence {
            rx_header.sequence_number != prev.wrapping_add(1)
        } else {
            false
        }
    }

    fn finish_success(&mut self, rx_header: TransferHeader, data_length: u16) -> TransferOutcome {
        if self.detects_reset(&rx_header) {
            return self.finish_reset();
        }
        self.accepted_protocol_version = Some(rx_header.protocol_version);
        self.rx_sequence = Some(rx_header.sequence_number);
        self.tx_sequence = self.tx_sequence.wrapping_add(1);
        self.tx_len = 0;
        // `data_length` is the padded size both sides exchanged, which may be
        // larger than what the peer actually sent (padded up to match our own
        // tx size). Only `rx_header.data_length` bytes are real payload.
        self.rx_len = rx_header.data_length as usize;
        self.stats.successful_transfers += 1;
        debug!(
            "transfer ok seq={} data_len={}",
            rx_header.sequence_number, data_length
        );
        TransferOutcome::Success
    }

    fn finish_reset(&mut self) -> TransferOutcome {
        warn!("peer reset detected, resynchronizing sequence numbers");
        self.had_reset = true;
        self.tx_sequence = 0;
        self.rx_sequence = None;
        self.accepted_protocol_version = None;
        self.tx_len = 0;
        self.rx_len = 0;
        self.stats.resets += 1;
        TransferOutcome::PeerReset
    }

    fn finish_fatal(&mut self) -> TransferOutcome {
        warn!("transfer retries exhausted, declaring fatal");
        self.tx_len = 0;
        TransferOutcome::Fatal
    }
}
