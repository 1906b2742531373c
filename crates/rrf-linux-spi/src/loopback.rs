//! In-memory [`SpiBus`]/[`ReadyPin`] pair with no firmware behind it, used
//! by `--no-spi` dry runs and by tests elsewhere in the workspace that want
//! a real `DataTransfer` without real hardware.
//!
//! Unlike the scripted fakes under `rrf-transport`'s own `tests/`, this bus
//! always succeeds and never has anything to report: it's a stand-in for
//! "no firmware attached", not a way to script particular wire bytes.

use std::convert::Infallible;
use std::time::Duration;

use rrf_transport::{ReadyPin, ResponseCode, SpiBus, TransferHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    HeaderResponse,
    Payload,
    PayloadResponse,
}

/// An always-succeeding bus that answers every transfer with an empty
/// payload, tracking phase explicitly rather than guessing from buffer
/// length (which a loopback attached to a real protocol cycle cannot do,
/// since payload length varies and can coincide with the header/response
/// wire sizes).
pub struct LoopbackBus {
    next_sequence: u16,
    phase: Phase,
    expect_payload: bool,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self {
            next_sequence: 0,
            phase: Phase::Header,
            expect_payload: false,
        }
    }
}

impl SpiBus for LoopbackBus {
    type Error = Infallible;

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Infallible> {
        match self.phase {
            Phase::Header => {
                let tx_header = TransferHeader::from_bytes(
                    tx.try_into().expect("header exchange is HEADER_SIZE bytes"),
                );
                self.expect_payload = tx_header.data_length > 0;
                let reply = TransferHeader::new(tx_header.protocol_version, self.next_sequence, 1, &[]);
                self.next_sequence = self.next_sequence.wrapping_add(1);
                rx.copy_from_slice(&reply.to_bytes());
                self.phase = Phase::HeaderResponse;
            }
            Phase::HeaderResponse => {
                rx.copy_from_slice(&ResponseCode::Success.to_bytes());
                self.phase = if self.expect_payload { Phase::Payload } else { Phase::Header };
            }
            Phase::Payload => {
                // No firmware payload to deliver; rx is already zeroed by
                // the caller and our declared data_length was 0.
                self.phase = Phase::PayloadResponse;
            }
            Phase::PayloadResponse => {
                rx.copy_from_slice(&ResponseCode::Success.to_bytes());
                self.phase = Phase::Header;
            }
        }
        Ok(())
    }
}

/// A ready pin that is always asserted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackReadyPin;

impl ReadyPin for LoopbackReadyPin {
    type Error = Infallible;

    fn wait_ready(&mut self, _timeout: Duration) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn is_ready(&mut self) -> Result<bool, Infallible> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrf_transport::{DataTransfer, TransferConfig, TransferOutcome};

    #[test]
    fn empty_cycles_succeed_without_reset() {
        let mut transfer = DataTransfer::new(LoopbackReadyPin, LoopbackBus::default(), TransferConfig::default());
        for _ in 0..5 {
            assert_eq!(transfer.perform_full_transfer().unwrap(), TransferOutcome::Success);
            assert!(transfer.rx_payload().is_empty());
        }
        assert!(!transfer.had_reset());
    }

    #[test]
    fn cycles_with_outgoing_data_still_succeed() {
        let mut transfer = DataTransfer::new(LoopbackReadyPin, LoopbackBus::default(), TransferConfig::default());
        assert!(transfer.push_tx(&[1, 2, 3, 4, 5]));
        assert_eq!(transfer.perform_full_transfer().unwrap(), TransferOutcome::Success);
        assert!(transfer.rx_payload().is_empty());
        assert!(!transfer.had_reset());
    }
}
