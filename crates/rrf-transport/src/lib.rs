//! Framed, checksummed, full-duplex SPI transfer state machine.
//!
//! Every logical transfer is up to four SPI exchanges: a header exchange, a
//! header-response exchange, an optional payload exchange, and a
//! payload-response exchange. [`DataTransfer`] drives this explicitly as
//! `AwaitHeader -> AwaitHeaderResp -> AwaitPayload -> AwaitPayloadResp ->
//! Done|Reset`, retrying a bad response in place rather than unwinding the
//! whole cycle. Bad checksums and ready-pin stalls are transient and never
//! escape this crate; only a detected peer reset or exhausted retries is
//! surfaced to the caller via [`TransferOutcome`].

mod bus;
mod error;
mod header;
mod transfer;

pub use bus::{ReadyPin, SpiBus};
pub use error::TransportError;
pub use header::{ResponseCode, TransferHeader, FORMAT_CODE, HEADER_SIZE, MAX_DATA_LENGTH};
pub use transfer::{DataTransfer, TransferConfig, TransferOutcome, TransferStats};
