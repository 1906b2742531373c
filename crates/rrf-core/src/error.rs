use thiserror::Error;

/// Top-level errors surfaced by the Processor loop.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] rrf_transport::TransportError),

    #[error("protocol error decoding rx payload: {0}")]
    Protocol(#[from] rrf_protocol::ProtocolError),

    #[error("transfer declared fatal after exhausting retries")]
    Fatal,

    #[error("firmware did not accept our protocol version within the startup window")]
    FirmwareIncompatible,

    #[error("no channel is registered for {0:?}")]
    UnknownChannel(rrf_protocol::CodeChannel),
}
