use thiserror::Error;

/// Errors surfaced by a single full-duplex transfer attempt.
///
/// Most of these are recoverable at the [`crate::DataTransfer`] level (they
/// drive a retry or a reset rather than propagating to the caller); they are
/// public so callers that want finer-grained diagnostics than
/// [`crate::TransferOutcome`] can match on them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("ready pin wait failed: {0}")]
    ReadyPin(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("spi transfer failed: {0}")]
    Bus(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("payload of {0} bytes exceeds the {1}-byte transfer buffer")]
    PayloadTooLarge(usize, usize),

    #[error("ready pin did not assert within the timeout")]
    ReadyTimeout,

    #[error("exceeded the maximum number of retries for a single transfer")]
    RetriesExhausted,
}
