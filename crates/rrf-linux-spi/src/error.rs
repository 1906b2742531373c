//! Error types for the Linux transport backends.

use thiserror::Error;

/// Errors from the spidev-backed [`crate::LinuxSpiBus`].
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    #[error("failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set SPI mode to {mode}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("SPI transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    #[error("tx and rx buffers must be the same length ({tx} != {rx})")]
    LengthMismatch { tx: usize, rx: usize },
}

/// Result type for spidev operations.
pub type SpiResult<T> = std::result::Result<T, LinuxSpiError>;

/// Errors from the gpiocdev-backed [`crate::LinuxReadyPin`].
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    #[error("failed to request line {offset} on {chip}: {source}")]
    LineRequestFailed {
        chip: String,
        offset: u32,
        #[source]
        source: gpiocdev::Error,
    },

    #[error("failed to read ready line: {0}")]
    ReadFailed(#[source] gpiocdev::Error),
}

/// Result type for gpiocdev operations.
pub type GpioResult<T> = std::result::Result<T, LinuxGpioError>;
