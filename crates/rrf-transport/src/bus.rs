use std::time::Duration;

/// A full-duplex SPI bus capable of exchanging `tx`/`rx` buffers of equal
/// length in a single transaction.
///
/// Implemented by `rrf-linux-spi` against a real spidev, and by an in-memory
/// loopback fake in this crate's tests.
pub trait SpiBus {
    /// Error type surfaced by bus failures; boxed into
    /// [`crate::TransportError::Bus`] by [`crate::DataTransfer`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Exchange `tx` and `rx` simultaneously; both slices must be the same
    /// length.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error>;
}

/// The firmware-to-host "data ready" signal line.
///
/// On real hardware this is a GPIO the firmware asserts when it has a
/// response queued; implemented against Linux gpiocdev by `rrf-linux-spi`.
pub trait ReadyPin {
    /// Error type surfaced by wait failures; boxed into
    /// [`crate::TransportError::ReadyPin`] by [`crate::DataTransfer`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Block until the line asserts or `timeout` elapses, returning whether
    /// it asserted.
    fn wait_ready(&mut self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Poll the current level without blocking.
    fn is_ready(&mut self) -> Result<bool, Self::Error>;
}
