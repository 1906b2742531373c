//! Linux transport backends for the RRF SPI daemon: a spidev-backed
//! [`SpiBus`] and a gpiocdev-backed [`ReadyPin`] for real hardware, plus an
//! in-memory loopback pair for `--no-spi` dry runs.

mod error;
mod gpio;
mod loopback;
mod spi;

pub use error::{GpioResult, LinuxGpioError, LinuxSpiError, SpiResult};
pub use gpio::{LinuxReadyPin, LinuxReadyPinConfig};
pub use loopback::{LoopbackBus, LoopbackReadyPin};
pub use spi::{mode, LinuxSpiBus, LinuxSpiConfig};

pub use rrf_transport::{ReadyPin, SpiBus};
