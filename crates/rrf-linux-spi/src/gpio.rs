//! gpiocdev-backed [`ReadyPin`] for the firmware's `transferReady` line.

use std::time::{Duration, Instant};

use gpiocdev::line::Value;
use gpiocdev::request::{Config, Request};
use rrf_transport::ReadyPin;

use crate::error::{GpioResult, LinuxGpioError};

/// How long to sleep between polls while waiting for the ready line.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Configuration for the `transferReady` GPIO input line.
#[derive(Debug, Clone)]
pub struct LinuxReadyPinConfig {
    /// GPIO chip device path, e.g. `/dev/gpiochip0`.
    pub chip: String,
    /// Line offset of the ready signal.
    pub offset: u32,
}

impl LinuxReadyPinConfig {
    pub fn new(chip: impl Into<String>, offset: u32) -> Self {
        Self { chip: chip.into(), offset }
    }
}

/// [`ReadyPin`] implementation polling a gpiocdev input line.
pub struct LinuxReadyPin {
    request: Request,
    offset: u32,
}

impl LinuxReadyPin {
    pub fn open(config: &LinuxReadyPinConfig) -> GpioResult<Self> {
        log::debug!(
            "rrf-linux-spi: requesting ready line {} on {}",
            config.offset,
            config.chip
        );

        let mut req_config = Config::default();
        req_config.with_line(config.offset).as_input();

        let request = Request::from_config(req_config)
            .on_chip(&config.chip)
            .with_consumer("rrfd")
            .request()
            .map_err(|e| LinuxGpioError::LineRequestFailed {
                chip: config.chip.clone(),
                offset: config.offset,
                source: e,
            })?;

        Ok(Self { request, offset: config.offset })
    }

    fn read(&self) -> GpioResult<bool> {
        match self.request.value(self.offset) {
            Ok(Value::Active) => Ok(true),
            Ok(Value::Inactive) => Ok(false),
            Err(e) => Err(LinuxGpioError::ReadFailed(e)),
        }
    }
}

impl ReadyPin for LinuxReadyPin {
    type Error = LinuxGpioError;

    fn wait_ready(&mut self, timeout: Duration) -> GpioResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.read()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn is_ready(&mut self) -> GpioResult<bool> {
        self.read()
    }
}
