//! Linux spidev-backed [`SpiBus`].

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use rrf_transport::SpiBus;

use crate::error::{LinuxSpiError, SpiResult};

/// SPI mode constants (CPOL/CPHA).
pub mod mode {
    pub const MODE_0: u8 = 0;
    pub const MODE_1: u8 = 1;
    pub const MODE_2: u8 = 2;
    pub const MODE_3: u8 = 3;
}

mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(spi_ioc_transfer)])
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Configuration for opening a `/dev/spidevX.Y` device.
#[derive(Debug, Clone)]
pub struct LinuxSpiConfig {
    pub device: String,
    pub speed_hz: u32,
    pub mode: u8,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            speed_hz: 8_000_000,
            mode: mode::MODE_0,
        }
    }
}

impl LinuxSpiConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }
}

/// [`SpiBus`] implementation against a Linux spidev character device.
pub struct LinuxSpiBus {
    file: std::fs::File,
    speed_hz: u32,
}

impl LinuxSpiBus {
    pub fn open(config: &LinuxSpiConfig) -> SpiResult<Self> {
        log::debug!("rrf-linux-spi: opening {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(Path::new(&config.device))
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;
        let fd = file.as_raw_fd();

        let mode = config.mode;
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        let speed = config.speed_hz;
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| LinuxSpiError::SetSpeedFailed {
                speed,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        log::info!(
            "rrf-linux-spi: opened {} (mode={}, speed={} kHz)",
            config.device,
            mode,
            speed / 1000
        );

        Ok(Self { file, speed_hz: speed })
    }
}

impl SpiBus for LinuxSpiBus {
    type Error = LinuxSpiError;

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> SpiResult<()> {
        if tx.len() != rx.len() {
            return Err(LinuxSpiError::LengthMismatch { tx: tx.len(), rx: rx.len() });
        }
        if tx.is_empty() {
            return Ok(());
        }

        let fd = self.file.as_raw_fd();
        let xfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: self.speed_hz,
            delay_usecs: 0,
            bits_per_word: 8,
            cs_change: 0,
            tx_nbits: 0,
            rx_nbits: 0,
            word_delay_usecs: 0,
            _pad: 0,
        };

        let ret = unsafe { libc::ioctl(fd, ioctl::spi_ioc_message(1), &xfer as *const SpiIocTransfer) };
        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}
