//! rrfd - SPI bridge daemon connecting a Linux SBC host to RRF
//! motion-control firmware.

mod cli;
mod config;
mod ipc;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::Cli;
use config::Config;
use rrf_core::{CoreContext, CoreHandle, LogMessageSink, NullObjectModelSink, Processor};
use rrf_linux_spi::{
    LinuxReadyPin, LinuxReadyPinConfig, LinuxSpiBus, LinuxSpiConfig, LoopbackBus, LoopbackReadyPin,
};
use rrf_transport::{DataTransfer, TransferConfig};

/// Exit codes from spec §6.
mod exit {
    pub const CLEAN: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const TRANSPORT_FATAL: i32 = 2;
    pub const FIRMWARE_INCOMPATIBLE: i32 = 3;
}

fn main() {
    let cli = Cli::parse();

    let default_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            write_start_error(&format!("config error: {e}"));
            eprintln!("Error: {e}");
            std::process::exit(exit::CONFIG_ERROR);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            write_start_error(&format!("failed to start async runtime: {e}"));
            eprintln!("Error: {e}");
            std::process::exit(exit::CONFIG_ERROR);
        }
    };

    let code = runtime.block_on(run(cli, config));
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(socket_path) = &cli.socket_path {
        config.socket_path = socket_path.clone();
    }
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> i32 {
    let object_model_sink = Arc::new(NullObjectModelSink);
    let message_sink = Arc::new(LogMessageSink);
    let context = Arc::new(CoreContext::new(object_model_sink, message_sink));
    let handle = CoreHandle::new(context.clone());

    let socket_path = config.socket_path.clone();
    let ipc_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = ipc::serve(&socket_path, ipc_handle).await {
            log::error!("rrfd: ipc server stopped: {e}");
        }
    });

    let transfer_config = TransferConfig {
        protocol_version: config.protocol_version,
        ..TransferConfig::default()
    };
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    // The Processor loop blocks on GPIO/SPI I/O, so it runs on its own
    // blocking thread rather than cooperating with the async runtime.
    let run_result = if cli.no_spi {
        log::info!("rrfd: running against an in-memory loopback (--no-spi)");
        let transfer = DataTransfer::new(LoopbackReadyPin, LoopbackBus::default(), transfer_config);
        let mut processor = Processor::new(transfer, context);
        spawn_shutdown_listener(processor.shutdown_handle());
        tokio::task::spawn_blocking(move || run_processor(processor, startup_timeout))
            .await
            .expect("processor thread panicked")
    } else {
        match open_hardware_transfer(&config, transfer_config) {
            Ok(transfer) => {
                let mut processor = Processor::new(transfer, context);
                spawn_shutdown_listener(processor.shutdown_handle());
                tokio::task::spawn_blocking(move || run_processor(processor, startup_timeout))
                    .await
                    .expect("processor thread panicked")
            }
            Err(e) => {
                write_start_error(&format!("failed to open hardware: {e}"));
                log::error!("rrfd: {e}");
                return exit::CONFIG_ERROR;
            }
        }
    };

    match run_result {
        Ok(()) => exit::CLEAN,
        Err(CoreRunError::FirmwareIncompatible) => {
            write_start_error("firmware did not accept our protocol version");
            exit::FIRMWARE_INCOMPATIBLE
        }
        Err(CoreRunError::Transport(e)) => {
            write_start_error(&format!("transport error: {e}"));
            log::error!("rrfd: {e}");
            exit::TRANSPORT_FATAL
        }
    }
}

fn open_hardware_transfer(
    config: &Config,
    transfer_config: TransferConfig,
) -> Result<DataTransfer<LinuxSpiBus, LinuxReadyPin>, Box<dyn std::error::Error>> {
    let spi_config = LinuxSpiConfig::new(config.spi_device.clone())
        .with_speed(config.spi_speed_khz * 1000)
        .with_mode(config.spi_mode);
    let bus = LinuxSpiBus::open(&spi_config)?;

    let ready_config = LinuxReadyPinConfig::new(config.gpio_chip.clone(), config.gpio_ready_offset);
    let ready_pin = LinuxReadyPin::open(&ready_config)?;

    Ok(DataTransfer::new(ready_pin, bus, transfer_config))
}

enum CoreRunError {
    FirmwareIncompatible,
    Transport(rrf_core::CoreError),
}

/// Drive the handshake and then the main Processor loop on a dedicated
/// blocking thread, since both block on GPIO/SPI I/O rather than
/// cooperating with the async runtime.
fn run_processor<B, R>(
    mut processor: Processor<B, R>,
    startup_timeout: Duration,
) -> Result<(), CoreRunError>
where
    B: rrf_transport::SpiBus + Send + 'static,
    R: rrf_transport::ReadyPin + Send + 'static,
{
    processor.handshake(startup_timeout).map_err(|e| match e {
        rrf_core::CoreError::FirmwareIncompatible => CoreRunError::FirmwareIncompatible,
        other => CoreRunError::Transport(other),
    })?;
    processor.run().map_err(CoreRunError::Transport)
}

/// Install a Ctrl-C / SIGTERM listener that flips the processor's shutdown
/// flag, causing `Processor::run` to cancel outstanding waiters, send a
/// final `ResetAll`, and return cleanly after its current cycle.
fn spawn_shutdown_listener(shutdown_requested: Arc<std::sync::atomic::AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    log::warn!("rrfd: failed to install SIGTERM handler: {e}");
                    tokio::signal::ctrl_c().await.ok();
                    shutdown_requested.store(true, std::sync::atomic::Ordering::Relaxed);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
        }
        log::info!("rrfd: shutdown requested, finishing the current cycle");
        shutdown_requested.store(true, std::sync::atomic::Ordering::Relaxed);
    });
}

fn write_start_error(reason: &str) {
    let path = Path::new("/run/rrfd.start_error");
    if let Err(e) = std::fs::write(path, reason) {
        log::warn!("rrfd: failed to write start-error file: {e}");
    }
}
