//! The top-level loop driving the transport, routing decoded packets to
//! channels and external collaborators, and filling the next tx payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rrf_channel::{Channel, LockRequestKind};
use rrf_protocol::{decode_packets, encode_packet, DecodedPacket, Packet};
use rrf_transport::{DataTransfer, ReadyPin, SpiBus, TransferOutcome};

use crate::context::CoreContext;
use crate::error::CoreError;

/// A packet body is never allowed to consume more than this much of the tx
/// buffer in one go; used as a conservative pre-check before popping a
/// channel's queued work, so an over-budget packet is deferred to the next
/// cycle instead of being silently dropped.
const MAX_SINGLE_PACKET_ESTIMATE: usize = 512;

pub struct Processor<B, R> {
    transfer: DataTransfer<B, R>,
    context: Arc<CoreContext>,
    next_packet_id: u16,
    shutdown_requested: Arc<AtomicBool>,
}

impl<B, R> Processor<B, R>
where
    B: SpiBus,
    R: ReadyPin,
{
    pub fn new(transfer: DataTransfer<B, R>, context: Arc<CoreContext>) -> Self {
        Self {
            transfer,
            context,
            next_packet_id: 0,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shared flag that, once set, makes `run` stop after its current
    /// cycle: it cancels every outstanding waiter and sends a final
    /// `ResetAll` packet before returning. Clone this before calling `run`
    /// so a signal handler elsewhere can request a clean shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown_requested.clone()
    }

    /// Exchange protocol-version bytes with the firmware until it's
    /// accepted or `timeout` elapses, backing off exponentially between
    /// attempts (starting at 100ms, capped at 2s). A version mismatch
    /// surfaces as repeated `TransferOutcome::PeerReset` from the
    /// transport; persisting past `timeout` means the firmware build is
    /// incompatible, not merely slow to respond.
    pub fn handshake(&mut self, timeout: Duration) -> Result<(), CoreError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Duration::from_millis(100);
        loop {
            match self.transfer.perform_full_transfer()? {
                TransferOutcome::Success => {
                    info!("firmware accepted our protocol version");
                    return Ok(());
                }
                TransferOutcome::Fatal => return Err(CoreError::Fatal),
                TransferOutcome::PeerReset => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::FirmwareIncompatible);
                    }
                    warn!("firmware did not accept our protocol version yet, retrying in {backoff:?}");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
            }
        }
    }

    /// Run cycles forever until a fatal transfer error ends the loop. Each
    /// cycle blocks on GPIO/SPI I/O, so callers running inside an async
    /// runtime should drive this from `tokio::task::spawn_blocking`.
    pub fn run(&mut self) -> Result<(), CoreError> {
        loop {
            if self.shutdown_requested.load(Ordering::Relaxed) {
                self.shutdown();
                return Ok(());
            }
            self.run_once()?;
        }
    }

    /// Cancel every outstanding waiter and send a final `ResetAll` packet.
    /// Best-effort: a transport failure here is logged, not propagated,
    /// since the daemon is already on its way down.
    fn shutdown(&mut self) {
        info!("shutting down: cancelling outstanding waiters and sending a final reset");
        self.context.channels.invalidate_all();
        let mut budget = self.transfer.tx_remaining();
        self.send_packet(&Packet::ResetAll, &mut budget);
        if let Err(e) = self.transfer.perform_full_transfer() {
            warn!("final reset transfer failed: {e}");
        }
    }

    /// One `performFullTransfer -> decode -> route -> fill tx` cycle.
    pub fn run_once(&mut self) -> Result<(), CoreError> {
        let outcome = self.transfer.perform_full_transfer()?;
        match outcome {
            TransferOutcome::PeerReset => {
                warn!("peer reset observed; reinitializing all channels");
                self.context.channels.reinitialize_all();
                return Ok(());
            }
            TransferOutcome::Fatal => return Err(CoreError::Fatal),
            TransferOutcome::Success => {}
        }

        let packets = decode_packets(self.transfer.rx_payload())?;
        for decoded in packets {
            self.route(decoded);
        }

        self.fill_tx_payload();
        Ok(())
    }

    fn route(&mut self, decoded: DecodedPacket) {
        match decoded.packet {
            Packet::ObjectModel { json } => self.context.object_model_sink.apply_patch(&json),
            Packet::Message { message_type, content } => {
                self.context.message_sink.message(message_type, &content)
            }
            Packet::CodeReply { channel, content, flags } => {
                if let Err(e) = self.context.channels.get(channel).on_reply(decoded.id, content, flags) {
                    warn!("channel {channel:?}: {e}");
                }
            }
            Packet::MacroRequest { channel, filename, from_code } => {
                self.context.channels.get(channel).on_macro_request(filename, from_code);
            }
            Packet::AbortFile { channel, abort_all } => {
                self.context.channels.get(channel).on_abort_file(abort_all);
            }
            Packet::ResourceLocked { channel } => {
                self.context.channels.get(channel).on_resource_locked();
            }
            Packet::CodeBufferUpdate { channel, space } => {
                debug!("channel {channel:?} buffer space: {space}");
            }
            Packet::FileChunkRequest { filename, offset, max_length } => {
                debug!("firmware requested chunk of {filename} at {offset} (max {max_length})");
            }
            Packet::EvaluationResult { result } => {
                debug!("expression evaluation result: {result}");
            }
            Packet::ExecuteMacro { channel, filename } => {
                self.context.channels.get(channel).on_macro_request(filename, true);
            }
            Packet::PrintPaused { file_position, reason } => {
                debug!("print paused at {file_position} (reason {reason})");
            }
            Packet::DoCode { channel, code } => {
                debug!("firmware asked channel {channel:?} to execute: {code}");
            }
            Packet::MacroFileClosed { channel } => {
                self.context.channels.get(channel).mark_macro_eof();
            }
            Packet::MacroCompletedAck { channel } => {
                self.context.channels.get(channel).ack_macro_completed();
            }
            other => {
                debug!("unrouted inbound packet: {other:?}");
            }
        }
    }

    fn fill_tx_payload(&mut self) {
        let mut budget = self.transfer.tx_remaining();

        // Snapshot the channel handles first: `send_packet*` needs `&mut
        // self`, which would otherwise conflict with the immutable borrow
        // `self.context.channels.iter()` holds for the loop's lifetime.
        let channels: Vec<Arc<Channel>> = self.context.channels.iter().cloned().collect();

        for channel in &channels {
            if let Some(kind) = channel.next_lock_request() {
                let packet = match kind {
                    LockRequestKind::Lock => {
                        Packet::LockMovementAndWaitForStandstill { channel: channel.id() }
                    }
                    LockRequestKind::Unlock => Packet::Unlock { channel: channel.id() },
                };
                self.send_packet(&packet, &mut budget);
            }

            if channel.try_begin_macro_completed() {
                // The frame only pops once `MacroCompletedAck` is routed back
                // from the firmware (see `route`), not on this send.
                self.send_packet(
                    &Packet::MacroCompleted { channel: channel.id(), error: false },
                    &mut budget,
                );
            }

            while budget > MAX_SINGLE_PACKET_ESTIMATE && channel.has_work() {
                let Some((id, code)) = channel.next_request() else { break };
                let packet = Packet::Code { channel: channel.id(), text: code.to_text() };
                self.send_packet_with_id(&packet, id, &mut budget);
            }
        }
    }

    fn send_packet(&mut self, packet: &Packet, budget: &mut usize) {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        self.send_packet_with_id(packet, id, budget);
    }

    fn send_packet_with_id(&mut self, packet: &Packet, id: u16, budget: &mut usize) {
        let mut bytes = Vec::new();
        if encode_packet(packet, id, 0, &mut bytes, usize::MAX).is_ok() {
            if self.transfer.push_tx(&bytes) {
                *budget = self.transfer.tx_remaining();
            } else {
                warn!("dropping packet {:?}: does not fit in the tx buffer this cycle", packet.kind());
            }
        }
    }
}
