use crate::channel::CodeChannel;
use crate::error::ProtocolError;
use crate::kind::PacketKind;
use crate::wire::{read_string, read_u16, read_u32, read_u8, write_string};

/// The 8-byte header that precedes every packet body in a transfer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// The packet kind tag (see [`PacketKind`]).
    pub request: u16,
    /// Correlation id, meaningful for request/reply pairs.
    pub id: u16,
    /// Length in bytes of the body that follows.
    pub length: u16,
    /// Id of a packet to selectively resend, or 0 when not a resend request.
    pub resend_packet_id: u16,
}

/// Size in bytes of [`PacketHeader`] on the wire.
pub const PACKET_HEADER_SIZE: usize = 8;

impl PacketHeader {
    fn to_bytes(self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.request.to_le_bytes());
        buf[2..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.length.to_le_bytes());
        buf[6..8].copy_from_slice(&self.resend_packet_id.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            request: u16::from_le_bytes([buf[0], buf[1]]),
            id: u16::from_le_bytes([buf[2], buf[3]]),
            length: u16::from_le_bytes([buf[4], buf[5]]),
            resend_packet_id: u16::from_le_bytes([buf[6], buf[7]]),
        }
    }
}

/// A decoded packet paired with the correlation fields from its header.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub id: u16,
    pub resend_packet_id: u16,
    pub packet: Packet,
}

/// The tagged union of packet bodies exchanged over the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Host -> firmware
    Code { channel: CodeChannel, text: String },
    GetObjectModel { key: String, flags: String },
    SetObjectModelValue { key: String, value: String },
    PrintStarted { filename: String },
    PrintStopped,
    MacroCompleted { channel: CodeChannel, error: bool },
    ResetAll,
    Ack,
    Reply { content: String },
    LockMovementAndWaitForStandstill { channel: CodeChannel },
    Unlock { channel: CodeChannel },
    StartPlugin { name: String },
    SetPrintFileInfo { raw_json: String },
    EvaluateExpression { channel: CodeChannel, expression: String },

    // Firmware -> host
    ObjectModel { json: String },
    CodeBufferUpdate { channel: CodeChannel, space: u32 },
    CodeReply { channel: CodeChannel, content: String, flags: u16 },
    MacroRequest { channel: CodeChannel, filename: String, from_code: bool },
    AbortFile { channel: CodeChannel, abort_all: bool },
    PrintPaused { file_position: u32, reason: u8 },
    Message { message_type: u16, content: String },
    ExecuteMacro { channel: CodeChannel, filename: String },
    ResourceLocked { channel: CodeChannel },
    FileChunkRequest { filename: String, offset: u32, max_length: u32 },
    EvaluationResult { result: String },
    DoCode { channel: CodeChannel, code: String },
    /// The macro file backing the channel's topmost frame has reached EOF.
    MacroFileClosed { channel: CodeChannel },
    /// The firmware has acknowledged our `MacroCompleted` for this channel;
    /// the frame may now pop.
    MacroCompletedAck { channel: CodeChannel },
}

impl Packet {
    /// The wire kind tag for this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Code { .. } => PacketKind::Code,
            Packet::GetObjectModel { .. } => PacketKind::GetObjectModel,
            Packet::SetObjectModelValue { .. } => PacketKind::SetObjectModelValue,
            Packet::PrintStarted { .. } => PacketKind::PrintStarted,
            Packet::PrintStopped => PacketKind::PrintStopped,
            Packet::MacroCompleted { .. } => PacketKind::MacroCompleted,
            Packet::ResetAll => PacketKind::ResetAll,
            Packet::Ack => PacketKind::Ack,
            Packet::Reply { .. } => PacketKind::Reply,
            Packet::LockMovementAndWaitForStandstill { .. } => {
                PacketKind::LockMovementAndWaitForStandstill
            }
            Packet::Unlock { .. } => PacketKind::Unlock,
            Packet::StartPlugin { .. } => PacketKind::StartPlugin,
            Packet::SetPrintFileInfo { .. } => PacketKind::SetPrintFileInfo,
            Packet::EvaluateExpression { .. } => PacketKind::EvaluateExpression,
            Packet::ObjectModel { .. } => PacketKind::ObjectModel,
            Packet::CodeBufferUpdate { .. } => PacketKind::CodeBufferUpdate,
            Packet::CodeReply { .. } => PacketKind::CodeReply,
            Packet::MacroRequest { .. } => PacketKind::MacroRequest,
            Packet::AbortFile { .. } => PacketKind::AbortFile,
            Packet::PrintPaused { .. } => PacketKind::PrintPaused,
            Packet::Message { .. } => PacketKind::Message,
            Packet::ExecuteMacro { .. } => PacketKind::ExecuteMacro,
            Packet::ResourceLocked { .. } => PacketKind::ResourceLocked,
            Packet::FileChunkRequest { .. } => PacketKind::FileChunkRequest,
            Packet::EvaluationResult { .. } => PacketKind::EvaluationResult,
            Packet::DoCode { .. } => PacketKind::DoCode,
            Packet::MacroFileClosed { .. } => PacketKind::MacroFileClosed,
            Packet::MacroCompletedAck { .. } => PacketKind::MacroCompletedAck,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            Packet::Code { channel, text } => {
                buf.push(channel.to_wire());
                write_string(buf, text);
            }
            Packet::GetObjectModel { key, flags } => {
                write_string(buf, key);
                write_string(buf, flags);
            }
            Packet::SetObjectModelValue { key, value } => {
                write_string(buf, key);
                write_string(buf, value);
            }
            Packet::PrintStarted { filename } => write_string(buf, filename),
            Packet::PrintStopped | Packet::ResetAll | Packet::Ack => {}
            Packet::MacroCompleted { channel, error } => {
                buf.push(channel.to_wire());
                buf.push(*error as u8);
            }
            Packet::Reply { content } => write_string(buf, content),
            Packet::LockMovementAndWaitForStandstill { channel } => buf.push(channel.to_wire()),
            Packet::Unlock { channel } => buf.push(channel.to_wire()),
            Packet::StartPlugin { name } => write_string(buf, name),
            Packet::SetPrintFileInfo { raw_json } => write_string(buf, raw_json),
            Packet::EvaluateExpression { channel, expression } => {
                buf.push(channel.to_wire());
                write_string(buf, expression);
            }
            Packet::ObjectModel { json } => write_string(buf, json),
            Packet::CodeBufferUpdate { channel, space } => {
                buf.push(channel.to_wire());
                buf.extend_from_slice(&space.to_le_bytes());
            }
            Packet::CodeReply { channel, content, flags } => {
                buf.push(channel.to_wire());
                buf.extend_from_slice(&flags.to_le_bytes());
                write_string(buf, content);
            }
            Packet::MacroRequest { channel, filename, from_code } => {
                buf.push(channel.to_wire());
                buf.push(*from_code as u8);
                write_string(buf, filename);
            }
            Packet::AbortFile { channel, abort_all } => {
                buf.push(channel.to_wire());
                buf.push(*abort_all as u8);
            }
            Packet::PrintPaused { file_position, reason } => {
                buf.extend_from_slice(&file_position.to_le_bytes());
                buf.push(*reason);
            }
            Packet::Message { message_type, content } => {
                buf.extend_from_slice(&message_type.to_le_bytes());
                write_string(buf, content);
            }
            Packet::ExecuteMacro { channel, filename } => {
                buf.push(channel.to_wire());
                write_string(buf, filename);
            }
            Packet::ResourceLocked { channel } => buf.push(channel.to_wire()),
            Packet::FileChunkRequest { filename, offset, max_length } => {
                buf.extend_from_slice(&offset.to_le_bytes());
                buf.extend_from_slice(&max_length.to_le_bytes());
                write_string(buf, filename);
            }
            Packet::EvaluationResult { result } => write_string(buf, result),
            Packet::DoCode { channel, code } => {
                buf.push(channel.to_wire());
                write_string(buf, code);
            }
            Packet::MacroFileClosed { channel } => buf.push(channel.to_wire()),
            Packet::MacroCompletedAck { channel } => buf.push(channel.to_wire()),
        }
    }

    fn decode_body(kind: PacketKind, body: &[u8]) -> Result<Packet, ProtocolError> {
        let mut pos = 0usize;
        let need = |n: usize, pos: usize| -> Result<(), ProtocolError> {
            if body.len() < pos + n {
                Err(ProtocolError::MalformedBody {
                    kind,
                    reason: "body shorter than fixed fields require",
                })
            } else {
                Ok(())
            }
        };
        Ok(match kind {
            PacketKind::Code => {
                need(1, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let text = read_string(body, &mut pos)?;
                Packet::Code { channel, text }
            }
            PacketKind::GetObjectModel => {
                let key = read_string(body, &mut pos)?;
                let flags = read_string(body, &mut pos)?;
                Packet::GetObjectModel { key, flags }
            }
            PacketKind::SetObjectModelValue => {
                let key = read_string(body, &mut pos)?;
                let value = read_string(body, &mut pos)?;
                Packet::SetObjectModelValue { key, value }
            }
            PacketKind::PrintStarted => Packet::PrintStarted {
                filename: read_string(body, &mut pos)?,
            },
            PacketKind::PrintStopped => Packet::PrintStopped,
            PacketKind::MacroCompleted => {
                need(2, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let error = read_u8(body, &mut pos) != 0;
                Packet::MacroCompleted { channel, error }
            }
            PacketKind::ResetAll => Packet::ResetAll,
            PacketKind::Ack => Packet::Ack,
            PacketKind::Reply => Packet::Reply {
                content: read_string(body, &mut pos)?,
            },
            PacketKind::LockMovementAndWaitForStandstill => {
                need(1, pos)?;
                Packet::LockMovementAndWaitForStandstill {
                    channel: CodeChannel::from_wire(read_u8(body, &mut pos)),
                }
            }
            PacketKind::Unlock => {
                need(1, pos)?;
                Packet::Unlock {
                    channel: CodeChannel::from_wire(read_u8(body, &mut pos)),
                }
            }
            PacketKind::StartPlugin => Packet::StartPlugin {
                name: read_string(body, &mut pos)?,
            },
            PacketKind::SetPrintFileInfo => Packet::SetPrintFileInfo {
                raw_json: read_string(body, &mut pos)?,
            },
            PacketKind::EvaluateExpression => {
                need(1, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let expression = read_string(body, &mut pos)?;
                Packet::EvaluateExpression { channel, expression }
            }
            PacketKind::ObjectModel => Packet::ObjectModel {
                json: read_string(body, &mut pos)?,
            },
            PacketKind::CodeBufferUpdate => {
                need(5, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let space = read_u32(body, &mut pos);
                Packet::CodeBufferUpdate { channel, space }
            }
            PacketKind::CodeReply => {
                need(3, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let flags = read_u16(body, &mut pos);
                let content = read_string(body, &mut pos)?;
                Packet::CodeReply { channel, content, flags }
            }
            PacketKind::MacroRequest => {
                need(2, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let from_code = read_u8(body, &mut pos) != 0;
                let filename = read_string(body, &mut pos)?;
                Packet::MacroRequest { channel, filename, from_code }
            }
            PacketKind::AbortFile => {
                need(2, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let abort_all = read_u8(body, &mut pos) != 0;
                Packet::AbortFile { channel, abort_all }
            }
            PacketKind::PrintPaused => {
                need(5, pos)?;
                let file_position = read_u32(body, &mut pos);
                let reason = read_u8(body, &mut pos);
                Packet::PrintPaused { file_position, reason }
            }
            PacketKind::Message => {
                need(2, pos)?;
                let message_type = read_u16(body, &mut pos);
                let content = read_string(body, &mut pos)?;
                Packet::Message { message_type, content }
            }
            PacketKind::ExecuteMacro => {
                need(1, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let filename = read_string(body, &mut pos)?;
                Packet::ExecuteMacro { channel, filename }
            }
            PacketKind::ResourceLocked => {
                need(1, pos)?;
                Packet::ResourceLocked {
                    channel: CodeChannel::from_wire(read_u8(body, &mut pos)),
                }
            }
            PacketKind::FileChunkRequest => {
                need(8, pos)?;
                let offset = read_u32(body, &mut pos);
                let max_length = read_u32(body, &mut pos);
                let filename = read_string(body, &mut pos)?;
                Packet::FileChunkRequest { filename, offset, max_length }
            }
            PacketKind::EvaluationResult => Packet::EvaluationResult {
                result: read_string(body, &mut pos)?,
            },
            PacketKind::DoCode => {
                need(1, pos)?;
                let channel = CodeChannel::from_wire(read_u8(body, &mut pos));
                let code = read_string(body, &mut pos)?;
                Packet::DoCode { channel, code }
            }
            PacketKind::MacroFileClosed => {
                need(1, pos)?;
                Packet::MacroFileClosed {
                    channel: CodeChannel::from_wire(read_u8(body, &mut pos)),
                }
            }
            PacketKind::MacroCompletedAck => {
                need(1, pos)?;
                Packet::MacroCompletedAck {
                    channel: CodeChannel::from_wire(read_u8(body, &mut pos)),
                }
            }
        })
    }
}

/// Encode `packet` as `PacketHeader + body` and append it to `buf`, as long
/// as the result fits within `capacity` total bytes. On failure `buf` is
/// left unmodified so the caller can defer the packet to the next cycle.
pub fn encode_packet(
    packet: &Packet,
    id: u16,
    resend_packet_id: u16,
    buf: &mut Vec<u8>,
    capacity: usize,
) -> Result<(), ProtocolError> {
    let mut body = Vec::new();
    packet.encode_body(&mut body);
    let pad = (4 - body.len() % 4) % 4;
    let total = PACKET_HEADER_SIZE + body.len() + pad;
    if buf.len() + total > capacity {
        return Err(ProtocolError::BufferFull(total, capacity - buf.len()));
    }

    let header = PacketHeader {
        request: packet.kind().to_wire(),
        id,
        length: body.len() as u16,
        resend_packet_id,
    };
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(&body);
    buf.extend(std::iter::repeat(0u8).take(pad));
    Ok(())
}

/// Decode every packet in `payload`.
///
/// Per the framing rules, a packet header whose `length` exceeds the
/// remaining payload bytes means the whole payload is corrupt (the caller
/// should request a resend); an unrecognized packet kind is logged and
/// skipped by its declared length instead of failing the batch.
pub fn decode_packets(payload: &[u8]) -> Result<Vec<DecodedPacket>, ProtocolError> {
    let mut packets = Vec::new();
    let mut pos = 0usize;

    while pos < payload.len() {
        if payload.len() - pos < PACKET_HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader(payload.len() - pos));
        }
        let header = PacketHeader::from_bytes(&payload[pos..pos + PACKET_HEADER_SIZE]);
        pos += PACKET_HEADER_SIZE;

        let body_len = header.length as usize;
        if payload.len() - pos < body_len {
            return Err(ProtocolError::TruncatedPacket {
                claimed: body_len,
                remaining: payload.len() - pos,
            });
        }
        let body = &payload[pos..pos + body_len];
        let pad = (4 - body_len % 4) % 4;
        pos += body_len + pad.min(payload.len() - pos - body_len);

        match PacketKind::from_wire(header.request) {
            Some(kind) => {
                let packet = Packet::decode_body(kind, body)?;
                packets.push(DecodedPacket {
                    id: header.id,
                    resend_packet_id: header.resend_packet_id,
                    packet,
                });
            }
            None => {
                log::warn!("skipping unknown packet kind {} ({} bytes)", header.request, body_len);
            }
        }
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let mut buf = Vec::new();
        encode_packet(&packet, 7, 0, &mut buf, 2048).unwrap();
        assert_eq!(buf.len() % 4, 0);
        let decoded = decode_packets(&buf).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, 7);
        assert_eq!(decoded[0].packet, packet);
    }

    #[test]
    fn round_trips_representative_variants() {
        round_trip(Packet::Code {
            channel: CodeChannel::Http,
            text: "G0 X10".to_string(),
        });
        round_trip(Packet::ResetAll);
        round_trip(Packet::Ack);
        round_trip(Packet::CodeReply {
            channel: CodeChannel::File,
            content: "ok".to_string(),
            flags: 0x1,
        });
        round_trip(Packet::MacroRequest {
            channel: CodeChannel::Daemon,
            filename: "homeall.g".to_string(),
            from_code: true,
        });
        round_trip(Packet::FileChunkRequest {
            filename: "print.gcode".to_string(),
            offset: 4096,
            max_length: 2048,
        });
        round_trip(Packet::MacroFileClosed { channel: CodeChannel::File });
        round_trip(Packet::MacroCompletedAck { channel: CodeChannel::File });
    }

    #[test]
    fn multiple_packets_in_one_payload() {
        let mut buf = Vec::new();
        encode_packet(&Packet::Ack, 1, 0, &mut buf, 2048).unwrap();
        encode_packet(
            &Packet::Reply { content: "done".to_string() },
            2,
            0,
            &mut buf,
            2048,
        )
        .unwrap();
        let decoded = decode_packets(&buf).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].packet, Packet::Ack);
        assert_eq!(decoded[1].id, 2);
    }

    #[test]
    fn encode_respects_capacity() {
        let mut buf = vec![0u8; 2044];
        let err = encode_packet(&Packet::Ack, 1, 0, &mut buf, 2048).unwrap_err();
        assert!(matches!(err, ProtocolError::BufferFull(_, _)));
        assert_eq!(buf.len(), 2044, "buffer must be left untouched on failure");
    }

    #[test]
    fn truncated_packet_reports_whole_payload_corrupt() {
        let mut buf = Vec::new();
        encode_packet(
            &Packet::Reply { content: "hello".to_string() },
            1,
            0,
            &mut buf,
            2048,
        )
        .unwrap();
        buf.truncate(buf.len() - 2);
        assert!(decode_packets(&buf).is_err());
    }

    #[test]
    fn unknown_kind_is_skipped_not_fatal() {
        let mut buf = Vec::new();
        let header = PacketHeader {
            request: 9999,
            id: 1,
            length: 4,
            resend_packet_id: 0,
        };
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        encode_packet(&Packet::Ack, 2, 0, &mut buf, 2048).unwrap();

        let decoded = decode_packets(&buf).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].packet, Packet::Ack);
    }
}
