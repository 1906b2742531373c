//! Typed packet encode/decode for the SBC/RRF SPI wire protocol.
//!
//! A transfer payload is a sequence of packets, each a fixed [`PacketHeader`]
//! followed by a kind-specific, 4-byte-aligned body. [`encode_packet`] and
//! [`decode_packets`] implement the framing rules: a truncated header or a
//! body whose claimed length runs past the end of the payload means the
//! whole payload is corrupt (propagated as an error so the caller can
//! request a resend); an unrecognized packet kind is logged and skipped by
//! its declared length rather than failing the batch.

mod channel;
mod error;
mod kind;
mod packet;
mod wire;

pub use channel::{CodeChannel, ALL_CHANNELS};
pub use error::ProtocolError;
pub use kind::PacketKind;
pub use packet::{decode_packets, encode_packet, DecodedPacket, Packet, PacketHeader, PACKET_HEADER_SIZE};
