use thiserror::Error;

/// Errors from encoding or decoding a single packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet body of {0} bytes does not fit in the {1} bytes remaining in the buffer")]
    BufferFull(usize, usize),

    #[error("packet claims a length of {claimed} bytes but only {remaining} remain in the payload")]
    TruncatedPacket { claimed: usize, remaining: usize },

    #[error("payload is shorter than a packet header ({0} bytes remaining)")]
    TruncatedHeader(usize),

    #[error("string field claims a length of {claimed} bytes but only {remaining} remain in the packet body")]
    TruncatedString { claimed: usize, remaining: usize },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("{kind:?} packet body is malformed: {reason}")]
    MalformedBody { kind: super::PacketKind, reason: &'static str },
}
