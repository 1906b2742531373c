use thiserror::Error;

/// Errors that abort a single channel without affecting the others.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("reply for code {got} arrived out of order (expected {expected})")]
    OutOfOrderReply { expected: u16, got: u16 },

    #[error("reply for unknown code id {0}")]
    UnknownReplyId(u16),

    #[error("channel is aborted")]
    Aborted,
}
