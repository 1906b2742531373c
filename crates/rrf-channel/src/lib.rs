//! Per-channel execution-frame stack, queues, and waiters.
//!
//! Each [`Channel`] is an independent execution context (HTTP, File, USB,
//! …) with its own stack of [`Frame`]s reflecting nested macros and
//! conditional blocks. Producers (IPC handlers, HTTP handlers) call
//! `push`/`flush`/`lock` and suspend on the returned [`Waiter`]; only the
//! Processor task ever resolves a waiter, by calling the `on_*` callbacks
//! as it routes decoded packets. The channel's internal state is guarded by
//! a single mutex whose critical sections never span an `.await`.

mod channel;
mod code;
mod error;
mod frame;
mod waiter;

pub use channel::{Channel, ChannelStats};
pub use code::{Code, CodeFlags, CodeParameter, CodeResult};
pub use error::ChannelError;
pub use frame::{Frame, FlushRequest, LockRequest, LockRequestKind, MacroInfo, OutstandingCode};
pub use waiter::{waiter_pair, Completer, Waiter};
