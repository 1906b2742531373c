//! The IPC-facing handle. Producer tasks (the Unix-socket command server)
//! call through here; every call suspends the caller on a [`Waiter`], never
//! the Processor task.

use std::sync::Arc;

use rrf_channel::{Code, CodeResult, Waiter};
use rrf_protocol::CodeChannel;

use crate::context::CoreContext;

/// A cheap, cloneable reference to the running core, handed to each IPC
/// connection.
#[derive(Clone)]
pub struct CoreHandle {
    context: Arc<CoreContext>,
}

impl CoreHandle {
    pub fn new(context: Arc<CoreContext>) -> Self {
        Self { context }
    }

    /// Enqueue `code` on `channel` and await its reply.
    pub fn push_code(&self, channel: CodeChannel, code: Code) -> Waiter<CodeResult> {
        self.context.channels.get(channel).push(code).1
    }

    /// Flush `channel`, optionally waiting for its file-stream buffers to
    /// drain too.
    pub fn flush(&self, channel: CodeChannel, sync_file_streams: bool) -> Waiter<bool> {
        self.context.channels.get(channel).flush(sync_file_streams)
    }

    /// Acquire the global motion lock on behalf of `channel`.
    pub fn lock_movement(&self, channel: CodeChannel) -> Waiter<()> {
        self.context.channels.get(channel).lock()
    }

    /// Release the global motion lock held on behalf of `channel`.
    pub fn unlock_movement(&self, channel: CodeChannel) -> Waiter<()> {
        self.context.channels.get(channel).unlock()
    }

    /// Diagnostics for every channel, keyed by channel id — surfaced over
    /// IPC for status/debugging.
    pub fn diagnostics(&self) -> Vec<(CodeChannel, rrf_channel::ChannelStats)> {
        self.context
            .channels
            .iter()
            .map(|c| (c.id(), c.diagnostics()))
            .collect()
    }
}
