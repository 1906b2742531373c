use std::collections::HashMap;
use std::sync::Arc;

use rrf_channel::Channel;
use rrf_protocol::{CodeChannel, ALL_CHANNELS};

/// Receives `ObjectModel` patches decoded from the firmware.
///
/// External collaborator boundary: the object-model mirror lives outside
/// this crate and is injected at construction time rather than reached
/// through a global.
pub trait ObjectModelSink: Send + Sync {
    fn apply_patch(&self, json: &str);
}

/// Receives `Message` packets decoded from the firmware (console output,
/// warnings, errors).
pub trait MessageSink: Send + Sync {
    fn message(&self, message_type: u16, content: &str);
}

/// A [`MessageSink`] that logs through the `log` facade; the default when
/// nothing more specific is wired up.
pub struct LogMessageSink;

impl MessageSink for LogMessageSink {
    fn message(&self, message_type: u16, content: &str) {
        log::info!("firmware message (type={message_type}): {content}");
    }
}

/// An [`ObjectModelSink`] that discards patches; useful for `--no-spi` test
/// runs where nothing downstream consumes the object model yet.
pub struct NullObjectModelSink;

impl ObjectModelSink for NullObjectModelSink {
    fn apply_patch(&self, _json: &str) {}
}

/// All channels, keyed by [`CodeChannel`], constructed once at startup.
pub struct Channels {
    by_id: HashMap<CodeChannel, Arc<Channel>>,
}

impl Channels {
    pub fn new() -> Self {
        let by_id = ALL_CHANNELS
            .iter()
            .map(|&id| (id, Arc::new(Channel::new(id))))
            .collect();
        Self { by_id }
    }

    pub fn get(&self, id: CodeChannel) -> &Arc<Channel> {
        self.by_id
            .get(&id)
            .expect("Channels is constructed with every CodeChannel variant")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.by_id.values()
    }

    /// Reset every channel to a fresh base frame — called after a detected
    /// peer reset.
    pub fn reinitialize_all(&self) {
        for channel in self.iter() {
            channel.reinitialize();
        }
    }

    /// Resolve every outstanding waiter on every channel as aborted —
    /// called on an emergency-stop-style invalidation that is not a full
    /// peer reset.
    pub fn invalidate_all(&self) {
        for channel in self.iter() {
            channel.on_invalidated();
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit, constructed-once context replacing the global singletons
/// (transport, logger, config) the original design relied on.
pub struct CoreContext {
    pub channels: Channels,
    pub object_model_sink: Arc<dyn ObjectModelSink>,
    pub message_sink: Arc<dyn MessageSink>,
}

impl CoreContext {
    pub fn new(object_model_sink: Arc<dyn ObjectModelSink>, message_sink: Arc<dyn MessageSink>) -> Self {
        Self {
            channels: Channels::new(),
            object_model_sink,
            message_sink,
        }
    }
}
