use std::collections::VecDeque;

use crate::code::{Code, CodeResult};
use crate::waiter::Completer;

/// A macro (or other nested construct) bound to a [`Frame`] at push time.
/// Immutable once set, per the frame invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInfo {
    pub filename: String,
    pub from_code: bool,
}

/// Which side of a lock/unlock exchange a queued [`LockRequest`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRequestKind {
    Lock,
    Unlock,
}

/// A pending or in-flight lock/unlock ask, serialized per channel.
pub struct LockRequest {
    pub kind: LockRequestKind,
    pub completer: Completer<()>,
    /// Set once the corresponding packet has been sent, so the Processor
    /// does not resend it every cycle while awaiting the firmware's ack.
    pub sent: bool,
}

/// A queued `flush()` call, resolved once every code pushed before it (on
/// the same frame) has been acknowledged.
pub struct FlushRequest {
    pub sync_file_streams: bool,
    pub completer: Completer<bool>,
}

/// A code that has been handed to the firmware (or is about to be) and is
/// awaiting a matching reply, keyed by its correlation id.
pub struct OutstandingCode {
    pub id: u16,
    pub code: Code,
    pub completer: Completer<CodeResult>,
}

/// One level of a channel's execution stack. Depth 0 is the base frame,
/// created with the channel and never popped.
#[derive(Default)]
pub struct Frame {
    /// True while a synchronous reply (e.g. an `M291` prompt) is outstanding
    /// for this frame specifically.
    pub waiting_for_acknowledgement: bool,
    pub lock_requests: VecDeque<LockRequest>,
    /// Codes that were queued but not yet handed down when this frame was
    /// displaced by a `startCode`-triggered branch; resumed once the
    /// branch's own body fully drains. Kept as `OutstandingCode` (not bare
    /// `Code`) so the original caller's waiter survives the displacement.
    pub suspended_codes: VecDeque<OutstandingCode>,
    pub macro_info: Option<MacroInfo>,
    /// Set once the `MacroCompleted` packet has been sent to the firmware.
    pub macro_completed: bool,
    /// Set once the macro body has reached EOF (host-observed), independent
    /// of whether `MacroCompleted` has been sent or acknowledged yet.
    pub macro_eof: bool,
    pub start_code: Option<Code>,
    pub pending_codes: VecDeque<OutstandingCode>,
    pub flush_requests: VecDeque<FlushRequest>,
    /// Codes handed to the firmware from this frame, awaiting reply, kept
    /// in FIFO hand-down order so out-of-order replies can be detected.
    pub in_flight: VecDeque<OutstandingCode>,
}

impl Frame {
    pub fn base() -> Self {
        Self::default()
    }

    pub fn with_macro(start_code: Option<Code>, macro_info: MacroInfo) -> Self {
        Self {
            start_code,
            macro_info: Some(macro_info),
            ..Self::default()
        }
    }

    /// A frame is eligible to pop once its macro has signalled EOF, every
    /// code it ever queued has been replied to, and every flush waiter on
    /// it has resolved — the `macroCompleted` acknowledgement itself is
    /// tracked separately since it is also gated on the firmware ack.
    pub fn is_drained(&self) -> bool {
        self.pending_codes.is_empty()
            && self.in_flight.is_empty()
            && self.flush_requests.is_empty()
            && self.lock_requests.is_empty()
            && self.suspended_codes.is_empty()
    }

    /// Resolve every queued waiter on this frame as aborted/cancelled and
    /// empty the queues. Used for protocol violations, `onInvalidated`, and
    /// forced `AbortFile` pops.
    pub fn resolve_all_aborted(&mut self) {
        while let Some(oc) = self.pending_codes.pop_front() {
            oc.completer.complete(CodeResult::Aborted);
        }
        while let Some(oc) = self.in_flight.pop_front() {
            oc.completer.complete(CodeResult::Aborted);
        }
        while let Some(oc) = self.suspended_codes.pop_front() {
            oc.completer.complete(CodeResult::Aborted);
        }
        while let Some(req) = self.flush_requests.pop_front() {
            req.completer.complete(false);
        }
        while let Some(req) = self.lock_requests.pop_front() {
            // Locks have no "aborted" value distinct from resolving; the
            // caller observes it via the channel's aborted state instead.
            drop(req.completer);
        }
    }
}
