/// A logical code-execution context. Each channel is fully independent at
/// the transport level; there are around a dozen of them in a typical
/// firmware build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodeChannel {
    Http = 0,
    Telnet = 1,
    File = 2,
    Usb = 3,
    Aux = 4,
    Daemon = 5,
    Trigger = 6,
    Queue = 7,
    Lcd = 8,
    Sbc = 9,
    AutoPause = 10,
    Unknown = 11,
}

/// All channels, in wire-tag order. Useful for round-robin iteration.
pub const ALL_CHANNELS: [CodeChannel; 12] = [
    CodeChannel::Http,
    CodeChannel::Telnet,
    CodeChannel::File,
    CodeChannel::Usb,
    CodeChannel::Aux,
    CodeChannel::Daemon,
    CodeChannel::Trigger,
    CodeChannel::Queue,
    CodeChannel::Lcd,
    CodeChannel::Sbc,
    CodeChannel::AutoPause,
    CodeChannel::Unknown,
];

impl CodeChannel {
    /// Decode a wire tag, falling back to `Unknown` rather than failing —
    /// an unrecognized channel tag should not corrupt the rest of the
    /// packet stream.
    pub fn from_wire(tag: u8) -> Self {
        match tag {
            0 => Self::Http,
            1 => Self::Telnet,
            2 => Self::File,
            3 => Self::Usb,
            4 => Self::Aux,
            5 => Self::Daemon,
            6 => Self::Trigger,
            7 => Self::Queue,
            8 => Self::Lcd,
            9 => Self::Sbc,
            10 => Self::AutoPause,
            _ => Self::Unknown,
        }
    }

    /// Encode to the wire tag.
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}
