use rrf_protocol::CodeChannel;

/// A single `letter=value` code parameter, e.g. `X` in `G0 X10`.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeParameter {
    pub letter: char,
    pub value: String,
}

bitflags::bitflags! {
    /// Flags describing how a [`Code`] should be evaluated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CodeFlags: u8 {
        /// At least one parameter value is an `{expression}` to evaluate,
        /// not a literal.
        const HAS_EXPRESSION = 0b0000_0001;
        /// Generated internally (e.g. by a macro) rather than received from
        /// an external source.
        const IS_INTERNAL    = 0b0000_0010;
        /// Part of a conditional block (`if`/`while`) body.
        const IS_CONDITIONAL = 0b0000_0100;
    }
}

/// A parsed G/M/T-code ready to hand to the firmware.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub letter: char,
    pub major_number: i32,
    pub minor_number: Option<u8>,
    pub parameters: Vec<CodeParameter>,
    pub channel: CodeChannel,
    pub file_position: Option<u64>,
    pub flags: CodeFlags,
}

impl Code {
    /// Look up a parameter's raw value by letter.
    pub fn parameter(&self, letter: char) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.letter == letter)
            .map(|p| p.value.as_str())
    }

    /// Whether this code blocks its frame on a synchronous firmware
    /// acknowledgement (e.g. `M291` with a user prompt) before the next
    /// code is handed down.
    pub fn is_synchronous_ack(&self) -> bool {
        self.letter == 'M' && self.major_number == 291
    }

    /// Reconstruct the textual G/M/T-code form sent to the firmware, e.g.
    /// `G0 X10 Y20`.
    pub fn to_text(&self) -> String {
        let mut text = format!("{}{}", self.letter, self.major_number);
        if let Some(minor) = self.minor_number {
            text.push('.');
            text.push_str(&minor.to_string());
        }
        for param in &self.parameters {
            text.push(' ');
            text.push(param.letter);
            text.push_str(&param.value);
        }
        text
    }
}

/// What became of a code after being handed to the firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeResult {
    /// A reply arrived; `flags` carries the firmware's message-type bits.
    Reply { content: String, flags: u16 },
    /// The caller's cancellation token fired before the code was handed
    /// down; it never reached the firmware.
    Cancelled,
    /// The channel was aborted (protocol violation or `onInvalidated`)
    /// while this code was outstanding.
    Aborted,
}
