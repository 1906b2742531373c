/// Packet kind tag. Host-to-firmware kinds occupy `1..=14`; firmware-to-host
/// kinds occupy `101..=112`. The two ranges never overlap, which lets a
/// decoder sanity-check direction without extra bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketKind {
    // Host -> firmware
    Code = 1,
    GetObjectModel = 2,
    SetObjectModelValue = 3,
    PrintStarted = 4,
    PrintStopped = 5,
    MacroCompleted = 6,
    ResetAll = 7,
    Ack = 8,
    Reply = 9,
    LockMovementAndWaitForStandstill = 10,
    Unlock = 11,
    StartPlugin = 12,
    SetPrintFileInfo = 13,
    EvaluateExpression = 14,

    // Firmware -> host
    ObjectModel = 101,
    CodeBufferUpdate = 102,
    CodeReply = 103,
    MacroRequest = 104,
    AbortFile = 105,
    PrintPaused = 106,
    Message = 107,
    ExecuteMacro = 108,
    ResourceLocked = 109,
    FileChunkRequest = 110,
    EvaluationResult = 111,
    DoCode = 112,
    MacroFileClosed = 113,
    MacroCompletedAck = 114,
}

impl PacketKind {
    /// Decode a wire tag, returning `None` for a tag this build does not
    /// recognize. The caller skips the packet body by its declared length
    /// rather than failing the whole payload.
    pub fn from_wire(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => Self::Code,
            2 => Self::GetObjectModel,
            3 => Self::SetObjectModelValue,
            4 => Self::PrintStarted,
            5 => Self::PrintStopped,
            6 => Self::MacroCompleted,
            7 => Self::ResetAll,
            8 => Self::Ack,
            9 => Self::Reply,
            10 => Self::LockMovementAndWaitForStandstill,
            11 => Self::Unlock,
            12 => Self::StartPlugin,
            13 => Self::SetPrintFileInfo,
            14 => Self::EvaluateExpression,
            101 => Self::ObjectModel,
            102 => Self::CodeBufferUpdate,
            103 => Self::CodeReply,
            104 => Self::MacroRequest,
            105 => Self::AbortFile,
            106 => Self::PrintPaused,
            107 => Self::Message,
            108 => Self::ExecuteMacro,
            109 => Self::ResourceLocked,
            110 => Self::FileChunkRequest,
            111 => Self::EvaluationResult,
            112 => Self::DoCode,
            113 => Self::MacroFileClosed,
            114 => Self::MacroCompletedAck,
            _ => return None,
        })
    }

    /// Encode to the wire tag.
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    /// Whether this kind travels host-to-firmware (`true`) or
    /// firmware-to-host (`false`).
    pub fn is_outbound(self) -> bool {
        (self as u16) < 100
    }
}
