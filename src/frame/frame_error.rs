use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    /// An escape byte was followed by something other than a valid substitute.
    #[error("malformed escape sequence: 0x{0:02X} after escape byte")]
    MalformedEscape(u8),

    /// A frame body grew past the configured maximum before its delimiter.
    #[error("frame exceeds maximum length of {max} bytes")]
    FrameTooLong { max: usize },

    /// Not enough bytes for the header and checksum.
    #[error("frame of {len} bytes is shorter than the minimum frame size")]
    Truncated { len: usize },

    #[error("checksum mismatch (expected 0x{expected:08X}, computed 0x{computed:08X})")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("unknown frame kind byte 0x{0:02X}")]
    UnknownKind(u8),

    /// A pure acknowledgment arrived without its ack field flagged.
    #[error("ack frame without an acknowledgment number")]
    MissingAck,

    /// An ack or fin frame carried payload bytes.
    #[error("{len} unexpected payload bytes on a control frame")]
    UnexpectedPayload { len: usize },
}

impl FrameDecodeError {
    /// Errors raised by the SLIP layer itself; these mean the byte stream
    /// can no longer be trusted and the connection must be torn down.
    ///
    /// The remaining variants are caught on a well-delimited frame and are
    /// treated like line noise.
    pub fn is_framing_violation(&self) -> bool {
        matches!(
            self,
            FrameDecodeError::MalformedEscape(_) | FrameDecodeError::FrameTooLong { .. }
        )
    }
}
