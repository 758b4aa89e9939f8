use crate::frame::FrameKind;

/// A single unit of the reliability protocol.
///
/// A frame is what one SLIP-delimited run of bytes decodes to once the
/// header and checksum have been validated. Data and fin frames consume a
/// sequence number; pure acknowledgments do not.
///
/// Any frame may carry a cumulative acknowledgment in `ack`. For `Data` and
/// `Fin` frames this is a piggybacked acknowledgment of the reverse
/// direction; for `Ack` frames it is the whole point of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The role of the frame on the wire.
    pub kind: FrameKind,

    /// Sequence number of a `Data` or `Fin` frame.
    ///
    /// Wraps modulo 2^32. Ignored (and encoded as zero) for pure
    /// acknowledgments.
    pub seq: u32,

    /// Cumulative acknowledgment: every frame before this sequence number
    /// has been received by the peer sending it.
    pub ack: Option<u32>,

    /// Application bytes. Always empty for `Ack` and `Fin` frames.
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn data(seq: u32, ack: Option<u32>, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Data,
            seq,
            ack,
            payload,
        }
    }

    pub fn fin(seq: u32, ack: Option<u32>) -> Self {
        Self {
            kind: FrameKind::Fin,
            seq,
            ack,
            payload: Vec::new(),
        }
    }

    pub fn ack(ack: u32) -> Self {
        Self {
            kind: FrameKind::Ack,
            seq: 0,
            ack: Some(ack),
            payload: Vec::new(),
        }
    }

    /// `true` for frames that occupy a sequence number and must be acknowledged.
    pub fn is_sequenced(&self) -> bool {
        self.kind.is_sequenced()
    }
}
