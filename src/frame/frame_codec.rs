use crate::{
    constants::{
        FRAME_ACK_OFFSET, FRAME_ACK_PRESENT_FLAG, FRAME_CHECKSUM_SIZE, FRAME_HEADER_SIZE,
        FRAME_KIND_MASK, FRAME_KIND_OFFSET, FRAME_MIN_SIZE, FRAME_SEQ_OFFSET,
    },
    frame::{Frame, FrameDecodeError, FrameKind},
};

/// Serializes frames to the bytes carried inside one SLIP frame and back.
///
/// Layout (big endian):
///
/// ```text
/// +------+---------+---------+-----------------+----------+
/// | kind | seq u32 | ack u32 | payload ...     | crc32    |
/// +------+---------+---------+-----------------+----------+
/// ```
///
/// The low nibble of `kind` is the [`FrameKind`]; bit `0x80` marks the ack
/// field as meaningful. The CRC-32 covers everything before it, so a frame
/// damaged by line noise is rejected instead of being delivered.
pub struct FrameCodec;

impl FrameCodec {
    pub fn encode(frame: &Frame) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(FRAME_HEADER_SIZE + frame.payload.len() + FRAME_CHECKSUM_SIZE);

        let mut kind_byte = frame.kind as u8;
        if frame.ack.is_some() {
            kind_byte |= FRAME_ACK_PRESENT_FLAG;
        }

        buf.push(kind_byte);
        buf.extend(&frame.seq.to_be_bytes());
        buf.extend(&frame.ack.unwrap_or(0).to_be_bytes());
        buf.extend(&frame.payload);

        let checksum = crc32fast::hash(&buf);
        buf.extend(&checksum.to_be_bytes());

        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Frame, FrameDecodeError> {
        if buf.len() < FRAME_MIN_SIZE {
            return Err(FrameDecodeError::Truncated { len: buf.len() });
        }

        let (body, trailer) = buf.split_at(buf.len() - FRAME_CHECKSUM_SIZE);

        let expected = read_u32(trailer, 0);
        let computed = crc32fast::hash(body);
        if expected != computed {
            return Err(FrameDecodeError::ChecksumMismatch { expected, computed });
        }

        let kind_byte = body[FRAME_KIND_OFFSET];
        if kind_byte & !(FRAME_KIND_MASK | FRAME_ACK_PRESENT_FLAG) != 0 {
            return Err(FrameDecodeError::UnknownKind(kind_byte));
        }

        let kind = FrameKind::try_from(kind_byte & FRAME_KIND_MASK)
            .map_err(|_| FrameDecodeError::UnknownKind(kind_byte))?;
        let has_ack = kind_byte & FRAME_ACK_PRESENT_FLAG != 0;

        let seq = read_u32(body, FRAME_SEQ_OFFSET);
        let ack = has_ack.then(|| read_u32(body, FRAME_ACK_OFFSET));
        let payload = &body[FRAME_HEADER_SIZE..];

        match kind {
            FrameKind::Ack if !has_ack => return Err(FrameDecodeError::MissingAck),
            FrameKind::Ack | FrameKind::Fin if !payload.is_empty() => {
                return Err(FrameDecodeError::UnexpectedPayload { len: payload.len() });
            }
            _ => {}
        }

        Ok(Frame {
            kind,
            seq,
            ack,
            payload: payload.to_vec(),
        })
    }
}

/// Callers guarantee `buf` holds at least `offset + 4` bytes.
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}
