use crate::constants::{SLIP_END, SLIP_ESC, SLIP_ESC_END, SLIP_ESC_ESC};

/// Wraps frame bytes in SLIP delimiters (RFC 1055).
///
/// The output starts and ends with `END`. Any `END` or `ESC` inside the
/// body is replaced by a two-byte escape sequence, so the delimiter never
/// appears anywhere else. The leading `END` flushes whatever line noise the
/// peer's decoder may have accumulated since the previous frame.
pub struct SlipEncoder;

impl SlipEncoder {
    pub fn encode(frame_bytes: &[u8]) -> Vec<u8> {
        // Worst case every byte needs escaping
        let mut buf = Vec::with_capacity(frame_bytes.len() * 2 + 2);

        buf.push(SLIP_END);

        for &byte in frame_bytes {
            match byte {
                SLIP_END => buf.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
                SLIP_ESC => buf.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                _ => buf.push(byte),
            }
        }

        buf.push(SLIP_END);

        buf
    }
}
