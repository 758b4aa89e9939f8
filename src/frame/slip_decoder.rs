use crate::constants::{SLIP_END, SLIP_ESC, SLIP_ESC_END, SLIP_ESC_ESC};
use crate::frame::FrameDecodeError;
use std::collections::VecDeque;

/// A streaming SLIP decoder.
///
/// `SlipDecoder` accepts a continuous byte stream split at arbitrary
/// boundaries and yields the body of every complete frame it finds. The
/// partially accumulated frame, and an escape byte that ended the previous
/// chunk, carry over to the next call.
///
/// ### Behavior Summary:
/// - An `END` after a non-empty body emits the body and resets.
/// - An `END` with nothing accumulated (`END END`, or leading padding) is
///   skipped; zero-length frames are never produced.
/// - `ESC` followed by anything but `ESC_END` / `ESC_ESC` yields
///   `MalformedEscape`.
/// - A body longer than `max_frame_len` yields `FrameTooLong`.
///
/// The decoder does not try to recover after an error: the bytes of the
/// offending frame are dropped and decoding carries on, but callers are
/// expected to abandon the link.
pub struct SlipDecoder {
    buffer: Vec<u8>,   // Body of the frame being assembled
    escaped: bool,     // Previous byte was ESC
    overflowed: bool,  // Current body already reported as too long
    max_frame_len: usize,
}

pub struct SlipDecoderIterator {
    queue: VecDeque<Result<Vec<u8>, FrameDecodeError>>,
}

impl Iterator for SlipDecoderIterator {
    type Item = Result<Vec<u8>, FrameDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

impl SlipDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            escaped: false,
            overflowed: false,
            max_frame_len,
        }
    }

    /// `true` while a frame (or a dangling escape) is partially assembled.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || self.escaped
    }

    // Reads new bytes and returns every frame they complete
    pub fn read_bytes(&mut self, data: &[u8]) -> SlipDecoderIterator {
        let mut queue = VecDeque::new();

        for &byte in data {
            if self.escaped {
                self.escaped = false;

                match byte {
                    SLIP_ESC_END => self.push(SLIP_END, &mut queue),
                    SLIP_ESC_ESC => self.push(SLIP_ESC, &mut queue),
                    other => {
                        self.reset();
                        queue.push_back(Err(FrameDecodeError::MalformedEscape(other)));
                    }
                }

                continue;
            }

            match byte {
                SLIP_END => {
                    if self.overflowed {
                        self.reset();
                    } else if !self.buffer.is_empty() {
                        queue.push_back(Ok(std::mem::take(&mut self.buffer)));
                    }
                }
                SLIP_ESC => self.escaped = true,
                _ => self.push(byte, &mut queue),
            }
        }

        SlipDecoderIterator { queue }
    }

    fn push(
        &mut self,
        byte: u8,
        queue: &mut VecDeque<Result<Vec<u8>, FrameDecodeError>>,
    ) {
        if self.overflowed {
            return;
        }

        if self.buffer.len() >= self.max_frame_len {
            self.buffer.clear();
            self.overflowed = true;
            queue.push_back(Err(FrameDecodeError::FrameTooLong {
                max: self.max_frame_len,
            }));
            return;
        }

        self.buffer.push(byte);
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.escaped = false;
        self.overflowed = false;
    }
}
