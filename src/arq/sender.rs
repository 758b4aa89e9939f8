//! Send side of the ARQ protocol.
//!
//! [`Sender`] owns the window of frames that have been emitted but not yet
//! acknowledged. It is shared between three parties:
//!
//! - application writers (`write`, `finish`, `wait_until_acknowledged`),
//!   which block while the window is full or not yet drained;
//! - the read path, which feeds it acknowledgments and schedules outgoing
//!   ones;
//! - the writer thread, which drives retransmission through `tick` and
//!   collects standalone acknowledgments.
//!
//! All of its state sits behind one mutex. Frames are handed to the emitter
//! while that mutex is held, so the order of the outgoing queue always
//! matches sequence order.
//!
//! Acknowledgments are cumulative: `ack = n` retires every outstanding frame
//! before `n`.

use crate::arq::{RtoEstimator, WireCommand, WireEmit, seq_space};
use crate::frame::{Frame, FrameCodec, FrameKind, SlipEncoder};
use crate::reliability::{Lifecycle, ProtocolViolation, ReliabilityConfig, ReliabilityError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One frame occupying a window slot.
#[derive(Debug)]
struct OutstandingFrame {
    seq: u32,
    /// SLIP-encoded bytes, re-emitted verbatim on retransmission.
    wire: Vec<u8>,
    /// Transmissions so far, the first included.
    attempts: u32,
    first_sent_at: Instant,
    timeout: Duration,
    deadline: Instant,
}

#[derive(Debug)]
struct SenderState {
    next_seq: u32,
    window: VecDeque<OutstandingFrame>,
    rto: RtoEstimator,
    /// Acknowledgment waiting to be piggybacked or flushed on its own.
    pending_ack: Option<u32>,
    /// A `FlushAck` is already on the queue.
    ack_flush_requested: bool,
    finished: bool,
}

impl SenderState {
    /// Oldest unacknowledged sequence number (`next_seq` when idle).
    fn send_base(&self) -> u32 {
        self.window.front().map_or(self.next_seq, |entry| entry.seq)
    }
}

pub struct Sender<E>
where
    E: WireEmit,
{
    window_size: usize,
    max_payload_len: usize,
    max_rto: Duration,
    max_attempts: u32,
    lifecycle: Arc<Lifecycle>,
    state: Mutex<SenderState>,
    window_changed: Condvar,
    emit: E,
}

impl<E> Sender<E>
where
    E: WireEmit,
{
    pub fn new(config: &ReliabilityConfig, lifecycle: Arc<Lifecycle>, emit: E) -> Self {
        Self {
            window_size: config.window_size,
            max_payload_len: config.max_payload_len,
            max_rto: config.max_rto,
            max_attempts: config.max_attempts,
            lifecycle,
            state: Mutex::new(SenderState {
                next_seq: 0,
                window: VecDeque::with_capacity(config.window_size),
                rto: RtoEstimator::new(config.initial_rto, config.min_rto, config.max_rto),
                pending_ack: None,
                ack_flush_requested: false,
                finished: false,
            }),
            window_changed: Condvar::new(),
            emit,
        }
    }

    /// Segments `data` into data frames and emits them, blocking whenever
    /// the window is full.
    ///
    /// Returns the number of bytes accepted. When a later chunk fails after
    /// earlier ones were queued, the short count is returned and the error
    /// surfaces on the next call.
    pub fn write(&self, data: &[u8]) -> Result<usize, ReliabilityError> {
        self.lifecycle.ensure_valid()?;

        let mut written = 0;
        for chunk in data.chunks(self.max_payload_len) {
            if let Err(err) = self.send_sequenced(FrameKind::Data, chunk.to_vec()) {
                if written == 0 {
                    return Err(err);
                }
                tracing::debug!("Short write of {} bytes: {}", written, err);
                break;
            }
            written += chunk.len();
        }

        Ok(written)
    }

    /// Sends the fin frame closing this direction of the stream.
    ///
    /// Calling it again is a no-op.
    pub fn finish(&self) -> Result<(), ReliabilityError> {
        self.lifecycle.ensure_valid()?;

        if self.lock_state().finished {
            return Ok(());
        }

        self.send_sequenced(FrameKind::Fin, Vec::new())
    }

    /// Blocks until every emitted frame has been acknowledged.
    pub fn wait_until_acknowledged(&self) -> Result<(), ReliabilityError> {
        let mut state = self.lock_state();

        loop {
            self.lifecycle.ensure_valid()?;

            if state.window.is_empty() {
                return Ok(());
            }

            state = self
                .window_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Processes a cumulative acknowledgment and returns how many frames it
    /// retired.
    ///
    /// Stale acknowledgments (behind the window) are ignored; one covering
    /// frames never sent is a protocol violation.
    pub fn on_ack_received(&self, ack: u32) -> Result<usize, ReliabilityError> {
        let mut state = self.lock_state();

        if seq_space::is_before(ack, state.send_base()) {
            tracing::trace!("Ignoring stale ack {}", ack);
            return Ok(0);
        }

        if seq_space::is_before(state.next_seq, ack) {
            return Err(ProtocolViolation::AckOutOfRange {
                ack,
                next_seq: state.next_seq,
            }
            .into());
        }

        let now = Instant::now();
        let mut retired = 0;
        let mut rtt_sample = None;

        while state
            .window
            .front()
            .is_some_and(|entry| seq_space::is_before(entry.seq, ack))
        {
            if let Some(entry) = state.window.pop_front() {
                // Karn: only frames sent exactly once give an unambiguous RTT
                if entry.attempts == 1 {
                    rtt_sample = Some(now.duration_since(entry.first_sent_at));
                }
                retired += 1;
            }
        }

        if let Some(sample) = rtt_sample {
            state.rto.record_rtt_sample(sample);
        }

        if retired > 0 {
            tracing::trace!("Ack {} retired {} frame(s)", ack, retired);
            self.window_changed.notify_all();
        }

        Ok(retired)
    }

    /// Re-emits every frame whose deadline has passed, doubling its timeout.
    ///
    /// Returns the number of frames retransmitted. A frame that has already
    /// used all of its attempts fails the whole connection.
    pub fn tick(&self, now: Instant) -> Result<usize, ReliabilityError> {
        let mut state = self.lock_state();
        let mut retransmitted = 0;

        for entry in state.window.iter_mut() {
            if entry.deadline > now {
                continue;
            }

            if entry.attempts >= self.max_attempts {
                return Err(ProtocolViolation::RetransmitLimitExceeded {
                    seq: entry.seq,
                    attempts: entry.attempts,
                }
                .into());
            }

            entry.attempts += 1;
            entry.timeout = entry.timeout.saturating_mul(2).min(self.max_rto);
            entry.deadline = now + entry.timeout;

            tracing::debug!(
                "Retransmitting frame {} (attempt {}, next timeout {:?})",
                entry.seq,
                entry.attempts,
                entry.timeout
            );

            (self.emit)(WireCommand::Frame(entry.wire.clone()))?;
            retransmitted += 1;
        }

        if retransmitted > 0 {
            state.rto.back_off();
        }

        Ok(retransmitted)
    }

    /// Records `ack` as the acknowledgment to send next and asks the writer
    /// thread to flush it, unless a flush is already queued.
    pub fn schedule_ack(&self, ack: u32) -> Result<(), ReliabilityError> {
        let mut state = self.lock_state();
        state.pending_ack = Some(ack);

        if state.ack_flush_requested {
            return Ok(());
        }

        state.ack_flush_requested = true;
        (self.emit)(WireCommand::FlushAck)
    }

    /// Takes the pending acknowledgment as an encoded standalone ack frame.
    ///
    /// Returns `None` when a data frame already carried it.
    pub fn take_standalone_ack(&self) -> Option<Vec<u8>> {
        let mut state = self.lock_state();
        state.ack_flush_requested = false;

        state
            .pending_ack
            .take()
            .map(|ack| SlipEncoder::encode(&FrameCodec::encode(&Frame::ack(ack))))
    }

    /// Wakes every thread blocked on window space or acknowledgment.
    pub fn invalidate(&self) {
        let _state = self.lock_state();
        self.window_changed.notify_all();
    }

    pub fn in_flight(&self) -> usize {
        self.lock_state().window.len()
    }

    pub fn next_seq(&self) -> u32 {
        self.lock_state().next_seq
    }

    pub fn current_rto(&self) -> Duration {
        self.lock_state().rto.current_rto()
    }

    pub fn is_finished(&self) -> bool {
        self.lock_state().finished
    }

    fn send_sequenced(&self, kind: FrameKind, payload: Vec<u8>) -> Result<(), ReliabilityError> {
        let mut state = self.lock_state();

        loop {
            self.lifecycle.ensure_valid()?;

            if state.finished {
                // A concurrent `finish` may have got there first
                return match kind {
                    FrameKind::Fin => Ok(()),
                    _ => Err(ReliabilityError::WriteAfterFinish),
                };
            }

            if state.window.len() < self.window_size {
                break;
            }

            state = self
                .window_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let seq = state.next_seq;
        let frame = Frame {
            kind,
            seq,
            ack: state.pending_ack.take(),
            payload,
        };
        let wire = SlipEncoder::encode(&FrameCodec::encode(&frame));

        let now = Instant::now();
        let timeout = state.rto.current_rto();

        state.window.push_back(OutstandingFrame {
            seq,
            wire: wire.clone(),
            attempts: 1,
            first_sent_at: now,
            timeout,
            deadline: now + timeout,
        });
        state.next_seq = seq.wrapping_add(1);

        if kind == FrameKind::Fin {
            state.finished = true;
        }

        tracing::trace!(
            "Sending {:?} frame {} ({} payload bytes, ack {:?})",
            kind,
            seq,
            frame.payload.len(),
            frame.ack
        );

        (self.emit)(WireCommand::Frame(wire))
    }

    fn lock_state(&self) -> MutexGuard<'_, SenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
