//! Receive side of the ARQ protocol.
//!
//! [`Receiver`] consumes decoded frames in arrival order and turns them into
//! an in-order byte stream for the application:
//!
//! - frames at the next expected sequence number are delivered, together
//!   with any consecutive frames already waiting in the reorder buffer;
//! - frames a little ahead (less than one window) are held back;
//! - duplicates of delivered frames are dropped and re-acknowledged, since
//!   the peer evidently missed the earlier acknowledgment;
//! - anything further ahead cannot come from a correct peer and fails the
//!   connection.
//!
//! Every sequenced frame results in a scheduled cumulative acknowledgment.

use crate::arq::{Sender, WireEmit, seq_space};
use crate::frame::{Frame, FrameKind};
use crate::reliability::{LayerState, Lifecycle, ProtocolViolation, ReliabilityError};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct ReceiverState {
    next_expected: u32,
    reorder: BTreeMap<u32, Frame>, // Early frames keyed by sequence number
    delivered: VecDeque<u8>,       // In-order payload not yet read
    fin_received: bool,
}

pub struct Receiver<E>
where
    E: WireEmit,
{
    window_size: usize,
    lifecycle: Arc<Lifecycle>,
    sender: Arc<Sender<E>>,
    state: Mutex<ReceiverState>,
    data_available: Condvar,
}

impl<E> Receiver<E>
where
    E: WireEmit,
{
    pub fn new(window_size: usize, lifecycle: Arc<Lifecycle>, sender: Arc<Sender<E>>) -> Self {
        Self {
            window_size,
            lifecycle,
            sender,
            state: Mutex::new(ReceiverState {
                next_expected: 0,
                reorder: BTreeMap::new(),
                delivered: VecDeque::new(),
                fin_received: false,
            }),
            data_available: Condvar::new(),
        }
    }

    /// Handles one decoded frame.
    ///
    /// Errors are fatal for the connection; the caller is expected to
    /// invalidate it.
    pub fn on_frame_decoded(&self, frame: Frame) -> Result<(), ReliabilityError> {
        if let Some(ack) = frame.ack {
            self.sender.on_ack_received(ack)?;
        }

        if !frame.is_sequenced() {
            return Ok(());
        }

        // Decided under the receive lock, scheduled after releasing it
        let ack = {
            let mut state = self.lock_state();
            let seq = frame.seq;
            let distance = seq_space::distance(state.next_expected, seq);

            if distance == 0 {
                self.deliver(&mut state, frame)?;

                while let Some(next) = {
                    let key = state.next_expected;
                    state.reorder.remove(&key)
                } {
                    self.deliver(&mut state, next)?;
                }

                self.data_available.notify_all();
            } else if seq_space::is_before(seq, state.next_expected) {
                tracing::trace!(
                    "Duplicate frame {} (expecting {}), re-acknowledging",
                    seq,
                    state.next_expected
                );
            } else if (distance as usize) < self.window_size {
                tracing::trace!(
                    "Buffering early frame {} (expecting {})",
                    seq,
                    state.next_expected
                );
                state.reorder.entry(seq).or_insert(frame);
            } else {
                return Err(ProtocolViolation::SequenceOutOfWindow {
                    seq,
                    expected: state.next_expected,
                }
                .into());
            }

            state.next_expected
        };

        self.sender.schedule_ack(ack)
    }

    /// Copies delivered bytes into `buf`, blocking until some are available.
    ///
    /// Returns `Ok(0)` at end of stream: after the peer's fin, or once the
    /// layer is invalidated and everything buffered has been read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, ReliabilityError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock_state();

        loop {
            if !state.delivered.is_empty() {
                let n = buf.len().min(state.delivered.len());
                for (dst, src) in buf[..n].iter_mut().zip(state.delivered.drain(..n)) {
                    *dst = src;
                }
                return Ok(n);
            }

            if state.fin_received {
                return Ok(0);
            }

            match self.lifecycle.state() {
                LayerState::Created => return Err(ReliabilityError::NotInitialized),
                LayerState::Invalidated => return Ok(0),
                LayerState::Initialized => {}
            }

            state = self
                .data_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wakes every blocked reader so it can observe end of stream.
    pub fn invalidate(&self) {
        let _state = self.lock_state();
        self.data_available.notify_all();
    }

    pub fn next_expected(&self) -> u32 {
        self.lock_state().next_expected
    }

    /// Delivered bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.lock_state().delivered.len()
    }

    /// Early frames held back until the gap before them closes.
    pub fn reordered(&self) -> usize {
        self.lock_state().reorder.len()
    }

    pub fn is_fin_received(&self) -> bool {
        self.lock_state().fin_received
    }

    fn deliver(&self, state: &mut ReceiverState, frame: Frame) -> Result<(), ReliabilityError> {
        if state.fin_received {
            return Err(ProtocolViolation::DataAfterFin { seq: frame.seq }.into());
        }

        match frame.kind {
            FrameKind::Data => state.delivered.extend(frame.payload),
            FrameKind::Fin => {
                tracing::debug!("Peer finished its stream at {}", frame.seq);
                state.fin_received = true;
            }
            FrameKind::Ack => {}
        }

        state.next_expected = state.next_expected.wrapping_add(1);
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arq::WireCommand;
    use crate::frame::{FrameCodec, SlipDecoder};
    use crate::reliability::{CloseReason, ReliabilityConfig};
    use rand::seq::SliceRandom;
    use std::thread;
    use std::time::Duration;

    type Recorded = Arc<Mutex<Vec<WireCommand>>>;

    const WINDOW: usize = 4;

    fn receiver() -> (Arc<Receiver<impl WireEmit>>, Recorded, Arc<Lifecycle>) {
        let config = ReliabilityConfig::default().with_window_size(WINDOW);
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.mark_initialized().expect("init");

        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        let emit = move |command: WireCommand| -> Result<(), ReliabilityError> {
            sink.lock().unwrap().push(command);
            Ok(())
        };

        let sender = Arc::new(Sender::new(&config, Arc::clone(&lifecycle), emit));
        let receiver = Arc::new(Receiver::new(WINDOW, Arc::clone(&lifecycle), sender));

        (receiver, recorded, lifecycle)
    }

    fn data(seq: u32, payload: &[u8]) -> Frame {
        Frame::data(seq, None, payload.to_vec())
    }

    fn read_all_available(receiver: &Receiver<impl WireEmit>) -> Vec<u8> {
        let mut out = vec![0u8; receiver.available()];
        let n = receiver.read(&mut out).unwrap();
        out.truncate(n);
        out
    }

    /// Acknowledgment the writer thread would send next.
    fn flushed_ack(receiver: &Receiver<impl WireEmit>) -> Option<u32> {
        let wire = receiver.sender.take_standalone_ack()?;
        let mut decoder = SlipDecoder::new(usize::MAX);
        let body = decoder.read_bytes(&wire).next()?.ok()?;
        FrameCodec::decode(&body).ok()?.ack
    }

    #[test]
    fn delivers_in_order_frame_and_acknowledges() {
        let (receiver, recorded, _) = receiver();

        receiver.on_frame_decoded(data(0, b"hello")).unwrap();

        assert_eq!(receiver.next_expected(), 1);
        assert_eq!(read_all_available(&receiver), b"hello");
        assert_eq!(flushed_ack(&receiver), Some(1));
        assert!(recorded.lock().unwrap().contains(&WireCommand::FlushAck));
    }

    #[test]
    fn duplicate_is_reacknowledged_not_redelivered() {
        let (receiver, _, _) = receiver();

        receiver.on_frame_decoded(data(0, b"a")).unwrap();
        receiver.on_frame_decoded(data(1, b"b")).unwrap();
        assert_eq!(flushed_ack(&receiver), Some(2));

        // Peer lost our ack and sent 1 again
        receiver.on_frame_decoded(data(1, b"b")).unwrap();

        assert_eq!(flushed_ack(&receiver), Some(2));
        assert_eq!(read_all_available(&receiver), b"ab");
        assert_eq!(receiver.next_expected(), 2);
    }

    #[test]
    fn early_frames_wait_for_the_gap() {
        let (receiver, _, _) = receiver();

        receiver.on_frame_decoded(data(2, b"c")).unwrap();
        receiver.on_frame_decoded(data(1, b"b")).unwrap();
        assert_eq!(receiver.available(), 0);
        assert_eq!(receiver.reordered(), 2);
        assert_eq!(flushed_ack(&receiver), Some(0));

        receiver.on_frame_decoded(data(0, b"a")).unwrap();
        assert_eq!(receiver.reordered(), 0);
        assert_eq!(read_all_available(&receiver), b"abc");
        assert_eq!(flushed_ack(&receiver), Some(3));
    }

    #[test]
    fn frame_beyond_window_is_violation() {
        let (receiver, _, _) = receiver();

        let err = receiver
            .on_frame_decoded(data(WINDOW as u32, b"far"))
            .unwrap_err();

        assert!(matches!(
            err,
            ReliabilityError::Protocol(ProtocolViolation::SequenceOutOfWindow {
                seq: 4,
                expected: 0
            })
        ));
    }

    #[test]
    fn delivery_crosses_sequence_wrap() {
        let (receiver, _, _) = receiver();
        receiver.lock_state().next_expected = u32::MAX - 1;

        receiver.on_frame_decoded(data(0, b"c")).unwrap();
        receiver.on_frame_decoded(data(u32::MAX, b"b")).unwrap();
        assert_eq!(receiver.available(), 0);
        assert_eq!(receiver.reordered(), 2);

        receiver.on_frame_decoded(data(u32::MAX - 1, b"a")).unwrap();
        receiver.on_frame_decoded(data(u32::MAX - 1, b"a")).unwrap();

        assert_eq!(read_all_available(&receiver), b"abc");
        assert_eq!(receiver.next_expected(), 1);
        assert_eq!(receiver.reordered(), 0);
        assert_eq!(flushed_ack(&receiver), Some(1));
    }

    #[test]
    fn window_check_crosses_sequence_wrap() {
        let (receiver, _, _) = receiver();
        receiver.lock_state().next_expected = u32::MAX - 1;

        let far = (u32::MAX - 1).wrapping_add(WINDOW as u32);
        let err = receiver.on_frame_decoded(data(far, b"far")).unwrap_err();

        assert!(matches!(
            err,
            ReliabilityError::Protocol(ProtocolViolation::SequenceOutOfWindow {
                seq: 2,
                expected,
            }) if expected == u32::MAX - 1
        ));

        // One short of the window edge is still buffered
        receiver.on_frame_decoded(data(far.wrapping_sub(1), b"near")).unwrap();
        assert_eq!(receiver.reordered(), 1);
    }

    #[test]
    fn shuffled_and_duplicated_arrivals_deliver_exactly_once_in_order() {
        let (receiver, _, _) = receiver();
        let mut rng = rand::rng();

        let payloads: Vec<Vec<u8>> = (0..40u8).map(|i| vec![i; (i % 5 + 1) as usize]).collect();
        let expected: Vec<u8> = payloads.iter().flatten().copied().collect();

        // Feed window-sized batches in random order, each frame up to three times
        for (batch_index, batch) in payloads.chunks(WINDOW).enumerate() {
            let base = (batch_index * WINDOW) as u32;
            let mut arrivals: Vec<Frame> = batch
                .iter()
                .enumerate()
                .flat_map(|(i, payload)| {
                    let copies = 1 + (i % 3);
                    std::iter::repeat_n(data(base + i as u32, payload), copies)
                })
                .collect();
            arrivals.shuffle(&mut rng);

            for frame in arrivals {
                receiver.on_frame_decoded(frame).unwrap();
            }
        }

        assert_eq!(read_all_available(&receiver), expected);
        assert_eq!(receiver.next_expected(), 40);
    }

    #[test]
    fn fin_ends_stream_after_buffered_data() {
        let (receiver, _, _) = receiver();

        receiver.on_frame_decoded(data(0, b"bye")).unwrap();
        receiver.on_frame_decoded(Frame::fin(1, None)).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(receiver.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"bye");
        assert_eq!(receiver.read(&mut buf).unwrap(), 0);
        assert!(receiver.is_fin_received());
    }

    #[test]
    fn data_after_fin_is_violation() {
        let (receiver, _, _) = receiver();

        receiver.on_frame_decoded(Frame::fin(0, None)).unwrap();
        let err = receiver.on_frame_decoded(data(1, b"x")).unwrap_err();

        assert!(matches!(
            err,
            ReliabilityError::Protocol(ProtocolViolation::DataAfterFin { seq: 1 })
        ));
    }

    #[test]
    fn piggybacked_ack_reaches_sender() {
        let (receiver, _, _) = receiver();
        receiver.sender.write(b"out").unwrap();
        assert_eq!(receiver.sender.in_flight(), 1);

        receiver
            .on_frame_decoded(Frame::data(0, Some(1), b"in".to_vec()))
            .unwrap();

        assert_eq!(receiver.sender.in_flight(), 0);
        assert_eq!(read_all_available(&receiver), b"in");
    }

    #[test]
    fn blocked_reader_wakes_on_delivery() {
        let (receiver, _, _) = receiver();

        let reader = {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                let n = receiver.read(&mut buf).unwrap();
                buf[..n].to_vec()
            })
        };

        thread::sleep(Duration::from_millis(20));
        receiver.on_frame_decoded(data(0, b"wake")).unwrap();

        assert_eq!(reader.join().unwrap(), b"wake");
    }

    #[test]
    fn blocked_reader_sees_eof_on_invalidation() {
        let (receiver, _, lifecycle) = receiver();

        let reader = {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                receiver.read(&mut buf)
            })
        };

        thread::sleep(Duration::from_millis(20));
        lifecycle.invalidate(CloseReason::LocalClose);
        receiver.invalidate();

        assert_eq!(reader.join().unwrap().unwrap(), 0);
    }
}
