use crossbeam_channel::unbounded;
use modemlink::frame::{Frame, FrameCodec, FrameKind, SlipDecoder};
use modemlink::{
    CloseReason, LayerState, ProtocolViolation, ReadHandler, ReliabilityConfig, ReliabilityError,
    ReliabilityLayer, WriteHandler,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const WINDOW: usize = 4;
const PAYLOAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Pass,
    Drop,
    Duplicate,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> ReliabilityConfig {
    ReliabilityConfig::default()
        .with_window_size(WINDOW)
        .with_max_payload_len(PAYLOAD)
        .with_initial_rto(Duration::from_millis(50))
        .with_rto_bounds(Duration::from_millis(10), Duration::from_millis(200))
        .with_max_attempts(20)
        .with_tick_interval(Duration::from_millis(5))
}

fn pass() -> impl FnMut(&Frame) -> Delivery + Send + 'static {
    |_: &Frame| Delivery::Pass
}

/// Outbound channel that hands every frame to `peer`, subject to `filter`,
/// from a separate thread the way a physical line would.
fn line_to<F>(peer: Arc<ReliabilityLayer>, mut filter: F) -> (impl WriteHandler, JoinHandle<()>)
where
    F: FnMut(&Frame) -> Delivery + Send + 'static,
{
    let (tx, rx) = unbounded::<Vec<u8>>();

    let pump = thread::spawn(move || {
        for bytes in rx {
            if peer.handle_read(&bytes).is_err() {
                break;
            }
        }
    });

    let mut inspector = SlipDecoder::new(usize::MAX);
    let channel = move |bytes: &[u8]| -> io::Result<()> {
        let frame = inspector
            .read_bytes(bytes)
            .next()
            .and_then(|body| body.ok())
            .and_then(|body| FrameCodec::decode(&body).ok())
            .expect("layer wrote an undecodable frame");

        // The far end may already be gone
        match filter(&frame) {
            Delivery::Pass => {
                let _ = tx.send(bytes.to_vec());
            }
            Delivery::Duplicate => {
                let _ = tx.send(bytes.to_vec());
                let _ = tx.send(bytes.to_vec());
            }
            Delivery::Drop => {}
        }
        Ok(())
    };

    (channel, pump)
}

struct Link {
    a: Arc<ReliabilityLayer>,
    b: Arc<ReliabilityLayer>,
    pumps: Vec<JoinHandle<()>>,
}

impl Link {
    fn connect<F, G>(config: ReliabilityConfig, a_to_b: F, b_to_a: G) -> Self
    where
        F: FnMut(&Frame) -> Delivery + Send + 'static,
        G: FnMut(&Frame) -> Delivery + Send + 'static,
    {
        init_tracing();

        let a = Arc::new(ReliabilityLayer::new(config.clone()).unwrap());
        let b = Arc::new(ReliabilityLayer::new(config).unwrap());

        let (a_out, pump_to_b) = line_to(Arc::clone(&b), a_to_b);
        let (b_out, pump_to_a) = line_to(Arc::clone(&a), b_to_a);

        a.init(a_out).unwrap();
        b.init(b_out).unwrap();

        Self {
            a,
            b,
            pumps: vec![pump_to_b, pump_to_a],
        }
    }

    fn shutdown(self) {
        self.a.shutdown();
        self.b.shutdown();
        for pump in self.pumps {
            pump.join().expect("pump panicked");
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn read_n(layer: &ReliabilityLayer, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    layer.reader().read_exact(&mut buf).unwrap();
    buf
}

#[test]
fn simple_exchange() {
    let link = Link::connect(test_config(), pass(), pass());

    link.a.writer().write_all(b"hello").unwrap();
    assert_eq!(read_n(&link.b, 5), b"hello");

    link.b.writer().write_all(b"world").unwrap();
    assert_eq!(read_n(&link.a, 5), b"world");

    let mut writer = link.a.writer();
    writer.flush().unwrap();
    assert_eq!(link.a.in_flight(), 0);

    link.shutdown();
}

#[test]
fn lost_frame_is_retransmitted_and_delivered_once() {
    let transmissions_of_3 = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&transmissions_of_3);
    let drop_first_seq_3 = move |frame: &Frame| {
        let first_try = frame.kind == FrameKind::Data
            && frame.seq == 3
            && counter.fetch_add(1, Ordering::SeqCst) == 0;

        if first_try { Delivery::Drop } else { Delivery::Pass }
    };

    let link = Link::connect(test_config(), drop_first_seq_3, pass());
    let message: Vec<u8> = (0..6 * PAYLOAD as u8).collect();

    let mut writer = link.a.writer();
    writer.write_all(&message).unwrap();
    writer.flush().unwrap();

    assert_eq!(read_n(&link.b, message.len()), message);
    assert_eq!(link.b.reader().available(), 0);
    assert!(transmissions_of_3.load(Ordering::SeqCst) >= 2);

    link.shutdown();
}

#[test]
fn duplicated_frame_is_delivered_once() {
    let duplicate_seq_2 = |frame: &Frame| {
        if frame.kind == FrameKind::Data && frame.seq == 2 {
            Delivery::Duplicate
        } else {
            Delivery::Pass
        }
    };

    let link = Link::connect(test_config(), duplicate_seq_2, pass());
    let message = b"abcdefghijklmnop";

    let mut writer = link.a.writer();
    writer.write_all(message).unwrap();
    writer.flush().unwrap();

    assert_eq!(read_n(&link.b, message.len()), message);
    assert_eq!(link.b.reader().available(), 0);
    assert!(link.b.is_valid());

    link.shutdown();
}

#[test]
fn random_loss_in_both_directions() {
    let lossy = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        move |_: &Frame| match rng.random_range(0..10) {
            0 | 1 => Delivery::Drop,
            2 => Delivery::Duplicate,
            _ => Delivery::Pass,
        }
    };

    let config = test_config().with_max_attempts(50);
    let link = Link::connect(config, lossy(7), lossy(11));

    let outbound: Vec<u8> = (0..600u32).map(|i| (i * 7 % 256) as u8).collect();
    let inbound: Vec<u8> = (0..400u32).map(|i| (i * 13 % 256) as u8).collect();

    let sender = {
        let a = Arc::clone(&link.a);
        let outbound = outbound.clone();
        thread::spawn(move || {
            let mut writer = a.writer();
            writer.write_all(&outbound).unwrap();
            writer.flush().unwrap();
        })
    };

    let mut b_writer = link.b.writer();
    b_writer.write_all(&inbound).unwrap();

    assert_eq!(read_n(&link.b, outbound.len()), outbound);
    assert_eq!(read_n(&link.a, inbound.len()), inbound);

    b_writer.flush().unwrap();
    sender.join().unwrap();

    link.shutdown();
}

#[test]
fn writer_blocks_on_full_window() {
    let black_hole = |_: &Frame| Delivery::Drop;
    let config = test_config()
        .with_initial_rto(Duration::from_secs(5))
        .with_rto_bounds(Duration::from_secs(5), Duration::from_secs(10));
    let link = Link::connect(config, black_hole, pass());

    let a = Arc::clone(&link.a);
    let blocked = thread::spawn(move || a.writer().write_all(&[0u8; (WINDOW + 1) * PAYLOAD]));

    wait_until(|| link.a.in_flight() == WINDOW);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(link.a.in_flight(), WINDOW);
    assert!(!blocked.is_finished());

    link.a.invalidate();
    let err = blocked.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);

    link.shutdown();
}

#[test]
fn shutdown_releases_blocked_reader() {
    let link = Link::connect(test_config(), pass(), pass());

    let b = Arc::clone(&link.b);
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 8];
        b.reader().read(&mut buf)
    });

    thread::sleep(Duration::from_millis(50));
    link.b.shutdown();

    assert_eq!(reader.join().unwrap().unwrap(), 0);
    assert_eq!(link.b.state(), LayerState::Invalidated);

    link.shutdown();
}

#[test]
fn operations_after_invalidation() {
    let link = Link::connect(test_config(), pass(), pass());

    link.a.writer().write_all(b"kept").unwrap();
    wait_until(|| link.b.reader().available() == 4);

    link.b.invalidate();

    // Buffered data drains, then end of stream
    assert_eq!(read_n(&link.b, 4), b"kept");
    let mut buf = [0u8; 4];
    assert_eq!(link.b.reader().read(&mut buf).unwrap(), 0);

    let err = link.b.writer().write(b"late").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    assert!(matches!(
        link.b.handle_read(&[0xC0]),
        Err(ReliabilityError::ConnectionClosed)
    ));
    assert_eq!(link.b.close_reason(), Some(CloseReason::LocalClose));

    link.shutdown();
}

#[test]
fn finish_yields_end_of_stream() {
    let link = Link::connect(test_config(), pass(), pass());

    let mut writer = link.a.writer();
    writer.write_all(b"last words").unwrap();
    writer.finish().unwrap();

    let mut received = Vec::new();
    link.b.reader().read_to_end(&mut received).unwrap();
    assert_eq!(received, b"last words");

    let err = writer.write(b"more").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

    // The other direction stays open
    link.b.writer().write_all(b"still here").unwrap();
    assert_eq!(read_n(&link.a, 10), b"still here");

    link.shutdown();
}

#[test]
fn retransmit_limit_invalidates() {
    let black_hole = |_: &Frame| Delivery::Drop;
    let config = test_config()
        .with_initial_rto(Duration::from_millis(10))
        .with_rto_bounds(Duration::from_millis(10), Duration::from_millis(20))
        .with_max_attempts(3);
    let link = Link::connect(config, black_hole, pass());

    link.a.writer().write_all(b"void").unwrap();

    wait_until(|| link.a.state() == LayerState::Invalidated);
    assert_eq!(
        link.a.close_reason(),
        Some(CloseReason::Protocol(
            ProtocolViolation::RetransmitLimitExceeded { seq: 0, attempts: 3 }
        ))
    );

    link.shutdown();
}

#[test]
fn line_garbage_between_frames_is_ignored() {
    let link = Link::connect(test_config(), pass(), pass());

    // Noise followed by a frame: the decoder sees a damaged body, then a good one
    link.b.handle_read(&[0x13, 0x37, 0x42]).unwrap();
    link.a.writer().write_all(b"clean").unwrap();

    assert_eq!(read_n(&link.b, 5), b"clean");
    assert!(link.b.is_valid());

    link.shutdown();
}
