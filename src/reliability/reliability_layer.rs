use crate::arq::{Receiver, Sender, WireCommand, WireEmit};
use crate::frame::{FrameCodec, SlipDecoder};
use crate::reliability::{
    CloseReason, LayerState, Lifecycle, ProtocolViolation, ReadHandler, ReliabilityConfig,
    ReliabilityError, ReliableReader, ReliableWriter, WriteHandler,
};
use crate::utils::next_connection_id;
use crossbeam_channel::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Emitter shared by the sender and receiver halves: enqueues onto the
/// outgoing wire queue.
pub(crate) type QueueEmit = Box<dyn WireEmit>;

const WRITER_THREAD_NAME: &str = "modemlink-writer";

/// Everything the writer thread and the read path share.
struct LayerCore {
    connection_id: u32,
    config: ReliabilityConfig,
    lifecycle: Arc<Lifecycle>,
    sender: Arc<Sender<QueueEmit>>,
    receiver: Arc<Receiver<QueueEmit>>,
    decoder: Mutex<SlipDecoder>,
    queue_tx: crossbeam_channel::Sender<WireCommand>,
}

/// A reliable, ordered byte stream over an unreliable serial channel.
///
/// The layer is created detached, attached to the outbound half of the
/// channel with [`init`](Self::init), and fed inbound bytes through
/// [`ReadHandler::handle_read`]. The application talks to it through
/// [`ReliableReader`] and [`ReliableWriter`] handles.
///
/// All physical writes happen on a single writer thread owned by the
/// layer, which also drives retransmission. Any I/O failure or protocol
/// violation invalidates the layer for good; after that, writes fail and
/// reads drain what was already delivered before reporting end of stream.
///
/// Dropping the layer shuts it down.
pub struct ReliabilityLayer {
    core: Arc<LayerCore>,
    queue_rx: Mutex<Option<crossbeam_channel::Receiver<WireCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl ReliabilityLayer {
    pub fn new(config: ReliabilityConfig) -> Result<Self, ReliabilityError> {
        config.validate()?;

        let connection_id = next_connection_id();
        let lifecycle = Arc::new(Lifecycle::new());
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();

        let emit: QueueEmit = {
            let lifecycle = Arc::clone(&lifecycle);
            let queue_tx = queue_tx.clone();
            Box::new(move |command| handle_write(&lifecycle, &queue_tx, command))
        };

        let sender = Arc::new(Sender::new(&config, Arc::clone(&lifecycle), emit));
        let receiver = Arc::new(Receiver::new(
            config.window_size,
            Arc::clone(&lifecycle),
            Arc::clone(&sender),
        ));

        tracing::debug!(
            connection_id,
            window_size = config.window_size,
            max_payload_len = config.max_payload_len,
            "Created reliability layer"
        );

        Ok(Self {
            core: Arc::new(LayerCore {
                connection_id,
                decoder: Mutex::new(SlipDecoder::new(config.max_frame_len())),
                config,
                lifecycle,
                sender,
                receiver,
                queue_tx,
            }),
            queue_rx: Mutex::new(Some(queue_rx)),
            writer: Mutex::new(None),
        })
    }

    /// Attaches the outbound channel and starts the writer thread.
    pub fn init<W>(&self, channel: W) -> Result<(), ReliabilityError>
    where
        W: WriteHandler,
    {
        self.core.lifecycle.mark_initialized()?;

        let queue = lock(&self.queue_rx)
            .take()
            .ok_or(ReliabilityError::AlreadyInitialized)?;

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || core.run_writer(queue, channel));

        match spawned {
            Ok(handle) => {
                *lock(&self.writer) = Some(handle);
                tracing::info!(
                    connection_id = self.core.connection_id,
                    "Reliability layer initialized"
                );
                Ok(())
            }
            Err(err) => {
                self.core.invalidate_with(CloseReason::Io(err.kind()));
                Err(ReliabilityError::WriterThread(err))
            }
        }
    }

    /// Invalidates the layer. Blocked readers see end of stream, blocked
    /// writers fail, and the writer thread stops.
    ///
    /// Idempotent; only the first call, from here or from a failure, records
    /// a close reason.
    pub fn invalidate(&self) {
        self.core.invalidate_with(CloseReason::LocalClose);
    }

    pub fn close(&self) {
        self.invalidate();
    }

    /// Invalidates the layer and waits for the writer thread to exit.
    pub fn shutdown(&self) {
        self.invalidate();

        let Some(handle) = lock(&self.writer).take() else {
            return;
        };

        // The last handle to the layer can be dropped by the channel itself
        if handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            tracing::warn!(
                connection_id = self.core.connection_id,
                "Writer thread panicked"
            );
        }
    }

    pub fn state(&self) -> LayerState {
        self.core.lifecycle.state()
    }

    /// Why the layer was invalidated, if it has been.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.core.lifecycle.close_reason()
    }

    /// Process-unique identifier used to tag log output.
    pub fn connection_id(&self) -> u32 {
        self.core.connection_id
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.core.config
    }

    /// Frames sent but not yet acknowledged by the peer.
    pub fn in_flight(&self) -> usize {
        self.core.sender.in_flight()
    }

    pub fn reader(&self) -> ReliableReader {
        ReliableReader::new(Arc::clone(&self.core.receiver))
    }

    pub fn writer(&self) -> ReliableWriter {
        ReliableWriter::new(Arc::clone(&self.core.sender))
    }
}

impl ReadHandler for ReliabilityLayer {
    fn handle_read(&self, bytes: &[u8]) -> Result<(), ReliabilityError> {
        self.core.handle_read(bytes)
    }

    fn is_valid(&self) -> bool {
        self.core.lifecycle.is_valid()
    }

    fn invalidate_with(&self, reason: CloseReason) {
        self.core.invalidate_with(reason);
    }
}

impl Drop for ReliabilityLayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LayerCore {
    fn handle_read(&self, bytes: &[u8]) -> Result<(), ReliabilityError> {
        self.lifecycle.ensure_valid()?;

        tracing::trace!(
            connection_id = self.connection_id,
            "Read {} bytes",
            bytes.len()
        );

        let mut decoder = lock(&self.decoder);

        for body in decoder.read_bytes(bytes) {
            let body = match body {
                Ok(body) => body,
                Err(err) => return Err(self.fail(ProtocolViolation::Decode(err).into())),
            };

            let frame = match FrameCodec::decode(&body) {
                Ok(frame) => frame,
                Err(err) if err.is_framing_violation() => {
                    return Err(self.fail(ProtocolViolation::Decode(err).into()));
                }
                Err(err) => {
                    // Line noise; the peer will retransmit
                    tracing::debug!(
                        connection_id = self.connection_id,
                        "Discarding damaged frame: {}",
                        err
                    );
                    continue;
                }
            };

            tracing::trace!(
                connection_id = self.connection_id,
                "Received {:?} seq={} ack={:?} ({} bytes)",
                frame.kind,
                frame.seq,
                frame.ack,
                frame.payload.len()
            );

            self.receiver
                .on_frame_decoded(frame)
                .map_err(|err| self.fail(err))?;
        }

        Ok(())
    }

    /// Invalidates the layer if `err` is a cause of failure, and hands the
    /// error back.
    fn fail(&self, err: ReliabilityError) -> ReliabilityError {
        if let Some(reason) = err.close_reason() {
            self.invalidate_with(reason);
        }
        err
    }

    fn invalidate_with(&self, reason: CloseReason) {
        if !self.lifecycle.invalidate(reason.clone()) {
            return;
        }

        match &reason {
            CloseReason::LocalClose => tracing::info!(
                connection_id = self.connection_id,
                "Reliability layer closed"
            ),
            other => tracing::warn!(
                connection_id = self.connection_id,
                "Reliability layer invalidated: {:?}",
                other
            ),
        }

        self.receiver.invalidate();
        self.sender.invalidate();

        // Fails only once the writer thread is gone
        let _ = self.queue_tx.send(WireCommand::Shutdown);
    }

    fn run_writer<W>(&self, queue: crossbeam_channel::Receiver<WireCommand>, mut channel: W)
    where
        W: WriteHandler,
    {
        let tick_interval = self.config.tick_interval;
        let mut last_tick = Instant::now();
        let mut unflushed = false;

        loop {
            let command = match queue.recv_timeout(tick_interval) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Whatever is still queued after invalidation is dropped
            if !self.lifecycle.is_valid() {
                break;
            }

            let written = match command {
                Some(WireCommand::Frame(bytes)) => self.write_frame(&mut channel, &bytes),
                Some(WireCommand::FlushAck) => match self.sender.take_standalone_ack() {
                    Some(bytes) => self.write_frame(&mut channel, &bytes),
                    None => Ok(false),
                },
                Some(WireCommand::Shutdown) => break,
                None => Ok(false),
            };

            let result = written.and_then(|wrote| {
                unflushed |= wrote;
                if unflushed && queue.is_empty() {
                    unflushed = false;
                    channel.flush()?;
                }

                let now = Instant::now();
                if now.duration_since(last_tick) >= tick_interval {
                    last_tick = now;
                    self.sender.tick(now)?;
                }

                Ok(())
            });

            if let Err(err) = result {
                self.fail(err);
                break;
            }
        }

        tracing::debug!(
            connection_id = self.connection_id,
            "Writer thread exiting"
        );
    }

    fn write_frame<W>(&self, channel: &mut W, bytes: &[u8]) -> Result<bool, ReliabilityError>
    where
        W: WriteHandler,
    {
        tracing::trace!(
            connection_id = self.connection_id,
            "Writing {} bytes",
            bytes.len()
        );

        channel.handle_write(bytes)?;
        Ok(true)
    }
}

/// Enqueues an outgoing command on behalf of the sender.
///
/// Rejected once the layer is no longer valid, so nothing new reaches the
/// queue after the shutdown marker.
fn handle_write(
    lifecycle: &Lifecycle,
    queue: &crossbeam_channel::Sender<WireCommand>,
    command: WireCommand,
) -> Result<(), ReliabilityError> {
    lifecycle.ensure_valid()?;

    if let WireCommand::Frame(bytes) = &command {
        if bytes.is_empty() {
            return Ok(());
        }
    }

    queue
        .send(command)
        .map_err(|_| ReliabilityError::ConnectionClosed)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
