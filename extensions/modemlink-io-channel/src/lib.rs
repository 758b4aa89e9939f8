//! Drives a [`ReliabilityLayer`] over a plain `std::io` reader and writer,
//! such as the two halves of an opened serial port, a pseudo-terminal, or a
//! TCP socket used in tests.

use modemlink::constants::DEFAULT_READ_CHUNK_SIZE;
use modemlink::{CloseReason, ReadHandler, ReliabilityError, ReliabilityLayer, WriteHandler};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const READ_PUMP_THREAD_NAME: &str = "modemlink-read-pump";

/// Pause before polling a reader again after it reported no data.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// [`WriteHandler`] over any `std::io::Write`.
///
/// Frames are written whole; the underlying writer is flushed whenever the
/// layer's outgoing queue runs empty.
pub struct IoWriteHandler<W> {
    inner: W,
}

impl<W> IoWriteHandler<W>
where
    W: Write + Send + 'static,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> WriteHandler for IoWriteHandler<W>
where
    W: Write + Send + 'static,
{
    fn handle_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Starts a thread that copies everything `reader` produces into `handler`.
///
/// The pump stops when:
/// - `reader` reports end of file (the handler is invalidated with
///   [`CloseReason::ChannelClosed`]);
/// - `reader` fails (invalidated with [`CloseReason::Io`]);
/// - `handler` rejects a chunk, which means it is already invalidated.
///
/// Read timeouts (`TimedOut` / `WouldBlock`, as returned by serial ports
/// opened with a timeout or non-blocking readers) are retried every
/// [`READ_RETRY_DELAY`] for as long as the handler is valid.
pub fn spawn_read_pump<R, H>(mut reader: R, handler: H) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
    H: ReadHandler + 'static,
{
    thread::Builder::new()
        .name(READ_PUMP_THREAD_NAME.to_string())
        .spawn(move || {
            let mut buf = vec![0u8; DEFAULT_READ_CHUNK_SIZE];

            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("Channel reached end of file");
                        handler.invalidate_with(CloseReason::ChannelClosed);
                        break;
                    }
                    Ok(n) => {
                        if let Err(err) = handler.handle_read(&buf[..n]) {
                            tracing::debug!("Read pump stopping: {}", err);
                            break;
                        }
                    }
                    Err(err) => match err.kind() {
                        io::ErrorKind::Interrupted => continue,
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                            if !handler.is_valid() {
                                break;
                            }
                            thread::sleep(READ_RETRY_DELAY);
                        }
                        kind => {
                            tracing::warn!("Channel read failed: {}", err);
                            handler.invalidate_with(CloseReason::Io(kind));
                            break;
                        }
                    },
                }
            }
        })
}

/// Initializes `layer` with `writer` as its outbound channel and starts a
/// read pump feeding it from `reader`.
///
/// Returns the pump's handle; it finishes once the channel or the layer
/// goes away.
pub fn attach<R, W>(
    layer: &Arc<ReliabilityLayer>,
    reader: R,
    writer: W,
) -> Result<JoinHandle<()>, ReliabilityError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    layer.init(IoWriteHandler::new(writer))?;

    spawn_read_pump(reader, Arc::clone(layer)).map_err(|err| {
        layer.invalidate_with(CloseReason::Io(err.kind()));
        ReliabilityError::Io(err)
    })
}
