use crate::arq::{Receiver, Sender};
use crate::reliability::ReliabilityError;
use crate::reliability::reliability_layer::QueueEmit;
use std::io;
use std::sync::Arc;

/// Blocking, in-order view of the bytes delivered by the peer.
///
/// `read` returns `Ok(0)` once the peer has finished its stream, or once the
/// layer is invalidated and everything delivered before that has been read.
#[derive(Clone)]
pub struct ReliableReader {
    receiver: Arc<Receiver<QueueEmit>>,
}

impl ReliableReader {
    pub(crate) fn new(receiver: Arc<Receiver<QueueEmit>>) -> Self {
        Self { receiver }
    }

    /// Bytes that can be read without blocking.
    pub fn available(&self) -> usize {
        self.receiver.available()
    }
}

impl io::Read for ReliableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.receiver.read(buf)?)
    }
}

/// Blocking writer into the reliable stream.
///
/// `write` accepts the whole buffer once every frame of it is inside the
/// send window; it does not wait for acknowledgment. `flush` does.
#[derive(Clone)]
pub struct ReliableWriter {
    sender: Arc<Sender<QueueEmit>>,
}

impl ReliableWriter {
    pub(crate) fn new(sender: Arc<Sender<QueueEmit>>) -> Self {
        Self { sender }
    }

    /// Ends this direction of the stream. The peer reads end of stream after
    /// the data written before it; further writes fail with `BrokenPipe`.
    pub fn finish(&self) -> Result<(), ReliabilityError> {
        self.sender.finish()
    }
}

impl io::Write for ReliableWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.sender.write(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.sender.wait_until_acknowledged()?)
    }
}
