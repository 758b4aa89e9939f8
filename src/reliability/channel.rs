use crate::reliability::{CloseReason, ReliabilityError};
use std::io;
use std::sync::Arc;

/// Outbound half of the physical channel.
///
/// Called only from the layer's writer thread, with fully SLIP-encoded
/// frames. Any error is treated as loss of the link.
pub trait WriteHandler: Send + 'static {
    fn handle_write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Pushes buffered bytes onto the line. Called once the writer thread
    /// has drained its queue.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> WriteHandler for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send + 'static,
{
    fn handle_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self(bytes)
    }
}

/// Inbound half of the physical channel, implemented by the layer.
///
/// Whatever reads the line calls `handle_read` with each chunk, split
/// wherever the line happened to split it.
pub trait ReadHandler: Send + Sync {
    fn handle_read(&self, bytes: &[u8]) -> Result<(), ReliabilityError>;

    /// `false` once nothing more will be accepted; lets a reader that polls
    /// with timeouts know when to stop.
    fn is_valid(&self) -> bool;

    /// Reports that the line is gone (end of file, read error).
    fn invalidate_with(&self, reason: CloseReason);
}

impl<T> ReadHandler for Arc<T>
where
    T: ReadHandler + ?Sized,
{
    fn handle_read(&self, bytes: &[u8]) -> Result<(), ReliabilityError> {
        (**self).handle_read(bytes)
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn invalidate_with(&self, reason: CloseReason) {
        (**self).invalidate_with(reason)
    }
}
