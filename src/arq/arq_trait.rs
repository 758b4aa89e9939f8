use crate::reliability::ReliabilityError;

/// An entry on the outgoing wire queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    /// A SLIP-encoded frame, written to the channel as-is.
    Frame(Vec<u8>),

    /// Emit the pending acknowledgment as a standalone frame, unless an
    /// outgoing data frame has already carried it.
    FlushAck,

    /// Stop the writer thread.
    Shutdown,
}

pub trait WireEmit: Fn(WireCommand) -> Result<(), ReliabilityError> + Send + Sync {}
impl<T: Fn(WireCommand) -> Result<(), ReliabilityError> + Send + Sync> WireEmit for T {}
