use crate::frame::FrameDecodeError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the reliability layer and its streams.
#[derive(Debug, Error)]
pub enum ReliabilityError {
    /// The layer has been invalidated; every operation fails from here on.
    #[error("connection closed")]
    ConnectionClosed,

    /// The layer was used before `init` started its writer thread.
    #[error("reliability layer not initialized")]
    NotInitialized,

    #[error("reliability layer already initialized")]
    AlreadyInitialized,

    /// The local side already sent its fin frame.
    #[error("write after the stream was finished")]
    WriteAfterFinish,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The physical channel failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The writer thread could not be started.
    #[error("failed to spawn writer thread: {0}")]
    WriterThread(io::Error),

    /// The peer (or the line) broke the protocol; the connection is unusable.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// Unrecoverable breaches of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("framing error: {0}")]
    Decode(#[from] FrameDecodeError),

    /// A data frame arrived further ahead than the window allows.
    #[error("sequence {seq} outside receive window (expected {expected})")]
    SequenceOutOfWindow { seq: u32, expected: u32 },

    /// The peer acknowledged a frame that was never sent.
    #[error("acknowledgment {ack} beyond next sequence {next_seq}")]
    AckOutOfRange { ack: u32, next_seq: u32 },

    #[error("frame {seq} unacknowledged after {attempts} transmissions")]
    RetransmitLimitExceeded { seq: u32, attempts: u32 },

    #[error("data frame {seq} after fin")]
    DataAfterFin { seq: u32 },
}

/// Why a layer was invalidated. Recorded once, by the first invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The application (or the owner of the layer) closed it.
    LocalClose,

    /// The channel adapter reported the link as gone.
    ChannelClosed,

    Io(io::ErrorKind),

    Protocol(ProtocolViolation),
}

impl ReliabilityError {
    /// The close reason this error implies, if it is a cause of failure
    /// rather than a consequence of an earlier one.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            ReliabilityError::Io(err) | ReliabilityError::WriterThread(err) => {
                Some(CloseReason::Io(err.kind()))
            }
            ReliabilityError::Protocol(violation) => Some(CloseReason::Protocol(violation.clone())),
            _ => None,
        }
    }
}

impl From<ReliabilityError> for io::Error {
    fn from(err: ReliabilityError) -> Self {
        match err {
            ReliabilityError::Io(err) => err,
            ReliabilityError::ConnectionClosed | ReliabilityError::NotInitialized => {
                io::Error::new(io::ErrorKind::NotConnected, err)
            }
            ReliabilityError::WriteAfterFinish => io::Error::new(io::ErrorKind::BrokenPipe, err),
            ReliabilityError::InvalidConfig(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            ReliabilityError::Protocol(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::other(other),
        }
    }
}
