//! Reliable, ordered, flow-controlled byte streams over unreliable serial links.
//!
//! The crate is layered the same way bytes travel:
//!
//! - [`frame`]: SLIP delimiting and the checksummed frame header.
//! - [`arq`]: the sender and receiver halves of the acknowledgment and
//!   retransmission protocol.
//! - [`reliability`]: [`ReliabilityLayer`], which wires the two together,
//!   owns the single writer thread, and hands out blocking
//!   [`ReliableReader`] / [`ReliableWriter`] streams.
//!
//! The physical link is supplied by the caller through [`WriteHandler`]
//! (outbound) and by calling [`ReadHandler::handle_read`] (inbound).

pub mod arq;
pub mod constants;
pub mod frame;
pub mod reliability;
pub mod utils;

pub use reliability::{
    CloseReason, LayerState, ProtocolViolation, ReadHandler, ReliabilityConfig,
    ReliabilityError, ReliabilityLayer, ReliableReader, ReliableWriter, WriteHandler,
};
