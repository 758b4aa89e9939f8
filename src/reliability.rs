mod channel;
mod lifecycle;
mod reliability_config;
mod reliability_error;
mod reliability_layer;
mod reliable_streams;

pub use channel::{ReadHandler, WriteHandler};
pub use lifecycle::{LayerState, Lifecycle};
pub use reliability_config::ReliabilityConfig;
pub use reliability_error::{CloseReason, ProtocolViolation, ReliabilityError};
pub use reliability_layer::ReliabilityLayer;
pub use reliable_streams::{ReliableReader, ReliableWriter};
