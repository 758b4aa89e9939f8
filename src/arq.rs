mod arq_trait;
mod receiver;
mod rto_estimator;
mod sender;
pub mod seq_space;

pub use arq_trait::{WireCommand, WireEmit};
pub use receiver::Receiver;
pub use rto_estimator::RtoEstimator;
pub use sender::Sender;
