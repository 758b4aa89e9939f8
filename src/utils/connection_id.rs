use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Hands out the `connection_id` a new [`ReliabilityLayer`] attaches to its
/// log events, so interleaved output from several links on one process can
/// be told apart.
///
/// Ids are unique across threads and wrap after `u32::MAX` layers.
///
/// [`ReliabilityLayer`]: crate::ReliabilityLayer
#[inline]
pub fn next_connection_id() -> u32 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed) as u32
}
