use crate::constants::{
    DEFAULT_INITIAL_RTO, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_MAX_RTO,
    DEFAULT_MIN_RTO, DEFAULT_TICK_INTERVAL, DEFAULT_WINDOW_SIZE, FRAME_MIN_SIZE, MAX_RTO_LIMIT,
};
use crate::reliability::ReliabilityError;
use std::time::Duration;

/// Tuning for one reliability layer.
///
/// `window_size` and `max_payload_len` shape the wire protocol and must be
/// identical on both peers. The timing fields are local decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityConfig {
    /// Unacknowledged frames allowed in flight. Also bounds how far ahead of
    /// the next expected frame the receiver will buffer.
    pub window_size: usize,
    /// Largest payload carried by one data frame; larger writes are split.
    pub max_payload_len: usize,
    /// Retransmission timeout used before the first RTT sample.
    pub initial_rto: Duration,
    pub min_rto: Duration,
    /// Cap for both the estimated timeout and per-frame exponential backoff.
    pub max_rto: Duration,
    /// Transmissions per frame, the first included, before the link is
    /// declared dead.
    pub max_attempts: u32,
    /// Period of the writer thread's retransmission scan.
    pub tick_interval: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            initial_rto: DEFAULT_INITIAL_RTO,
            min_rto: DEFAULT_MIN_RTO,
            max_rto: DEFAULT_MAX_RTO,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl ReliabilityConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_max_payload_len(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    pub fn with_initial_rto(mut self, initial_rto: Duration) -> Self {
        self.initial_rto = initial_rto;
        self
    }

    pub fn with_rto_bounds(mut self, min_rto: Duration, max_rto: Duration) -> Self {
        self.min_rto = min_rto;
        self.max_rto = max_rto;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Largest SLIP body the decoder accepts: header, full payload, checksum.
    pub fn max_frame_len(&self) -> usize {
        FRAME_MIN_SIZE + self.max_payload_len
    }

    pub fn validate(&self) -> Result<(), ReliabilityError> {
        if self.window_size == 0 {
            return Err(ReliabilityError::InvalidConfig("window_size must be at least 1"));
        }
        // Keeps every in-flight sequence number well inside half the sequence space
        if self.window_size > u16::MAX as usize {
            return Err(ReliabilityError::InvalidConfig("window_size must fit in 16 bits"));
        }
        if self.max_payload_len == 0 {
            return Err(ReliabilityError::InvalidConfig("max_payload_len must be at least 1"));
        }
        if self.initial_rto.is_zero() || self.min_rto.is_zero() {
            return Err(ReliabilityError::InvalidConfig("timeouts must be non-zero"));
        }
        if self.min_rto > self.max_rto {
            return Err(ReliabilityError::InvalidConfig("min_rto exceeds max_rto"));
        }
        if self.max_rto > MAX_RTO_LIMIT {
            return Err(ReliabilityError::InvalidConfig("max_rto exceeds one hour"));
        }
        if self.max_attempts == 0 {
            return Err(ReliabilityError::InvalidConfig("max_attempts must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(ReliabilityError::InvalidConfig("tick_interval must be non-zero"));
        }
        Ok(())
    }
}
