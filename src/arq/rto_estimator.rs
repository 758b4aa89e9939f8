//! Retransmission timeout estimation (RFC 6298).
//!
//! `RTO = SRTT + 4 * RTTVAR`, clamped to the configured bounds, doubling on
//! each timeout until the next valid RTT sample restores it.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RtoEstimator {
    initial_rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    current_rto: Duration,
    srtt: Option<Duration>,
    rttvar: Duration,
}

impl RtoEstimator {
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration) -> Self {
        Self {
            initial_rto,
            min_rto,
            max_rto,
            current_rto: initial_rto.clamp(min_rto, max_rto),
            srtt: None,
            rttvar: Duration::ZERO,
        }
    }

    pub fn current_rto(&self) -> Duration {
        self.current_rto
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// First sample: SRTT = R, RTTVAR = R/2.
    /// Afterwards:   RTTVAR = 3/4 RTTVAR + 1/4 |SRTT - R|, SRTT = 7/8 SRTT + 1/8 R.
    pub fn record_rtt_sample(&mut self, sample: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2;
            }
            Some(srtt) => {
                let diff = sample.abs_diff(srtt);
                self.rttvar = self.rttvar * 3 / 4 + diff / 4;
                self.srtt = Some(srtt * 7 / 8 + sample / 8);
            }
        }
        self.reset();
    }

    /// Exponential backoff after a timeout.
    pub fn back_off(&mut self) {
        self.current_rto = self.current_rto.saturating_mul(2).min(self.max_rto);
    }

    fn reset(&mut self) {
        let rto = match self.srtt {
            Some(srtt) => srtt + self.rttvar * 4,
            None => self.initial_rto,
        };
        self.current_rto = rto.clamp(self.min_rto, self.max_rto);
    }
}
