use crate::reliability::{CloseReason, ReliabilityError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Created = 0,
    Initialized = 1,
    Invalidated = 2,
}

impl From<u8> for LayerState {
    fn from(value: u8) -> Self {
        match value {
            0 => LayerState::Created,
            1 => LayerState::Initialized,
            _ => LayerState::Invalidated,
        }
    }
}

/// The validity flag shared by every component of one connection.
///
/// Transitions only move forward: `Created -> Initialized -> Invalidated`
/// (or straight from `Created` to `Invalidated`). Readers only need the
/// atomic; the close reason is written once, by whoever wins the
/// transition to `Invalidated`.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LayerState::Created as u8),
            close_reason: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LayerState {
        LayerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_valid(&self) -> bool {
        self.state() == LayerState::Initialized
    }

    /// Fails with the error an operation on a non-valid layer should report.
    pub fn ensure_valid(&self) -> Result<(), ReliabilityError> {
        match self.state() {
            LayerState::Initialized => Ok(()),
            LayerState::Created => Err(ReliabilityError::NotInitialized),
            LayerState::Invalidated => Err(ReliabilityError::ConnectionClosed),
        }
    }

    pub fn mark_initialized(&self) -> Result<(), ReliabilityError> {
        match self.state.compare_exchange(
            LayerState::Created as u8,
            LayerState::Initialized as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) => match LayerState::from(current) {
                LayerState::Invalidated => Err(ReliabilityError::ConnectionClosed),
                _ => Err(ReliabilityError::AlreadyInitialized),
            },
        }
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn invalidate(&self, reason: CloseReason) -> bool {
        // Record first so the reason is visible to anyone who observes the new state
        let mut close_reason = self
            .close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = self
            .state
            .swap(LayerState::Invalidated as u8, Ordering::AcqRel);

        if LayerState::from(previous) == LayerState::Invalidated {
            return false;
        }

        *close_reason = Some(reason);
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
