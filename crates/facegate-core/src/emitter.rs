//! Take-once result slot for a capture session.

use crate::session::CaptureError;
use crate::types::Descriptor;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFailure {
    TimedOut,
    Cancelled,
}

impl From<TerminalFailure> for CaptureError {
    fn from(f: TerminalFailure) -> Self {
        match f {
            TerminalFailure::TimedOut => CaptureError::TimedOut,
            TerminalFailure::Cancelled => CaptureError::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Pending,
    Ready(Descriptor),
    Consumed,
    Failed(TerminalFailure),
}

/// Hands the captured descriptor to exactly one caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEmitter {
    slot: Slot,
}

impl ResultEmitter {
    pub fn new() -> Self {
        Self {
            slot: Slot::Pending,
        }
    }

    /// Store the captured descriptor. Ignored once the slot has been filled.
    pub fn publish(&mut self, descriptor: Descriptor) {
        if self.slot == Slot::Pending {
            self.slot = Slot::Ready(descriptor);
        }
    }

    /// Record a terminal failure. Ignored once the slot has been filled.
    pub fn fail(&mut self, failure: TerminalFailure) {
        if self.slot == Slot::Pending {
            self.slot = Slot::Failed(failure);
        }
    }

    /// Extract the descriptor. Succeeds at most once per session.
    pub fn take(&mut self) -> Result<Descriptor, CaptureError> {
        match std::mem::replace(&mut self.slot, Slot::Consumed) {
            Slot::Ready(descriptor) => Ok(descriptor),
            Slot::Consumed => Err(CaptureError::AlreadyConsumed),
            Slot::Failed(failure) => {
                self.slot = Slot::Failed(failure);
                Err(failure.into())
            }
            Slot::Pending => {
                self.slot = Slot::Pending;
                Err(CaptureError::NotFinished)
            }
        }
    }
}

impl Default for ResultEmitter {
    fn default() -> Self {
        Self::new()
    }
}
