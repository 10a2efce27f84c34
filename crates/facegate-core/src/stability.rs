//! Consecutive-pass counter that debounces the alignment gate.

use crate::gate::{AlignmentVerdict, RejectReason};

/// Result of feeding one verdict into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilitySignal {
    /// Aligned, streak not yet long enough.
    Progress(u32),
    /// Streak just reached the required length.
    Stable,
    /// Streak was reset to zero.
    Unstable(RejectReason),
}

#[derive(Debug, Clone)]
pub struct StabilityTracker {
    streak: u32,
    required: u32,
}

impl StabilityTracker {
    /// `required` is clamped to at least one frame.
    pub fn new(required: u32) -> Self {
        Self {
            streak: 0,
            required: required.max(1),
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn observe(&mut self, verdict: AlignmentVerdict) -> StabilitySignal {
        match verdict {
            AlignmentVerdict::Pass => {
                self.streak = self.streak.saturating_add(1);
                if self.streak == self.required {
                    StabilitySignal::Stable
                } else {
                    StabilitySignal::Progress(self.streak)
                }
            }
            AlignmentVerdict::Reject(reason) => {
                self.streak = 0;
                StabilitySignal::Unstable(reason)
            }
        }
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASS: AlignmentVerdict = AlignmentVerdict::Pass;

    #[test]
    fn test_streak_reaches_stable() {
        let mut t = StabilityTracker::new(3);
        assert_eq!(t.observe(PASS), StabilitySignal::Progress(1));
        assert_eq!(t.observe(PASS), StabilitySignal::Progress(2));
        assert_eq!(t.observe(PASS), StabilitySignal::Stable);
        assert_eq!(t.streak(), 3);
    }

    #[test]
    fn test_reject_resets_from_any_streak() {
        for prior in 0..6 {
            let mut t = StabilityTracker::new(10);
            for _ in 0..prior {
                t.observe(PASS);
            }
            let signal = t.observe(AlignmentVerdict::Reject(RejectReason::Tilted));
            assert_eq!(signal, StabilitySignal::Unstable(RejectReason::Tilted));
            assert_eq!(t.streak(), 0, "prior streak {prior}");
        }
    }

    #[test]
    fn test_no_partial_decay() {
        let mut t = StabilityTracker::new(5);
        t.observe(PASS);
        t.observe(PASS);
        t.observe(AlignmentVerdict::Reject(RejectReason::NoFace));
        assert_eq!(t.observe(PASS), StabilitySignal::Progress(1));
    }

    #[test]
    fn test_single_frame_requirement() {
        let mut t = StabilityTracker::new(0);
        assert_eq!(t.required(), 1);
        assert_eq!(t.observe(PASS), StabilitySignal::Stable);
    }
}
