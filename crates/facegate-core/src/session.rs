//! Capture session state machine.
//!
//! ```text
//! Idle ──start──▶ Countdown ──tick×N──▶ Detecting ──Stable──▶ Captured
//!                    │                      │ ├──timeout──▶ TimedOut
//!                    └──────cancel──────────┴─┴──cancel───▶ Cancelled
//! ```
//!
//! The session owns no timers. Every time-dependent operation takes the
//! current monotonic time in milliseconds, so the same transitions can be
//! driven by a real scheduler or stepped by hand in tests.

use crate::config::{CaptureConfig, ConfigError};
use crate::detector::DetectorError;
use crate::emitter::{ResultEmitter, TerminalFailure};
use crate::gate::{self, AlignmentVerdict, RejectReason, Thresholds};
use crate::geometry;
use crate::stability::{StabilitySignal, StabilityTracker};
use crate::types::{Descriptor, Frame};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Monotonic milliseconds.
pub type Millis = u64;

const ALIGN_PROMPT: &str = "Align your face roughly in the center and look at the camera.";
const TIMEOUT_MESSAGE: &str = "No valid face detected. Please try again.";
const CANCEL_MESSAGE: &str = "Capture cancelled.";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no face detected")]
    NoFace,
    #[error("no aligned face within the capture timeout")]
    TimedOut,
    #[error("capture cancelled")]
    Cancelled,
    #[error("descriptor already consumed")]
    AlreadyConsumed,
    #[error("capture has not finished")]
    NotFinished,
    #[error("a capture session is already active")]
    SessionActive,
    #[error("a manual capture is already pending")]
    ForcePending,
    #[error("session already finished ({0})")]
    SessionFinished(Phase),
    #[error("session is not active ({0})")]
    NotActive(Phase),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("capture task exited")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Countdown,
    Detecting,
    Captured,
    TimedOut,
    Cancelled,
}

impl Phase {
    /// Countdown or Detecting.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Countdown | Self::Detecting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Captured | Self::TimedOut | Self::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Countdown => "countdown",
            Self::Detecting => "detecting",
            Self::Captured => "captured",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Snapshot for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub streak: u32,
    pub required_streak: u32,
    pub countdown_remaining: Option<u32>,
    /// Time spent in Detecting, the basis of the timeout.
    pub elapsed_ms: Millis,
    pub message: String,
    /// Last rejection reason, cleared on a passing frame.
    pub reason: Option<RejectReason>,
}

/// What a completed poll did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Frame evaluated; carries the gate verdict and tracker signal.
    Evaluated(AlignmentVerdict, StabilitySignal),
    /// Detector failed; streak untouched.
    Skipped,
    /// Result arrived after the session stopped detecting.
    Discarded,
}

/// One capture run. Created per attempt; a finished session cannot restart.
#[derive(Debug)]
pub struct CaptureSession {
    config: CaptureConfig,
    thresholds: Thresholds,
    phase: Phase,
    tracker: StabilityTracker,
    countdown_remaining: Option<u32>,
    detecting_since: Option<Millis>,
    elapsed_ms: Millis,
    poll_in_flight: bool,
    message: String,
    reason: Option<RejectReason>,
    last_no_face_notice: Millis,
    emitter: ResultEmitter,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds(),
            tracker: StabilityTracker::new(config.required_streak),
            config,
            phase: Phase::Idle,
            countdown_remaining: None,
            detecting_since: None,
            elapsed_ms: 0,
            poll_in_flight: false,
            message: String::new(),
            reason: None,
            last_no_face_notice: 0,
            emitter: ResultEmitter::new(),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn streak(&self) -> u32 {
        self.tracker.streak()
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown_remaining
    }

    /// When the session entered Detecting.
    pub fn detecting_since(&self) -> Option<Millis> {
        self.detecting_since
    }

    /// Instant at which Detecting times out.
    pub fn detection_deadline(&self) -> Option<Millis> {
        self.detecting_since
            .map(|since| since.saturating_add(self.config.timeout_ms))
    }

    pub fn is_poll_in_flight(&self) -> bool {
        self.poll_in_flight
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            streak: self.tracker.streak(),
            required_streak: self.tracker.required(),
            countdown_remaining: self.countdown_remaining,
            elapsed_ms: self.elapsed_ms,
            message: self.message.clone(),
            reason: self.reason,
        }
    }

    /// Idle → Countdown, or straight to Detecting when the countdown is zero.
    pub fn start(&mut self, now: Millis) -> Result<(), CaptureError> {
        match self.phase {
            Phase::Idle => {}
            p if p.is_active() => return Err(CaptureError::SessionActive),
            p => return Err(CaptureError::SessionFinished(p)),
        }

        tracing::info!(
            mode = %self.config.mode,
            profile = %self.config.profile,
            countdown = self.config.countdown_seconds,
            "capture session started"
        );

        if self.config.countdown_seconds == 0 {
            self.enter_detecting(now);
        } else {
            let n = self.config.countdown_seconds;
            self.phase = Phase::Countdown;
            self.countdown_remaining = Some(n);
            self.message = countdown_message(n);
        }
        Ok(())
    }

    /// One countdown second elapsed. Returns the remaining count, or `None`
    /// when not counting down.
    pub fn countdown_tick(&mut self, now: Millis) -> Option<u32> {
        if self.phase != Phase::Countdown {
            return None;
        }
        let remaining = self.countdown_remaining.unwrap_or(0).saturating_sub(1);
        if remaining == 0 {
            self.enter_detecting(now);
        } else {
            self.countdown_remaining = Some(remaining);
            self.message = countdown_message(remaining);
        }
        Some(remaining)
    }

    /// Ask for a poll permit. Denied outside Detecting, after the timeout,
    /// and while the previous poll has not completed; denied polls are
    /// skipped rather than queued.
    pub fn begin_poll(&mut self, now: Millis) -> bool {
        if self.phase != Phase::Detecting || self.check_timeout(now) {
            return false;
        }
        if self.poll_in_flight {
            tracing::debug!(elapsed_ms = self.elapsed_ms, "previous poll still running, skipping");
            return false;
        }
        self.poll_in_flight = true;
        true
    }

    /// Feed the result of a granted poll through geometry, gate and tracker.
    pub fn complete_poll(
        &mut self,
        now: Millis,
        result: Result<Option<Frame>, DetectorError>,
    ) -> PollOutcome {
        self.poll_in_flight = false;
        if self.phase != Phase::Detecting || self.check_timeout(now) {
            tracing::debug!(phase = %self.phase, "dropping late detection result");
            return PollOutcome::Discarded;
        }

        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "detector call failed, skipping poll");
                return PollOutcome::Skipped;
            }
        };

        let metrics = frame.as_ref().and_then(|f| match geometry::evaluate(f) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!(error = %e, "unusable landmarks, treating as no face");
                None
            }
        });
        let verdict = gate::check(metrics.as_ref(), &self.thresholds);
        let signal = self.tracker.observe(verdict);

        tracing::debug!(
            ?verdict,
            streak = self.tracker.streak(),
            elapsed_ms = self.elapsed_ms,
            "frame evaluated"
        );

        match signal {
            StabilitySignal::Stable => {
                // Stable implies a passing frame, which implies a detection.
                if let Some(frame) = frame {
                    self.reason = None;
                    self.enter_captured(frame.descriptor);
                }
            }
            StabilitySignal::Progress(streak) => {
                self.reason = None;
                self.message = format!(
                    "Face aligned ({streak}/{})...",
                    self.tracker.required()
                );
            }
            StabilitySignal::Unstable(reason) => {
                self.reason = Some(reason);
                self.notify_rejection(now, reason);
            }
        }

        PollOutcome::Evaluated(verdict, signal)
    }

    /// Detecting → TimedOut once the detection budget is spent.
    /// Returns true when the session is (now) timed out.
    pub fn check_timeout(&mut self, now: Millis) -> bool {
        if self.phase == Phase::TimedOut {
            return true;
        }
        let (Phase::Detecting, Some(since)) = (self.phase, self.detecting_since) else {
            return false;
        };
        self.elapsed_ms = now.saturating_sub(since);
        if self.elapsed_ms < self.config.timeout_ms {
            return false;
        }

        tracing::info!(
            elapsed_ms = self.elapsed_ms,
            timeout_ms = self.config.timeout_ms,
            "capture timed out"
        );
        self.phase = Phase::TimedOut;
        self.poll_in_flight = false;
        self.tracker.reset();
        self.message = TIMEOUT_MESSAGE.to_string();
        self.emitter.fail(TerminalFailure::TimedOut);
        true
    }

    /// Abort an active session. Returns false when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        tracing::info!(phase = %self.phase, "capture cancelled");
        self.phase = Phase::Cancelled;
        self.countdown_remaining = None;
        self.poll_in_flight = false;
        self.tracker.reset();
        self.message = CANCEL_MESSAGE.to_string();
        self.emitter.fail(TerminalFailure::Cancelled);
        true
    }

    /// Manual capture: take the descriptor of whatever face is visible now,
    /// regardless of streak. Without a usable face the phase is left as is.
    pub fn force_capture(
        &mut self,
        now: Millis,
        result: Result<Option<Frame>, DetectorError>,
    ) -> Result<Descriptor, CaptureError> {
        if !self.phase.is_active() || self.check_timeout(now) {
            return Err(CaptureError::NotActive(self.phase));
        }

        let frame = match result {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(CaptureError::NoFace),
            Err(e) => {
                tracing::warn!(error = %e, "detector call failed during manual capture");
                return Err(CaptureError::NoFace);
            }
        };

        match geometry::evaluate(&frame) {
            Ok(m) => {
                let verdict = gate::check(Some(&m), &self.thresholds);
                tracing::info!(?verdict, streak = self.tracker.streak(), "manual capture");
            }
            Err(e) => {
                tracing::debug!(error = %e, "manual capture without usable landmarks");
                return Err(CaptureError::NoFace);
            }
        }

        self.enter_captured(frame.descriptor);
        self.emitter.take()
    }

    /// Hand out the captured descriptor. Succeeds once.
    pub fn take_descriptor(&mut self) -> Result<Descriptor, CaptureError> {
        self.emitter.take()
    }

    fn enter_detecting(&mut self, now: Millis) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            timeout_ms = self.config.timeout_ms,
            "detecting"
        );
        self.phase = Phase::Detecting;
        self.countdown_remaining = None;
        self.detecting_since = Some(now);
        self.last_no_face_notice = now;
        self.elapsed_ms = 0;
        self.message = ALIGN_PROMPT.to_string();
    }

    fn enter_captured(&mut self, descriptor: Descriptor) {
        tracing::info!(
            dims = descriptor.len(),
            elapsed_ms = self.elapsed_ms,
            "descriptor captured"
        );
        self.phase = Phase::Captured;
        self.countdown_remaining = None;
        self.poll_in_flight = false;
        self.message = self.config.mode.captured_message().to_string();
        self.emitter.publish(descriptor);
    }

    /// "No face" notices are rate limited so the prompt does not flicker
    /// between frames; other reasons update immediately.
    fn notify_rejection(&mut self, now: Millis, reason: RejectReason) {
        if reason == RejectReason::NoFace {
            if now.saturating_sub(self.last_no_face_notice) <= self.config.no_face_notice_ms {
                return;
            }
            self.last_no_face_notice = now;
        }
        self.message = reason.message().to_string();
    }
}

fn countdown_message(n: u32) -> String {
    format!("Capturing in {n}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;
    use crate::testutil::{aligned, aligned_tagged, frame_with, shifted};

    fn scenario_config() -> CaptureConfig {
        CaptureConfig {
            thresholds: Some(Thresholds {
                min_ratio: 0.2,
                max_ratio: 0.65,
                max_center_x: 0.3,
                max_center_y: 0.3,
                max_nose_offset: 0.25,
                max_tilt: 0.1,
            }),
            required_streak: 3,
            ..Default::default()
        }
    }

    /// Start and run the countdown to completion at one tick per second.
    fn detecting(config: CaptureConfig) -> (CaptureSession, Millis) {
        let mut s = CaptureSession::new(config).unwrap();
        s.start(0).unwrap();
        let mut now = 0;
        while s.phase() == Phase::Countdown {
            now += 1000;
            s.countdown_tick(now);
        }
        (s, now)
    }

    fn poll(s: &mut CaptureSession, now: Millis, frame: Option<Frame>) -> PollOutcome {
        assert!(s.begin_poll(now), "poll permit denied at {now}");
        s.complete_poll(now, Ok(frame))
    }

    #[test]
    fn test_three_aligned_frames_capture() {
        let mut s = CaptureSession::new(scenario_config()).unwrap();
        let mut phases = vec![s.phase()];
        s.start(0).unwrap();
        phases.push(s.phase());

        let mut counts = Vec::new();
        let mut now = 0;
        while s.phase() == Phase::Countdown {
            now += 1000;
            counts.extend(s.countdown_tick(now));
        }
        assert_eq!(counts, vec![2, 1, 0]);
        phases.push(s.phase());

        let mut streaks = Vec::new();
        for i in 1..=3 {
            poll(&mut s, now + i * 400, Some(frame_with(0.4, 0.05, 0.02)));
            streaks.push(s.streak());
        }
        phases.push(s.phase());

        assert_eq!(
            phases,
            vec![Phase::Idle, Phase::Countdown, Phase::Detecting, Phase::Captured]
        );
        assert_eq!(streaks, vec![1, 2, 3]);
        assert_eq!(s.status().message, "Face detected successfully!");
    }

    #[test]
    fn test_too_far_resets_streak() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned()));
        assert_eq!(s.streak(), 1);

        let outcome = poll(&mut s, now + 800, Some(frame_with(0.1, 0.05, 0.02)));
        assert_eq!(
            outcome,
            PollOutcome::Evaluated(
                AlignmentVerdict::Reject(RejectReason::TooFar),
                StabilitySignal::Unstable(RejectReason::TooFar)
            )
        );
        assert_eq!(s.streak(), 0);
        assert_eq!(s.status().reason, Some(RejectReason::TooFar));
        assert_eq!(s.status().message, "Move closer to the camera.");
        assert_eq!(s.phase(), Phase::Detecting);
    }

    #[test]
    fn test_captures_last_passing_frame() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned_tagged(1.0)));
        poll(&mut s, now + 800, None);
        poll(&mut s, now + 1200, Some(aligned_tagged(2.0)));
        poll(&mut s, now + 1600, Some(aligned_tagged(3.0)));
        poll(&mut s, now + 2000, Some(aligned_tagged(4.0)));

        assert_eq!(s.phase(), Phase::Captured);
        assert_eq!(s.take_descriptor().unwrap().values, vec![4.0]);
        assert!(matches!(s.take_descriptor(), Err(CaptureError::AlreadyConsumed)));
    }

    #[test]
    fn test_timeout_without_face() {
        let config = CaptureConfig {
            timeout_ms: 1000,
            poll_interval_ms: 500,
            countdown_seconds: 0,
            ..scenario_config()
        };
        let mut s = CaptureSession::new(config).unwrap();
        s.start(0).unwrap();
        assert_eq!(s.phase(), Phase::Detecting);

        let mut polls = 0;
        let mut now = 0;
        while s.phase() == Phase::Detecting {
            now += 500;
            if s.begin_poll(now) {
                polls += 1;
                s.complete_poll(now, Ok(None));
            }
        }

        assert_eq!(s.phase(), Phase::TimedOut);
        assert_eq!(polls, 1);
        assert_eq!(now, 1000);
        assert!(matches!(s.take_descriptor(), Err(CaptureError::TimedOut)));
        assert_eq!(s.status().message, "No valid face detected. Please try again.");
    }

    #[test]
    fn test_late_result_after_timeout_is_discarded() {
        let config = CaptureConfig {
            timeout_ms: 1000,
            ..scenario_config()
        };
        let (mut s, now) = detecting(CaptureConfig {
            required_streak: 1,
            ..config
        });
        assert!(s.begin_poll(now + 900));
        let outcome = s.complete_poll(now + 1100, Ok(Some(aligned())));
        assert_eq!(outcome, PollOutcome::Discarded);
        assert_eq!(s.phase(), Phase::TimedOut);
    }

    #[test]
    fn test_overlapping_poll_is_skipped() {
        let (mut s, now) = detecting(scenario_config());
        assert!(s.begin_poll(now + 400));
        assert!(!s.begin_poll(now + 800));
        assert!(s.is_poll_in_flight());
        s.complete_poll(now + 900, Ok(Some(aligned())));
        assert_eq!(s.streak(), 1);
        assert!(s.begin_poll(now + 1200));
    }

    #[test]
    fn test_detector_error_is_skipped_poll() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned()));
        assert!(s.begin_poll(now + 800));
        let outcome = s.complete_poll(now + 800, Err(DetectorError::StreamEnded));
        assert_eq!(outcome, PollOutcome::Skipped);
        assert_eq!(s.streak(), 1);
        assert_eq!(s.phase(), Phase::Detecting);
    }

    #[test]
    fn test_insufficient_landmarks_is_no_face() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned()));
        let mut frame = aligned();
        frame.landmarks.left_eye.clear();
        let outcome = poll(&mut s, now + 800, Some(frame));
        assert_eq!(
            outcome,
            PollOutcome::Evaluated(
                AlignmentVerdict::Reject(RejectReason::NoFace),
                StabilitySignal::Unstable(RejectReason::NoFace)
            )
        );
        assert_eq!(s.streak(), 0);
    }

    #[test]
    fn test_no_face_notice_is_rate_limited() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(shifted(aligned(), 200.0, 0.0)));
        assert_eq!(s.status().message, "Move your face toward the center.");

        // Within 1.5 s of detection start: prompt unchanged.
        poll(&mut s, now + 800, None);
        assert_eq!(s.status().message, "Move your face toward the center.");
        assert_eq!(s.status().reason, Some(RejectReason::NoFace));

        poll(&mut s, now + 1600, None);
        assert_eq!(s.status().message, RejectReason::NoFace.message());

        // Another reason in between, then no face again soon after: held back.
        poll(&mut s, now + 2000, Some(frame_with(0.9, 0.0, 0.0)));
        poll(&mut s, now + 2400, None);
        assert_eq!(s.status().message, RejectReason::TooClose.message());
    }

    #[test]
    fn test_progress_message() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned()));
        assert_eq!(s.status().message, "Face aligned (1/3)...");
    }

    #[test]
    fn test_cancel_from_countdown_and_detecting() {
        let mut s = CaptureSession::new(scenario_config()).unwrap();
        s.start(0).unwrap();
        assert!(s.cancel());
        assert_eq!(s.phase(), Phase::Cancelled);
        assert_eq!(s.countdown_tick(1000), None);
        assert!(!s.cancel());

        let (mut s, now) = detecting(scenario_config());
        assert!(s.begin_poll(now + 400));
        assert!(s.cancel());
        assert!(!s.begin_poll(now + 800));
        assert_eq!(s.complete_poll(now + 800, Ok(Some(aligned()))), PollOutcome::Discarded);
        assert_eq!(s.streak(), 0);
        assert!(matches!(s.take_descriptor(), Err(CaptureError::Cancelled)));
    }

    #[test]
    fn test_cancel_in_idle_is_noop() {
        let mut s = CaptureSession::new(scenario_config()).unwrap();
        assert!(!s.cancel());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_reentrant_start_rejected() {
        let mut s = CaptureSession::new(scenario_config()).unwrap();
        s.start(0).unwrap();
        assert!(matches!(s.start(10), Err(CaptureError::SessionActive)));
        s.cancel();
        assert!(matches!(
            s.start(20),
            Err(CaptureError::SessionFinished(Phase::Cancelled))
        ));
    }

    #[test]
    fn test_terminal_phase_stops_processing() {
        let (mut s, now) = detecting(CaptureConfig {
            required_streak: 1,
            ..scenario_config()
        });
        poll(&mut s, now + 400, Some(aligned()));
        assert_eq!(s.phase(), Phase::Captured);
        assert!(!s.begin_poll(now + 800));
        assert!(!s.check_timeout(now + 100_000));
        assert_eq!(s.phase(), Phase::Captured);
    }

    #[test]
    fn test_force_capture_ignores_streak() {
        let (mut s, now) = detecting(scenario_config());
        // Misaligned but present: manual capture still takes it.
        let frame = frame_with(0.1, 0.05, 0.02);
        let descriptor = s.force_capture(now + 100, Ok(Some(frame.clone()))).unwrap();
        assert_eq!(descriptor, frame.descriptor);
        assert_eq!(s.phase(), Phase::Captured);
        assert!(matches!(s.take_descriptor(), Err(CaptureError::AlreadyConsumed)));
    }

    #[test]
    fn test_force_capture_without_face_keeps_phase() {
        let (mut s, now) = detecting(scenario_config());
        poll(&mut s, now + 400, Some(aligned()));
        assert!(matches!(s.force_capture(now + 500, Ok(None)), Err(CaptureError::NoFace)));
        assert_eq!(s.phase(), Phase::Detecting);
        assert_eq!(s.streak(), 1);

        let mut s = CaptureSession::new(scenario_config()).unwrap();
        s.start(0).unwrap();
        assert!(matches!(s.force_capture(10, Ok(None)), Err(CaptureError::NoFace)));
        assert_eq!(s.phase(), Phase::Countdown);
    }

    #[test]
    fn test_force_capture_when_not_active() {
        let mut s = CaptureSession::new(scenario_config()).unwrap();
        assert!(matches!(
            s.force_capture(0, Ok(Some(aligned()))),
            Err(CaptureError::NotActive(Phase::Idle))
        ));
    }

    #[test]
    fn test_zero_countdown_goes_straight_to_detecting() {
        let mut s = CaptureSession::new(CaptureConfig {
            countdown_seconds: 0,
            ..scenario_config()
        })
        .unwrap();
        s.start(0).unwrap();
        assert_eq!(s.phase(), Phase::Detecting);
        assert_eq!(s.countdown_remaining(), None);
    }

    #[test]
    fn test_match_mode_message() {
        let (mut s, now) = detecting(CaptureConfig {
            mode: CaptureMode::Match,
            required_streak: 1,
            ..scenario_config()
        });
        poll(&mut s, now + 400, Some(aligned()));
        assert_eq!(s.status().message, "Face captured.");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CaptureConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(CaptureSession::new(config), Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_elapsed_tracks_detection_time() {
        let (mut s, now) = detecting(scenario_config());
        assert_eq!(s.status().elapsed_ms, 0);
        poll(&mut s, now + 1200, None);
        assert_eq!(s.status().elapsed_ms, 1200);
    }
}
