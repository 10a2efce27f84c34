//! facegate-core: Face-capture alignment pipeline.
//!
//! Turns a stream of per-frame face detections into a single selected
//! descriptor: geometry is measured per frame, gated against a threshold
//! profile, debounced by a stability streak, and driven through a capture
//! session with countdown, timeout and cancellation.

pub mod config;
pub mod detector;
pub mod emitter;
pub mod gate;
pub mod geometry;
pub mod runner;
pub mod session;
pub mod stability;
pub mod types;

#[cfg(test)]
mod testutil;

pub use config::{CaptureConfig, CaptureMode, ConfigError};
pub use detector::{Detector, DetectorError, LatestFrameDetector, ScriptedDetector, StreamDetector};
pub use gate::{AlignmentVerdict, Profile, RejectReason, Thresholds};
pub use geometry::GeometryMetrics;
pub use runner::{CaptureEngine, CaptureHandle, SessionControl};
pub use session::{CaptureError, CaptureSession, Phase, SessionStatus};
pub use types::{BoundingBox, Descriptor, Frame, Landmarks, Point};
