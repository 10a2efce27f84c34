//! Alignment gate: ordered threshold checks over [`GeometryMetrics`].
//!
//! The check order is fixed and defines which guidance message the subject
//! sees when several thresholds are violated at once: presence, distance,
//! horizontal centering, vertical centering, rotation, tilt.

use crate::config::ConfigError;
use crate::geometry::GeometryMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why a frame was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFace,
    /// Face larger than `max_ratio`; subject should move away.
    TooClose,
    /// Face smaller than `min_ratio`; subject should move closer.
    TooFar,
    OffCenterX,
    OffCenterY,
    Rotated,
    Tilted,
}

impl RejectReason {
    /// Guidance shown to the subject.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoFace => "No face detected. Please move closer or adjust lighting.",
            Self::TooFar => "Move closer to the camera.",
            Self::TooClose => "Move slightly farther from the camera.",
            Self::OffCenterX => "Move your face toward the center.",
            Self::OffCenterY => "Adjust up/down to center your face.",
            Self::Rotated => "Please face the camera directly.",
            Self::Tilted => "Keep your head level (avoid tilting).",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoFace => "no_face",
            Self::TooClose => "too_close",
            Self::TooFar => "too_far",
            Self::OffCenterX => "off_center_x",
            Self::OffCenterY => "off_center_y",
            Self::Rotated => "rotated",
            Self::Tilted => "tilted",
        };
        f.write_str(name)
    }
}

/// Outcome of the gate for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum AlignmentVerdict {
    Pass,
    Reject(RejectReason),
}

impl AlignmentVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Threshold bundle applied by [`check`]. Every value lies in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_ratio: f32,
    pub max_ratio: f32,
    pub max_center_x: f32,
    pub max_center_y: f32,
    pub max_nose_offset: f32,
    pub max_tilt: f32,
}

impl Thresholds {
    /// Tolerant of loose framing and mild head rotation.
    pub const LENIENT: Self = Self {
        min_ratio: 0.2,
        max_ratio: 0.65,
        max_center_x: 0.3,
        max_center_y: 0.3,
        max_nose_offset: 0.25,
        max_tilt: 0.1,
    };

    /// Tighter framing for enrollment-quality captures.
    pub const STRICT: Self = Self {
        min_ratio: 0.25,
        max_ratio: 0.55,
        max_center_x: 0.2,
        max_center_y: 0.2,
        max_nose_offset: 0.15,
        max_tilt: 0.06,
    };

    /// Reject values outside (0, 1] and an inverted size range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("min_ratio", self.min_ratio),
            ("max_ratio", self.max_ratio),
            ("max_center_x", self.max_center_x),
            ("max_center_y", self.max_center_y),
            ("max_nose_offset", self.max_nose_offset),
            ("max_tilt", self.max_tilt),
        ];
        for (name, value) in fields {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidThreshold {
                    name,
                    reason: format!("{value} is outside (0, 1]"),
                });
            }
        }
        if self.min_ratio > self.max_ratio {
            return Err(ConfigError::InvalidThreshold {
                name: "min_ratio",
                reason: format!(
                    "min_ratio {} exceeds max_ratio {}",
                    self.min_ratio, self.max_ratio
                ),
            });
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Profile::default().thresholds()
    }
}

/// Named threshold preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Lenient,
    Strict,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Lenient, Profile::Strict];

    pub fn thresholds(&self) -> Thresholds {
        match self {
            Self::Lenient => Thresholds::LENIENT,
            Self::Strict => Thresholds::STRICT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Apply the ordered checks. `None` means the detector found no usable face.
pub fn check(metrics: Option<&GeometryMetrics>, thresholds: &Thresholds) -> AlignmentVerdict {
    let Some(m) = metrics else {
        return AlignmentVerdict::Reject(RejectReason::NoFace);
    };

    let reason = if m.face_width_ratio < thresholds.min_ratio {
        RejectReason::TooFar
    } else if m.face_width_ratio > thresholds.max_ratio {
        RejectReason::TooClose
    } else if m.center_offset_x > thresholds.max_center_x {
        RejectReason::OffCenterX
    } else if m.center_offset_y > thresholds.max_center_y {
        RejectReason::OffCenterY
    } else if m.nose_offset > thresholds.max_nose_offset {
        RejectReason::Rotated
    } else if m.eye_tilt > thresholds.max_tilt {
        RejectReason::Tilted
    } else {
        return AlignmentVerdict::Pass;
    };

    AlignmentVerdict::Reject(reason)
}
