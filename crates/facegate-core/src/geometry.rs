//! Per-frame face geometry: size, centering and orientation ratios.
//!
//! All metrics are dimensionless so the same thresholds apply regardless of
//! camera resolution or subject distance.

use crate::types::{Frame, Point};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("landmark cluster is empty: {0}")]
    InsufficientLandmarks(&'static str),
    #[error("degenerate frame geometry: {0}")]
    DegenerateFrame(&'static str),
}

/// Geometry derived from a single detection frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometryMetrics {
    /// Face box width relative to frame width. Larger = closer to the camera.
    pub face_width_ratio: f32,
    /// Horizontal distance of the face center from the frame center,
    /// relative to half the frame width.
    pub center_offset_x: f32,
    /// Vertical distance of the face center from the frame center,
    /// relative to half the frame height.
    pub center_offset_y: f32,
    /// Horizontal nose displacement from the eye midpoint, relative to inter-eye distance.
    pub nose_offset: f32,
    /// Vertical difference between eye centers, relative to box height.
    pub eye_tilt: f32,
}

/// Compute [`GeometryMetrics`] for one frame.
///
/// Fails when any landmark cluster is empty or the frame/box dimensions
/// cannot be used as a divisor; callers treat both as "no face".
pub fn evaluate(frame: &Frame) -> Result<GeometryMetrics, GeometryError> {
    let (fw, fh) = (frame.frame_width, frame.frame_height);
    if !(fw.is_finite() && fh.is_finite()) || fw <= 0.0 || fh <= 0.0 {
        return Err(GeometryError::DegenerateFrame("frame dimensions must be positive"));
    }
    let bbox = &frame.bbox;
    if !(bbox.width.is_finite() && bbox.height.is_finite()) || bbox.height <= 0.0 {
        return Err(GeometryError::DegenerateFrame("box height must be positive"));
    }

    let left_eye = centroid(&frame.landmarks.left_eye)
        .ok_or(GeometryError::InsufficientLandmarks("left_eye"))?;
    let right_eye = centroid(&frame.landmarks.right_eye)
        .ok_or(GeometryError::InsufficientLandmarks("right_eye"))?;
    let nose = centroid(&frame.landmarks.nose)
        .ok_or(GeometryError::InsufficientLandmarks("nose"))?;

    if [left_eye, right_eye, nose]
        .iter()
        .any(|p| !(p.x.is_finite() && p.y.is_finite()))
        || !(bbox.x.is_finite() && bbox.y.is_finite())
    {
        return Err(GeometryError::DegenerateFrame("non-finite coordinates"));
    }

    let (cx, cy) = bbox.center();
    let half_w = fw / 2.0;
    let half_h = fh / 2.0;

    let eye_mid_x = (left_eye.x + right_eye.x) / 2.0;
    let eye_span = (right_eye.x - left_eye.x).abs();
    // Coincident eyes means the face is seen edge-on; never let it pass as NaN.
    let nose_offset = if eye_span > 0.0 {
        (nose.x - eye_mid_x).abs() / eye_span
    } else {
        f32::INFINITY
    };

    Ok(GeometryMetrics {
        face_width_ratio: bbox.width / fw,
        center_offset_x: (cx - half_w).abs() / half_w,
        center_offset_y: (cy - half_h).abs() / half_h,
        nose_offset,
        eye_tilt: (left_eye.y - right_eye.y).abs() / bbox.height,
    })
}

/// Mean of a point cluster, `None` when empty.
fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}
