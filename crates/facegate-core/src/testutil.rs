//! Synthetic detection frames for unit tests.

use crate::types::{BoundingBox, Descriptor, Frame, Landmarks, Point};

const FRAME_W: f32 = 640.0;
const FRAME_H: f32 = 480.0;

/// A square face centered in a 640×480 frame.
///
/// `ratio` is the face width relative to the frame, `nose_offset` the nose
/// displacement in units of inter-eye distance, and `eye_tilt` the eye height
/// difference in units of box height.
pub fn frame_with(ratio: f32, nose_offset: f32, eye_tilt: f32) -> Frame {
    let width = ratio * FRAME_W;
    let (cx, cy) = (FRAME_W / 2.0, FRAME_H / 2.0);
    let eye_span = 0.4 * width;
    let left_x = cx - eye_span / 2.0;
    let right_x = cx + eye_span / 2.0;
    let left_y = cy - 0.1 * width;
    let right_y = left_y + eye_tilt * width;
    let nose_x = cx + nose_offset * eye_span;

    Frame {
        bbox: BoundingBox {
            x: cx - width / 2.0,
            y: cy - width / 2.0,
            width,
            height: width,
        },
        landmarks: Landmarks {
            left_eye: vec![Point::new(left_x - 2.0, left_y), Point::new(left_x + 2.0, left_y)],
            right_eye: vec![Point::new(right_x - 2.0, right_y), Point::new(right_x + 2.0, right_y)],
            nose: vec![Point::new(nose_x, cy), Point::new(nose_x, cy + 6.0)],
        },
        descriptor: Descriptor::new(vec![ratio, nose_offset, eye_tilt]),
        frame_width: FRAME_W,
        frame_height: FRAME_H,
    }
}

/// A frame that passes both built-in profiles.
pub fn aligned() -> Frame {
    frame_with(0.4, 0.05, 0.02)
}

/// Same frame with a distinguishable descriptor.
pub fn aligned_tagged(tag: f32) -> Frame {
    let mut frame = aligned();
    frame.descriptor = Descriptor::new(vec![tag]);
    frame
}

/// Move the face (box and landmarks) by (dx, dy) pixels.
pub fn shifted(mut frame: Frame, dx: f32, dy: f32) -> Frame {
    frame.bbox.x += dx;
    frame.bbox.y += dy;
    for p in frame
        .landmarks
        .left_eye
        .iter_mut()
        .chain(frame.landmarks.right_eye.iter_mut())
        .chain(frame.landmarks.nose.iter_mut())
    {
        p.x += dx;
        p.y += dy;
    }
    frame
}
