//! Gaze estimation
//!
//! Estimates where the subject is looking from the iris centers relative to the
//! eye corners (horizontal) and from the absolute iris height in the frame
//! (vertical).

use super::EPSILON;
use crate::error::ComputeError;
use crate::landmarks::{ids, LandmarkSet};
use crate::types::{GazeDirection, GazeReading};

/// Averaged horizontal ratio below which the subject is looking left
pub const LEFT_RATIO_THRESHOLD: f64 = 0.35;
/// Averaged horizontal ratio above which the subject is looking right
pub const RIGHT_RATIO_THRESHOLD: f64 = 0.65;
/// Averaged iris height below which the subject is looking up
pub const UP_THRESHOLD: f64 = 0.45;
/// Averaged iris height above which the subject is looking down
pub const DOWN_THRESHOLD: f64 = 0.55;

/// Classify gaze direction for one frame.
///
/// The vertical check runs after the horizontal one and overwrites it, so a
/// frame looking both far left and far up reports `Up`.
pub fn analyze_gaze(landmarks: &LandmarkSet) -> Result<GazeReading, ComputeError> {
    let left_iris = landmarks.point(ids::LEFT_IRIS)?;
    let right_iris = landmarks.point(ids::RIGHT_IRIS)?;

    let left_eye_left = landmarks.point(ids::LEFT_EYE_OUTER)?;
    let left_eye_right = landmarks.point(ids::LEFT_EYE_INNER)?;
    let right_eye_left = landmarks.point(ids::RIGHT_EYE_INNER)?;
    let right_eye_right = landmarks.point(ids::RIGHT_EYE_OUTER)?;

    let left_ratio = (left_iris.x - left_eye_left.x) / (left_eye_right.x - left_eye_left.x + EPSILON);
    let right_ratio =
        (right_iris.x - right_eye_left.x) / (right_eye_right.x - right_eye_left.x + EPSILON);
    let ratio_x = (left_ratio + right_ratio) / 2.0;

    let (mut direction, mut away) = if ratio_x < LEFT_RATIO_THRESHOLD {
        (GazeDirection::Left, true)
    } else if ratio_x > RIGHT_RATIO_THRESHOLD {
        (GazeDirection::Right, true)
    } else {
        (GazeDirection::Center, false)
    };

    let iris_y = (left_iris.y + right_iris.y) / 2.0;
    if iris_y < UP_THRESHOLD {
        direction = GazeDirection::Up;
        away = true;
    } else if iris_y > DOWN_THRESHOLD {
        direction = GazeDirection::Down;
        away = true;
    }

    Ok(GazeReading {
        direction,
        away,
        ratio_x,
        iris_y,
    })
}
