//! Facial expression features
//!
//! Confusion is scored from five binary geometric indicators whose thresholds
//! are scaled by the frame size. Smiling is approximated by how open the mouth
//! is relative to its width.

use super::EPSILON;
use crate::error::ComputeError;
use crate::landmarks::{ids, LandmarkSet};
use crate::types::{ConfusionAnalysis, ConfusionIndicator};

/// Inter-brow distance below this fraction of the frame width reads as furrowed
const BROW_DISTANCE_RATIO: f64 = 0.12;
/// Brow-to-eye gap below this fraction of the frame height reads as lowered brows
const BROW_TO_EYE_RATIO: f64 = 0.03;
/// Mouth aspect ratio below which the subject is not smiling
const NO_SMILE_MAR: f64 = 0.25;
/// Face-edge height difference above this fraction of the frame height is a tilt
const HEAD_TILT_RATIO: f64 = 0.03;
/// Average eye opening below this fraction of the frame height is a squint
const SQUINT_RATIO: f64 = 0.015;
/// Lip gap below this fraction of the frame height, combined with a flat mouth
const LIP_GAP_RATIO: f64 = 0.01;
const TENSE_MOUTH_MAR: f64 = 0.2;

/// Indicator count from which the mean score is amplified
const AMPLIFY_MIN_INDICATORS: usize = 3;
const AMPLIFY_FACTOR: f64 = 1.2;

/// Mouth aspect ratio that maps to a full smile
const SMILE_FULL_MAR: f64 = 0.35;

/// Mouth opening height over mouth width, both in pixels
pub fn mouth_aspect_ratio(
    landmarks: &LandmarkSet,
    width: f64,
    height: f64,
) -> Result<f64, ComputeError> {
    let mouth_left = landmarks.point(ids::MOUTH_LEFT)?;
    let mouth_right = landmarks.point(ids::MOUTH_RIGHT)?;
    let mouth_top = landmarks.point(ids::MOUTH_TOP)?;
    let mouth_bottom = landmarks.point(ids::MOUTH_BOTTOM)?;

    let mouth_width = (mouth_left.x - mouth_right.x).abs() * width;
    let mouth_height = (mouth_top.y - mouth_bottom.y).abs() * height;

    Ok(mouth_height / (mouth_width + EPSILON))
}

/// Score confusion from brow, mouth, head and eye geometry.
///
/// The score is the mean weight of the indicators that fired. Three or more
/// indicators amplify it by 1.2, capped at 1.0.
pub fn detect_confusion(
    landmarks: &LandmarkSet,
    width: f64,
    height: f64,
) -> Result<ConfusionAnalysis, ComputeError> {
    let left_brow_inner = landmarks.point(ids::LEFT_BROW_INNER)?;
    let right_brow_inner = landmarks.point(ids::RIGHT_BROW_INNER)?;
    let left_brow_center = landmarks.point(ids::LEFT_BROW_CENTER)?;
    let right_brow_center = landmarks.point(ids::RIGHT_BROW_CENTER)?;

    let left_eye_top = landmarks.point(ids::LEFT_EYE_TOP)?;
    let left_eye_bottom = landmarks.point(ids::LEFT_EYE_BOTTOM)?;
    let right_eye_top = landmarks.point(ids::RIGHT_EYE_TOP)?;
    let right_eye_bottom = landmarks.point(ids::RIGHT_EYE_BOTTOM)?;

    let upper_lip = landmarks.point(ids::UPPER_LIP)?;
    let lower_lip = landmarks.point(ids::LOWER_LIP)?;

    let left_face = landmarks.point(ids::LEFT_FACE_EDGE)?;
    let right_face = landmarks.point(ids::RIGHT_FACE_EDGE)?;

    let mar = mouth_aspect_ratio(landmarks, width, height)?;

    let mut indicators = Vec::new();

    let brow_distance = (left_brow_inner.x - right_brow_inner.x).abs() * width;
    let brow_height = (left_brow_center.y + right_brow_center.y) / 2.0 * height;
    let eye_height = (left_eye_top.y + right_eye_top.y) / 2.0 * height;
    let brow_to_eye = eye_height - brow_height;
    if brow_distance < width * BROW_DISTANCE_RATIO && brow_to_eye < height * BROW_TO_EYE_RATIO {
        indicators.push(ConfusionIndicator::BrowFurrowing);
    }

    if mar < NO_SMILE_MAR {
        indicators.push(ConfusionIndicator::NoSmile);
    }

    let face_tilt = (left_face.y - right_face.y).abs() * height;
    if face_tilt > height * HEAD_TILT_RATIO {
        indicators.push(ConfusionIndicator::HeadTilt);
    }

    let left_eye_opening = (left_eye_top.y - left_eye_bottom.y).abs() * height;
    let right_eye_opening = (right_eye_top.y - right_eye_bottom.y).abs() * height;
    if (left_eye_opening + right_eye_opening) / 2.0 < height * SQUINT_RATIO {
        indicators.push(ConfusionIndicator::EyeSquinting);
    }

    let lip_gap = (upper_lip.y - lower_lip.y).abs() * height;
    if lip_gap < height * LIP_GAP_RATIO && mar < TENSE_MOUTH_MAR {
        indicators.push(ConfusionIndicator::MouthTension);
    }

    Ok(ConfusionAnalysis {
        score: confusion_score(&indicators),
        indicators,
    })
}

/// Combine fired indicators into a single score
pub fn confusion_score(indicators: &[ConfusionIndicator]) -> f64 {
    if indicators.is_empty() {
        return 0.0;
    }

    let mean = indicators.iter().map(|i| i.weight()).sum::<f64>() / indicators.len() as f64;
    if indicators.len() >= AMPLIFY_MIN_INDICATORS {
        (mean * AMPLIFY_FACTOR).min(1.0)
    } else {
        mean
    }
}

/// Smile score (0-1): mouth aspect ratio relative to a full smile
pub fn detect_smile(landmarks: &LandmarkSet, width: f64, height: f64) -> Result<f64, ComputeError> {
    let mar = mouth_aspect_ratio(landmarks, width, height)?;
    Ok((mar / SMILE_FULL_MAR).min(1.0))
}
