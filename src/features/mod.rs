//! Feature extraction
//!
//! This module derives per-frame features from a landmark set:
//! - Gaze direction and the looking-away flag
//! - Confusion score from geometric facial indicators
//! - Smile score from the mouth aspect ratio
//!
//! Every extractor is a pure function of the landmarks and the frame size.

pub mod expression;
pub mod gaze;

pub use expression::{detect_confusion, detect_smile, mouth_aspect_ratio};
pub use gaze::analyze_gaze;

use crate::error::ComputeError;
use crate::landmarks::LandmarkSet;
use crate::types::FrameFeatures;

/// Additive guard for every division between landmark distances
pub const EPSILON: f64 = 1e-6;

/// Feature extractor for computing per-frame signals
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract all features from one landmark set.
    ///
    /// `width` and `height` are the frame dimensions in pixels; thresholds that
    /// depend on face geometry are scaled by them.
    pub fn extract(
        landmarks: &LandmarkSet,
        width: f64,
        height: f64,
    ) -> Result<FrameFeatures, ComputeError> {
        let gaze = analyze_gaze(landmarks)?;
        let confusion = detect_confusion(landmarks, width, height)?;
        let mouth_aspect_ratio = mouth_aspect_ratio(landmarks, width, height)?;
        let smile_score = detect_smile(landmarks, width, height)?;

        Ok(FrameFeatures {
            gaze,
            confusion,
            smile_score,
            mouth_aspect_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{neutral_face, TEST_FRAME};
    use crate::types::GazeDirection;

    #[test]
    fn test_extract_neutral_face() {
        let (w, h) = TEST_FRAME;
        let features = FeatureExtractor::extract(&neutral_face(), w as f64, h as f64).unwrap();

        assert_eq!(features.gaze.direction, GazeDirection::Center);
        assert!(!features.gaze.away);
        assert_eq!(features.confusion.score, 0.0);
        assert!(features.confusion.indicators.is_empty());
        assert!((features.mouth_aspect_ratio - 0.3).abs() < 1e-4);
        assert!((features.smile_score - 0.3 / 0.35).abs() < 1e-4);
    }

    #[test]
    fn test_extract_fails_on_incomplete_landmarks() {
        let partial = LandmarkSet::new().with(crate::landmarks::ids::LEFT_IRIS, 0.5, 0.5);
        assert!(FeatureExtractor::extract(&partial, 640.0, 480.0).is_err());
    }
}
