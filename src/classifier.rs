//! Status classification
//!
//! Turns the per-frame signals into a single engagement verdict. Rules are
//! evaluated in a fixed order and the first match wins:
//!
//! 1. No face in frame (alert)
//! 2. More than one face (alert)
//! 3. Face found but landmarks unusable (warning)
//! 4. Looking away longer than the gaze threshold (alert)
//! 5. Confusion above threshold (warning)
//! 6. Smiling (good, engaged)
//! 7. Otherwise (good, focused)

use crate::config::EngineConfig;
use crate::types::{AlertType, Emotion, EngagementLevel, FrameFeatures, Status, Verdict};

/// Confidence attached to verdicts computed from a full landmark set
pub const LANDMARK_CONFIDENCE: f64 = 0.85;
/// Confidence attached to verdicts where landmarks could not be used
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

/// Everything the classifier looks at for one frame
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    /// Faces reported by the provider
    pub face_count: usize,
    /// Whether the provider returned a landmark set, usable or not
    pub landmarks_detected: bool,
    /// Features of the primary face, `None` when landmarks were unusable
    pub features: Option<&'a FrameFeatures>,
    /// Continuous look-away time in seconds, including this frame
    pub away_duration: f64,
}

/// Priority-ordered rule set mapping frame signals to a verdict
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    gaze_away_threshold_secs: f64,
    confusion_threshold: f64,
    smile_threshold: f64,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl StatusClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            gaze_away_threshold_secs: config.gaze_away_threshold_secs,
            confusion_threshold: config.confusion_threshold,
            smile_threshold: config.smile_threshold,
        }
    }

    /// Classify one frame. Pure: the same input always yields the same verdict.
    pub fn classify(&self, input: &ClassifierInput<'_>) -> Verdict {
        let mut verdict = Verdict {
            face_count: input.face_count,
            face_detected: input.face_count > 0,
            multiple_faces: input.face_count > 1,
            landmarks_detected: input.landmarks_detected,
            ..Verdict::default()
        };

        if input.face_count == 0 {
            verdict.status = Status::Alert;
            verdict.alert_type = Some(AlertType::NoFaceDetected);
            verdict.message = Some("No face detected in frame".to_string());
            return verdict;
        }

        if input.face_count > 1 {
            verdict.status = Status::Alert;
            verdict.alert_type = Some(AlertType::MultipleFaces);
            verdict.message = Some("Multiple faces detected".to_string());
            return verdict;
        }

        let Some(features) = input.features else {
            verdict.status = Status::Warning;
            verdict.message = Some("Face detected but landmarks unclear".to_string());
            verdict.confidence = DEGRADED_CONFIDENCE;
            return verdict;
        };

        verdict.confidence = LANDMARK_CONFIDENCE;
        verdict.gaze_direction = features.gaze.direction;
        verdict.gaze_away = Some(features.gaze.away);

        if input.away_duration > self.gaze_away_threshold_secs {
            verdict.status = Status::Alert;
            verdict.alert_type = Some(AlertType::GazeAway);
            verdict.message = Some(format!("Looking away for {:.1}s", input.away_duration));
            return verdict;
        }

        verdict.confusion_score = features.confusion.score;
        verdict.confusion_indicators = Some(features.confusion.indicators.clone());

        if features.confusion.score > self.confusion_threshold {
            verdict.status = Status::Warning;
            verdict.alert_type = Some(AlertType::Confused);
            verdict.emotion = Emotion::Confused;
            verdict.engagement_level = EngagementLevel::Struggling;
            verdict.message = Some("Subject appears confused".to_string());
        } else if features.smile_score > self.smile_threshold {
            verdict.status = Status::Good;
            verdict.emotion = Emotion::Happy;
            verdict.engagement_level = EngagementLevel::Engaged;
        } else {
            verdict.status = Status::Good;
            verdict.emotion = Emotion::Focused;
            verdict.engagement_level = EngagementLevel::Focused;
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfusionAnalysis, ConfusionIndicator, GazeDirection, GazeReading};
    use pretty_assertions::assert_eq;

    fn features(direction: GazeDirection, confusion: f64, smile: f64) -> FrameFeatures {
        FrameFeatures {
            gaze: GazeReading {
                direction,
                away: direction != GazeDirection::Center,
                ratio_x: 0.5,
                iris_y: 0.5,
            },
            confusion: ConfusionAnalysis {
                score: confusion,
                indicators: if confusion > 0.0 {
                    vec![ConfusionIndicator::BrowFurrowing]
                } else {
                    Vec::new()
                },
            },
            smile_score: smile,
            mouth_aspect_ratio: smile * 0.35,
        }
    }

    fn input(face_count: usize, features: Option<&FrameFeatures>, away: f64) -> ClassifierInput<'_> {
        ClassifierInput {
            face_count,
            landmarks_detected: features.is_some(),
            features,
            away_duration: away,
        }
    }

    #[test]
    fn test_no_face() {
        let verdict = StatusClassifier::default().classify(&input(0, None, 0.0));

        assert_eq!(verdict.status, Status::Alert);
        assert_eq!(verdict.alert_type, Some(AlertType::NoFaceDetected));
        assert_eq!(verdict.message.as_deref(), Some("No face detected in frame"));
        assert_eq!(verdict.confidence, 0.0);
        assert!(!verdict.face_detected);
    }

    #[test]
    fn test_multiple_faces_beat_usable_landmarks() {
        let f = features(GazeDirection::Center, 0.0, 0.9);
        let verdict = StatusClassifier::default().classify(&input(2, Some(&f), 0.0));

        assert_eq!(verdict.status, Status::Alert);
        assert_eq!(verdict.alert_type, Some(AlertType::MultipleFaces));
        assert_eq!(verdict.message.as_deref(), Some("Multiple faces detected"));
        assert!(verdict.multiple_faces);
        assert_eq!(verdict.gaze_away, None);
    }

    #[test]
    fn test_landmarks_unclear() {
        let verdict = StatusClassifier::default().classify(&input(1, None, 10.0));

        assert_eq!(verdict.status, Status::Warning);
        assert_eq!(verdict.alert_type, None);
        assert_eq!(verdict.confidence, DEGRADED_CONFIDENCE);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Face detected but landmarks unclear")
        );
        assert!(verdict.face_detected);
        assert!(!verdict.landmarks_detected);
    }

    #[test]
    fn test_landmarks_reported_whatever_the_face_count() {
        let classifier = StatusClassifier::default();
        let crowd = classifier.classify(&ClassifierInput {
            face_count: 2,
            landmarks_detected: true,
            features: None,
            away_duration: 0.0,
        });
        assert_eq!(crowd.alert_type, Some(AlertType::MultipleFaces));
        assert!(crowd.landmarks_detected);

        let partial = classifier.classify(&ClassifierInput {
            face_count: 1,
            landmarks_detected: true,
            features: None,
            away_duration: 0.0,
        });
        assert_eq!(partial.confidence, DEGRADED_CONFIDENCE);
        assert!(partial.landmarks_detected);
    }

    #[test]
    fn test_gaze_away_beats_confusion() {
        let f = features(GazeDirection::Left, 0.9, 0.0);
        let verdict = StatusClassifier::default().classify(&input(1, Some(&f), 5.0));

        assert_eq!(verdict.status, Status::Alert);
        assert_eq!(verdict.alert_type, Some(AlertType::GazeAway));
        assert_eq!(verdict.message.as_deref(), Some("Looking away for 5.0s"));
        assert_eq!(verdict.confidence, LANDMARK_CONFIDENCE);
        assert_eq!(verdict.gaze_direction, GazeDirection::Left);
        assert_eq!(verdict.gaze_away, Some(true));
        // confusion is not evaluated once the gaze rule fires
        assert_eq!(verdict.confusion_score, 0.0);
        assert_eq!(verdict.confusion_indicators, None);
    }

    #[test]
    fn test_gaze_threshold_is_exclusive() {
        let f = features(GazeDirection::Left, 0.0, 0.0);
        let verdict = StatusClassifier::default().classify(&input(1, Some(&f), 4.0));

        assert_eq!(verdict.status, Status::Good);
        assert_eq!(verdict.gaze_away, Some(true));
    }

    #[test]
    fn test_confused() {
        let f = features(GazeDirection::Center, 0.84, 0.9);
        let verdict = StatusClassifier::default().classify(&input(1, Some(&f), 0.0));

        assert_eq!(verdict.status, Status::Warning);
        assert_eq!(verdict.alert_type, Some(AlertType::Confused));
        assert_eq!(verdict.emotion, Emotion::Confused);
        assert_eq!(verdict.engagement_level, EngagementLevel::Struggling);
        assert_eq!(verdict.message.as_deref(), Some("Subject appears confused"));
        assert_eq!(verdict.confusion_score, 0.84);
    }

    #[test]
    fn test_happy_and_focused() {
        let classifier = StatusClassifier::default();

        let smiling = features(GazeDirection::Center, 0.0, 0.857);
        let verdict = classifier.classify(&input(1, Some(&smiling), 0.0));
        assert_eq!(verdict.status, Status::Good);
        assert_eq!(verdict.emotion, Emotion::Happy);
        assert_eq!(verdict.engagement_level, EngagementLevel::Engaged);
        assert_eq!(verdict.alert_type, None);
        assert_eq!(verdict.message, None);
        assert_eq!(verdict.confidence, LANDMARK_CONFIDENCE);

        let neutral = features(GazeDirection::Center, 0.55, 0.6);
        let verdict = classifier.classify(&input(1, Some(&neutral), 0.0));
        assert_eq!(verdict.emotion, Emotion::Focused);
        assert_eq!(verdict.engagement_level, EngagementLevel::Focused);
        assert_eq!(verdict.confusion_score, 0.55);
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = EngineConfig {
            gaze_away_threshold_secs: 1.0,
            confusion_threshold: 0.9,
            ..EngineConfig::default()
        };
        let classifier = StatusClassifier::new(&config);

        let f = features(GazeDirection::Right, 0.84, 0.0);
        let verdict = classifier.classify(&input(1, Some(&f), 1.5));
        assert_eq!(verdict.alert_type, Some(AlertType::GazeAway));

        let verdict = classifier.classify(&input(1, Some(&f), 0.0));
        assert_eq!(verdict.status, Status::Good);
    }

    #[test]
    fn test_deterministic() {
        let f = features(GazeDirection::Up, 0.3, 0.2);
        let classifier = StatusClassifier::default();
        let a = classifier.classify(&input(1, Some(&f), 2.0));
        let b = classifier.classify(&input(1, Some(&f), 2.0));
        assert_eq!(a, b);
    }
}
