//! Core types for the Synheart Focus engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: per-frame feature readings, the verdict produced by the classifier,
//! the gaze events retained per subject, and the snapshots handed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall engagement status of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unknown,
    Good,
    Warning,
    Alert,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Good => "good",
            Status::Warning => "warning",
            Status::Alert => "alert",
        }
    }
}

/// Reason attached to a warning or alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NoFaceDetected,
    MultipleFaces,
    GazeAway,
    Confused,
}

/// Coarse gaze direction derived from iris position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    #[default]
    Center,
    Left,
    Right,
    Up,
    Down,
}

/// Facial expression label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Focused,
    Confused,
}

/// Engagement level reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    #[default]
    Unknown,
    Struggling,
    Engaged,
    Focused,
}

/// Geometric indicators contributing to the confusion score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionIndicator {
    BrowFurrowing,
    NoSmile,
    HeadTilt,
    EyeSquinting,
    MouthTension,
}

impl ConfusionIndicator {
    /// Contribution of this indicator to the raw confusion mean
    pub fn weight(&self) -> f64 {
        match self {
            ConfusionIndicator::BrowFurrowing => 0.8,
            ConfusionIndicator::NoSmile => 0.5,
            ConfusionIndicator::HeadTilt => 0.6,
            ConfusionIndicator::EyeSquinting => 0.7,
            ConfusionIndicator::MouthTension => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfusionIndicator::BrowFurrowing => "brow_furrowing",
            ConfusionIndicator::NoSmile => "no_smile",
            ConfusionIndicator::HeadTilt => "head_tilt",
            ConfusionIndicator::EyeSquinting => "eye_squinting",
            ConfusionIndicator::MouthTension => "mouth_tension",
        }
    }
}

/// Gaze features extracted from a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeReading {
    /// Classified direction (vertical overrides horizontal)
    pub direction: GazeDirection,
    /// Whether the subject is looking away from the screen
    pub away: bool,
    /// Averaged horizontal iris ratio across both eyes (0 = left corner, 1 = right corner)
    pub ratio_x: f64,
    /// Averaged normalized iris height across both eyes
    pub iris_y: f64,
}

/// Confusion features extracted from a single frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionAnalysis {
    /// Confusion score (0-1)
    pub score: f64,
    /// Indicators that fired, in evaluation order
    pub indicators: Vec<ConfusionIndicator>,
}

/// Features derived from one landmark set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    pub gaze: GazeReading,
    pub confusion: ConfusionAnalysis,
    /// Smile score (0-1)
    pub smile_score: f64,
    /// Mouth aspect ratio (height / width)
    pub mouth_aspect_ratio: f64,
}

/// A single entry in a subject's gaze window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeEvent {
    pub away: bool,
    pub timestamp: DateTime<Utc>,
}

/// Engagement verdict produced for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: Status,
    pub alert_type: Option<AlertType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Confidence in the verdict (0-1)
    pub confidence: f64,
    pub gaze_direction: GazeDirection,
    pub emotion: Emotion,
    /// Confusion score (0-1)
    pub confusion_score: f64,
    pub engagement_level: EngagementLevel,
    /// Number of faces reported by the provider
    pub face_count: usize,
    pub face_detected: bool,
    pub multiple_faces: bool,
    pub landmarks_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze_away: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confusion_indicators: Option<Vec<ConfusionIndicator>>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            status: Status::Unknown,
            alert_type: None,
            message: None,
            confidence: 0.0,
            gaze_direction: GazeDirection::Center,
            emotion: Emotion::Neutral,
            confusion_score: 0.0,
            engagement_level: EngagementLevel::Unknown,
            face_count: 0,
            face_detected: false,
            multiple_faces: false,
            landmarks_detected: false,
            gaze_away: None,
            confusion_indicators: None,
        }
    }
}

/// Verdict stamped with its subject and emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub subject_id: String,
    /// Emission time (RFC 3339)
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Current state of one subject as exposed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub subject_id: String,
    pub last_update: DateTime<Utc>,
    /// Latest verdict (status `unknown` until the first frame is classified)
    pub latest_verdict: Verdict,
}
