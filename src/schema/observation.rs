//! focus.observation.v1 schema definition
//!
//! One observation describes what the landmark provider saw in a single frame
//! of a subject's stream. Observations arrive either standalone (NDJSON replay)
//! or wrapped in the inbound message envelope used on live connections.

use crate::landmarks::LandmarkSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "focus.observation.v1";

/// Provider output for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Schema version; assumed current when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Opaque subject identifier
    pub subject_id: String,
    /// Frame width in pixels
    pub frame_width: u32,
    /// Frame height in pixels
    pub frame_height: u32,
    /// Faces visible in the frame
    pub face_count: usize,
    /// Landmarks of the primary face (`null` when they could not be located)
    #[serde(default)]
    pub landmarks: Option<LandmarkSet>,
    /// Capture time; the engine clock is used when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl FrameObservation {
    /// Create an observation with no landmarks
    pub fn new(
        subject_id: impl Into<String>,
        frame_width: u32,
        frame_height: u32,
        face_count: usize,
    ) -> Self {
        Self {
            schema_version: None,
            subject_id: subject_id.into(),
            frame_width,
            frame_height,
            face_count,
            landmarks: None,
            captured_at: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: LandmarkSet) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Validate the observation envelope.
    ///
    /// Landmark completeness is not checked here: an incomplete set is a
    /// legitimate "landmarks unclear" frame, not a malformed message.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(version) = &self.schema_version {
            if version != SCHEMA_VERSION {
                return Err(ValidationError::InvalidSchemaVersion {
                    expected: SCHEMA_VERSION.to_string(),
                    actual: version.clone(),
                });
            }
        }

        if self.subject_id.trim().is_empty() {
            return Err(ValidationError::EmptySubjectId);
        }

        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ValidationError::InvalidFrameSize {
                width: self.frame_width,
                height: self.frame_height,
            });
        }

        Ok(())
    }
}

/// Messages accepted from live connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Landmark observation for one frame (subject connections)
    Observation(FrameObservation),
    /// Liveness probe, answered with `pong`
    Ping,
    /// Encoded camera frame, base64 with an optional `data:` URL prefix
    /// (subject connections)
    VideoFrame { frame: String },
    /// Request for the full subject snapshot map (observer connections)
    RequestState,
    /// Any other `type`; ignored by both connection kinds
    #[serde(other)]
    Unknown,
}

/// Validation errors for observations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Observation has an empty subject_id")]
    EmptySubjectId,

    #[error("Invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
}
