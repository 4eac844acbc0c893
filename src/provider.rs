//! Landmark provider boundary
//!
//! The face-landmark engine is an external capability. This module defines the
//! trait it is consumed through, decodes encoded frames into pixel buffers, and
//! ships two providers that need no model: one that is never ready and one that
//! replays a script.

use crate::error::ComputeError;
use crate::landmarks::LandmarkSet;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::RgbImage;
use std::collections::VecDeque;
use thiserror::Error;

/// Failure reported by a landmark provider for a single frame
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl From<ProviderError> for ComputeError {
    fn from(err: ProviderError) -> Self {
        ComputeError::ProviderError(err.0)
    }
}

/// Face counting and landmark localization on decoded frames.
///
/// Implementations may keep per-stream tracking state, hence `&mut self`.
pub trait LandmarkProvider: Send {
    /// Whether the backend initialized and can analyze frames
    fn is_ready(&self) -> bool;

    /// Number of faces visible in the frame
    fn count_faces(&mut self, frame: &RgbImage) -> Result<usize, ProviderError>;

    /// Landmarks of the primary face, or `None` when they cannot be located
    fn locate_landmarks(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, ProviderError>;
}

/// Decode an encoded image (PNG or JPEG) into an RGB pixel buffer
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, ComputeError> {
    if bytes.is_empty() {
        return Err(ComputeError::DecodeError("empty frame payload".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| ComputeError::DecodeError(e.to_string()))?
        .to_rgb8();

    if image.width() == 0 || image.height() == 0 {
        return Err(ComputeError::InvalidFrame(format!(
            "frame has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }

    Ok(image)
}

/// Decode a base64 frame payload, with or without a `data:image/...;base64,`
/// prefix, into the encoded image bytes
pub fn decode_frame_payload(payload: &str) -> Result<Vec<u8>, ComputeError> {
    let data = payload.split_once(',').map_or(payload, |(_, data)| data);
    STANDARD
        .decode(data.trim())
        .map_err(|e| ComputeError::DecodeError(format!("invalid base64 frame: {e}")))
}

/// Base64 form of `bytes` as a `data:` URL, as browsers produce it
#[cfg(test)]
pub(crate) fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Provider used when no landmark backend is available
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableProvider;

impl LandmarkProvider for UnavailableProvider {
    fn is_ready(&self) -> bool {
        false
    }

    fn count_faces(&mut self, _frame: &RgbImage) -> Result<usize, ProviderError> {
        Err(ProviderError("no landmark backend configured".to_string()))
    }

    fn locate_landmarks(
        &mut self,
        _frame: &RgbImage,
    ) -> Result<Option<LandmarkSet>, ProviderError> {
        Err(ProviderError("no landmark backend configured".to_string()))
    }
}

/// What a provider sees in one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    pub face_count: usize,
    pub landmarks: Option<LandmarkSet>,
}

impl Detection {
    pub fn new(face_count: usize, landmarks: Option<LandmarkSet>) -> Self {
        Self {
            face_count,
            landmarks,
        }
    }
}

/// Replays queued detections, one per frame, in order.
///
/// `count_faces` advances the script; `locate_landmarks` answers for the frame
/// most recently counted. Once the script runs out every frame is empty.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: VecDeque<Result<Detection, ProviderError>>,
    current: Option<Detection>,
}

impl ScriptedProvider {
    pub fn new(detections: impl IntoIterator<Item = Detection>) -> Self {
        Self {
            script: detections.into_iter().map(Ok).collect(),
            current: None,
        }
    }

    /// Queue a detection for the next frame
    pub fn push(&mut self, detection: Detection) {
        self.script.push_back(Ok(detection));
    }

    /// Queue a provider failure for the next frame
    pub fn push_failure(&mut self, message: impl Into<String>) {
        self.script.push_back(Err(ProviderError(message.into())));
    }

    /// Detections not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl LandmarkProvider for ScriptedProvider {
    fn is_ready(&self) -> bool {
        true
    }

    fn count_faces(&mut self, _frame: &RgbImage) -> Result<usize, ProviderError> {
        match self.script.pop_front() {
            Some(Ok(detection)) => {
                let count = detection.face_count;
                self.current = Some(detection);
                Ok(count)
            }
            Some(Err(err)) => {
                self.current = None;
                Err(err)
            }
            None => {
                self.current = Some(Detection::default());
                Ok(0)
            }
        }
    }

    fn locate_landmarks(
        &mut self,
        _frame: &RgbImage,
    ) -> Result<Option<LandmarkSet>, ProviderError> {
        match &self.current {
            Some(detection) => Ok(detection.landmarks.clone()),
            None => Err(ProviderError("no frame counted".to_string())),
        }
    }
}

/// Encode a blank frame as PNG (test helper)
#[cfg(test)]
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::new(width, height)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
