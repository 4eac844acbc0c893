//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Focus. It runs each frame
//! through the full pipeline: landmarks, features, gaze window, classifier,
//! and the subject store.

use crate::classifier::{ClassifierInput, StatusClassifier};
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::features::FeatureExtractor;
use crate::provider::{decode_frame, decode_frame_payload, LandmarkProvider};
use crate::schema::{FrameObservation, ObservationReader};
use crate::store::SubjectStore;
use crate::types::{AnalysisResult, FrameFeatures};
use chrono::{DateTime, Utc};
use image::RgbImage;
use log::{debug, warn};
use std::sync::Arc;

/// Replay an NDJSON stream of observations through a fresh engine.
///
/// Observations without `captured_at` are stamped with the current time.
///
/// # Example
/// ```ignore
/// let results = replay_ndjson(&std::fs::read_to_string("session.ndjson")?, EngineConfig::default())?;
/// ```
pub fn replay_ndjson(
    ndjson: &str,
    config: EngineConfig,
) -> Result<Vec<AnalysisResult>, ComputeError> {
    let observations = ObservationReader::parse_ndjson(ndjson)?;
    replay_observations(&observations, config)
}

/// Replay a batch of observations through a fresh engine, in order
pub fn replay_observations(
    observations: &[FrameObservation],
    config: EngineConfig,
) -> Result<Vec<AnalysisResult>, ComputeError> {
    let engine = AttentionEngine::new(config)?;
    observations
        .iter()
        .map(|obs| engine.ingest(obs, Utc::now()))
        .collect()
}

/// Stateful per-subject analysis engine.
///
/// Shared across connection handlers through `Arc`; frames for different
/// subjects never block each other.
#[derive(Debug)]
pub struct AttentionEngine {
    config: EngineConfig,
    store: SubjectStore,
    classifier: StatusClassifier,
}

impl Default for AttentionEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            store: SubjectStore::new(&config),
            classifier: StatusClassifier::new(&config),
            config,
        }
    }
}

impl AttentionEngine {
    /// Create an engine after validating its configuration
    pub fn new(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            store: SubjectStore::new(&config),
            classifier: StatusClassifier::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SubjectStore {
        &self.store
    }

    /// Analyze one frame observation and record the verdict.
    ///
    /// `now` is the engine clock. A `captured_at` stamp is used as the frame
    /// time unless it lies ahead of the engine clock, in which case it is
    /// ignored. Frame times are clamped per subject so they never run
    /// backwards. Eviction only ever looks at the engine clock.
    pub fn ingest(
        &self,
        observation: &FrameObservation,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, ComputeError> {
        observation.validate()?;
        let subject_id = observation.subject_id.as_str();
        let frame_at = frame_time(observation, now);

        // Only a single face's landmarks feed the gaze window
        let features = if observation.face_count == 1 {
            usable_features(observation)
        } else {
            None
        };

        let record = self.store.acquire(subject_id, now);
        let (verdict, timestamp) = {
            let mut record = record.lock();
            record.touch(now);
            let at = record.frame_time(frame_at);

            let away_duration = match &features {
                Some(f) => {
                    record.push_gaze(f.gaze.away, at);
                    record.window.continuous_away_duration(at)
                }
                None => 0.0,
            };

            let verdict = self.classifier.classify(&ClassifierInput {
                face_count: observation.face_count,
                landmarks_detected: observation.landmarks.is_some(),
                features: features.as_ref(),
                away_duration,
            });
            record.set_verdict(verdict.clone(), at);
            (verdict, at)
        };

        debug!(
            "subject {subject_id}: {} ({:?})",
            verdict.status.as_str(),
            verdict.alert_type
        );

        Ok(AnalysisResult {
            subject_id: subject_id.to_string(),
            timestamp,
            verdict,
        })
    }
}

/// Frame time for an observation given the engine clock
fn frame_time(observation: &FrameObservation, now: DateTime<Utc>) -> DateTime<Utc> {
    match observation.captured_at {
        Some(captured) if captured > now => {
            warn!(
                "subject {}: ignoring captured_at {captured} ahead of engine clock {now}",
                observation.subject_id
            );
            now
        }
        Some(captured) => captured,
        None => now,
    }
}

/// Features of the primary face, or `None` when its landmarks are unusable
fn usable_features(observation: &FrameObservation) -> Option<FrameFeatures> {
    let landmarks = observation.landmarks.as_ref()?;
    let width = observation.frame_width as f64;
    let height = observation.frame_height as f64;

    match landmarks
        .validate()
        .and_then(|_| FeatureExtractor::extract(landmarks, width, height))
    {
        Ok(features) => Some(features),
        Err(e) => {
            debug!("subject {}: landmarks unusable: {e}", observation.subject_id);
            None
        }
    }
}

/// Runs encoded frames through a landmark provider and into the engine.
///
/// Each connection handler owns one analyzer; the provider may keep tracking
/// state per stream. The engine is shared.
pub struct FrameAnalyzer {
    engine: Arc<AttentionEngine>,
    provider: Box<dyn LandmarkProvider>,
}

impl FrameAnalyzer {
    pub fn new(engine: Arc<AttentionEngine>, provider: Box<dyn LandmarkProvider>) -> Self {
        Self { engine, provider }
    }

    /// Whether the landmark provider initialized
    pub fn is_ready(&self) -> bool {
        self.provider.is_ready()
    }

    pub fn engine(&self) -> &Arc<AttentionEngine> {
        &self.engine
    }

    /// Decode and analyze one encoded frame.
    ///
    /// An undecodable payload fails with `DecodeError` and leaves all subject
    /// state untouched.
    pub fn analyze(
        &mut self,
        subject_id: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, ComputeError> {
        let frame = decode_frame(bytes)?;
        let observation = self.observe(subject_id, &frame);
        self.engine.ingest(&observation, now)
    }

    /// Analyze a base64 frame as carried by `video_frame` messages
    pub fn analyze_payload(
        &mut self,
        subject_id: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, ComputeError> {
        let bytes = decode_frame_payload(payload)?;
        self.analyze(subject_id, &bytes, now)
    }

    /// Ask the provider what it sees in a decoded frame
    pub fn observe(&mut self, subject_id: &str, frame: &RgbImage) -> FrameObservation {
        let (width, height) = frame.dimensions();
        // A face is assumed whenever the provider cannot tell, which
        // classifies the frame as "landmarks unclear"
        let degraded = FrameObservation::new(subject_id, width, height, 1);

        if !self.provider.is_ready() {
            return degraded;
        }

        let face_count = match self.provider.count_faces(frame) {
            Ok(count) => count,
            Err(e) => {
                warn!("subject {subject_id}: face counting failed: {e}");
                return degraded;
            }
        };

        let mut observation = FrameObservation::new(subject_id, width, height, face_count);
        if face_count == 1 {
            match self.provider.locate_landmarks(frame) {
                Ok(landmarks) => observation.landmarks = landmarks,
                Err(e) => warn!("subject {subject_id}: landmark localization failed: {e}"),
            }
        }
        observation
    }
}
