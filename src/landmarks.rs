//! Facial landmark sets
//!
//! Landmarks are normalized keypoints (x, y in [0, 1] relative to frame width and
//! height) keyed by the stable anatomical ids of the MediaPipe face mesh with
//! refined iris points.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Landmark ids consumed by the feature extractors
pub mod ids {
    pub const LEFT_IRIS: u32 = 468;
    pub const RIGHT_IRIS: u32 = 473;

    pub const LEFT_EYE_OUTER: u32 = 33;
    pub const LEFT_EYE_INNER: u32 = 133;
    pub const RIGHT_EYE_INNER: u32 = 362;
    pub const RIGHT_EYE_OUTER: u32 = 263;

    pub const LEFT_EYE_TOP: u32 = 159;
    pub const LEFT_EYE_BOTTOM: u32 = 145;
    pub const RIGHT_EYE_TOP: u32 = 386;
    pub const RIGHT_EYE_BOTTOM: u32 = 374;

    pub const LEFT_BROW_INNER: u32 = 336;
    pub const RIGHT_BROW_INNER: u32 = 107;
    pub const LEFT_BROW_OUTER: u32 = 285;
    pub const RIGHT_BROW_OUTER: u32 = 55;
    pub const LEFT_BROW_CENTER: u32 = 300;
    pub const RIGHT_BROW_CENTER: u32 = 70;

    pub const MOUTH_LEFT: u32 = 61;
    pub const MOUTH_RIGHT: u32 = 291;
    pub const MOUTH_TOP: u32 = 13;
    pub const MOUTH_BOTTOM: u32 = 14;
    pub const UPPER_LIP: u32 = 0;
    pub const LOWER_LIP: u32 = 17;

    pub const NOSE_TIP: u32 = 1;
    pub const NOSE_BRIDGE: u32 = 168;

    pub const LEFT_FACE_EDGE: u32 = 234;
    pub const RIGHT_FACE_EDGE: u32 = 454;
}

/// Every id a landmark set must carry to be usable
pub const REQUIRED_LANDMARKS: [u32; 26] = [
    ids::LEFT_IRIS,
    ids::RIGHT_IRIS,
    ids::LEFT_EYE_OUTER,
    ids::LEFT_EYE_INNER,
    ids::RIGHT_EYE_INNER,
    ids::RIGHT_EYE_OUTER,
    ids::LEFT_EYE_TOP,
    ids::LEFT_EYE_BOTTOM,
    ids::RIGHT_EYE_TOP,
    ids::RIGHT_EYE_BOTTOM,
    ids::LEFT_BROW_INNER,
    ids::RIGHT_BROW_INNER,
    ids::LEFT_BROW_OUTER,
    ids::RIGHT_BROW_OUTER,
    ids::LEFT_BROW_CENTER,
    ids::RIGHT_BROW_CENTER,
    ids::MOUTH_LEFT,
    ids::MOUTH_RIGHT,
    ids::MOUTH_TOP,
    ids::MOUTH_BOTTOM,
    ids::UPPER_LIP,
    ids::LOWER_LIP,
    ids::NOSE_TIP,
    ids::NOSE_BRIDGE,
    ids::LEFT_FACE_EDGE,
    ids::RIGHT_FACE_EDGE,
];

/// A normalized landmark position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Landmarks of the primary face, keyed by landmark id.
///
/// On the wire this is a JSON object with stringified ids as keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, LandmarkPoint>",
    into = "BTreeMap<String, LandmarkPoint>"
)]
pub struct LandmarkSet {
    points: BTreeMap<u32, LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a landmark
    pub fn insert(&mut self, id: u32, point: LandmarkPoint) {
        self.points.insert(id, point);
    }

    /// Builder-style insert
    pub fn with(mut self, id: u32, x: f64, y: f64) -> Self {
        self.insert(id, LandmarkPoint::new(x, y));
        self
    }

    /// Look up a landmark, failing when the provider did not report it
    pub fn point(&self, id: u32) -> Result<LandmarkPoint, ComputeError> {
        self.points
            .get(&id)
            .copied()
            .ok_or(ComputeError::MissingLandmark(id))
    }

    pub fn get(&self, id: u32) -> Option<&LandmarkPoint> {
        self.points.get(&id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check that every required landmark is present and finite
    pub fn validate(&self) -> Result<(), ComputeError> {
        for id in REQUIRED_LANDMARKS {
            let p = self.point(id)?;
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(ComputeError::InvalidFrame(format!(
                    "landmark {id} has non-finite coordinates"
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<String, LandmarkPoint>> for LandmarkSet {
    type Error = String;

    fn try_from(raw: BTreeMap<String, LandmarkPoint>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, point)| {
                key.trim()
                    .parse::<u32>()
                    .map(|id| (id, point))
                    .map_err(|_| format!("invalid landmark id {key:?}"))
            })
            .collect()
    }
}

impl From<LandmarkSet> for BTreeMap<String, LandmarkPoint> {
    fn from(set: LandmarkSet) -> Self {
        set.points
            .into_iter()
            .map(|(id, point)| (id.to_string(), point))
            .collect()
    }
}

impl FromIterator<(u32, LandmarkPoint)> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = (u32, LandmarkPoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Frame size the test landmark geometry is tuned for
#[cfg(test)]
pub(crate) const TEST_FRAME: (u32, u32) = (640, 480);

/// Landmark set of a relaxed, centered face looking straight at the camera.
///
/// Shared by unit tests across the crate; individual tests move points to
/// trigger specific features.
#[cfg(test)]
pub(crate) fn neutral_face() -> LandmarkSet {
    LandmarkSet::new()
        // irises centered in their eyes, vertically at mid-frame
        .with(ids::LEFT_IRIS, 0.40, 0.50)
        .with(ids::RIGHT_IRIS, 0.60, 0.50)
        .with(ids::LEFT_EYE_OUTER, 0.35, 0.50)
        .with(ids::LEFT_EYE_INNER, 0.45, 0.50)
        .with(ids::RIGHT_EYE_INNER, 0.55, 0.50)
        .with(ids::RIGHT_EYE_OUTER, 0.65, 0.50)
        // open eyes: 0.04 of frame height
        .with(ids::LEFT_EYE_TOP, 0.40, 0.48)
        .with(ids::LEFT_EYE_BOTTOM, 0.40, 0.52)
        .with(ids::RIGHT_EYE_TOP, 0.60, 0.48)
        .with(ids::RIGHT_EYE_BOTTOM, 0.60, 0.52)
        // brows wide apart and well above the eyes
        .with(ids::LEFT_BROW_INNER, 0.58, 0.40)
        .with(ids::RIGHT_BROW_INNER, 0.42, 0.40)
        .with(ids::LEFT_BROW_OUTER, 0.68, 0.41)
        .with(ids::RIGHT_BROW_OUTER, 0.32, 0.41)
        .with(ids::LEFT_BROW_CENTER, 0.63, 0.40)
        .with(ids::RIGHT_BROW_CENTER, 0.37, 0.40)
        // mouth aspect ratio 0.3 on a 640x480 frame (38.4px / 128px)
        .with(ids::MOUTH_LEFT, 0.40, 0.75)
        .with(ids::MOUTH_RIGHT, 0.60, 0.75)
        .with(ids::MOUTH_TOP, 0.50, 0.71)
        .with(ids::MOUTH_BOTTOM, 0.50, 0.79)
        .with(ids::UPPER_LIP, 0.50, 0.70)
        .with(ids::LOWER_LIP, 0.50, 0.80)
        .with(ids::NOSE_TIP, 0.50, 0.62)
        .with(ids::NOSE_BRIDGE, 0.50, 0.50)
        // level head
        .with(ids::LEFT_FACE_EDGE, 0.25, 0.55)
        .with(ids::RIGHT_FACE_EDGE, 0.75, 0.55)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_face_is_valid() {
        assert!(neutral_face().validate().is_ok());
        assert_eq!(neutral_face().len(), REQUIRED_LANDMARKS.len());
    }

    #[test]
    fn test_missing_landmark_reported_by_id() {
        let mut points: Vec<(u32, LandmarkPoint)> = Vec::new();
        for id in REQUIRED_LANDMARKS.iter().filter(|id| **id != ids::RIGHT_IRIS) {
            points.push((*id, LandmarkPoint::new(0.5, 0.5)));
        }
        let set: LandmarkSet = points.into_iter().collect();

        match set.validate() {
            Err(ComputeError::MissingLandmark(id)) => assert_eq!(id, ids::RIGHT_IRIS),
            other => panic!("expected missing landmark, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_landmark_rejected() {
        let set = neutral_face().with(ids::NOSE_TIP, f64::NAN, 0.5);
        assert!(matches!(set.validate(), Err(ComputeError::InvalidFrame(_))));
    }

    #[test]
    fn test_deserialize_from_id_keyed_object() {
        let json = r#"{"468": {"x": 0.4, "y": 0.5}, "473": {"x": 0.6, "y": 0.5}}"#;
        let set: LandmarkSet = serde_json::from_str(json).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.point(ids::LEFT_IRIS).unwrap(), LandmarkPoint::new(0.4, 0.5));
    }

    #[test]
    fn test_non_numeric_id_rejected() {
        let json = r#"{"left_iris": {"x": 0.4, "y": 0.5}}"#;
        assert!(serde_json::from_str::<LandmarkSet>(json).is_err());
    }

    #[test]
    fn test_serialized_keys_are_ids() {
        let json = serde_json::to_value(neutral_face()).unwrap();
        assert_eq!(json["468"]["x"], 0.40);
    }
}
