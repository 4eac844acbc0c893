//! Parsing helpers for observation batches and inbound messages

use crate::error::ComputeError;
use crate::schema::observation::{FrameObservation, InboundMessage, ValidationError};

impl From<ValidationError> for ComputeError {
    fn from(err: ValidationError) -> Self {
        ComputeError::InvalidFrame(err.to_string())
    }
}

/// Reader for observation streams
pub struct ObservationReader;

impl ObservationReader {
    /// Parse a JSON array of observations
    pub fn parse_array(json: &str) -> Result<Vec<FrameObservation>, ComputeError> {
        let observations: Vec<FrameObservation> = serde_json::from_str(json)?;
        for obs in &observations {
            obs.validate()?;
        }
        Ok(observations)
    }

    /// Parse NDJSON (one observation per line, blank lines skipped)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FrameObservation>, ComputeError> {
        ndjson
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_num, line)| Self::parse_line(line, line_num + 1))
            .collect()
    }

    /// Parse and validate a single NDJSON line
    pub fn parse_line(line: &str, line_num: usize) -> Result<FrameObservation, ComputeError> {
        let obs: FrameObservation = serde_json::from_str(line.trim()).map_err(|e| {
            ComputeError::DecodeError(format!("Failed to parse line {line_num}: {e}"))
        })?;
        obs.validate().map_err(|e| {
            ComputeError::InvalidFrame(format!("Invalid observation on line {line_num}: {e}"))
        })?;
        Ok(obs)
    }

    /// Parse one text message received on a live connection
    pub fn parse_message(text: &str) -> Result<InboundMessage, ComputeError> {
        let message: InboundMessage = serde_json::from_str(text)
            .map_err(|e| ComputeError::DecodeError(format!("Malformed message: {e}")))?;
        if let InboundMessage::Observation(obs) = &message {
            obs.validate()?;
        }
        Ok(message)
    }
}
