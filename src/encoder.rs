//! Outbound message encoding
//!
//! Every message sent to a connection is a `{"type": ..., "data": ...}`
//! envelope serialized as a single line of JSON.

use crate::error::ComputeError;
use crate::types::{AnalysisResult, SubjectSnapshot};
use crate::{FOCUS_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot map handed to observers, keyed by subject id
pub type StateMap = BTreeMap<String, SubjectSnapshot>;

/// Messages pushed to subject and observer connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Verdict for the subject's own frame
    AnalysisResult(AnalysisResult),
    /// Verdict fanned out to observers
    SubjectUpdate(AnalysisResult),
    /// Full state sent when an observer attaches
    InitialState(StateMap),
    /// Full state sent in answer to `request_state`
    StateUpdate(StateMap),
    SubjectDisconnected(DisconnectNotice),
    Pong,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::AnalysisResult(_) => "analysis_result",
            OutboundMessage::SubjectUpdate(_) => "subject_update",
            OutboundMessage::InitialState(_) => "initial_state",
            OutboundMessage::StateUpdate(_) => "state_update",
            OutboundMessage::SubjectDisconnected(_) => "subject_disconnected",
            OutboundMessage::Pong => "pong",
        }
    }
}

/// Sent to observers when a subject's connection closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub subject_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Liveness summary of a running gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub producer: Producer,
    /// Open subject connections
    pub active_subjects: usize,
    /// Open observer connections
    pub active_observers: usize,
    /// Subject records held by the engine (connected or not)
    pub tracked_subjects: usize,
    pub provider_ready: bool,
    pub timestamp: DateTime<Utc>,
}

/// Envelope encoder tagged with a per-process instance id
#[derive(Debug, Clone)]
pub struct EnvelopeEncoder {
    instance_id: String,
}

impl Default for EnvelopeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode a message as one line of JSON
    pub fn encode(&self, message: &OutboundMessage) -> Result<String, ComputeError> {
        serde_json::to_string(message).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    pub fn producer(&self) -> Producer {
        Producer {
            name: PRODUCER_NAME.to_string(),
            version: FOCUS_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn health(
        &self,
        active_subjects: usize,
        active_observers: usize,
        tracked_subjects: usize,
        provider_ready: bool,
    ) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            producer: self.producer(),
            active_subjects,
            active_observers,
            tracked_subjects,
            provider_ready,
            timestamp: Utc::now(),
        }
    }
}
