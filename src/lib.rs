//! Synheart Focus - Real-time attention and engagement classification
//!
//! Focus turns per-frame facial-landmark measurements into an engagement
//! verdict for each subject through a deterministic pipeline: landmark
//! validation → feature extraction → gaze window → status classification →
//! subject state, then fans the verdict out to observers.
//!
//! ## Modules
//!
//! - **Engine**: `AttentionEngine` keeps per-subject state and classifies frames
//! - **Provider boundary**: `LandmarkProvider` and `FrameAnalyzer` for encoded frames
//! - **Gateway**: `Gateway` routes verdicts and state snapshots to connections

pub mod broadcast;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod landmarks;
pub mod pipeline;
pub mod provider;
pub mod schema;
pub mod store;
pub mod temporal;
pub mod types;

pub use broadcast::{ChannelConnection, Connection, Gateway};
pub use classifier::{ClassifierInput, StatusClassifier};
pub use config::EngineConfig;
pub use error::ComputeError;
pub use landmarks::{LandmarkPoint, LandmarkSet};
pub use pipeline::{replay_ndjson, replay_observations, AttentionEngine, FrameAnalyzer};
pub use provider::{LandmarkProvider, ProviderError, ScriptedProvider, UnavailableProvider};

// Schema exports
pub use schema::{FrameObservation, InboundMessage, ObservationReader, SCHEMA_VERSION};

/// Focus version embedded in producer metadata
pub const FOCUS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported in health reports
pub const PRODUCER_NAME: &str = "synheart-focus";
