//! Connection registry and fan-out
//!
//! The gateway tracks one connection per subject and any number of observer
//! connections. Each verdict goes back to the subject that produced it and to
//! every observer. A connection that fails a send is dropped; the others are
//! unaffected. The transport itself lives behind the [`Connection`] trait.

use crate::encoder::{DisconnectNotice, EnvelopeEncoder, HealthReport, OutboundMessage};
use crate::error::ComputeError;
use crate::pipeline::{AttentionEngine, FrameAnalyzer};
use crate::schema::{InboundMessage, ObservationReader};
use crate::types::AnalysisResult;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Outbound half of a live connection
pub trait Connection: Send + Sync {
    /// Deliver one encoded message
    fn send(&self, message: &str) -> Result<(), ComputeError>;
}

/// Connection backed by a crossbeam channel; the receiver is the transport side
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    sender: Sender<String>,
}

impl ChannelConnection {
    /// Connection whose queue grows without limit
    pub fn unbounded() -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    /// Connection that fails once `capacity` messages are waiting
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl Connection for ChannelConnection {
    fn send(&self, message: &str) -> Result<(), ComputeError> {
        self.sender
            .try_send(message.to_string())
            .map_err(|e| match e {
                TrySendError::Full(_) => ComputeError::DeliveryError("queue full".to_string()),
                TrySendError::Disconnected(_) => {
                    ComputeError::DeliveryError("receiver closed".to_string())
                }
            })
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn Connection>>>;

/// Routes verdicts and state snapshots between subjects and observers
pub struct Gateway {
    engine: Arc<AttentionEngine>,
    encoder: EnvelopeEncoder,
    subjects: Registry,
    observers: Registry,
}

impl Gateway {
    pub fn new(engine: Arc<AttentionEngine>) -> Self {
        Self::with_encoder(engine, EnvelopeEncoder::new())
    }

    pub fn with_encoder(engine: Arc<AttentionEngine>, encoder: EnvelopeEncoder) -> Self {
        Self {
            engine,
            encoder,
            subjects: RwLock::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<AttentionEngine> {
        &self.engine
    }

    /// Register a subject connection, replacing any previous one for the id
    pub fn connect_subject(&self, subject_id: &str, connection: Arc<dyn Connection>) {
        let total = {
            let mut subjects = self.subjects.write();
            subjects.insert(subject_id.to_string(), connection);
            subjects.len()
        };
        info!("subject {subject_id} connected ({total} total)");
    }

    /// Unregister a subject and tell observers it left.
    ///
    /// Returns `false` if the subject was not connected.
    pub fn disconnect_subject(&self, subject_id: &str, now: DateTime<Utc>) -> bool {
        let (removed, total) = {
            let mut subjects = self.subjects.write();
            let removed = subjects.remove(subject_id).is_some();
            (removed, subjects.len())
        };
        if !removed {
            return false;
        }
        info!("subject {subject_id} disconnected ({total} remaining)");

        if self.engine.config().forget_on_disconnect {
            self.engine.store().remove(subject_id);
        }

        self.broadcast_to_observers(&OutboundMessage::SubjectDisconnected(DisconnectNotice {
            subject_id: subject_id.to_string(),
            timestamp: now,
        }));
        true
    }

    /// Register an observer and hydrate it with the current state
    pub fn connect_observer(
        &self,
        observer_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<(), ComputeError> {
        let initial = self.encoder.encode(&OutboundMessage::InitialState(
            self.engine.store().all_snapshots(),
        ))?;
        connection.send(&initial)?;

        let total = {
            let mut observers = self.observers.write();
            observers.insert(observer_id.to_string(), connection);
            observers.len()
        };
        info!("observer {observer_id} connected ({total} total)");
        Ok(())
    }

    pub fn disconnect_observer(&self, observer_id: &str) -> bool {
        let removed = self.observers.write().remove(observer_id).is_some();
        if removed {
            info!("observer {observer_id} disconnected");
        }
        removed
    }

    /// Push a verdict to its subject and to every observer
    pub fn publish(&self, result: &AnalysisResult) -> Result<(), ComputeError> {
        let own = OutboundMessage::AnalysisResult(result.clone());
        self.send_to_subject(&result.subject_id, &own)?;
        self.broadcast_to_observers(&OutboundMessage::SubjectUpdate(result.clone()));
        Ok(())
    }

    /// Handle one text message from a subject connection.
    ///
    /// `analyzer` is the connection's own frame analyzer, used for
    /// `video_frame` messages. Returns the verdict when the message carried a
    /// frame or an observation. A malformed message fails with `DecodeError`
    /// and mutates nothing; unknown message types are ignored.
    pub fn handle_subject_message(
        &self,
        analyzer: &mut FrameAnalyzer,
        subject_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, ComputeError> {
        let result = match ObservationReader::parse_message(text)? {
            InboundMessage::VideoFrame { frame } => {
                analyzer.analyze_payload(subject_id, &frame, now)?
            }
            InboundMessage::Observation(observation) => {
                if observation.subject_id != subject_id {
                    return Err(ComputeError::InvalidFrame(format!(
                        "observation for {} received on connection of {subject_id}",
                        observation.subject_id
                    )));
                }
                self.engine.ingest(&observation, now)?
            }
            InboundMessage::Ping => {
                self.send_to_subject(subject_id, &OutboundMessage::Pong)?;
                return Ok(None);
            }
            InboundMessage::RequestState | InboundMessage::Unknown => {
                debug!("ignoring message from subject {subject_id}");
                return Ok(None);
            }
        };
        self.publish(&result)?;
        Ok(Some(result))
    }

    /// Analyze an encoded frame from a subject and publish the verdict
    pub fn handle_subject_frame(
        &self,
        analyzer: &mut FrameAnalyzer,
        subject_id: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, ComputeError> {
        let result = analyzer.analyze(subject_id, bytes, now)?;
        self.publish(&result)?;
        Ok(result)
    }

    /// Handle one text message from an observer connection
    pub fn handle_observer_message(
        &self,
        observer_id: &str,
        text: &str,
    ) -> Result<(), ComputeError> {
        let reply = match ObservationReader::parse_message(text)? {
            InboundMessage::Ping => OutboundMessage::Pong,
            InboundMessage::RequestState => {
                OutboundMessage::StateUpdate(self.engine.store().all_snapshots())
            }
            InboundMessage::Observation(_)
            | InboundMessage::VideoFrame { .. }
            | InboundMessage::Unknown => {
                debug!("ignoring message from observer {observer_id}");
                return Ok(());
            }
        };
        self.send_to(&self.observers, observer_id, &reply)
    }

    pub fn active_subjects(&self) -> usize {
        self.subjects.read().len()
    }

    pub fn active_observers(&self) -> usize {
        self.observers.read().len()
    }

    pub fn health(&self, provider_ready: bool) -> HealthReport {
        self.encoder.health(
            self.active_subjects(),
            self.active_observers(),
            self.engine.store().len(),
            provider_ready,
        )
    }

    fn send_to_subject(
        &self,
        subject_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), ComputeError> {
        self.send_to(&self.subjects, subject_id, message)
    }

    /// Send to one registered connection; a missing connection is not an error
    fn send_to(
        &self,
        registry: &Registry,
        id: &str,
        message: &OutboundMessage,
    ) -> Result<(), ComputeError> {
        let Some(connection) = registry.read().get(id).cloned() else {
            return Ok(());
        };
        let encoded = self.encoder.encode(message)?;
        if let Err(e) = connection.send(&encoded) {
            warn!("dropping connection {id}: {e}");
            registry.write().remove(id);
        }
        Ok(())
    }

    /// Fan a message out to every observer, returning how many received it
    fn broadcast_to_observers(&self, message: &OutboundMessage) -> usize {
        let encoded = match self.encoder.encode(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("failed to encode {}: {e}", message.kind());
                return 0;
            }
        };

        let targets: Vec<(String, Arc<dyn Connection>)> = self
            .observers
            .read()
            .iter()
            .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
            .collect();

        let mut failed = Vec::new();
        for (id, connection) in &targets {
            if let Err(e) = connection.send(&encoded) {
                warn!("dropping observer {id}: {e}");
                failed.push(id.clone());
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write();
            for id in &failed {
                observers.remove(id);
            }
        }
        targets.len() - failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::landmarks::neutral_face;
    use crate::provider::{blank_png, data_url, Detection, ScriptedProvider, UnavailableProvider};
    use crate::types::Status;
    use chrono::TimeZone;
    use serde_json::Value;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn gateway() -> Gateway {
        Gateway::new(Arc::new(AttentionEngine::default()))
    }

    fn analyzer(gateway: &Gateway) -> FrameAnalyzer {
        FrameAnalyzer::new(Arc::clone(gateway.engine()), Box::new(UnavailableProvider))
    }

    fn recv_json(receiver: &Receiver<String>) -> Value {
        serde_json::from_str(&receiver.try_recv().unwrap()).unwrap()
    }

    const NO_FACE: &str = r#"{"type":"observation","subject_id":"alice","frame_width":640,"frame_height":480,"face_count":0}"#;

    #[test]
    fn test_observation_reaches_subject_and_observers() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (subject, subject_rx) = ChannelConnection::unbounded();
        let (obs_a, obs_a_rx) = ChannelConnection::unbounded();
        let (obs_b, obs_b_rx) = ChannelConnection::unbounded();

        gateway.connect_subject("alice", Arc::new(subject));
        gateway.connect_observer("observer-1", Arc::new(obs_a)).unwrap();
        gateway.connect_observer("observer-2", Arc::new(obs_b)).unwrap();
        assert_eq!(recv_json(&obs_a_rx)["type"], "initial_state");
        assert_eq!(recv_json(&obs_b_rx)["type"], "initial_state");

        let result = gateway
            .handle_subject_message(&mut frames, "alice", NO_FACE, now())
            .unwrap()
            .unwrap();
        assert_eq!(result.verdict.message.as_deref(), Some("No face detected in frame"));

        let own = recv_json(&subject_rx);
        assert_eq!(own["type"], "analysis_result");
        assert_eq!(own["data"]["alert_type"], "no_face_detected");

        for rx in [&obs_a_rx, &obs_b_rx] {
            let update = recv_json(rx);
            assert_eq!(update["type"], "subject_update");
            assert_eq!(update["data"]["subject_id"], "alice");
        }
    }

    #[test]
    fn test_initial_state_contains_known_subjects() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();

        let (observer, rx) = ChannelConnection::unbounded();
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();

        let state = recv_json(&rx);
        assert_eq!(state["type"], "initial_state");
        assert_eq!(state["data"]["alice"]["latest_verdict"]["status"], "alert");
        assert_eq!(state["data"]["alice"]["subject_id"], "alice");
    }

    #[test]
    fn test_failed_observer_is_dropped() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (healthy, healthy_rx) = ChannelConnection::unbounded();
        let (broken, broken_rx) = ChannelConnection::unbounded();
        gateway.connect_observer("healthy", Arc::new(healthy)).unwrap();
        gateway.connect_observer("broken", Arc::new(broken)).unwrap();
        drop(broken_rx);
        assert_eq!(gateway.active_observers(), 2);

        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();

        assert_eq!(gateway.active_observers(), 1);
        assert_eq!(recv_json(&healthy_rx)["type"], "initial_state");
        assert_eq!(recv_json(&healthy_rx)["type"], "subject_update");
    }

    #[test]
    fn test_full_subject_queue_drops_subject() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (subject, _rx) = ChannelConnection::bounded(1);
        gateway.connect_subject("alice", Arc::new(subject));

        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();
        assert_eq!(gateway.active_subjects(), 1);

        // second verdict does not fit in the queue
        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();
        assert_eq!(gateway.active_subjects(), 0);
    }

    #[test]
    fn test_malformed_message_mutates_nothing() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (observer, rx) = ChannelConnection::unbounded();
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();
        rx.try_recv().unwrap();

        assert!(matches!(
            gateway.handle_subject_message(&mut frames, "alice", "{not json", now()),
            Err(ComputeError::DecodeError(_))
        ));
        assert!(gateway.engine().store().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_observation_for_other_subject_rejected() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        assert!(matches!(
            gateway.handle_subject_message(&mut frames, "bob", NO_FACE, now()),
            Err(ComputeError::InvalidFrame(_))
        ));
        assert!(gateway.engine().store().is_empty());
    }

    #[test]
    fn test_ping_and_request_state() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (subject, subject_rx) = ChannelConnection::unbounded();
        let (observer, observer_rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();
        observer_rx.try_recv().unwrap();

        gateway
            .handle_subject_message(&mut frames, "alice", r#"{"type":"ping"}"#, now())
            .unwrap();
        assert_eq!(subject_rx.try_recv().unwrap(), r#"{"type":"pong"}"#);

        gateway
            .handle_observer_message("observer", r#"{"type":"ping"}"#)
            .unwrap();
        assert_eq!(observer_rx.try_recv().unwrap(), r#"{"type":"pong"}"#);

        gateway
            .handle_observer_message("observer", r#"{"type":"request_state"}"#)
            .unwrap();
        assert_eq!(recv_json(&observer_rx)["type"], "state_update");
    }

    #[test]
    fn test_subject_disconnect_notifies_observers() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (subject, _subject_rx) = ChannelConnection::unbounded();
        let (observer, observer_rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();
        observer_rx.try_recv().unwrap();
        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();
        observer_rx.try_recv().unwrap();

        assert!(gateway.disconnect_subject("alice", now()));
        assert!(!gateway.disconnect_subject("alice", now()));

        let notice = recv_json(&observer_rx);
        assert_eq!(notice["type"], "subject_disconnected");
        assert_eq!(notice["data"]["subject_id"], "alice");
        // state survives the disconnect by default
        assert!(gateway.engine().store().contains("alice"));
    }

    #[test]
    fn test_forget_on_disconnect() {
        let config = EngineConfig {
            forget_on_disconnect: true,
            ..EngineConfig::default()
        };
        let gateway = Gateway::new(Arc::new(AttentionEngine::new(config).unwrap()));
        let mut frames = analyzer(&gateway);
        let (subject, _rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        gateway.handle_subject_message(&mut frames, "alice", NO_FACE, now()).unwrap();

        gateway.disconnect_subject("alice", now());
        assert!(!gateway.engine().store().contains("alice"));
    }

    #[test]
    fn test_subject_frame_through_analyzer() {
        let gateway = gateway();
        let (subject, subject_rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        let mut analyzer = FrameAnalyzer::new(
            Arc::clone(gateway.engine()),
            Box::new(ScriptedProvider::new([Detection::new(1, Some(neutral_face()))])),
        );

        let result = gateway
            .handle_subject_frame(&mut analyzer, "alice", &blank_png(32, 24), now())
            .unwrap();
        assert_eq!(result.verdict.confidence, 0.85);
        assert_eq!(recv_json(&subject_rx)["data"]["status"], "good");

        assert!(gateway
            .handle_subject_frame(&mut analyzer, "alice", b"", now())
            .is_err());
        assert!(subject_rx.try_recv().is_err());
    }

    #[test]
    fn test_health() {
        let gateway = gateway();
        let (subject, _rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));

        let report = gateway.health(true);
        assert_eq!(report.active_subjects, 1);
        assert_eq!(report.active_observers, 0);
        assert_eq!(report.tracked_subjects, 0);
        assert!(report.provider_ready);
    }

    #[test]
    fn test_video_frame_message_is_analyzed() {
        let gateway = gateway();
        let (subject, subject_rx) = ChannelConnection::unbounded();
        let (observer, observer_rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();
        observer_rx.try_recv().unwrap();
        let mut frames = FrameAnalyzer::new(
            Arc::clone(gateway.engine()),
            Box::new(ScriptedProvider::new([Detection::new(1, Some(neutral_face()))])),
        );

        let message = serde_json::json!({
            "type": "video_frame",
            "frame": data_url("image/png", &blank_png(32, 24)),
        })
        .to_string();
        let result = gateway
            .handle_subject_message(&mut frames, "alice", &message, now())
            .unwrap()
            .unwrap();
        assert_eq!(result.verdict.status, Status::Good);
        assert_eq!(recv_json(&subject_rx)["type"], "analysis_result");
        assert_eq!(recv_json(&observer_rx)["type"], "subject_update");

        let broken = r#"{"type":"video_frame","frame":"data:image/png;base64,%%%"}"#;
        assert!(matches!(
            gateway.handle_subject_message(&mut frames, "alice", broken, now()),
            Err(ComputeError::DecodeError(_))
        ));
        assert!(subject_rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_message_types_ignored() {
        let gateway = gateway();
        let mut frames = analyzer(&gateway);
        let (subject, subject_rx) = ChannelConnection::unbounded();
        let (observer, observer_rx) = ChannelConnection::unbounded();
        gateway.connect_subject("alice", Arc::new(subject));
        gateway.connect_observer("observer", Arc::new(observer)).unwrap();
        observer_rx.try_recv().unwrap();

        let chat = r#"{"type":"chat","text":"hello"}"#;
        assert_eq!(
            gateway
                .handle_subject_message(&mut frames, "alice", chat, now())
                .unwrap(),
            None
        );
        gateway.handle_observer_message("observer", chat).unwrap();

        assert!(subject_rx.try_recv().is_err());
        assert!(observer_rx.try_recv().is_err());
        assert!(gateway.engine().store().is_empty());
    }
}
