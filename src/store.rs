//! Per-subject state
//!
//! One record per subject id, created lazily on the first frame. The map lock
//! is only held for lookup, insertion and eviction; each record has its own
//! mutex so frames for different subjects never contend.
//!
//! Two clocks are kept apart. `last_update` is the subject's frame time and is
//! what observers see; `last_seen` is the engine clock at the last frame and is
//! the only input to idle and capacity eviction.

use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::temporal::GazeWindow;
use crate::types::{SubjectSnapshot, Verdict};
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Mutable state kept for one subject
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Engine clock at the most recent frame
    pub last_seen: DateTime<Utc>,
    pub latest_verdict: Verdict,
    pub window: GazeWindow,
}

impl SubjectRecord {
    fn new(subject_id: &str, capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            created_at: now,
            last_update: now,
            last_seen: now,
            latest_verdict: Verdict::default(),
            window: GazeWindow::new(capacity),
        }
    }

    /// Clamp a frame time so this subject's clock never runs backwards
    pub fn frame_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let newest = self.window.latest().unwrap_or(self.last_update);
        now.max(newest).max(self.last_update)
    }

    /// Append a gaze event at a clamped time
    pub fn push_gaze(&mut self, away: bool, now: DateTime<Utc>) {
        let at = self.frame_time(now);
        self.window.push(away, at);
    }

    /// Overwrite the latest verdict
    pub fn set_verdict(&mut self, verdict: Verdict, now: DateTime<Utc>) {
        self.last_update = self.frame_time(now);
        self.latest_verdict = verdict;
    }

    /// Mark the record as active at engine time `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = self.last_seen.max(now);
    }

    pub fn snapshot(&self) -> SubjectSnapshot {
        SubjectSnapshot {
            subject_id: self.subject_id.clone(),
            last_update: self.last_update,
            latest_verdict: self.latest_verdict.clone(),
        }
    }
}

/// Handle to one subject's record, valid even after the store evicts it
pub type SharedRecord = Arc<Mutex<SubjectRecord>>;

/// Thread-safe registry of subject records
#[derive(Debug)]
pub struct SubjectStore {
    subjects: RwLock<HashMap<String, SharedRecord>>,
    gaze_window: usize,
    max_subjects: Option<usize>,
    idle_ttl_secs: Option<u64>,
}

impl Default for SubjectStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SubjectStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            gaze_window: config.gaze_window,
            max_subjects: config.max_subjects,
            idle_ttl_secs: config.idle_ttl_secs,
        }
    }

    /// Create the record for `subject_id` if it does not exist yet.
    ///
    /// Returns `true` when a record was created. `now` is the engine clock.
    pub fn ensure(&self, subject_id: &str, now: DateTime<Utc>) -> bool {
        self.get_or_create(subject_id, now).1
    }

    /// Handle to the record for `subject_id`, creating it if needed.
    ///
    /// The handle stays usable when another thread evicts the record in the
    /// meantime, so a caller holding it never sees `UnknownSubject`.
    pub fn acquire(&self, subject_id: &str, now: DateTime<Utc>) -> SharedRecord {
        self.get_or_create(subject_id, now).0
    }

    fn get_or_create(&self, subject_id: &str, now: DateTime<Utc>) -> (SharedRecord, bool) {
        if let Some(record) = self.subjects.read().get(subject_id) {
            return (Arc::clone(record), false);
        }

        let mut subjects = self.subjects.write();
        if let Some(record) = subjects.get(subject_id) {
            return (Arc::clone(record), false);
        }

        // Idle records go first, then the least recently seen if still full
        self.evict_idle_locked(&mut subjects, now);
        if let Some(max) = self.max_subjects {
            while subjects.len() >= max {
                let Some(oldest) = least_recently_seen(&subjects) else {
                    break;
                };
                warn!("subject store full ({max}), evicting {oldest}");
                subjects.remove(&oldest);
            }
        }

        let record = Arc::new(Mutex::new(SubjectRecord::new(
            subject_id,
            self.gaze_window,
            now,
        )));
        subjects.insert(subject_id.to_string(), Arc::clone(&record));
        info!("tracking new subject {subject_id}");
        (record, true)
    }

    /// Run `f` with exclusive access to one subject's record
    pub fn with_subject<R>(
        &self,
        subject_id: &str,
        f: impl FnOnce(&mut SubjectRecord) -> R,
    ) -> Result<R, ComputeError> {
        let record = self.record(subject_id)?;
        let mut guard = record.lock();
        Ok(f(&mut guard))
    }

    /// Replace a subject's latest verdict
    pub fn record_verdict(
        &self,
        subject_id: &str,
        verdict: Verdict,
        now: DateTime<Utc>,
    ) -> Result<(), ComputeError> {
        self.with_subject(subject_id, |record| {
            record.touch(now);
            record.set_verdict(verdict, now);
        })
    }

    /// Append one gaze event to a subject's window
    pub fn record_gaze_event(
        &self,
        subject_id: &str,
        away: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ComputeError> {
        self.with_subject(subject_id, |record| {
            record.touch(now);
            record.push_gaze(away, now);
        })
    }

    pub fn snapshot(&self, subject_id: &str) -> Result<SubjectSnapshot, ComputeError> {
        self.with_subject(subject_id, |record| record.snapshot())
    }

    /// Snapshot of every tracked subject, keyed by id
    pub fn all_snapshots(&self) -> BTreeMap<String, SubjectSnapshot> {
        let records: Vec<SharedRecord> = self.subjects.read().values().cloned().collect();
        records
            .iter()
            .map(|record| {
                let snapshot = record.lock().snapshot();
                (snapshot.subject_id.clone(), snapshot)
            })
            .collect()
    }

    /// Drop records not seen for longer than the configured TTL.
    ///
    /// `now` is the engine clock. Returns the number of records removed.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut subjects = self.subjects.write();
        self.evict_idle_locked(&mut subjects, now)
    }

    /// Forget a subject. Returns `true` if it was tracked.
    pub fn remove(&self, subject_id: &str) -> bool {
        self.subjects.write().remove(subject_id).is_some()
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.subjects.read().contains_key(subject_id)
    }

    pub fn len(&self) -> usize {
        self.subjects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.read().is_empty()
    }

    fn record(&self, subject_id: &str) -> Result<SharedRecord, ComputeError> {
        self.subjects
            .read()
            .get(subject_id)
            .cloned()
            .ok_or_else(|| ComputeError::UnknownSubject(subject_id.to_string()))
    }

    fn evict_idle_locked(
        &self,
        subjects: &mut HashMap<String, SharedRecord>,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(ttl) = self.idle_ttl_secs else {
            return 0;
        };

        let before = subjects.len();
        subjects.retain(|id, record| {
            let idle = (now - record.lock().last_seen).num_milliseconds() as f64 / 1000.0;
            let keep = idle <= ttl as f64;
            if !keep {
                warn!("evicting idle subject {id} ({idle:.0}s without frames)");
            }
            keep
        });
        before - subjects.len()
    }
}

fn least_recently_seen(subjects: &HashMap<String, SharedRecord>) -> Option<String> {
    subjects
        .iter()
        .min_by_key(|(_, record)| record.lock().last_seen)
        .map(|(id, _)| id.clone())
}
