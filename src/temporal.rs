//! Temporal gaze aggregation
//!
//! This module keeps a bounded recency window of gaze events per subject and
//! derives how long the subject has been looking away without interruption.

use crate::types::GazeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of gaze events retained per subject
pub const DEFAULT_GAZE_WINDOW: usize = 30;

/// Fixed-capacity FIFO of gaze events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeWindow {
    events: VecDeque<GazeEvent>,
    /// Maximum window size
    capacity: usize,
}

impl Default for GazeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_GAZE_WINDOW)
    }
}

impl GazeWindow {
    /// Create an empty window holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest once the window is full
    pub fn push(&mut self, away: bool, timestamp: DateTime<Utc>) {
        self.events.push_back(GazeEvent { away, timestamp });
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Seconds spanned by the unbroken run of away events ending at the newest one.
    ///
    /// Returns 0 when the newest event is not away. When every retained event is
    /// away the span is measured from the oldest retained event, so it never
    /// exceeds what `capacity` samples can cover.
    pub fn continuous_away_duration(&self, now: DateTime<Utc>) -> f64 {
        self.events
            .iter()
            .rev()
            .take_while(|event| event.away)
            .last()
            .map(|oldest| seconds_between(oldest.timestamp, now))
            .unwrap_or(0.0)
    }

    /// Timestamp of the newest event
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.events.back().map(|e| e.timestamp)
    }

    pub fn events(&self) -> impl Iterator<Item = &GazeEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}
