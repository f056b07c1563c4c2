use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// One continuous encoder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Session ids are start times in unix milliseconds, bumped past `previous` if needed.
    fn start_after(previous: Option<&Session>) -> Self {
        let now = Utc::now();
        let mut id = now.timestamp_millis();
        if let Some(prev) = previous.and_then(|p| p.id.parse::<i64>().ok()) {
            id = id.max(prev + 1);
        }
        Self {
            id: id.to_string(),
            started_at: now,
        }
    }
}

/// Where an accepted segment lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSlot {
    pub session_id: String,
    pub seq: u64,
    /// First segment of a session that follows an earlier one.
    pub discontinuity: bool,
    /// This segment ended an idle gap and started a new session.
    pub restarted: bool,
}

/// Sequence numbering and idle/restart detection.
#[derive(Debug)]
pub struct SessionTracker {
    current: Session,
    sequence: u64,
    last_segment_at: Option<Instant>,
    ended: bool,
    transitions: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            current: Session::start_after(None),
            sequence: 0,
            last_segment_at: None,
            ended: false,
            transitions: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.current
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Number of session transitions so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Marks the session ended once the gap since the last segment exceeds
    /// `threshold`. State is kept until the next segment arrives.
    /// Returns `true` only on the tick that ends the session.
    pub fn check_idle(&mut self, now: Instant, threshold: Duration) -> bool {
        if self.ended {
            return false;
        }
        match self.last_segment_at {
            Some(last) if now.saturating_duration_since(last) > threshold => {
                self.ended = true;
                true
            }
            _ => false,
        }
    }

    /// Assigns the next sequence number, first starting a new session if the
    /// previous one ended.
    pub fn begin_segment(&mut self, now: Instant) -> SegmentSlot {
        let restarted = self.ended;
        if restarted {
            self.current = Session::start_after(Some(&self.current));
            self.sequence = 0;
            self.ended = false;
            self.transitions += 1;
        }

        self.sequence += 1;
        self.last_segment_at = Some(now);

        SegmentSlot {
            session_id: self.current.id.clone(),
            seq: self.sequence,
            discontinuity: restarted,
            restarted,
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
