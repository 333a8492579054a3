use crate::models::{ActivityEntry, now_millis};
use chrono::{DateTime, Utc};

pub const ACTIVITY_CAP: usize = 20;
pub const FEED_SIZE: usize = 5;

/// Newest-first list of human readable actions, trimmed to `ACTIVITY_CAP`.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
    last_id: u64,
}

impl ActivityLog {
    pub fn new(mut entries: Vec<ActivityEntry>) -> Self {
        entries.truncate(ACTIVITY_CAP);
        let last_id = entries.iter().map(|entry| entry.id).max().unwrap_or(0);
        Self { entries, last_id }
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn recent(&self) -> &[ActivityEntry] {
        &self.entries[..self.entries.len().min(FEED_SIZE)]
    }

    pub fn record(&mut self, text: impl Into<String>) -> &ActivityEntry {
        self.record_at(text, now_millis())
    }

    pub fn record_at(&mut self, text: impl Into<String>, now: DateTime<Utc>) -> &ActivityEntry {
        let candidate = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = candidate.max(self.last_id + 1);
        self.last_id = id;

        self.entries.insert(
            0,
            ActivityEntry {
                id,
                text: text.into(),
                timestamp: now,
            },
        );
        self.entries.truncate(ACTIVITY_CAP);
        &self.entries[0]
    }

    pub fn replace(&mut self, entries: Vec<ActivityEntry>) {
        *self = Self::new(entries);
    }
}

/// Coarse relative age used by the activity feed.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{} min ago", seconds / 60),
        3_600..=86_399 => format!("{} h ago", seconds / 3_600),
        86_400..=604_799 => format!("{} d ago", seconds / 86_400),
        _ => then.format("%Y-%m-%d").to_string(),
    }
}
