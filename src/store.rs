use crate::models::{PlayerPatch, PlayerRecord, coerce_count, coerce_hours, now_millis};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("player \"{0}\" already exists")]
    DuplicateNickname(String),
    #[error("player {0} not found")]
    NotFound(u64),
    #[error("player id {0} appears more than once")]
    DuplicateId(u64),
}

/// Canonical, ordered list of player records for the running session.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<PlayerRecord>,
    last_id: u64,
}

impl RecordStore {
    pub fn new(records: Vec<PlayerRecord>) -> Self {
        let last_id = records.iter().map(|record| record.id).max().unwrap_or(0);
        Self { records, last_id }
    }

    pub fn records(&self) -> &[PlayerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&PlayerRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn add(
        &mut self,
        nickname: &str,
        kills: &Value,
        deaths: &Value,
        time: &Value,
    ) -> Result<PlayerRecord, StoreError> {
        self.add_at(nickname, kills, deaths, time, now_millis())
    }

    pub fn add_at(
        &mut self,
        nickname: &str,
        kills: &Value,
        deaths: &Value,
        time: &Value,
        now: DateTime<Utc>,
    ) -> Result<PlayerRecord, StoreError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(StoreError::EmptyNickname);
        }
        if self.nickname_taken(nickname, None) {
            return Err(StoreError::DuplicateNickname(nickname.to_string()));
        }

        let record = PlayerRecord {
            id: self.next_id(now),
            nickname: nickname.to_string(),
            kills: coerce_count(kills),
            deaths: coerce_count(deaths),
            time: coerce_hours(time),
            screenshot: None,
            created_at: now,
            updated_at: now,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    pub fn update(&mut self, id: u64, patch: PlayerPatch) -> Result<PlayerRecord, StoreError> {
        self.update_at(id, patch, now_millis())
    }

    pub fn update_at(
        &mut self,
        id: u64,
        patch: PlayerPatch,
        now: DateTime<Utc>,
    ) -> Result<PlayerRecord, StoreError> {
        let index = self.index_of(id)?;

        let nickname = match patch.nickname.as_deref().map(str::trim) {
            Some("") => return Err(StoreError::EmptyNickname),
            Some(name) if self.nickname_taken(name, Some(id)) => {
                return Err(StoreError::DuplicateNickname(name.to_string()));
            }
            other => other.map(str::to_string),
        };

        let record = &mut self.records[index];
        if let Some(nickname) = nickname {
            record.nickname = nickname;
        }
        if let Some(kills) = &patch.kills {
            record.kills = coerce_count(kills);
        }
        if let Some(deaths) = &patch.deaths {
            record.deaths = coerce_count(deaths);
        }
        if let Some(time) = &patch.time {
            record.time = coerce_hours(time);
        }
        if let Some(screenshot) = patch.screenshot {
            record.screenshot = screenshot;
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    pub fn remove(&mut self, id: u64) -> Result<PlayerRecord, StoreError> {
        let index = self.index_of(id)?;
        Ok(self.records.remove(index))
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Swaps in a whole record set (import). Nothing changes unless every
    /// record has a unique id and a unique, non-empty nickname.
    pub fn replace_all(&mut self, records: Vec<PlayerRecord>) -> Result<usize, StoreError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for record in &records {
            let name = record.nickname.trim();
            if name.is_empty() {
                return Err(StoreError::EmptyNickname);
            }
            if !ids.insert(record.id) {
                return Err(StoreError::DuplicateId(record.id));
            }
            if !names.insert(name.to_lowercase()) {
                return Err(StoreError::DuplicateNickname(name.to_string()));
            }
        }

        let max_id = records.iter().map(|record| record.id).max().unwrap_or(0);
        self.last_id = self.last_id.max(max_id);
        self.records = records;
        Ok(self.records.len())
    }

    fn index_of(&self, id: u64) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|record| record.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn nickname_taken(&self, nickname: &str, except: Option<u64>) -> bool {
        let wanted = nickname.to_lowercase();
        self.records
            .iter()
            .filter(|record| Some(record.id) != except)
            .any(|record| record.nickname.to_lowercase() == wanted)
    }

    // Millisecond clock ids, bumped past anything handed out before so that
    // two adds in the same millisecond (or after a delete) never collide.
    fn next_id(&mut self, now: DateTime<Utc>) -> u64 {
        let candidate = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = candidate.max(self.last_id + 1);
        self.last_id = id;
        id
    }
}

pub fn kill_death_ratio(record: &PlayerRecord) -> f64 {
    ratio(record.kills, record.deaths)
}

/// K/D with the zero-deaths convention: raw kills instead of infinity.
pub fn ratio(kills: u64, deaths: u64) -> f64 {
    if deaths > 0 {
        kills as f64 / deaths as f64
    } else {
        kills as f64
    }
}

pub fn kills_per_hour(record: &PlayerRecord) -> f64 {
    record.kills as f64 / record.time.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn add(store: &mut RecordStore, name: &str, kills: u64, deaths: u64, time: f64) -> PlayerRecord {
        store
            .add(name, &json!(kills), &json!(deaths), &json!(time))
            .expect("add player")
    }

    #[test]
    fn add_trims_and_coerces() {
        let mut store = RecordStore::default();
        let record = store
            .add("  Alice ", &json!("10"), &json!("oops"), &json!("1.5"))
            .unwrap();
        assert_eq!(record.nickname, "Alice");
        assert_eq!(record.kills, 10);
        assert_eq!(record.deaths, 0);
        assert_eq!(record.time, 1.5);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_rejects_blank_nickname() {
        let mut store = RecordStore::default();
        let err = store.add("   ", &json!(1), &json!(1), &json!(1)).unwrap_err();
        assert_eq!(err, StoreError::EmptyNickname);
        assert!(store.is_empty());
    }

    #[test]
    fn add_rejects_duplicate_in_any_case() {
        let mut store = RecordStore::default();
        add(&mut store, "Alice", 1, 1, 1.0);
        let err = store
            .add("aLICE", &json!(5), &json!(0), &json!(0))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateNickname("aLICE".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ids_are_unique_within_one_millisecond() {
        let mut store = RecordStore::default();
        let now = at(1_700_000_000_000);
        let first = store.add_at("a", &json!(0), &json!(0), &json!(0), now).unwrap();
        let second = store.add_at("b", &json!(0), &json!(0), &json!(0), now).unwrap();
        assert_ne!(first.id, second.id);
        assert!(second.id > first.id);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut store = RecordStore::default();
        let now = at(1_700_000_000_000);
        let first = store.add_at("a", &json!(0), &json!(0), &json!(0), now).unwrap();
        store.remove(first.id).unwrap();
        let second = store.add_at("b", &json!(0), &json!(0), &json!(0), now).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn update_merges_fields_and_keeps_identity() {
        let mut store = RecordStore::default();
        let created = at(1_700_000_000_000);
        let record = store
            .add_at("Alice", &json!(1), &json!(1), &json!(1), created)
            .unwrap();

        let later = created + Duration::seconds(30);
        let patch = PlayerPatch {
            kills: Some(json!(9)),
            ..PlayerPatch::default()
        };
        let updated = store.update_at(record.id, patch, later).unwrap();
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.kills, 9);
        assert_eq!(updated.deaths, 1);
        assert_eq!(updated.nickname, "Alice");
        assert_eq!(updated.created_at, created);
        assert_eq!(updated.updated_at, later);
    }

    #[test]
    fn rename_must_stay_unique() {
        let mut store = RecordStore::default();
        let alice = add(&mut store, "Alice", 1, 1, 1.0);
        add(&mut store, "Bob", 1, 1, 1.0);

        let clash = PlayerPatch {
            nickname: Some("BOB".to_string()),
            ..PlayerPatch::default()
        };
        assert_eq!(
            store.update(alice.id, clash).unwrap_err(),
            StoreError::DuplicateNickname("BOB".to_string())
        );

        let recase = PlayerPatch {
            nickname: Some("ALICE".to_string()),
            ..PlayerPatch::default()
        };
        assert_eq!(store.update(alice.id, recase).unwrap().nickname, "ALICE");
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let mut store = RecordStore::default();
        assert_eq!(
            store.update(42, PlayerPatch::default()).unwrap_err(),
            StoreError::NotFound(42)
        );
    }

    #[test]
    fn remove_takes_exactly_one_record() {
        let mut store = RecordStore::default();
        let alice = add(&mut store, "Alice", 10, 2, 1.5);
        let bob = add(&mut store, "Bob", 5, 5, 2.0);
        let carol = add(&mut store, "Carol", 1, 0, 0.5);

        let removed = store.remove(bob.id).unwrap();
        assert_eq!(removed, bob);
        assert_eq!(store.records(), &[alice, carol][..]);
        assert_eq!(store.remove(bob.id).unwrap_err(), StoreError::NotFound(bob.id));
    }

    #[test]
    fn replace_all_is_all_or_nothing() {
        let mut store = RecordStore::default();
        let alice = add(&mut store, "Alice", 1, 1, 1.0);

        let mut twin = alice.clone();
        twin.id += 1;
        twin.nickname = "alice".to_string();
        let err = store.replace_all(vec![alice.clone(), twin]).unwrap_err();
        assert_eq!(err, StoreError::DuplicateNickname("alice".to_string()));
        assert_eq!(store.records(), &[alice.clone()][..]);

        let err = store.replace_all(vec![alice.clone(), alice.clone()]).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(alice.id));
    }

    #[test]
    fn kd_uses_raw_kills_without_deaths() {
        let mut store = RecordStore::default();
        let flawless = add(&mut store, "Flawless", 5, 0, 0.0);
        let even = add(&mut store, "Even", 5, 2, 0.0);
        assert_eq!(kill_death_ratio(&flawless), 5.0);
        assert_eq!(kill_death_ratio(&even), 2.5);
    }

    #[test]
    fn kills_per_hour_floors_time_at_one() {
        let mut store = RecordStore::default();
        let short = add(&mut store, "Short", 6, 0, 0.5);
        let long = add(&mut store, "Long", 6, 0, 3.0);
        assert_eq!(kills_per_hour(&short), 6.0);
        assert_eq!(kills_per_hour(&long), 2.0);
    }
}
