//! Redundant persistence of a [`Snapshot`] on top of a [`KeyValueStore`].
//!
//! Every entity is written to a primary key and an emergency mirror; players
//! and activity additionally get a timestamped backup key. Writes are
//! verified by reading the primary keys back. Loading walks primary,
//! emergency, backups (newest first) and finally the emergency bundle, and
//! falls back to defaults instead of failing.

use crate::kv::{KeyValueStore, StorageError};
use crate::models::{ActivityEntry, PlayerRecord, Settings, Snapshot};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{self, JoinError};
use tracing::{debug, error, info, warn};

pub const EMERGENCY_BUNDLE_KEY: &str = "emergency-data";
pub const LAST_SAVE_KEY: &str = "last-save-timestamp";
pub const DEFAULT_MAX_BACKUPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Players,
    Activity,
    Settings,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Players, Entity::Activity, Entity::Settings];

    pub fn name(self) -> &'static str {
        match self {
            Entity::Players => "players",
            Entity::Activity => "activity",
            Entity::Settings => "settings",
        }
    }

    pub fn primary_key(self) -> String {
        format!("stats-{}", self.name())
    }

    pub fn emergency_key(self) -> String {
        format!("emergency-{}", self.name())
    }

    pub fn backup_prefix(self) -> String {
        format!("backup-{}-", self.name())
    }

    pub fn backup_key(self, millis: i64) -> String {
        format!("{}{millis}", self.backup_prefix())
    }

    pub fn keeps_backups(self) -> bool {
        matches!(self, Entity::Players | Entity::Activity)
    }
}

/// Bounded verify-and-rewrite schedule: `max_attempts` read-backs, the first
/// after `initial_delay`, doubling up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay.max(self.initial_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Verified { attempts: u32 },
    EmergencyOnly,
    Skipped,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save could not be verified after {attempts} attempts")]
    VerificationFailed { attempts: u32 },
    #[error("saving failed and the emergency copy could not be written: {0}")]
    Fatal(#[source] StorageError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "key", rename_all = "snake_case")]
pub enum LoadSource {
    Primary,
    Emergency,
    Backup(String),
    Bundle,
    Default,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: Snapshot,
    pub players: LoadSource,
    pub activity: LoadSource,
    pub settings: LoadSource,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmergencyBundle {
    #[serde(default)]
    players: Option<Vec<PlayerRecord>>,
    #[serde(default)]
    activity: Option<Vec<ActivityEntry>>,
    #[serde(default)]
    settings: Option<Settings>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Owns the write path. Saves, flushes and purges are serialized by
/// `write_lock`: a save that finds it taken is skipped, a flush or purge
/// waits for it, so a verification pass never races another writer.
/// Storage calls run on the blocking pool.
pub struct PersistenceGateway {
    io: StorageIo,
    policy: RetryPolicy,
    write_lock: Mutex<()>,
}

impl PersistenceGateway {
    pub fn new(kv: Arc<dyn KeyValueStore>, policy: RetryPolicy, max_backups: usize) -> Self {
        Self {
            io: StorageIo { kv, max_backups },
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.write_lock.try_lock().is_err()
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T, JoinError>
    where
        F: FnOnce(&StorageIo) -> T + Send + 'static,
        T: Send + 'static,
    {
        let io = self.io.clone();
        task::spawn_blocking(move || job(&io)).await
    }

    pub async fn persist_all(&self, snapshot: &Snapshot) -> Result<SaveOutcome, SaveError> {
        self.persist_all_at(snapshot, Utc::now()).await
    }

    pub async fn persist_all_at(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, SaveError> {
        let Ok(_guard) = self.write_lock.try_lock() else {
            debug!("save already in progress, skipping");
            return Ok(SaveOutcome::Skipped);
        };

        let payloads: Arc<[(Entity, String)]> = serialize(snapshot)?.into();
        let written = {
            let payloads = Arc::clone(&payloads);
            self.blocking(move |io| io.write_all(&payloads, now)).await?
        };
        if let Err(err) = written {
            error!("save failed: {err}; writing emergency bundle");
            let snapshot = snapshot.clone();
            return self.blocking(move |io| io.write_bundle(&snapshot, now)).await?;
        }

        let mut attempt = 1;
        loop {
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            let stale = {
                let payloads = Arc::clone(&payloads);
                self.blocking(move |io| io.stale_primaries(&payloads)).await?
            };
            if stale.is_empty() {
                debug!(attempt, "save verified");
                return Ok(SaveOutcome::Verified { attempts: attempt });
            }
            if attempt >= self.policy.max_attempts {
                error!(attempt, "save verification failed, giving up");
                return Err(SaveError::VerificationFailed { attempts: attempt });
            }

            warn!(attempt, stale = stale.len(), "save verification mismatch, rewriting");
            self.blocking(move |io| io.rewrite(&stale)).await?;
            attempt += 1;
        }
    }

    /// Primary and emergency keys only, no verification. Waits for a running
    /// save so the older snapshot cannot land on top of this one.
    pub async fn flush(&self, snapshot: &Snapshot) -> Result<(), SaveError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = snapshot.clone();
        self.blocking(move |io| io.flush(&snapshot)).await?
    }

    /// Deletes every key this gateway owns, backups included, once any
    /// running save has finished.
    pub async fn purge(&self) -> Result<(), SaveError> {
        let _guard = self.write_lock.lock().await;
        self.blocking(|io| io.purge()).await??;
        Ok(())
    }

    pub async fn load_all(&self) -> Result<LoadReport, SaveError> {
        Ok(self.blocking(|io| io.load_all()).await?)
    }

    pub async fn last_saved_at(&self) -> Option<String> {
        self.blocking(|io| io.kv.get(LAST_SAVE_KEY).ok().flatten())
            .await
            .ok()
            .flatten()
    }

    /// Backup keys for `entity` with their timestamps, newest first. Keys
    /// whose suffix is not a number are not backups.
    pub async fn backup_keys(&self, entity: Entity) -> Result<Vec<(i64, String)>, SaveError> {
        Ok(self.blocking(move |io| io.backup_keys(entity)).await??)
    }
}

/// The synchronous storage work, cloned onto blocking threads.
#[derive(Clone)]
struct StorageIo {
    kv: Arc<dyn KeyValueStore>,
    max_backups: usize,
}

impl StorageIo {
    fn load_all(&self) -> LoadReport {
        let mut bundle = None;
        let (players, players_source) = self.load_entity::<Vec<PlayerRecord>>(
            Entity::Players,
            &mut bundle,
            |bundle| bundle.players.take(),
        );
        let (activity, activity_source) = self.load_entity::<Vec<ActivityEntry>>(
            Entity::Activity,
            &mut bundle,
            |bundle| bundle.activity.take(),
        );
        let (settings, settings_source) =
            self.load_entity::<Settings>(Entity::Settings, &mut bundle, |bundle| {
                bundle.settings.take()
            });

        info!(
            players = players.len(),
            activity = activity.len(),
            "loaded state (players from {:?})",
            players_source
        );

        LoadReport {
            snapshot: Snapshot {
                players,
                activity,
                settings,
            },
            players: players_source,
            activity: activity_source,
            settings: settings_source,
        }
    }

    fn backup_keys(&self, entity: Entity) -> Result<Vec<(i64, String)>, StorageError> {
        let prefix = entity.backup_prefix();
        let mut backups: Vec<(i64, String)> = self
            .kv
            .keys()?
            .into_iter()
            .filter_map(|key| {
                let stamp = key.strip_prefix(&prefix)?.parse::<i64>().ok()?;
                Some((stamp, key))
            })
            .collect();
        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups)
    }

    fn prune_backups(&self, entity: Entity, keep: usize) -> Result<usize, StorageError> {
        let backups = self.backup_keys(entity)?;
        let mut removed = 0;
        for (_, key) in backups.iter().skip(keep) {
            self.kv.remove(key)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(entity = entity.name(), removed, "pruned old backups");
        }
        Ok(removed)
    }

    fn purge(&self) -> Result<(), StorageError> {
        for entity in Entity::ALL {
            self.kv.remove(&entity.primary_key())?;
            self.kv.remove(&entity.emergency_key())?;
            self.prune_backups(entity, 0)?;
        }
        self.kv.remove(EMERGENCY_BUNDLE_KEY)?;
        self.kv.remove(LAST_SAVE_KEY)?;
        Ok(())
    }

    fn write_all(&self, payloads: &[(Entity, String)], now: DateTime<Utc>) -> Result<(), StorageError> {
        for (entity, payload) in payloads {
            let entity = *entity;
            let backups = entity.keeps_backups() && self.max_backups > 0;
            if entity.keeps_backups() {
                if let Err(err) = self.prune_backups(entity, self.max_backups.saturating_sub(1)) {
                    warn!("backup rotation for {} failed: {err}", entity.name());
                }
            }

            self.kv.set(&entity.primary_key(), payload)?;
            self.kv.set(&entity.emergency_key(), payload)?;

            if backups {
                let key = entity.backup_key(now.timestamp_millis());
                if let Err(err) = self.kv.set(&key, payload) {
                    warn!("backup {key} not written: {err}");
                }
            }
        }
        self.kv.set(LAST_SAVE_KEY, &now.to_rfc3339())?;
        Ok(())
    }

    fn flush(&self, snapshot: &Snapshot) -> Result<(), SaveError> {
        let payloads = serialize(snapshot)?;
        let mut first_error = None;
        for (entity, payload) in &payloads {
            for key in [entity.primary_key(), entity.emergency_key()] {
                if let Err(err) = self.kv.set(&key, payload) {
                    error!("flush of {key} failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => {
                self.write_bundle(snapshot, Utc::now())?;
                warn!("flush fell back to emergency bundle after: {err}");
                Ok(())
            }
        }
    }

    fn write_bundle(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<SaveOutcome, SaveError> {
        let bundle = EmergencyBundle {
            players: Some(snapshot.players.clone()),
            activity: Some(snapshot.activity.clone()),
            settings: Some(snapshot.settings.clone()),
            timestamp: Some(now.to_rfc3339()),
        };
        let payload = serde_json::to_string(&bundle)?;
        match self.kv.set(EMERGENCY_BUNDLE_KEY, &payload) {
            Ok(()) => {
                warn!("state kept in emergency bundle only");
                Ok(SaveOutcome::EmergencyOnly)
            }
            Err(err) => {
                error!("emergency save failed: {err}");
                Err(SaveError::Fatal(err))
            }
        }
    }

    fn stale_primaries(&self, payloads: &[(Entity, String)]) -> Vec<(Entity, String)> {
        payloads
            .iter()
            .filter(|(entity, payload)| match self.kv.get(&entity.primary_key()) {
                Ok(Some(stored)) => stored != *payload,
                Ok(None) => true,
                Err(err) => {
                    warn!("verification read of {} failed: {err}", entity.primary_key());
                    true
                }
            })
            .cloned()
            .collect()
    }

    fn rewrite(&self, stale: &[(Entity, String)]) {
        for (entity, payload) in stale {
            if let Err(err) = self.kv.set(&entity.primary_key(), payload) {
                warn!("rewrite of {} failed: {err}", entity.primary_key());
            }
        }
    }

    fn load_entity<T: DeserializeOwned + Default>(
        &self,
        entity: Entity,
        bundle: &mut Option<Option<EmergencyBundle>>,
        from_bundle: impl FnOnce(&mut EmergencyBundle) -> Option<T>,
    ) -> (T, LoadSource) {
        let mut candidates = vec![
            (entity.primary_key(), LoadSource::Primary),
            (entity.emergency_key(), LoadSource::Emergency),
        ];
        match self.backup_keys(entity) {
            Ok(backups) => candidates.extend(
                backups
                    .into_iter()
                    .map(|(_, key)| (key.clone(), LoadSource::Backup(key))),
            ),
            Err(err) => warn!("listing backups for {} failed: {err}", entity.name()),
        }

        for (key, source) in candidates {
            if let Some(value) = self.read_json::<T>(&key) {
                if source != LoadSource::Primary {
                    warn!("recovered {} from {key}", entity.name());
                }
                return (value, source);
            }
        }

        let bundle = bundle.get_or_insert_with(|| self.read_json::<EmergencyBundle>(EMERGENCY_BUNDLE_KEY));
        if let Some(value) = bundle.as_mut().and_then(from_bundle) {
            warn!("recovered {} from {EMERGENCY_BUNDLE_KEY}", entity.name());
            return (value, LoadSource::Bundle);
        }

        (T::default(), LoadSource::Default)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("failed to read {key}: {err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("failed to parse {key}: {err}");
                None
            }
        }
    }
}

fn serialize(snapshot: &Snapshot) -> Result<Vec<(Entity, String)>, serde_json::Error> {
    Ok(vec![
        (Entity::Players, serde_json::to_string(&snapshot.players)?),
        (Entity::Activity, serde_json::to_string(&snapshot.activity)?),
        (Entity::Settings, serde_json::to_string(&snapshot.settings)?),
    ])
}
